//! Generación del jobfile: producto cartesiano de argumentos sobre un comando base.
//!
//! Orden de variación: el primer valor de cada nuevo argumento varía más
//! rápido dentro de los ya existentes; cada flag duplica el conjunto
//! (primero con el flag, después sin él).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{LaunchError, Result};
use crate::job::{CommandMapping, JobRecord, TaskId};
use crate::launch::validate_jobname;
use crate::workspace::Workspace;

const SEP: &str = "_";
const WSEP: &str = "__";
const FLAG_ON: &str = "+";
const FLAG_OFF: &str = "-";

/// Cómo se escribe un argumento con valor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgMode {
    /// `--key value`
    #[default]
    Argparse,
    /// `key=value`
    Hydra,
}

impl ArgMode {
    pub fn separator(&self) -> &'static str {
        match self {
            ArgMode::Argparse => " ",
            ArgMode::Hydra => "=",
        }
    }
}

impl fmt::Display for ArgMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArgMode::Argparse => "argparse",
            ArgMode::Hydra => "hydra",
        })
    }
}

impl FromStr for ArgMode {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argparse" => Ok(ArgMode::Argparse),
            "hydra" => Ok(ArgMode::Hydra),
            other => Err(LaunchError::Config(format!("arg-mode desconocido: {}", other))),
        }
    }
}

/// `--key` con su lista de valores (vacía => argumento sin valor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedArg {
    pub key: String,
    pub values: Vec<String>,
}

impl FromStr for KeyedArg {
    type Err = LaunchError;

    /// "--lr 0.1 0.01" -> key "--lr", values ["0.1", "0.01"]
    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace().map(str::to_string);
        let key = words
            .next()
            .ok_or_else(|| LaunchError::Config("argumento vacío".to_string()))?;
        Ok(Self {
            key,
            values: words.collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PrelaunchArgs {
    pub jobname: String,
    pub command: String,
    pub jobfile: Option<PathBuf>,
    /// Cada entrada es la lista de valores de un posicional
    pub pos_args: Vec<Vec<String>>,
    pub args: Vec<KeyedArg>,
    pub excludes: Vec<KeyedArg>,
    pub flags: Vec<String>,
    /// Flag que recibe la etiqueta de cada comando (None => sin etiquetas)
    pub tag: Option<String>,
    /// Claves que entran en la etiqueta (None => todas las de `args`)
    pub tag_args: Option<Vec<String>>,
    pub no_tag_number: bool,
    pub arg_mode: ArgMode,
    pub append: bool,
    pub quiet: bool,
}

impl PrelaunchArgs {
    pub fn new(jobname: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            jobname: jobname.into(),
            command: command.into(),
            jobfile: None,
            pos_args: Vec::new(),
            args: Vec::new(),
            excludes: Vec::new(),
            flags: Vec::new(),
            tag: None,
            tag_args: None,
            no_tag_number: false,
            arg_mode: ArgMode::Argparse,
            append: false,
            quiet: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrelaunchReport {
    pub jobfile: PathBuf,
    /// Comandos agregados en esta llamada
    pub added: usize,
    /// Total en el jobfile
    pub total: usize,
}

/// Una combinación en construcción.
#[derive(Debug, Clone, Default)]
struct Combo {
    command: String,
    suffix: String,
    assigned: Vec<(String, Option<String>)>,
}

impl Combo {
    fn excluded_by(&self, excludes: &[KeyedArg]) -> bool {
        !excludes.is_empty()
            && excludes.iter().all(|ex| {
                self.assigned.iter().any(|(key, value)| {
                    key == &ex.key
                        && match value {
                            Some(v) => ex.values.contains(v),
                            None => ex.values.is_empty(),
                        }
                })
            })
    }
}

/// `--learning-rate` -> `learningrate`, `model/opt=x` -> `model.opt_x`
fn tag_keyname(key: &str) -> String {
    key.replace(['_', '-'], "")
        .replace('=', "_")
        .replace('/', ".")
}

fn flag_name(flag: &str) -> String {
    flag.replace(['+', '-'], "")
}

/// Arma las combinaciones. `start_id` es el id de la primera (para la etiqueta).
pub fn generate(args: &PrelaunchArgs, start_id: TaskId) -> Result<Vec<JobRecord>> {
    if matches!(args.tag.as_deref(), Some("")) {
        return Err(LaunchError::Config("--tag no puede ser vacío".to_string()));
    }
    let tagging = args.tag.is_some();
    let sep = args.arg_mode.separator();

    // --arg repetido: el último gana, en la posición del primero
    let mut keyed: Vec<KeyedArg> = Vec::new();
    for arg in &args.args {
        match keyed.iter_mut().find(|k| k.key == arg.key) {
            Some(existing) => existing.values = arg.values.clone(),
            None => keyed.push(arg.clone()),
        }
    }

    let tag_keys: Vec<String> = match &args.tag_args {
        None => keyed.iter().map(|k| k.key.clone()).collect(),
        Some(names) => {
            for name in names {
                if !keyed.iter().any(|k| &k.key == name) {
                    warn!("{} no es un argumento del comando", name);
                }
            }
            names.clone()
        }
    };

    let mut combos = vec![Combo {
        command: args.command.clone(),
        ..Combo::default()
    }];

    for values in &args.pos_args {
        combos = values
            .iter()
            .flat_map(|v| {
                combos.iter().map(move |c| {
                    let mut next = c.clone();
                    next.command.push_str(&format!(" {}", v));
                    if tagging {
                        next.suffix.push_str(&format!("{}{}", WSEP, v));
                    }
                    next
                })
            })
            .collect();
    }

    for arg in &keyed {
        let in_tag = tagging && tag_keys.contains(&arg.key);
        let keyname = tag_keyname(&arg.key);

        if arg.values.is_empty() {
            for c in combos.iter_mut() {
                c.command.push_str(&format!(" {}", arg.key));
                if in_tag {
                    c.suffix.push_str(&format!("{}{}", WSEP, keyname));
                }
                c.assigned.push((arg.key.clone(), None));
            }
            continue;
        }

        combos = arg
            .values
            .iter()
            .flat_map(|v| {
                let keyname = &keyname;
                combos.iter().map(move |c| {
                    let mut next = c.clone();
                    next.command.push_str(&format!(" {}{}{}", arg.key, sep, v));
                    if in_tag {
                        next.suffix.push_str(&format!("{}{}{}{}", WSEP, keyname, SEP, v));
                    }
                    next.assigned.push((arg.key.clone(), Some(v.clone())));
                    next
                })
            })
            .collect();
    }

    combos.retain(|c| !c.excluded_by(&args.excludes));

    for flag in &args.flags {
        let name = flag_name(flag);
        let on = combos.iter().map(|c| {
            let mut next = c.clone();
            next.command.push_str(&format!(" {}", flag));
            if tagging {
                next.suffix.push_str(&format!("{}{}{}", WSEP, FLAG_ON, name));
            }
            next
        });
        let off = combos.iter().map(|c| {
            let mut next = c.clone();
            if tagging {
                next.suffix.push_str(&format!("{}{}{}", WSEP, FLAG_OFF, name));
            }
            next
        });
        combos = on.chain(off).collect();
    }

    let Some(tag_flag) = &args.tag else {
        return Ok(combos
            .into_iter()
            .map(|c| JobRecord {
                command: c.command,
                tag: String::new(),
            })
            .collect());
    };

    // ancho fijo del número: el del último id
    let last_id = start_id as usize + combos.len().saturating_sub(1);
    let width = last_id.to_string().len();

    Ok(combos
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let tag = if args.no_tag_number {
                format!("{}{}", args.jobname, c.suffix)
            } else {
                format!(
                    "{}{}{:0width$}{}",
                    args.jobname,
                    SEP,
                    start_id as usize + i,
                    c.suffix,
                    width = width
                )
            };
            JobRecord {
                command: format!("{} {}{}{}", c.command, tag_flag, sep, tag),
                tag,
            }
        })
        .collect())
}

/// Genera los comandos y los escribe en el jobfile.
pub fn prelaunch(args: &PrelaunchArgs, workspace: &Workspace) -> Result<PrelaunchReport> {
    validate_jobname(&args.jobname)?;

    let jobfile = args
        .jobfile
        .clone()
        .unwrap_or_else(|| workspace.default_jobfile(&args.jobname));

    let mut mapping = if args.append && jobfile.exists() {
        CommandMapping::load(&jobfile)?
    } else {
        CommandMapping::default()
    };
    let start_id = mapping.max_id().map_or(1, |id| id + 1);

    let records = generate(args, start_id)?;
    let added = records.len();

    for (offset, record) in records.into_iter().enumerate() {
        if !args.quiet {
            println!("{}", record.command);
        }
        mapping.insert(start_id + offset as TaskId, record.command, record.tag);
    }
    if let Some(tag) = &args.tag {
        mapping.tag_flag = tag.clone();
    }

    mapping.save(&jobfile)?;
    info!("jobfile {} con {} comandos", jobfile.display(), mapping.len());
    println!("Pre-lanzados {} comandos para {}.", mapping.len(), args.jobname);

    Ok(PrelaunchReport {
        jobfile,
        added,
        total: mapping.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("prelaunch_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn keyed(text: &str) -> KeyedArg {
        text.parse().unwrap()
    }

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn commands(records: &[JobRecord]) -> Vec<&str> {
        records.iter().map(|r| r.command.as_str()).collect()
    }

    #[test]
    fn posicionales_varian_el_primero_mas_rapido() {
        let mut args = PrelaunchArgs::new("t", "echo");
        args.pos_args = vec![words("0 1 2"), words("3 4")];

        let out = generate(&args, 1).unwrap();
        assert_eq!(
            commands(&out),
            vec!["echo 0 3", "echo 1 3", "echo 2 3", "echo 0 4", "echo 1 4", "echo 2 4"]
        );
        assert!(out.iter().all(|r| r.tag.is_empty()));
    }

    #[test]
    fn flags_duplican_primero_encendido() {
        let mut args = PrelaunchArgs::new("t", "echo");
        args.flags = words("--hi --hi2");

        let out = generate(&args, 1).unwrap();
        assert_eq!(
            commands(&out),
            vec!["echo --hi --hi2", "echo --hi2", "echo --hi", "echo"]
        );
    }

    #[test]
    fn etiqueta_por_defecto_incluye_numero_y_argumentos() {
        let mut args = PrelaunchArgs::new("testecho", "echo");
        args.args = vec![keyed("--test hi"), keyed("--test2 hi2")];
        args.tag = Some("--tag".to_string());

        let out = generate(&args, 1).unwrap();
        assert_eq!(
            out[0].command,
            "echo --test hi --test2 hi2 --tag testecho_1__test_hi__test2_hi2"
        );
        assert_eq!(out[0].tag, "testecho_1__test_hi__test2_hi2");
    }

    #[test]
    fn etiqueta_combinada_con_flags_y_posicionales() {
        let mut args = PrelaunchArgs::new("testecho", "echo");
        args.pos_args = vec![words("hi2")];
        args.args = vec![keyed("--test hi")];
        args.flags = words("--help");
        args.tag = Some("--tag".to_string());

        let out = generate(&args, 1).unwrap();
        assert_eq!(
            commands(&out),
            vec![
                "echo hi2 --test hi --help --tag testecho_1__hi2__test_hi__+help",
                "echo hi2 --test hi --tag testecho_2__hi2__test_hi__-help",
            ]
        );
    }

    #[test]
    fn numero_de_etiqueta_con_ancho_fijo() {
        let mut args = PrelaunchArgs::new("exp", "run");
        args.args = vec![keyed("--seed 1 2 3 4 5 6 7 8 9 10 11")];
        args.tag = Some("--tag".to_string());
        args.tag_args = Some(Vec::new());

        let out = generate(&args, 1).unwrap();
        assert_eq!(out.len(), 11);
        assert_eq!(out[0].tag, "exp_01");
        assert_eq!(out[10].tag, "exp_11");

        args.no_tag_number = true;
        let out = generate(&args, 1).unwrap();
        assert_eq!(out[0].tag, "exp");
    }

    #[test]
    fn tag_args_limita_las_claves_de_la_etiqueta() {
        let mut args = PrelaunchArgs::new("e", "run");
        args.args = vec![keyed("--lr 0.1 0.2"), keyed("--seed 1")];
        args.tag = Some("--name".to_string());
        args.tag_args = Some(vec!["--lr".to_string(), "--nope".to_string()]);

        let out = generate(&args, 1).unwrap();
        assert_eq!(out[0].tag, "e_1__lr_0.1");
        assert_eq!(out[1].tag, "e_2__lr_0.2");
        assert!(out[1].command.ends_with("--seed 1 --name e_2__lr_0.2"));
    }

    #[test]
    fn exclude_filtra_comando_y_etiqueta_juntos() {
        let mut args = PrelaunchArgs::new("e", "run");
        args.args = vec![keyed("--a 1 2"), keyed("--b x y")];
        args.excludes = vec![keyed("--a 2"), keyed("--b y")];
        args.tag = Some("--tag".to_string());

        let out = generate(&args, 1).unwrap();
        assert_eq!(
            commands(&out),
            vec![
                "run --a 1 --b x --tag e_1__a_1__b_x",
                "run --a 2 --b x --tag e_2__a_2__b_x",
                "run --a 1 --b y --tag e_3__a_1__b_y",
            ]
        );
    }

    #[test]
    fn modo_hydra_usa_igual() {
        let mut args = PrelaunchArgs::new("h", "python app.py");
        args.args = vec![keyed("model.lr 0.1")];
        args.arg_mode = "hydra".parse().unwrap();
        args.tag = Some("tag".to_string());

        let out = generate(&args, 1).unwrap();
        assert_eq!(out[0].command, "python app.py model.lr=0.1 tag=h_1__model.lr_0.1");
    }

    #[test]
    fn argumento_sin_valores_va_solo() {
        let mut args = PrelaunchArgs::new("e", "run");
        args.args = vec![keyed("--verbose")];
        let out = generate(&args, 1).unwrap();
        assert_eq!(commands(&out), vec!["run --verbose"]);
    }

    #[test]
    fn tag_vacio_es_error() {
        let mut args = PrelaunchArgs::new("e", "run");
        args.tag = Some(String::new());
        assert!(matches!(generate(&args, 1), Err(LaunchError::Config(_))));
    }

    #[test]
    fn prelaunch_escribe_y_append_continua_la_numeracion() {
        let tmp = temp_dir("append");
        let ws = Workspace::new(tmp.join("estado"));

        let mut args = PrelaunchArgs::new("testecho", "echo");
        args.args = vec![keyed("--test hi"), keyed("--test2 hi2")];
        args.tag = Some("--tag".to_string());
        args.quiet = true;

        let first = prelaunch(&args, &ws).unwrap();
        assert_eq!(first.total, 1);

        args.append = true;
        let second = prelaunch(&args, &ws).unwrap();
        assert_eq!(second.added, 1);
        assert_eq!(second.total, 2);

        let mapping = CommandMapping::load(&ws.default_jobfile("testecho")).unwrap();
        assert_eq!(mapping.tag_flag, "--tag");
        assert_eq!(
            mapping.command(2).unwrap(),
            "echo --test hi --test2 hi2 --tag testecho_2__test_hi__test2_hi2"
        );
        assert_eq!(mapping.get(2).unwrap().tag, "testecho_2__test_hi__test2_hi2");
    }

    #[test]
    fn prelaunch_sin_append_reemplaza_el_jobfile() {
        let tmp = temp_dir("reemplaza");
        let ws = Workspace::new(tmp.join("estado"));

        let mut args = PrelaunchArgs::new("e", "echo");
        args.pos_args = vec![words("a b c")];
        args.quiet = true;
        prelaunch(&args, &ws).unwrap();

        args.pos_args = vec![words("z")];
        let report = prelaunch(&args, &ws).unwrap();
        assert_eq!(report.total, 1);
        let mapping = CommandMapping::load(&report.jobfile).unwrap();
        assert_eq!(mapping.command(1).unwrap(), "echo z");
    }
}
