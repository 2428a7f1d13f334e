use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::backend::BackendKind;
use common::cancel::{self, CancelArgs};
use common::config::{self, Config, SECTIONS};
use common::history::{self, History, HistoryFilter};
use common::listing::{self, job_listings};
use common::prelaunch::{self, ArgMode, KeyedArg, PrelaunchArgs};
use common::{launch, LaunchArgs, Workspace};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "launcher")]
#[command(about = "Lanza jobs en la máquina local, GridEngine o Slurm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Genera el jobfile combinando argumentos sobre un comando base
    Prelaunch(PrelaunchCmd),
    /// Lanza las tareas de un jobfile con el backend elegido
    Launch(LaunchCmd),
    /// Lista las tareas lanzadas por job id y task id
    List {
        #[arg(short = 'j', long)]
        jobid: Option<String>,
        /// Rango de tareas, p.ej. "18-22:1,26,29"
        #[arg(short, long)]
        tasklist: Option<String>,
        /// Columnas a ocultar
        #[arg(long, num_args = 1.., value_name = "COLUMNA")]
        hide: Vec<String>,
    },
    /// Cancela jobs / tareas ya enviadas
    Cancel {
        #[arg(long)]
        backend: BackendKind,
        #[arg(short = 'j', long)]
        jobid: String,
        #[arg(short, long)]
        tasklist: Option<String>,
        /// Solo imprime los comandos
        #[arg(short, long)]
        dry_run: bool,
        #[arg(short, long)]
        quiet: bool,
        /// No pide confirmación al cancelar el job entero
        #[arg(short, long)]
        yes: bool,
    },
    /// Lee o escribe la configuración
    Config {
        /// Solo la config global (~/.launcher/config.toml)
        #[arg(long = "global")]
        global: bool,
        /// Solo la config local (<estado>/config.toml)
        #[arg(long)]
        local: bool,
        #[arg(long)]
        read: bool,
        #[arg(long, num_args = 3, value_names = ["SECCION", "CLAVE", "VALOR"], allow_hyphen_values = true)]
        write: Option<Vec<String>>,
    },
    /// Historial de prelaunch / launch
    History {
        /// Últimas N entradas
        #[arg(short)]
        n: Option<usize>,
        #[arg(long)]
        launch: bool,
        #[arg(long)]
        prelaunch: bool,
        /// Oculta los dry-run
        #[arg(long)]
        no_dry_run: bool,
    },
}

#[derive(Args)]
struct PrelaunchCmd {
    /// Comando base
    #[arg(long, allow_hyphen_values = true)]
    command: String,
    #[arg(long)]
    jobname: String,
    #[arg(long)]
    jobfile: Option<PathBuf>,
    /// Argumento con valores excluyentes: "--lr 0.1 0.01"
    #[arg(long, allow_hyphen_values = true, value_name = "CLAVE VALORES")]
    arg: Vec<String>,
    /// Posicional con valores excluyentes: "a b c"
    #[arg(long, allow_hyphen_values = true, value_name = "VALORES")]
    pos_arg: Vec<String>,
    /// Descarta las combinaciones con estos valores: "--lr 0.1"
    #[arg(long, allow_hyphen_values = true, value_name = "CLAVE VALORES")]
    exclude: Vec<String>,
    /// Flag booleano que se prende y se apaga
    #[arg(long, allow_hyphen_values = true)]
    flag: Vec<String>,
    /// Pasa una etiqueta única a cada comando con este flag (por defecto --tag)
    #[arg(long, num_args = 0..=1, default_missing_value = "--tag")]
    tag: Option<String>,
    /// Claves que entran en la etiqueta: "--lr --seed"
    #[arg(long, allow_hyphen_values = true)]
    tag_args: Vec<String>,
    /// Etiqueta sin número de tarea
    #[arg(long)]
    no_tag_number: bool,
    #[arg(long, default_value = "argparse")]
    arg_mode: ArgMode,
    /// Agrega al jobfile existente
    #[arg(short, long)]
    append: bool,
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args)]
struct LaunchCmd {
    #[arg(long)]
    backend: BackendKind,
    #[arg(long)]
    jobname: String,
    /// Un solo comando en vez de un jobfile
    #[arg(long, allow_hyphen_values = true, conflicts_with = "jobfile")]
    command: Option<String>,
    #[arg(long)]
    jobfile: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    cpus: u32,
    #[arg(long, default_value_t = 0)]
    gpus: u32,
    /// GB de RAM por nodo
    #[arg(long, default_value_t = 2)]
    mem: u32,
    /// Virtualenv de python a activar
    #[arg(long)]
    venv: Option<String>,
    /// Duración d-hh:mm:ss
    #[arg(long, default_value = "0-01:00:00")]
    duration: String,
    /// Rango de tareas, p.ej. "18-22:1,26,29,34-49:3,51"
    #[arg(long)]
    tasklist: Option<String>,
    /// Máximo de tareas simultáneas
    #[arg(long, alias = "max", default_value_t = -1, allow_negative_numbers = true)]
    maxtasks: i32,
    /// Job corto de alta prioridad
    #[arg(long, alias = "test")]
    debug: bool,
    #[arg(short, long)]
    dry_run: bool,
    /// Espera a que termine este job id
    #[arg(long)]
    hold_jid: Option<String>,
    #[arg(short, long)]
    quiet: bool,
    /// Argumentos extra para el comando de envío (después de `--`)
    #[arg(last = true)]
    extra_args: Vec<String>,
}

impl LaunchCmd {
    fn into_args(self) -> LaunchArgs {
        LaunchArgs {
            command: self.command,
            jobfile: self.jobfile,
            cpus: self.cpus,
            gpus: self.gpus,
            mem: self.mem,
            venv: self.venv,
            duration: self.duration,
            tasklist: self.tasklist,
            maxtasks: self.maxtasks,
            debug: self.debug,
            dry_run: self.dry_run,
            hold_jid: self.hold_jid,
            quiet: self.quiet,
            extra_args: self.extra_args,
            ..LaunchArgs::new(self.backend, self.jobname)
        }
    }
}

impl PrelaunchCmd {
    fn into_args(self) -> Result<PrelaunchArgs> {
        let parse_keyed = |texts: Vec<String>| -> Result<Vec<KeyedArg>> {
            texts
                .iter()
                .map(|t| t.parse::<KeyedArg>().with_context(|| format!("argumento {:?}", t)))
                .collect()
        };
        let split = |t: &String| t.split_whitespace().map(str::to_string).collect::<Vec<_>>();

        let tag_args = if self.tag_args.is_empty() {
            None
        } else {
            Some(self.tag_args.iter().flat_map(split).collect())
        };

        Ok(PrelaunchArgs {
            jobfile: self.jobfile,
            pos_args: self.pos_arg.iter().map(split).filter(|v| !v.is_empty()).collect(),
            args: parse_keyed(self.arg)?,
            excludes: parse_keyed(self.exclude)?,
            flags: self.flag,
            tag: self.tag,
            tag_args,
            no_tag_number: self.no_tag_number,
            arg_mode: self.arg_mode,
            append: self.append,
            quiet: self.quiet,
            ..PrelaunchArgs::new(self.jobname, self.command)
        })
    }
}

/// Argumentos crudos del subcomando, para el historial.
fn raw_args() -> String {
    std::env::args().skip(2).collect::<Vec<_>>().join(" ")
}

/// y/yes => true; n/no/vacío => false; otra cosa => aviso y false.
fn confirm(question: &str) -> Result<bool> {
    print!("{} (y/[n])\n> ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    match answer.trim() {
        "y" | "yes" | "Y" | "YES" => Ok(true),
        "n" | "no" | "N" | "NO" | "" => Ok(false),
        other => {
            println!("No se entiende la respuesta {:?}", other);
            Ok(false)
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let workspace = Workspace::from_env();

    match cli.command {
        Commands::Prelaunch(cmd) => {
            let args = cmd.into_args()?;
            let report = prelaunch::prelaunch(&args, &workspace)?;
            info!("prelaunch {} -> {}", args.jobname, report.jobfile.display());

            History::new(workspace.history()).append(&args.jobname, "prelaunch", false, &raw_args())?;
        }

        Commands::Launch(cmd) => {
            let args = cmd.into_args();
            let config = Config::load(&workspace).context("no se pudo cargar la configuración")?;

            if !args.extra_args.is_empty() && !args.quiet {
                println!("Pasando estos argumentos al backend: {}", args.extra_args.join(" "));
            }

            // el historial registra también los lanzamientos fallidos
            let result = launch(&args, &workspace, &config).await;
            History::new(workspace.history()).append(&args.jobname, "launch", args.dry_run, &raw_args())?;
            let report = result?;

            if let Some(pool) = &report.pool {
                let failed = pool.failed();
                if !args.quiet {
                    println!(
                        "{} tareas terminadas, {} fallidas",
                        pool.outcomes.len(),
                        failed.len()
                    );
                }
                for outcome in failed {
                    warn!("tarea {} fallida: {:?}", outcome.task_id, outcome.status);
                }
            }
            if !report.job_ids.is_empty() {
                info!("{}: jobs {}", report.backend_name, report.job_ids.join(", "));
            }
        }

        Commands::List { jobid, tasklist, hide } => {
            let rows = job_listings(&workspace, jobid.as_deref(), tasklist.as_deref())?;
            let cells: Vec<Vec<String>> = rows.iter().map(|r| r.cells(&hide)).collect();
            println!("{}", listing::render_table(&listing::COLUMNS, &cells));
        }

        Commands::Cancel {
            backend,
            jobid,
            tasklist,
            dry_run,
            quiet,
            yes,
        } => {
            if tasklist.is_none()
                && !yes
                && !confirm("¿Seguro que quieres cancelar todas las tareas de este job?")?
            {
                println!("Cancelación abortada.");
                return Ok(());
            }

            let args = CancelArgs {
                backend,
                job_id: jobid,
                tasklist,
                dry_run,
                quiet,
            };
            cancel::cancel(&args, &workspace).await?;
        }

        Commands::Config {
            global,
            local,
            read,
            write,
        } => {
            if read && write.is_some() {
                bail!("no se puede leer y escribir a la vez");
            }

            let global_path = config::global_config_path();

            if let Some(values) = write {
                if global && local {
                    bail!("no se puede escribir en la config global y local a la vez");
                }
                let [section, key, value] = <[String; 3]>::try_from(values)
                    .map_err(|v| anyhow::anyhow!("--write espera 3 valores, llegaron {}", v.len()))?;
                if !SECTIONS.contains(&section.as_str()) {
                    warn!("no se puede asignar {}.{}={} (sección inválida)", section, key, value);
                    return Ok(());
                }

                let path = if global {
                    global_path.context("HOME no está definido")?
                } else {
                    workspace.local_config()
                };
                config::write_value(&path, &section, &key, &value)?;
                info!("{}.{} escrito en {}", section, key, path.display());
            } else {
                // --global y --local juntos (o ninguno) => configuración efectiva
                let mut layers = Vec::new();
                if global || !local {
                    layers.extend(global_path);
                }
                if local || !global {
                    layers.push(workspace.local_config());
                }
                let cfg = Config::from_layers(&layers)?;
                print!("{}", cfg.to_toml()?);
            }
        }

        Commands::History {
            n,
            launch,
            prelaunch,
            no_dry_run,
        } => {
            let filter = HistoryFilter {
                last: n,
                launch,
                prelaunch,
                no_dry_run,
            };
            let entries = History::new(workspace.history()).filtered(&filter)?;
            println!("{}", history::render(&entries));
        }
    }

    Ok(())
}
