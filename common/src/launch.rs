use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{info, warn};

use crate::backend::{Backend, BackendKind, LocalBackend, Plan, ShellCommand};
use crate::config::Config;
use crate::error::{LaunchError, Result};
use crate::index::{IndexEntry, JobIndex};
use crate::job::{CommandMapping, JobId};
use crate::pool::{self, PoolReport};
use crate::tasklist;
use crate::workspace::Workspace;

/// Argumentos ya resueltos de un lanzamiento (CLI + config).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchArgs {
    pub backend: BackendKind,
    pub jobname: String,
    /// Un solo comando en vez de un jobfile
    pub command: Option<String>,
    /// None => <estado>/scripts/<jobname>/jobs.json
    pub jobfile: Option<PathBuf>,
    pub cpus: u32,
    pub gpus: u32,
    /// GB por nodo
    pub mem: u32,
    pub venv: Option<String>,
    /// [D-]HH:MM:SS
    pub duration: String,
    pub tasklist: Option<String>,
    /// -1 => sin tope
    pub maxtasks: i32,
    pub debug: bool,
    pub dry_run: bool,
    pub hold_jid: Option<String>,
    pub quiet: bool,
    /// Argumentos que se pasan tal cual al comando de envío
    pub extra_args: Vec<String>,
}

impl LaunchArgs {
    pub fn new(backend: BackendKind, jobname: impl Into<String>) -> Self {
        Self {
            backend,
            jobname: jobname.into(),
            command: None,
            jobfile: None,
            cpus: 1,
            gpus: 0,
            mem: 2,
            venv: None,
            duration: "0-01:00:00".to_string(),
            tasklist: None,
            maxtasks: -1,
            debug: false,
            dry_run: false,
            hold_jid: None,
            quiet: false,
            extra_args: Vec::new(),
        }
    }
}

/// Resultado de un lanzamiento.
#[derive(Debug, Clone, Default)]
pub struct LaunchReport {
    pub backend_name: String,
    pub tasklist: String,
    /// Comandos de envío (cluster), ya renderizados
    pub commands: Vec<String>,
    /// Ids registrados en el índice
    pub job_ids: Vec<JobId>,
    /// Solo en local y fuera de dry-run
    pub pool: Option<PoolReport>,
}

/// El nombre se usa como carpeta de scripts: solo [A-Za-z0-9_.-].
pub fn validate_jobname(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(LaunchError::InvalidJobName(name.to_string()))
    }
}

/// Lee el job id de la salida de qsub -terse / sbatch --parsable.
/// "12345.1-10:1" -> "12345", "678;cluster" -> "678".
pub fn parse_job_id(output: &str) -> Option<JobId> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let id = line.split(['.', ';']).next()?.trim();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Ejecuta un comando de envío y devuelve el job id que imprime.
pub async fn submit(cmd: &ShellCommand) -> Result<JobId> {
    let line = cmd.render();
    let output = Command::new("sh")
        .arg("-c")
        .arg(&line)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| LaunchError::Submission {
            command: line.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("terminó con {}", output.status)
        } else {
            stderr
        };
        return Err(LaunchError::Submission {
            command: line,
            reason,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    parse_job_id(&stdout).ok_or(LaunchError::UnparsableJobId {
        command: line,
        output: stdout,
    })
}

/// Lanza un job: resuelve jobfile y rango, arma el plan y lo ejecuta
/// (pool local) o lo envía bloque por bloque (cluster).
pub async fn launch(args: &LaunchArgs, workspace: &Workspace, config: &Config) -> Result<LaunchReport> {
    // ---- validaciones sin efectos secundarios ----
    validate_jobname(&args.jobname)?;
    if args.cpus == 0 {
        return Err(LaunchError::ConflictingFlags("--cpus debe ser >= 1".to_string()));
    }
    if args.command.is_some() && args.jobfile.is_some() {
        return Err(LaunchError::ConflictingFlags(
            "--command escribe su propio jobfile, no se combina con --jobfile".to_string(),
        ));
    }
    let backend = Backend::new(args.backend);
    if let Some(text) = &args.tasklist {
        tasklist::parse_blocks(text)?;
        backend.validate_tasklist(text)?;
    }

    let jobfile = args
        .jobfile
        .clone()
        .unwrap_or_else(|| workspace.default_jobfile(&args.jobname));

    if let Some(command) = &args.command {
        CommandMapping::single(command.as_str()).save(&jobfile)?;
    }
    let commands = CommandMapping::load(&jobfile)?;
    if commands.is_empty() {
        return Err(LaunchError::Jobfile {
            path: jobfile,
            reason: "no tiene tareas".to_string(),
        });
    }

    let tasklist_text = args
        .tasklist
        .clone()
        .unwrap_or_else(|| backend.default_tasklist(&commands));

    let plan = backend.build_plan(args, &jobfile, &tasklist_text, workspace, config)?;

    let mut report = LaunchReport {
        backend_name: backend.name().to_string(),
        tasklist: tasklist_text,
        ..LaunchReport::default()
    };
    let index = JobIndex::new(workspace.job_index());

    match plan {
        Plan::Local { task_ids } => {
            let Backend::Local(local) = &backend else {
                return Err(LaunchError::Unsupported {
                    backend: backend.name().to_string(),
                    op: "local pool",
                });
            };
            let counter = index.next_local_id()?;
            let prefix = LocalBackend::log_prefix(&backend.log_dir(workspace), &args.jobname, counter);

            if args.dry_run {
                let n = pool::worker_count(task_ids.len(), args.maxtasks, args.cpus, pool::available_cpus());
                if !args.quiet {
                    println!(
                        "[dry-run] {} tareas ({}) con {} workers en {}",
                        task_ids.len(),
                        report.tasklist,
                        n,
                        local.name()
                    );
                }
                return Ok(report);
            }

            let job_id = counter.to_string();
            index.append(&[IndexEntry::new(job_id.as_str(), &args.jobname, &jobfile)])?;
            report.job_ids.push(job_id);

            let pool_report = local
                .execute(
                    Arc::new(commands),
                    &task_ids,
                    args,
                    &prefix,
                    pool::available_cpus(),
                )
                .await?;
            report.pool = Some(pool_report);
        }
        Plan::Cluster { commands: plan } => {
            for cmd in &plan {
                let line = cmd.render();
                if !args.quiet {
                    println!("{}", line);
                }
                report.commands.push(line);

                if args.dry_run {
                    continue;
                }

                match submit(cmd).await {
                    Ok(job_id) => {
                        info!("{}: job {} enviado", backend.name(), job_id);
                        report.job_ids.push(job_id);
                    }
                    Err(e) => {
                        // lo ya enviado queda en el índice; no se cancela nada
                        warn!(
                            "{}: envío fallido, se omiten los bloques restantes",
                            backend.name()
                        );
                        record_submitted(&index, &report.job_ids, args, &jobfile)?;
                        return Err(e);
                    }
                }
            }
            record_submitted(&index, &report.job_ids, args, &jobfile)?;
        }
    }

    Ok(report)
}

fn record_submitted(
    index: &JobIndex,
    job_ids: &[JobId],
    args: &LaunchArgs,
    jobfile: &std::path::Path,
) -> Result<()> {
    let entries: Vec<IndexEntry> = job_ids
        .iter()
        .map(|id| IndexEntry::new(id.as_str(), &args.jobname, jobfile))
        .collect();
    index.append(&entries)
}
