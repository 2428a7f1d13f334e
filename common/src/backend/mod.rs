//! Backends de ejecución: local (pool en proceso), GridEngine y Slurm.
//!
//! El conjunto es cerrado: agregar un cuarto backend es agregar una variante
//! a `BackendKind` / `Backend` y sus brazos en los `match`.

pub mod command;
pub mod gridengine;
pub mod local;
pub mod script;
pub mod slurm;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;
use crate::error::{LaunchError, Result};
use crate::job::{CommandMapping, JobId, TaskId};
use crate::launch::LaunchArgs;
use crate::tasklist;
use crate::workspace::Workspace;

pub use command::ShellCommand;
pub use gridengine::GridEngineBackend;
pub use local::LocalBackend;
pub use script::WrapperScript;
pub use slurm::SlurmBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Local,
    GridEngine,
    Slurm,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Local, BackendKind::GridEngine, BackendKind::Slurm];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::GridEngine => "gridengine",
            BackendKind::Slurm => "slurm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(BackendKind::Local),
            "gridengine" => Ok(BackendKind::GridEngine),
            "slurm" => Ok(BackendKind::Slurm),
            other => Err(LaunchError::UnknownBackend(other.to_string())),
        }
    }
}

/// Qué hacer con un lanzamiento ya resuelto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Local: no hay scheduler, el "plan" son los ids a correr en el pool.
    Local { task_ids: Vec<TaskId> },
    /// Cluster: un comando de envío por bloque del rango, en orden.
    Cluster { commands: Vec<ShellCommand> },
}

/// (job, subconjunto de tareas). `None` => cancelar el job entero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub job_id: JobId,
    pub task_ids: Option<Vec<TaskId>>,
}

#[derive(Debug, Clone)]
pub enum Backend {
    Local(LocalBackend),
    GridEngine(GridEngineBackend),
    Slurm(SlurmBackend),
}

impl Backend {
    pub fn new(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Local => Backend::Local(LocalBackend::new()),
            BackendKind::GridEngine => Backend::GridEngine(GridEngineBackend),
            BackendKind::Slurm => Backend::Slurm(SlurmBackend),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Local(_) => BackendKind::Local,
            Backend::GridEngine(_) => BackendKind::GridEngine,
            Backend::Slurm(_) => BackendKind::Slurm,
        }
    }

    /// Nombre para logs: hostname en local, nombre del scheduler en cluster.
    pub fn name(&self) -> &str {
        match self {
            Backend::Local(b) => b.name(),
            Backend::GridEngine(_) => gridengine::NAME,
            Backend::Slurm(_) => slurm::NAME,
        }
    }

    /// Variable de entorno con el id de la tarea dentro del array.
    pub fn task_id_var(&self) -> &'static str {
        match self {
            Backend::Local(_) => local::TASK_ID_VAR,
            Backend::GridEngine(_) => gridengine::TASK_ID_VAR,
            Backend::Slurm(_) => slurm::TASK_ID_VAR,
        }
    }

    pub fn log_dir(&self, workspace: &Workspace) -> PathBuf {
        workspace.logs_dir(self.name())
    }

    /// Lista de tareas por defecto: todos los ids del jobfile.
    pub fn default_tasklist(&self, commands: &CommandMapping) -> String {
        match self {
            Backend::Local(_) => commands
                .ids()
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
            // ids ordenados -> bloques a-b que el scheduler entiende
            Backend::GridEngine(_) | Backend::Slurm(_) => tasklist::compress(&commands.ids()),
        }
    }

    /// Expande y valida el rango antes de cualquier efecto secundario.
    pub fn validate_tasklist(&self, text: &str) -> Result<Vec<TaskId>> {
        let ids = tasklist::expand(text)?;
        if let Backend::GridEngine(_) = self {
            // el rango de GridEngine no acepta 0
            if ids.contains(&0) {
                return Err(LaunchError::InvalidTaskId {
                    backend: self.name().to_string(),
                    id: 0,
                });
            }
        }
        Ok(ids)
    }

    pub fn wrapper_script(&self, config: &Config, args: &LaunchArgs, jobfile: &Path) -> WrapperScript {
        let section = config
            .script(self.kind().as_str())
            .cloned()
            .unwrap_or_default();
        WrapperScript::render(
            &section,
            args.venv.as_deref(),
            &config.worker.command,
            jobfile,
            self.task_id_var(),
        )
    }

    /// Arma el plan. En cluster escribe el wrapper script (después de validar
    /// duración/recursos, así un error no deja archivos a medias).
    pub fn build_plan(
        &self,
        args: &LaunchArgs,
        jobfile: &Path,
        tasklist_text: &str,
        workspace: &Workspace,
        config: &Config,
    ) -> Result<Plan> {
        let task_ids = self.validate_tasklist(tasklist_text)?;

        match self {
            Backend::Local(b) => {
                b.check_args(args)?;
                let mut task_ids = task_ids;
                task_ids.sort_unstable();
                task_ids.dedup();
                Ok(Plan::Local { task_ids })
            }
            Backend::GridEngine(b) => {
                let request = b.resource_request(args)?;
                let script = self.wrapper_script(config, args, jobfile);
                let script_path = script.save(&workspace.scripts_dir(&args.jobname))?;
                let commands = b.submission_commands(
                    args,
                    &request,
                    &self.log_dir(workspace),
                    tasklist_text,
                    &script_path,
                );
                Ok(Plan::Cluster { commands })
            }
            Backend::Slurm(b) => {
                let request = b.resource_request(args)?;
                let script = self.wrapper_script(config, args, jobfile);
                let script_path = script.save(&workspace.scripts_dir(&args.jobname))?;
                let commands = b.submission_commands(
                    args,
                    &request,
                    &self.log_dir(workspace),
                    tasklist_text,
                    &script_path,
                );
                Ok(Plan::Cluster { commands })
            }
        }
    }

    pub fn cancel_commands(&self, cancellations: &[Cancellation]) -> Result<Vec<ShellCommand>> {
        match self {
            Backend::Local(_) => Err(LaunchError::Unsupported {
                backend: self.name().to_string(),
                op: "cancel",
            }),
            Backend::GridEngine(b) => Ok(b.cancel_commands(cancellations)),
            Backend::Slurm(b) => Ok(b.cancel_commands(cancellations)),
        }
    }
}

/* ---------------- duración compartida ---------------- */

/// Parsea `D-HH:MM:SS` o `HH:MM:SS` (días = 0).
pub fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || LaunchError::InvalidDuration(text.to_string());
    let text = text.trim();

    let (days, hms) = match text.split_once('-') {
        Some((d, rest)) => (d.parse::<u64>().map_err(|_| invalid())?, rest),
        None => (0, text),
    };

    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let mut values = [0u64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = part.parse().map_err(|_| invalid())?;
    }
    let [h, m, s] = values;
    if m >= 60 || s >= 60 {
        return Err(invalid());
    }

    let secs = days
        .checked_mul(86_400)
        .and_then(|d| h.checked_mul(3_600).and_then(|h| d.checked_add(h)))
        .and_then(|t| t.checked_add(m * 60 + s))
        .ok_or_else(invalid)?;
    Ok(Duration::from_secs(secs))
}

/// `2h`, `10m`, `1d`... solo para mensajes de error.
pub(crate) fn human_limit(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s % 86_400 == 0 => format!("{}d", s / 86_400),
        s if s % 3_600 == 0 => format!("{}h", s / 3_600),
        s if s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}
