use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{LaunchError, Result};
use crate::job::{CommandMapping, TaskId};
use crate::launch::LaunchArgs;
use crate::pool::{self, PoolReport};

pub const TASK_ID_VAR: &str = "$TASK_ID";

/// Backend local: sin scheduler, corre las tareas en un pool de procesos.
/// Su nombre (para logs) es el hostname de la máquina.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
}

impl LocalBackend {
    pub fn new() -> Self {
        let hostname = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let name = hostname.trim_end_matches(".local").to_string();
        if name.is_empty() {
            Self::with_name("localhost")
        } else {
            Self { name }
        }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// No hay comando de envío donde meter argumentos extra.
    pub fn check_args(&self, args: &LaunchArgs) -> Result<()> {
        if !args.extra_args.is_empty() {
            return Err(LaunchError::ExtraArgsUnsupported {
                backend: self.name.clone(),
                args: args.extra_args.join(" "),
            });
        }
        Ok(())
    }

    /// `<logs>/<jobname>_<contador>`; el pool agrega `_<task>.o|.e`.
    pub fn log_prefix(log_dir: &Path, jobname: &str, counter: u64) -> PathBuf {
        log_dir.join(format!("{}_{}", jobname, counter))
    }

    /// Corre las tareas y espera a que terminen todas.
    pub async fn execute(
        &self,
        commands: Arc<CommandMapping>,
        task_ids: &[TaskId],
        args: &LaunchArgs,
        log_prefix: &Path,
        available_cpus: usize,
    ) -> Result<PoolReport> {
        if let Some(dir) = log_prefix.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let n_workers = pool::worker_count(task_ids.len(), args.maxtasks, args.cpus, available_cpus);
        pool::run_pool(commands, task_ids, n_workers, log_prefix, args.quiet).await
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}
