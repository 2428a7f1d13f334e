//! Pool local con concurrencia acotada.
//!
//! Cada tarea es un proceso `sh -c` nuevo (no se reutiliza estado entre
//! tareas) y un semáforo limita cuántas corren a la vez. Las tareas se
//! despachan en orden ascendente; el orden de terminación no está garantizado.
//! El fallo de una tarea no corta a las demás.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{System, SystemExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{LaunchError, Result};
use crate::job::{CommandMapping, TaskId};
use crate::worker::{run_command_by_id, TaskLogs, TaskOutcome, TaskStatus};

/// CPUs lógicas de la máquina (al menos 1).
pub fn available_cpus() -> usize {
    let mut sys = System::new();
    sys.refresh_cpu();
    cpus_or_fallback(sys.cpus().len())
}

/// sysinfo puede no listar CPUs (p. ej. sin /proc); en ese caso se usa lo que
/// reporta la std.
fn cpus_or_fallback(listed: usize) -> usize {
    if listed > 0 {
        return listed;
    }
    let fallback = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    warn!("sysinfo no reporta CPUs, se usan {}", fallback);
    fallback
}

/// Cantidad de workers:
/// - `maxtasks > 0`: ese valor;
/// - si no: floor(cpus disponibles / cpus por tarea), al menos 1;
/// - nunca más workers que tareas.
pub fn worker_count(n_tasks: usize, maxtasks: i32, cpus_per_task: u32, available: usize) -> usize {
    let wanted = if maxtasks > 0 {
        maxtasks as usize
    } else {
        (available / cpus_per_task.max(1) as usize).max(1)
    };
    wanted.min(n_tasks)
}

/// `<prefijo>_<task>.o` / `<prefijo>_<task>.e`
pub fn log_paths(log_prefix: &Path, task_id: TaskId) -> (PathBuf, PathBuf) {
    let base = log_prefix.to_string_lossy();
    (
        PathBuf::from(format!("{}_{}.o", base, task_id)),
        PathBuf::from(format!("{}_{}.e", base, task_id)),
    )
}

#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    /// Un resultado por tarea, ordenado por task id
    pub outcomes: Vec<TaskOutcome>,
}

impl PoolReport {
    pub fn failed(&self) -> Vec<&TaskOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded()).collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.succeeded())
    }
}

/// Corre todas las tareas y espera a que terminen (join).
///
/// Solo falla si el pool no puede arrancar (0 workers); los fallos de cada
/// tarea quedan en el `PoolReport`.
pub async fn run_pool(
    commands: Arc<CommandMapping>,
    task_ids: &[TaskId],
    n_workers: usize,
    log_prefix: &Path,
    quiet: bool,
) -> Result<PoolReport> {
    if n_workers == 0 {
        return Err(LaunchError::PoolStart(format!(
            "0 workers para {} tareas",
            task_ids.len()
        )));
    }

    // un id repetido correría dos veces sobre los mismos logs
    let unique: BTreeSet<TaskId> = task_ids.iter().copied().collect();
    if unique.len() < task_ids.len() {
        warn!("{} task ids repetidos, se ejecutan una sola vez", task_ids.len() - unique.len());
    }
    let task_ids: Vec<TaskId> = unique.into_iter().collect();

    if !quiet {
        println!("Iniciando pool local con {} workers", n_workers);
    }
    info!("pool local: {} tareas, {} workers", task_ids.len(), n_workers);

    let sem = Arc::new(Semaphore::new(n_workers));
    let mut set = JoinSet::new();
    let mut pending: BTreeSet<TaskId> = BTreeSet::new();

    for &task_id in &task_ids {
        // esperamos un slot libre antes de despachar la siguiente tarea
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| LaunchError::PoolStart(e.to_string()))?;

        let commands = Arc::clone(&commands);
        let (stdout, stderr) = log_paths(log_prefix, task_id);
        pending.insert(task_id);

        set.spawn(async move {
            let logs = TaskLogs {
                stdout: Some(&stdout),
                stderr: Some(&stderr),
            };
            let result = run_command_by_id(&commands, task_id, logs, quiet).await;
            drop(permit);

            result.unwrap_or_else(|e| TaskOutcome {
                task_id,
                status: TaskStatus::Error(e.to_string()),
                elapsed: Duration::ZERO,
            })
        });
    }

    let mut outcomes = Vec::with_capacity(task_ids.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => {
                match &outcome.status {
                    TaskStatus::Succeeded => {}
                    TaskStatus::Failed { code } => {
                        warn!("tarea {} terminó con código {:?}", outcome.task_id, code)
                    }
                    TaskStatus::Error(e) => {
                        warn!("tarea {} no se pudo ejecutar: {}", outcome.task_id, e)
                    }
                }
                pending.remove(&outcome.task_id);
                outcomes.push(outcome);
            }
            Err(e) => warn!("panic o join error en el pool: {:?}", e),
        }
    }

    // tareas cuyo worker murió sin devolver resultado
    for task_id in pending {
        outcomes.push(TaskOutcome {
            task_id,
            status: TaskStatus::Error("el worker terminó sin resultado".to_string()),
            elapsed: Duration::ZERO,
        });
    }

    outcomes.sort_by_key(|o| o.task_id);
    Ok(PoolReport { outcomes })
}
