//! Ejecución de una tarea: busca el comando por id y lo corre con `sh -c`.
//! Lo usan el binario `worker` (en el cluster) y el pool local.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::error::Result;
use crate::job::{CommandMapping, TaskId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    /// Exit code distinto de cero (None si lo mató una señal)
    Failed { code: Option<i32> },
    /// No se pudo ni lanzar (log inaccesible, id inexistente, ...)
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded)
    }

    /// Exit code para propagar desde el binario worker.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            TaskStatus::Succeeded => 0,
            TaskStatus::Failed { code } => code.unwrap_or(1),
            TaskStatus::Error(_) => 1,
        }
    }
}

/// Archivos de log de una tarea; `None` hereda el stdout/stderr del proceso.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLogs<'a> {
    pub stdout: Option<&'a Path>,
    pub stderr: Option<&'a Path>,
}

fn log_stdio(path: Option<&Path>) -> Result<Stdio> {
    Ok(match path {
        Some(p) => Stdio::from(File::create(p)?),
        None => Stdio::inherit(),
    })
}

/// Corre el comando de `task_id` hasta que termine.
///
/// Un exit code distinto de cero no es error: queda en el `TaskOutcome`.
/// Solo devuelve `Err` si el id no existe o no se pudo abrir un log / lanzar `sh`.
pub async fn run_command_by_id(
    commands: &CommandMapping,
    task_id: TaskId,
    logs: TaskLogs<'_>,
    quiet: bool,
) -> Result<TaskOutcome> {
    let cmd = commands.command(task_id)?;
    if !quiet {
        println!("Lanzando worker: {}", cmd);
    }

    let stdout = log_stdio(logs.stdout)?;
    let stderr = log_stdio(logs.stderr)?;

    let start = Instant::now();
    let status = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .await?;
    let elapsed = start.elapsed();

    debug!("tarea {} terminó con {:?}", task_id, status);

    if !quiet {
        println!(
            "Worker terminó: {}\nTiempo transcurrido: {}",
            cmd,
            format_elapsed(elapsed)
        );
    }

    let status = if status.success() {
        TaskStatus::Succeeded
    } else {
        TaskStatus::Failed { code: status.code() }
    };

    Ok(TaskOutcome {
        task_id,
        status,
        elapsed,
    })
}

/// h:mm:ss.mmm
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    format!(
        "{}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        d.subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("worker_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[tokio::test]
    async fn redirige_stdout_y_stderr_a_los_logs() {
        let tmp = temp_dir("logs");
        let mut commands = CommandMapping::default();
        commands.insert(4, "echo hola; echo error >&2", "");

        let out = tmp.join("t_4.o");
        let err = tmp.join("t_4.e");
        let outcome = run_command_by_id(
            &commands,
            4,
            TaskLogs {
                stdout: Some(&out),
                stderr: Some(&err),
            },
            true,
        )
        .await
        .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(fs::read_to_string(out).unwrap(), "hola\n");
        assert_eq!(fs::read_to_string(err).unwrap(), "error\n");
    }

    #[tokio::test]
    async fn exit_code_distinto_de_cero_no_es_error() {
        let tmp = temp_dir("exit");
        let commands = CommandMapping::single("exit 3");
        let out = tmp.join("o");

        let outcome = run_command_by_id(
            &commands,
            1,
            TaskLogs {
                stdout: Some(&out),
                stderr: None,
            },
            true,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, TaskStatus::Failed { code: Some(3) });
        assert_eq!(outcome.exit_code(), 3);
    }

    #[tokio::test]
    async fn id_inexistente_devuelve_error() {
        let commands = CommandMapping::single("true");
        let res = run_command_by_id(&commands, 9, TaskLogs::default(), true).await;
        assert!(res.is_err());
    }

    #[test]
    fn format_elapsed_usa_horas_minutos_y_segundos() {
        assert_eq!(format_elapsed(Duration::from_millis(3_723_004)), "1:02:03.004");
    }
}
