use anyhow::{Context, Result};
use clap::Parser;
use common::job::{CommandMapping, TaskId};
use common::worker::{run_command_by_id, TaskLogs};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Corre una tarea del jobfile. Lo invoca el wrapper script en cada nodo
/// del cluster con el task id que pone el scheduler.
#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Ejecuta el comando de una tarea del jobfile")]
struct Args {
    /// Jobfile JSON generado por prelaunch / launch --command
    #[arg(value_name = "JOBFILE")]
    jobfile: PathBuf,

    /// Id de la tarea dentro del jobfile
    #[arg(value_name = "TASK_ID")]
    task_id: TaskId,

    /// No imprime el comando ni el tiempo transcurrido
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=info,common=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let commands = CommandMapping::load(&args.jobfile)
        .with_context(|| format!("no se pudo leer {}", args.jobfile.display()))?;

    // stdout/stderr heredados: el scheduler ya los redirige a sus logs
    let outcome = run_command_by_id(&commands, args.task_id, TaskLogs::default(), args.quiet)
        .await
        .with_context(|| format!("tarea {}", args.task_id))?;

    if outcome.succeeded() {
        info!("tarea {} terminó bien", args.task_id);
    } else {
        warn!("tarea {} terminó con {:?}", args.task_id, outcome.status);
    }

    std::process::exit(outcome.exit_code());
}
