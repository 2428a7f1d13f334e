use std::path::Path;
use std::time::Duration;

use super::{human_limit, parse_duration, Cancellation, ShellCommand};
use crate::error::{LaunchError, Result};
use crate::launch::LaunchArgs;

pub const NAME: &str = "slurm";
pub const TASK_ID_VAR: &str = "$SLURM_ARRAY_TASK_ID";

/// Techo de duración en modo debug/test.
pub const DEBUG_LIMIT: Duration = Duration::from_secs(2 * 60 * 60);
/// Hasta aquí un job sin GPU va a la partición rápida.
const SHORT_LIMIT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Debug,
    Batch,
    Gpu,
    GpuDebug,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Debug => "debug",
            Partition::Batch => "batch",
            Partition::Gpu => "gpu",
            Partition::GpuDebug => "gpu-debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlurmRequest {
    pub partition: Partition,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlurmBackend;

impl SlurmBackend {
    pub fn select_partition(duration: Duration, gpus: u32, debug: bool) -> Partition {
        match (gpus > 0, debug) {
            (true, true) => Partition::GpuDebug,
            (true, false) => Partition::Gpu,
            (false, true) => Partition::Debug,
            (false, false) if duration <= SHORT_LIMIT => Partition::Debug,
            (false, false) => Partition::Batch,
        }
    }

    pub fn resource_request(&self, args: &LaunchArgs) -> Result<SlurmRequest> {
        let duration = parse_duration(&args.duration)?;
        if args.debug && duration > DEBUG_LIMIT {
            return Err(LaunchError::DebugDurationExceeded {
                backend: NAME.to_string(),
                limit: human_limit(DEBUG_LIMIT),
            });
        }
        Ok(SlurmRequest {
            partition: Self::select_partition(duration, args.gpus, args.debug),
            duration,
        })
    }

    /// Un `sbatch --array=<bloque>` por bloque del rango.
    pub fn submission_commands(
        &self,
        args: &LaunchArgs,
        request: &SlurmRequest,
        log_dir: &Path,
        tasklist_text: &str,
        script: &Path,
    ) -> Vec<ShellCommand> {
        // Slurm corre en el directorio actual por defecto
        let mut base = ShellCommand::new("sbatch")
            .flag("-J", &args.jobname)
            .flag("-t", &args.duration)
            .flag("-n", args.cpus)
            .flag("-p", request.partition.as_str());

        if args.gpus > 0 {
            base = base.joined("--gres", format!("gpu:{}", args.gpus));
        }

        base = base
            .joined("--mem", format!("{}G", args.mem))
            // logs: jobname_jobid_taskid.{o,e}
            .flag("-o", log_dir.join("%x_%A_%a.o").to_string_lossy())
            .flag("-e", log_dir.join("%x_%A_%a.e").to_string_lossy())
            // --parsable: sbatch imprime solo el job id
            .switch("--parsable");

        tasklist_text
            .split(',')
            .map(|block| {
                let array = if args.maxtasks > 0 {
                    format!("{}%{}", block.trim(), args.maxtasks)
                } else {
                    block.trim().to_string()
                };
                let mut cmd = base.clone().joined("--array", array);
                if let Some(hold) = &args.hold_jid {
                    cmd = cmd.joined("--depend", format!("afterany:{}", hold));
                }
                cmd.arg(script.to_string_lossy())
                    .with_extra_args(&args.extra_args)
            })
            .collect()
    }

    /// `scancel <job>` o un `scancel <job>_<task>` por tarea.
    pub fn cancel_commands(&self, cancellations: &[Cancellation]) -> Vec<ShellCommand> {
        let mut cmds = Vec::new();
        for c in cancellations {
            match &c.task_ids {
                None => cmds.push(ShellCommand::new("scancel").arg(&c.job_id)),
                Some(ids) => {
                    for id in ids {
                        cmds.push(ShellCommand::new("scancel").arg(format!("{}_{}", c.job_id, id)));
                    }
                }
            }
        }
        cmds
    }
}
