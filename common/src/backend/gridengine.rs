use std::path::Path;
use std::time::Duration;

use super::{human_limit, parse_duration, Cancellation, ShellCommand};
use crate::error::{LaunchError, Result};
use crate::launch::LaunchArgs;
use crate::tasklist;

pub const NAME: &str = "gridengine";
pub const TASK_ID_VAR: &str = "$SGE_TASK_ID";

/// Techo de duración en modo debug/test (cola `test`).
pub const DEBUG_LIMIT: Duration = Duration::from_secs(10 * 60);
const SHORT_LIMIT: Duration = Duration::from_secs(60 * 60);
const LONG_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Colas de GridEngine:
///  -l test   (10 min, alta prioridad, un slot por máquina)
///  -l short  (1 hora)
///  -l long   (1 día)
///  -l vlong  (sin límite)
///  -l gpus=# (sin límite, máquina con GPU)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Queue {
    Test,
    Short,
    Long,
    VeryLong,
    Gpu,
}

impl Queue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Queue::Test => "test",
            Queue::Short => "short",
            Queue::Long => "long",
            Queue::VeryLong => "vlong",
            Queue::Gpu => "gpu",
        }
    }
}

/// Recursos ya validados para un envío.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridEngineRequest {
    pub queue: Queue,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GridEngineBackend;

impl GridEngineBackend {
    pub fn select_queue(duration: Duration, gpus: u32, debug: bool) -> Queue {
        if gpus > 0 {
            Queue::Gpu
        } else if debug {
            Queue::Test
        } else if duration > LONG_LIMIT {
            Queue::VeryLong
        } else if duration > SHORT_LIMIT {
            Queue::Long
        } else {
            Queue::Short
        }
    }

    pub fn resource_request(&self, args: &LaunchArgs) -> Result<GridEngineRequest> {
        let duration = parse_duration(&args.duration)?;

        if args.debug && duration > DEBUG_LIMIT {
            return Err(LaunchError::DebugDurationExceeded {
                backend: NAME.to_string(),
                limit: human_limit(DEBUG_LIMIT),
            });
        }
        if args.debug && args.cpus > 1 {
            return Err(LaunchError::DebugMultiCpu {
                backend: NAME.to_string(),
            });
        }

        Ok(GridEngineRequest {
            queue: Self::select_queue(duration, args.gpus, args.debug),
            duration,
        })
    }

    /// Un `qsub` por bloque del rango: todos comparten script y nombre de job.
    pub fn submission_commands(
        &self,
        args: &LaunchArgs,
        request: &GridEngineRequest,
        log_dir: &Path,
        tasklist_text: &str,
        script: &Path,
    ) -> Vec<ShellCommand> {
        let mut base = ShellCommand::new("qsub")
            .flag("-N", &args.jobname)
            // correr en el directorio actual
            .switch("-cwd");

        base = match request.queue {
            Queue::Gpu => base.flag("-l", format!("gpus={}", args.gpus)),
            queue => base.flag("-l", queue.as_str()),
        };

        if args.cpus > 1 {
            base = base.flag_values("-pe", &["smp".to_string(), args.cpus.to_string()]);
        }
        if args.mem > 1 {
            base = base.flag("-l", format!("vf={}G", args.mem));
        }

        // logs: jobname_jobid_taskid.{o,e}; las variables las resuelve GridEngine
        base = base
            .flag(
                "-o",
                log_dir.join("$JOB_NAME_$JOB_ID_$TASK_ID.o").to_string_lossy(),
            )
            .flag(
                "-e",
                log_dir.join("$JOB_NAME_$JOB_ID_$TASK_ID.e").to_string_lossy(),
            )
            // -terse: qsub imprime solo el job id
            .switch("-terse");

        if let Some(hold) = &args.hold_jid {
            base = base.flag("-hold_jid", hold);
        }
        if args.maxtasks > 0 {
            // máximo de tareas corriendo a la vez por bloque
            base = base.flag("-tc", args.maxtasks);
        }

        tasklist_text
            .split(',')
            .map(|block| {
                base.clone()
                    .flag("-t", block.trim())
                    .arg(script.to_string_lossy())
                    .with_extra_args(&args.extra_args)
            })
            .collect()
    }

    /// `qdel <job>` o un `qdel <job> -t <bloque>` por bloque comprimido.
    pub fn cancel_commands(&self, cancellations: &[Cancellation]) -> Vec<ShellCommand> {
        let mut cmds = Vec::new();
        for c in cancellations {
            match &c.task_ids {
                None => cmds.push(ShellCommand::new("qdel").arg(&c.job_id)),
                Some(ids) => {
                    let mut ids = ids.clone();
                    ids.sort_unstable();
                    ids.dedup();
                    let blocks = tasklist::compress(&ids);
                    for block in blocks.split(',').filter(|b| !b.is_empty()) {
                        cmds.push(ShellCommand::new("qdel").arg(&c.job_id).flag("-t", block));
                    }
                }
            }
        }
        cmds
    }
}
