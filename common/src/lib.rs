//! Núcleo del launcher: rangos de tareas, jobfiles, backends (local,
//! GridEngine, Slurm), pool local e índice de jobs.

pub mod backend;
pub mod cancel;
pub mod config;
pub mod error;
pub mod history;
pub mod index;
pub mod job;
pub mod launch;
pub mod listing;
pub mod pool;
pub mod prelaunch;
pub mod tasklist;
pub mod worker;
pub mod workspace;

pub use backend::{Backend, BackendKind, Plan};
pub use config::Config;
pub use error::{LaunchError, Result};
pub use job::{CommandMapping, JobId, TaskId};
pub use launch::{launch, LaunchArgs, LaunchReport};
pub use workspace::Workspace;
