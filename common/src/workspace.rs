use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_STATE_DIR: &str = ".launcher";

/// Directorio de estado del launcher (scripts, logs, índice, historial).
/// - Por defecto `.launcher` en el directorio actual.
/// - Se puede sobreescribir con la env var LAUNCHER_HOME.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = env::var("LAUNCHER_HOME").unwrap_or_else(|_| DEFAULT_STATE_DIR.to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scripts_dir(&self, jobname: &str) -> PathBuf {
        self.root.join("scripts").join(jobname)
    }

    pub fn default_jobfile(&self, jobname: &str) -> PathBuf {
        self.scripts_dir(jobname).join("jobs.json")
    }

    /// Carpeta de logs de un backend (no la crea).
    pub fn logs_dir(&self, backend_name: &str) -> PathBuf {
        self.root.join("logs").join(backend_name)
    }

    pub fn job_index(&self) -> PathBuf {
        self.root.join("job_index.csv")
    }

    pub fn history(&self) -> PathBuf {
        self.root.join("history.csv")
    }

    pub fn local_config(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}
