use std::io;
use std::path::PathBuf;

/// Errores del launcher. Los de configuración / formato se reportan antes de
/// cualquier efecto secundario; los fallos de tareas locales nunca llegan aquí.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /* --------- Configuración --------- */
    #[error("nombre de job inválido: {0:?} (solo letras, dígitos, '_', '.', '-')")]
    InvalidJobName(String),

    #[error("backend desconocido: {0}")]
    UnknownBackend(String),

    #[error("opciones en conflicto: {0}")]
    ConflictingFlags(String),

    #[error("{backend}: no se pueden pasar argumentos adicionales: {args}")]
    ExtraArgsUnsupported { backend: String, args: String },

    #[error("{backend}: operación no soportada: {op}")]
    Unsupported { backend: String, op: &'static str },

    #[error("configuración inválida: {0}")]
    Config(String),

    /* --------- Rangos / duraciones --------- */
    #[error("formato de rango inválido: {0:?}")]
    InvalidRangeFormat(String),

    #[error("{backend}: task id inválido: {id} (los ids empiezan en 1)")]
    InvalidTaskId { backend: String, id: u32 },

    #[error("duración inválida: {0:?} (se espera [D-]HH:MM:SS)")]
    InvalidDuration(String),

    #[error("{backend}: la duración no puede superar {limit} en modo debug/test")]
    DebugDurationExceeded { backend: String, limit: String },

    #[error("{backend}: no se puede usar más de una cpu en modo debug/test")]
    DebugMultiCpu { backend: String },

    /* --------- Jobfile / ejecución --------- */
    #[error("jobfile {path}: {reason}")]
    Jobfile { path: PathBuf, reason: String },

    #[error("task id {0} no existe en el jobfile")]
    TaskNotFound(u32),

    #[error("no se pudo iniciar el pool: {0}")]
    PoolStart(String),

    #[error("falló el envío `{command}`: {reason}")]
    Submission { command: String, reason: String },

    #[error("no se pudo leer un job id de la salida {output:?} de `{command}`")]
    UnparsableJobId { command: String, output: String },

    /* --------- Wrappers --------- */
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    TomlRead(#[from] toml::de::Error),

    #[error(transparent)]
    TomlWrite(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, LaunchError>;
