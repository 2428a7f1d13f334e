use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::debug;

use crate::error::{LaunchError, Result};
use crate::workspace::Workspace;

/// Secciones válidas de la configuración.
pub const SECTIONS: [&str; 4] = ["worker", "local", "gridengine", "slurm"];

/// Configuración efectiva (defaults < global < local).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub worker: WorkerConfig,
    pub local: ScriptConfig,
    pub gridengine: ScriptConfig,
    pub slurm: ScriptConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Programa que invoca el wrapper script: `<command> <jobfile> <task_id>`
    pub command: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: "worker".to_string(),
        }
    }
}

/// Texto extra que se pega antes / después de la invocación del worker
/// (module load, activar virtualenv, limpieza, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub header: String,
    pub footer: String,
}

impl Config {
    /// Carga defaults + ~/.launcher/config.toml + <estado>/config.toml.
    pub fn load(workspace: &Workspace) -> Result<Self> {
        let mut layers = Vec::new();
        if let Some(global) = global_config_path() {
            layers.push(global);
        }
        layers.push(workspace.local_config());
        Self::from_layers(&layers)
    }

    /// Mezcla las capas en orden; las que no existen se ignoran.
    pub fn from_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = Table::new();
        for path in paths {
            let layer = read_layer(path)?;
            merge_tables(&mut merged, layer);
        }
        Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| LaunchError::Config(e.to_string()))
    }

    pub fn script(&self, section: &str) -> Option<&ScriptConfig> {
        match section {
            "local" => Some(&self.local),
            "gridengine" => Some(&self.gridengine),
            "slurm" => Some(&self.slurm),
            _ => None,
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Config global del usuario: $HOME/.launcher/config.toml
pub fn global_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(".launcher").join("config.toml"))
}

/// Lee una capa como tabla TOML. Un archivo inexistente es una tabla vacía.
pub fn read_layer(path: &Path) -> Result<Table> {
    if !path.exists() {
        debug!("config {} no existe, se ignora", path.display());
        return Ok(Table::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str::<Table>(&content)?)
}

/// Mezcla profunda: las claves de `over` pisan a las de `base`.
pub fn merge_tables(base: &mut Table, over: Table) {
    for (key, value) in over {
        if let Value::Table(over_sub) = value {
            if let Some(Value::Table(base_sub)) = base.get_mut(&key) {
                merge_tables(base_sub, over_sub);
                continue;
            }
            base.insert(key, Value::Table(over_sub));
        } else {
            base.insert(key, value);
        }
    }
}

fn valid_key(section: &str, key: &str) -> bool {
    match section {
        "worker" => key == "command",
        "local" | "gridengine" | "slurm" => key == "header" || key == "footer",
        _ => false,
    }
}

/// Escribe `[section] key = value` en una capa concreta.
pub fn write_value(path: &Path, section: &str, key: &str, value: &str) -> Result<()> {
    if !SECTIONS.contains(&section) {
        return Err(LaunchError::Config(format!("sección inválida: {}", section)));
    }
    if !valid_key(section, key) {
        return Err(LaunchError::Config(format!("clave inválida: {}.{}", section, key)));
    }

    let mut layer = read_layer(path)?;
    let entry = layer
        .entry(section.to_string())
        .or_insert_with(|| Value::Table(Table::new()));
    match entry {
        Value::Table(t) => {
            t.insert(key.to_string(), Value::String(value.to_string()));
        }
        other => {
            *other = Value::Table(Table::from_iter([(
                key.to_string(),
                Value::String(value.to_string()),
            )]));
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, toml::to_string_pretty(&layer)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("config_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[test]
    fn sin_archivos_usa_defaults() {
        let tmp = temp_dir("defaults");
        let cfg = Config::from_layers(&[tmp.join("no_existe.toml")]).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.worker.command, "worker");
    }

    #[test]
    fn capa_local_pisa_a_la_global() {
        let tmp = temp_dir("capas");
        let global = tmp.join("global.toml");
        let local = tmp.join("local.toml");

        fs::write(
            &global,
            "[slurm]\nheader = \"module load cuda\"\nfooter = \"echo fin\"\n",
        )
        .unwrap();
        fs::write(&local, "[slurm]\nheader = \"source venv/bin/activate\"\n").unwrap();

        let cfg = Config::from_layers(&[global, local]).unwrap();
        assert_eq!(cfg.slurm.header, "source venv/bin/activate");
        assert_eq!(cfg.slurm.footer, "echo fin");
        assert_eq!(cfg.gridengine, ScriptConfig::default());
    }

    #[test]
    fn write_value_crea_archivo_y_conserva_otras_claves() {
        let tmp = temp_dir("write");
        let path = tmp.join("sub").join("config.toml");

        write_value(&path, "gridengine", "header", "module load python").unwrap();
        write_value(&path, "worker", "command", "/opt/bin/worker").unwrap();

        let cfg = Config::from_layers(&[path.clone()]).unwrap();
        assert_eq!(cfg.gridengine.header, "module load python");
        assert_eq!(cfg.worker.command, "/opt/bin/worker");
    }

    #[test]
    fn write_value_rechaza_secciones_y_claves_desconocidas() {
        let tmp = temp_dir("write_mal");
        let path = tmp.join("config.toml");
        assert!(matches!(
            write_value(&path, "pbs", "header", "x"),
            Err(LaunchError::Config(_))
        ));
        assert!(matches!(
            write_value(&path, "slurm", "partition", "x"),
            Err(LaunchError::Config(_))
        ));
        assert!(!path.exists());
    }
}
