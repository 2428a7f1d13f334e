use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{LaunchError, Result};

/// Id de job devuelto por el cluster (o contador local).
pub type JobId = String;

/// Id de tarea dentro de un job (siempre > 0 en el jobfile).
pub type TaskId = u32;

/// Un comando del jobfile con su etiqueta opcional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub command: String,
    pub tag: String,
}

/// Formato en disco del jobfile:
/// { "tag": "--tag", "jobs": { "1": "python train.py" }, "tags": { "1": "exp_1" } }
#[derive(Debug, Default, Serialize, Deserialize)]
struct JobfileRepr {
    #[serde(default)]
    tag: String,
    jobs: HashMap<String, String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Mapeo task id -> comando. Se carga una vez y solo se lee
/// (el pool local lo comparte entre tareas sin locks).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandMapping {
    /// Flag usado para pasar la etiqueta a cada comando ("" si no hay)
    pub tag_flag: String,
    jobs: BTreeMap<TaskId, JobRecord>,
}

impl CommandMapping {
    pub fn new(tag_flag: impl Into<String>) -> Self {
        Self {
            tag_flag: tag_flag.into(),
            jobs: BTreeMap::new(),
        }
    }

    /// Mapeo de una sola tarea (launch --command).
    pub fn single(command: impl Into<String>) -> Self {
        let mut mapping = Self::default();
        mapping.insert(1, command, "");
        mapping
    }

    pub fn insert(&mut self, id: TaskId, command: impl Into<String>, tag: impl Into<String>) {
        self.jobs.insert(
            id,
            JobRecord {
                command: command.into(),
                tag: tag.into(),
            },
        );
    }

    pub fn get(&self, id: TaskId) -> Option<&JobRecord> {
        self.jobs.get(&id)
    }

    pub fn command(&self, id: TaskId) -> Result<&str> {
        self.jobs
            .get(&id)
            .map(|r| r.command.as_str())
            .ok_or(LaunchError::TaskNotFound(id))
    }

    /// Ids en orden ascendente.
    pub fn ids(&self) -> Vec<TaskId> {
        self.jobs.keys().copied().collect()
    }

    pub fn max_id(&self) -> Option<TaskId> {
        self.jobs.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &JobRecord)> {
        self.jobs.iter().map(|(id, r)| (*id, r))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| LaunchError::Jobfile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let repr: JobfileRepr = serde_json::from_str(&content).map_err(|e| LaunchError::Jobfile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut mapping = Self::new(repr.tag);
        for (key, command) in repr.jobs {
            // JSON guarda las claves como strings
            let id = match key.trim().parse::<TaskId>() {
                Ok(id) if id > 0 => id,
                _ => {
                    return Err(LaunchError::Jobfile {
                        path: path.to_path_buf(),
                        reason: format!("task id inválido: {:?}", key),
                    })
                }
            };
            let tag = repr.tags.get(&key).cloned().unwrap_or_default();
            mapping.insert(id, command, tag);
        }
        Ok(mapping)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let repr = JobfileRepr {
            tag: self.tag_flag.clone(),
            jobs: self
                .jobs
                .iter()
                .map(|(id, r)| (id.to_string(), r.command.clone()))
                .collect(),
            tags: self
                .jobs
                .iter()
                .filter(|(_, r)| !r.tag.is_empty())
                .map(|(id, r)| (id.to_string(), r.tag.clone()))
                .collect(),
        };

        fs::write(path, serde_json::to_string_pretty(&repr)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, path::PathBuf};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("job_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[test]
    fn save_y_load_conservan_comandos_y_tags() {
        let tmp = temp_dir("save_load");
        let path = tmp.join("scripts").join("jobs.json");

        let mut mapping = CommandMapping::new("--tag");
        mapping.insert(2, "echo b", "exp_2");
        mapping.insert(1, "echo a", "exp_1");
        mapping.insert(10, "echo c", "");
        mapping.save(&path).unwrap();

        let loaded = CommandMapping::load(&path).unwrap();
        assert_eq!(loaded, mapping);
        assert_eq!(loaded.ids(), vec![1, 2, 10]);
        assert_eq!(loaded.max_id(), Some(10));
        assert_eq!(loaded.get(2).unwrap().tag, "exp_2");
    }

    #[test]
    fn load_acepta_jobfile_sin_tags() {
        let tmp = temp_dir("sin_tags");
        let path = tmp.join("jobs.json");
        fs::write(&path, r#"{"jobs": {"3": "echo x", "1": "echo y"}}"#).unwrap();

        let loaded = CommandMapping::load(&path).unwrap();
        assert_eq!(loaded.ids(), vec![1, 3]);
        assert_eq!(loaded.command(3).unwrap(), "echo x");
        assert_eq!(loaded.get(1).unwrap().tag, "");
        assert_eq!(loaded.tag_flag, "");
    }

    #[test]
    fn load_rechaza_ids_no_numericos_o_cero() {
        let tmp = temp_dir("ids_malos");
        for (i, content) in [r#"{"jobs": {"a": "x"}}"#, r#"{"jobs": {"0": "x"}}"#]
            .iter()
            .enumerate()
        {
            let path = tmp.join(format!("jobs{}.json", i));
            fs::write(&path, content).unwrap();
            assert!(matches!(
                CommandMapping::load(&path),
                Err(LaunchError::Jobfile { .. })
            ));
        }
    }

    #[test]
    fn command_de_id_inexistente_falla() {
        let mapping = CommandMapping::single("echo hola");
        assert_eq!(mapping.command(1).unwrap(), "echo hola");
        assert!(matches!(mapping.command(2), Err(LaunchError::TaskNotFound(2))));
    }
}
