//! Índice de jobs enviados: `job_id,job_name,jobfile_path` (CSV, append-only).
//!
//! Se escribe una vez por lanzamiento desde el hilo principal. Dos lanzamientos
//! independientes en paralelo pueden intercalar filas: no hay lock entre procesos.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub job_id: JobId,
    pub job_name: String,
    pub jobfile: String,
}

impl IndexEntry {
    pub fn new(job_id: impl Into<JobId>, job_name: &str, jobfile: &Path) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: job_name.to_string(),
            jobfile: jobfile.to_string_lossy().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobIndex {
    path: PathBuf,
}

impl JobIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filas en orden de escritura. Sin archivo => índice vacío.
    pub fn load(&self) -> Result<Vec<IndexEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .quote(b'|')
            .from_path(&self.path)?;

        let mut out = Vec::new();
        for row in reader.deserialize() {
            out.push(row?);
        }
        Ok(out)
    }

    /// Última fila registrada para un job id.
    pub fn find(&self, job_id: &str) -> Result<Option<IndexEntry>> {
        Ok(self.load()?.into_iter().rev().find(|e| e.job_id == job_id))
    }

    pub fn append(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote(b'|')
            .from_writer(file);

        for entry in entries {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Siguiente contador para el backend local: max(ids numéricos) + 1, o 0.
    pub fn next_local_id(&self) -> Result<u64> {
        let next = self
            .load()?
            .iter()
            .filter_map(|e| e.job_id.parse::<u64>().ok())
            .max()
            .map(|max| max + 1)
            .unwrap_or(0);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("index_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    #[test]
    fn indice_inexistente_esta_vacio_y_empieza_en_cero() {
        let tmp = temp_dir("vacio");
        let index = JobIndex::new(tmp.join("job_index.csv"));
        assert!(index.load().unwrap().is_empty());
        assert_eq!(index.next_local_id().unwrap(), 0);
    }

    #[test]
    fn append_agrega_filas_en_orden() {
        let tmp = temp_dir("append");
        let index = JobIndex::new(tmp.join("estado").join("job_index.csv"));

        index
            .append(&[IndexEntry::new("101", "exp", Path::new("a/jobs.json"))])
            .unwrap();
        index
            .append(&[
                IndexEntry::new("102", "exp", Path::new("a/jobs.json")),
                IndexEntry::new("7", "otro, con coma", Path::new("b/jobs.json")),
            ])
            .unwrap();

        let rows = index.load().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].job_id, "101");
        assert_eq!(rows[2].job_name, "otro, con coma");
        assert_eq!(index.next_local_id().unwrap(), 103);

        let content = fs::read_to_string(index.path()).unwrap();
        assert!(content.starts_with("101,exp,a/jobs.json\n"));
    }

    #[test]
    fn find_devuelve_la_ultima_fila_del_job() {
        let tmp = temp_dir("find");
        let index = JobIndex::new(tmp.join("job_index.csv"));
        index
            .append(&[
                IndexEntry::new("5", "viejo", Path::new("x.json")),
                IndexEntry::new("5", "nuevo", Path::new("y.json")),
            ])
            .unwrap();

        assert_eq!(index.find("5").unwrap().unwrap().job_name, "nuevo");
        assert!(index.find("6").unwrap().is_none());
    }
}
