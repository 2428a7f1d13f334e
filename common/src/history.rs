//! Historial de comandos (`prelaunch` / `launch`) en CSV append-only.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::listing::render_table;

pub const COLUMNS: [&str; 6] = ["id", "date", "time", "jobname", "mode", "args"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    /// %Y.%m.%d
    pub date: String,
    /// %H:%M:%S.%f
    pub time: String,
    pub jobname: String,
    pub mode: String,
    #[serde(with = "yes_no")]
    pub dry_run: bool,
    pub args: String,
}

/// `y` / `n` en disco.
mod yes_no {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if *value { "y" } else { "n" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match String::deserialize(d)?.as_str() {
            "y" => Ok(true),
            "n" => Ok(false),
            other => Err(D::Error::custom(format!("se esperaba y/n, llegó {:?}", other))),
        }
    }
}

/// Filtros de `history`.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Últimas N filas (después de filtrar)
    pub last: Option<usize>,
    pub launch: bool,
    pub prelaunch: bool,
    pub no_dry_run: bool,
}

impl HistoryFilter {
    fn matches(&self, entry: &HistoryEntry) -> bool {
        let any_mode = !(self.launch || self.prelaunch);
        let mode_ok = any_mode
            || (self.launch && entry.mode == "launch")
            || (self.prelaunch && entry.mode == "prelaunch");
        mode_ok && !(self.no_dry_run && entry.dry_run)
    }
}

#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<HistoryEntry>> {
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

    /// Agrega una fila con la fecha/hora actual. Ids desde 0.
    pub fn append(&self, jobname: &str, mode: &str, dry_run: bool, args: &str) -> Result<HistoryEntry> {
        let id = self.load()?.iter().map(|e| e.id + 1).max().unwrap_or(0);
        let now = Local::now();
        let entry = HistoryEntry {
            id,
            date: now.format("%Y.%m.%d").to_string(),
            time: now.format("%H:%M:%S%.6f").to_string(),
            jobname: jobname.to_string(),
            mode: mode.to_string(),
            dry_run,
            args: args.to_string(),
        };

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
        writer.serialize(&entry)?;
        writer.flush()?;
        Ok(entry)
    }

    pub fn filtered(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>> {
        let mut rows: Vec<HistoryEntry> = self
            .load()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        if let Some(n) = filter.last {
            let skip = rows.len().saturating_sub(n);
            rows.drain(..skip);
        }
        Ok(rows)
    }
}

/// Tabla de `history`; la hora se muestra en milisegundos.
pub fn render(entries: &[HistoryEntry]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            let time = e.time.get(..12).unwrap_or(&e.time).to_string();
            vec![
                e.id.to_string(),
                e.date.clone(),
                time,
                e.jobname.clone(),
                e.mode.clone(),
                e.args.clone(),
            ]
        })
        .collect();
    render_table(&COLUMNS, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("history_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn sample(sub: &str) -> History {
        let h = History::new(temp_dir(sub).join("history.csv"));
        h.append("a", "prelaunch", false, "+command echo").unwrap();
        h.append("a", "launch", true, "--backend slurm --dry-run").unwrap();
        h.append("b", "launch", false, "--backend local, con coma").unwrap();
        h
    }

    #[test]
    fn append_numera_desde_cero_y_relee_igual() {
        let h = sample("numera");
        let rows = h.load().unwrap();
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(rows[1].dry_run);
        assert_eq!(rows[2].args, "--backend local, con coma");
        assert_eq!(rows[0].date.len(), 10);

        let raw = fs::read_to_string(h.path()).unwrap();
        assert!(raw.lines().nth(1).unwrap().contains(",y,"));
    }

    #[test]
    fn filtros_de_modo_y_dry_run() {
        let h = sample("filtros");

        let launches = h
            .filtered(&HistoryFilter {
                launch: true,
                ..HistoryFilter::default()
            })
            .unwrap();
        assert_eq!(launches.len(), 2);

        let real = h
            .filtered(&HistoryFilter {
                launch: true,
                no_dry_run: true,
                ..HistoryFilter::default()
            })
            .unwrap();
        assert_eq!(real.len(), 1);
        assert_eq!(real[0].jobname, "b");

        let last = h
            .filtered(&HistoryFilter {
                last: Some(1),
                ..HistoryFilter::default()
            })
            .unwrap();
        assert_eq!(last[0].id, 2);
    }

    #[test]
    fn sin_archivo_no_hay_historial() {
        let h = History::new(temp_dir("vacio").join("history.csv"));
        assert!(h.load().unwrap().is_empty());
        assert!(render(&[]).starts_with("id"));
    }
}
