//! Listado de tareas registradas: índice de jobs + jobfile de cada uno.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::index::JobIndex;
use crate::job::{CommandMapping, JobId, TaskId};
use crate::tasklist;
use crate::workspace::Workspace;

pub const COLUMNS: [&str; 5] = ["job_id", "task_id", "jobname", "command", "tag"];
const HIDDEN: &str = "[hidden]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobListing {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub jobname: String,
    pub command: String,
    pub tag: String,
}

impl JobListing {
    /// Celdas para imprimir; las columnas de `hide` salen como `[hidden]`.
    pub fn cells(&self, hide: &[String]) -> Vec<String> {
        let values = [
            self.job_id.clone(),
            self.task_id.to_string(),
            self.jobname.clone(),
            format!("{:?}", self.command),
            self.tag.clone(),
        ];
        COLUMNS
            .iter()
            .zip(values)
            .map(|(col, value)| {
                if hide.iter().any(|h| h.as_str() == *col) {
                    HIDDEN.to_string()
                } else {
                    value
                }
            })
            .collect()
    }
}

/// Filas (job, tarea) en orden del índice y task id ascendente.
///
/// Sin índice => lista vacía. Un jobfile ilegible se salta con un warn.
pub fn job_listings(
    workspace: &Workspace,
    job_id: Option<&str>,
    tasklist_text: Option<&str>,
) -> Result<Vec<JobListing>> {
    let wanted: Option<BTreeSet<TaskId>> = match tasklist_text {
        Some(text) => Some(tasklist::expand(text)?.into_iter().collect()),
        None => None,
    };

    let index = JobIndex::new(workspace.job_index());
    let mut out = Vec::new();

    for entry in index.load()? {
        if job_id.is_some_and(|id| id != entry.job_id) {
            continue;
        }
        let commands = match CommandMapping::load(Path::new(&entry.jobfile)) {
            Ok(c) => c,
            Err(e) => {
                warn!("job {}: {}", entry.job_id, e);
                continue;
            }
        };

        for (task_id, record) in commands.iter() {
            if wanted.as_ref().is_some_and(|w| !w.contains(&task_id)) {
                continue;
            }
            out.push(JobListing {
                job_id: entry.job_id.clone(),
                task_id,
                jobname: entry.job_name.clone(),
                command: record.command.clone(),
                tag: record.tag.clone(),
            });
        }
    }
    Ok(out)
}

/// Tabla simple con columnas alineadas (estilo de la salida de `list`).
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let mut out = vec![
        line(headers.to_vec()),
        line(dashes.iter().map(String::as_str).collect()),
    ];
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use std::path::PathBuf;
    use std::{env, fs};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("listing_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn setup(sub: &str) -> Workspace {
        let ws = Workspace::new(temp_dir(sub).join("estado"));

        let mut a = CommandMapping::new("--tag");
        a.insert(2, "echo dos", "a_2");
        a.insert(1, "echo uno", "a_1");
        a.insert(3, "echo tres", "a_3");
        let fa = ws.default_jobfile("a");
        a.save(&fa).unwrap();

        let b = CommandMapping::single("echo b");
        let fb = ws.default_jobfile("b");
        b.save(&fb).unwrap();

        JobIndex::new(ws.job_index())
            .append(&[IndexEntry::new("10", "a", &fa), IndexEntry::new("11", "b", &fb)])
            .unwrap();
        ws
    }

    #[test]
    fn sin_indice_no_hay_filas() {
        let ws = Workspace::new(temp_dir("vacio").join("estado"));
        assert!(job_listings(&ws, None, None).unwrap().is_empty());
    }

    #[test]
    fn lista_en_orden_de_indice_y_task_id() {
        let ws = setup("orden");
        let rows = job_listings(&ws, None, None).unwrap();
        let keys: Vec<(&str, u32)> = rows.iter().map(|r| (r.job_id.as_str(), r.task_id)).collect();
        assert_eq!(keys, vec![("10", 1), ("10", 2), ("10", 3), ("11", 1)]);
        assert_eq!(rows[1].tag, "a_2");
        assert_eq!(rows[3].jobname, "b");
    }

    #[test]
    fn filtra_por_job_y_rango() {
        let ws = setup("filtro");
        let rows = job_listings(&ws, Some("10"), Some("1,3")).unwrap();
        let ids: Vec<u32> = rows.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec![1, 3]);

        assert!(job_listings(&ws, Some("99"), None).unwrap().is_empty());
    }

    #[test]
    fn celdas_ocultas() {
        let row = JobListing {
            job_id: "1".into(),
            task_id: 2,
            jobname: "x".into(),
            command: "echo hola".into(),
            tag: "t".into(),
        };
        let cells = row.cells(&["command".to_string(), "tag".to_string()]);
        assert_eq!(cells, vec!["1", "2", "x", "[hidden]", "[hidden]"]);
        assert_eq!(row.cells(&[])[3], "\"echo hola\"");
    }

    #[test]
    fn render_table_alinea_columnas() {
        let table = render_table(&["id", "nombre"], &[vec!["1".into(), "abc".into()]]);
        assert_eq!(table, "id  nombre\n--  ------\n1   abc");
    }
}
