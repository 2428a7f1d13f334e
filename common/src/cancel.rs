//! Cancelación de jobs ya enviados al cluster.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::backend::{Backend, BackendKind, Cancellation};
use crate::error::Result;
use crate::index::JobIndex;
use crate::job::{JobId, TaskId};
use crate::listing::job_listings;
use crate::tasklist;
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct CancelArgs {
    pub backend: BackendKind,
    pub job_id: JobId,
    /// None => el job entero
    pub tasklist: Option<String>,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Qué cancelar.
///
/// Sin rango: el job entero. Con rango: las tareas del job registradas en el
/// índice que caen en el rango; si el job no está en el índice se usa el
/// rango tal cual. Un job indexado sin tareas en el rango no cancela nada.
pub fn cancellations(workspace: &Workspace, job_id: &str, tasklist_text: Option<&str>) -> Result<Vec<Cancellation>> {
    let Some(text) = tasklist_text else {
        return Ok(vec![Cancellation {
            job_id: job_id.to_string(),
            task_ids: None,
        }]);
    };

    if JobIndex::new(workspace.job_index()).find(job_id)?.is_none() {
        return Ok(vec![Cancellation {
            job_id: job_id.to_string(),
            task_ids: Some(tasklist::expand(text)?),
        }]);
    }

    let mut task_ids: Vec<TaskId> = job_listings(workspace, Some(job_id), Some(text))?
        .into_iter()
        .map(|l| l.task_id)
        .collect();
    // el mismo job puede aparecer más de una vez en el índice
    task_ids.sort_unstable();
    task_ids.dedup();

    if task_ids.is_empty() {
        warn!("job {}: ninguna tarea registrada en {:?}, no se cancela nada", job_id, text);
        return Ok(Vec::new());
    }

    Ok(vec![Cancellation {
        job_id: job_id.to_string(),
        task_ids: Some(task_ids),
    }])
}

/// Imprime y ejecuta los comandos de cancelación. Devuelve las líneas.
pub async fn cancel(args: &CancelArgs, workspace: &Workspace) -> Result<Vec<String>> {
    let backend = Backend::new(args.backend);
    let todo = cancellations(workspace, &args.job_id, args.tasklist.as_deref())?;
    let commands = backend.cancel_commands(&todo)?;

    let mut lines = Vec::with_capacity(commands.len());
    for cmd in commands {
        let line = cmd.render();
        if !args.quiet {
            println!("{}", line);
        }

        if !args.dry_run {
            let status = Command::new("sh")
                .arg("-c")
                .arg(&line)
                .stdin(Stdio::null())
                .status()
                .await?;
            if status.success() {
                info!("{}: {}", backend.name(), line);
            } else {
                warn!("{}: `{}` terminó con {}", backend.name(), line, status);
            }
        }
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LaunchError;
    use crate::index::IndexEntry;
    use crate::job::CommandMapping;
    use std::path::PathBuf;
    use std::{env, fs};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("cancel_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn indexed_job(sub: &str) -> Workspace {
        let ws = Workspace::new(temp_dir(sub).join("estado"));
        let mut m = CommandMapping::default();
        for id in [1, 2, 3, 5] {
            m.insert(id, format!("echo {}", id), "");
        }
        let path = ws.default_jobfile("exp");
        m.save(&path).unwrap();
        JobIndex::new(ws.job_index())
            .append(&[IndexEntry::new("77", "exp", &path)])
            .unwrap();
        ws
    }

    #[test]
    fn sin_rango_cancela_el_job_entero() {
        let ws = indexed_job("entero");
        let c = cancellations(&ws, "77", None).unwrap();
        assert_eq!(c[0].task_ids, None);
    }

    #[test]
    fn con_rango_usa_las_tareas_del_indice() {
        let ws = indexed_job("rango");
        let c = cancellations(&ws, "77", Some("2-5")).unwrap();
        assert_eq!(c[0].task_ids, Some(vec![2, 3, 5]));

        // job fuera del índice: el rango tal cual
        let c = cancellations(&ws, "88", Some("4-6")).unwrap();
        assert_eq!(c[0].task_ids, Some(vec![4, 5, 6]));
    }

    #[tokio::test]
    async fn rango_fuera_de_las_tareas_indexadas_no_cancela_nada() {
        let ws = indexed_job("fuera");
        assert!(cancellations(&ws, "77", Some("10-12")).unwrap().is_empty());

        let args = CancelArgs {
            backend: BackendKind::Slurm,
            job_id: "77".to_string(),
            tasklist: Some("10-12".to_string()),
            dry_run: true,
            quiet: true,
        };
        assert!(cancel(&args, &ws).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_en_gridengine_comprime_bloques() {
        let ws = indexed_job("dry");
        let args = CancelArgs {
            backend: BackendKind::GridEngine,
            job_id: "77".to_string(),
            tasklist: Some("1-5".to_string()),
            dry_run: true,
            quiet: true,
        };
        let lines = cancel(&args, &ws).await.unwrap();
        assert_eq!(lines, vec!["qdel 77 -t 1-3", "qdel 77 -t 5"]);
    }

    #[tokio::test]
    async fn local_no_cancela() {
        let ws = indexed_job("local");
        let args = CancelArgs {
            backend: BackendKind::Local,
            job_id: "0".to_string(),
            tasklist: None,
            dry_run: true,
            quiet: true,
        };
        assert!(matches!(
            cancel(&args, &ws).await,
            Err(LaunchError::Unsupported { .. })
        ));
    }
}
