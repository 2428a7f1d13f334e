use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ScriptConfig;
use crate::error::Result;

const SHEBANG: &str = "#!/bin/bash\n";

/// Script que el scheduler ejecuta por cada tarea del array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperScript {
    pub header: String,
    pub body: String,
    pub footer: String,
}

impl WrapperScript {
    /// - `worker_command`: programa que corre una tarea (`worker`)
    /// - `task_id_var`: variable del scheduler ($SLURM_ARRAY_TASK_ID, ...);
    ///   se deja literal, la resuelve el scheduler al ejecutar.
    pub fn render(
        section: &ScriptConfig,
        venv: Option<&str>,
        worker_command: &str,
        jobfile: &Path,
        task_id_var: &str,
    ) -> Self {
        let mut header = String::from(SHEBANG);
        if !section.header.is_empty() {
            header.push_str(&section.header);
            if !section.header.ends_with('\n') {
                header.push('\n');
            }
        }
        if let Some(venv) = venv {
            header.push_str(&format!("source {}/bin/activate\n", venv.trim_end_matches('/')));
        }

        let body = format!(
            "\n{} {} {}\n",
            worker_command,
            super::command::quote(&jobfile.to_string_lossy()),
            task_id_var
        );

        Self {
            header,
            body,
            footer: section.footer.clone(),
        }
    }

    pub fn text(&self) -> String {
        format!("{}{}{}", self.header, self.body, self.footer)
    }

    /// Escribe `<dir>/wrapper.sh` (crea la carpeta; pisa un script anterior).
    pub fn save(&self, scripts_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(scripts_dir)?;
        let path = scripts_dir.join("wrapper.sh");
        fs::write(&path, self.text())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }

        Ok(path)
    }
}
