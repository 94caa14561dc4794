//! Per-task working directories.
//!
//! Every task gets `<root>/<user>/<task>`. Acquired inputs live directly in
//! it and the produced output in its `out/` subdirectory, so the output keeps
//! the name it is delivered under. Concurrent tasks never share a path and
//! cleanup is a single recursive removal.

use std::path::{Path, PathBuf};

use mf_core::{Error, TaskId, UserId};

const OUTPUT_DIR: &str = "out";

/// Working directory of one task.
#[derive(Debug)]
pub struct TaskWorkspace {
    dir: PathBuf,
}

impl TaskWorkspace {
    /// Create the directory for `task` under `root`.
    pub fn create(root: &Path, user: UserId, task: TaskId) -> mf_core::Result<Self> {
        let dir = root.join(user.to_string()).join(task.to_string());
        std::fs::create_dir_all(dir.join(OUTPUT_DIR)).map_err(|e| {
            Error::Internal(format!(
                "failed to create workspace {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path for the input at `index` (arrival order).
    ///
    /// The index prefix keeps two inputs with the same name apart.
    pub fn input_path(&self, index: usize, name: &str) -> PathBuf {
        self.dir.join(format!("in{index:02}_{}", sanitize_file_name(name)))
    }

    /// Local path for the produced output.
    pub fn output_path(&self, name: &str) -> PathBuf {
        self.dir.join(OUTPUT_DIR).join(sanitize_file_name(name))
    }

    /// Path for an auxiliary file (e.g. a concat list).
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.dir.join(sanitize_file_name(name))
    }

    /// Remove the task directory and everything in it, then the user
    /// directory if it is left empty.
    pub fn cleanup(self) -> mf_core::Result<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::Internal(format!(
                    "failed to remove workspace {}: {e}",
                    self.dir.display()
                )))
            }
        }
        if let Some(user_dir) = self.dir.parent() {
            // Fails when another task of the user still has files; that is fine.
            let _ = std::fs::remove_dir(user_dir);
        }
        Ok(())
    }
}

/// Reduce an untrusted name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
