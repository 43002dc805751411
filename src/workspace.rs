use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Local scratch directory shared by all requests.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    root: PathBuf,
}

impl TempWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Base name for one request's scratch files:
    /// `{job_id}-{template}-{version}-{random}`.
    pub fn scratch_base(&self, job_id: &str, template: &str, version: &str) -> String {
        format!(
            "{}-{}-{}-{}",
            sanitize(job_id),
            sanitize(template),
            sanitize(version),
            Uuid::new_v4().simple()
        )
    }

    /// Reserve `{base}.{ext}` inside the workspace. The file itself is not
    /// created; it is removed when the guard drops.
    pub fn scratch_file(&self, base: &str, ext: &str) -> ScratchFile {
        ScratchFile::new(self.root.join(format!("{base}.{ext}")))
    }
}

/// Keeps file names inside the workspace: anything other than
/// `[A-Za-z0-9._-]` becomes `_`, and a leading dot is replaced.
fn sanitize(component: &str) -> String {
    let mut out: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    out
}

/// A path that is deleted (best-effort) when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "could not remove scratch file")
            }
        }
    }
}
