use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("could not start converter {bin:?}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("converter timed out after {0:?}")]
    Timeout(Duration),

    #[error("no pdf produced at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Turns a document on disk into a PDF next to it.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Convert `input`, writing the PDF into `out_dir`. Returns the PDF path.
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ConversionError>;
}

/// Where a converter writes the PDF for `input`: `{out_dir}/{stem}.pdf`.
pub fn expected_output(input: &Path, out_dir: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
    name.push(".pdf");
    out_dir.join(name)
}

/// Headless LibreOffice (`libreoffice` / `soffice`) run as a child process.
pub struct LibreOfficeConverter {
    bin: String,
    timeout: Option<Duration>,
}

impl LibreOfficeConverter {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, input: &Path, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Converter for LibreOfficeConverter {
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ConversionError> {
        let mut cmd = self.command(input, out_dir);
        tracing::debug!(?cmd, "running converter");

        let child = cmd.spawn().map_err(|source| ConversionError::Spawn {
            bin: self.bin.clone(),
            source,
        })?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ConversionError::Timeout(limit))?,
            None => wait.await,
        }
        .map_err(|source| ConversionError::Spawn {
            bin: self.bin.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ConversionError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let pdf = expected_output(input, out_dir);
        if !tokio::fs::try_exists(&pdf).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput(pdf));
        }

        tracing::debug!(pdf = %pdf.display(), "converter finished");
        Ok(pdf)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn output_sits_next_to_input_stem() {
        let pdf = expected_output(Path::new("/tmp/in/job-a-v1-x.docx"), Path::new("/tmp/out"));
        assert_eq!(pdf, PathBuf::from("/tmp/out/job-a-v1-x.pdf"));

        let pdf = expected_output(Path::new("/tmp/in/job-a-1.2-x.docx"), Path::new("/tmp/out"));
        assert_eq!(pdf, PathBuf::from("/tmp/out/job-a-1.2-x.pdf"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.docx");
        let err = LibreOfficeConverter::new("false")
            .convert(&input, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Failed { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn success_without_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.docx");
        let err = LibreOfficeConverter::new("true")
            .convert(&input, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::MissingOutput(_)), "got {err:?}");
        assert!(err.to_string().contains("no pdf produced"));
    }

    #[tokio::test]
    async fn existing_output_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.docx");
        std::fs::write(dir.path().join("doc.pdf"), b"%PDF-1.7").unwrap();

        let pdf = LibreOfficeConverter::new("true")
            .convert(&input, dir.path())
            .await
            .unwrap();
        assert_eq!(pdf, dir.path().join("doc.pdf"));
    }

    #[tokio::test]
    async fn slow_converter_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-office");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let started = std::time::Instant::now();
        let err = LibreOfficeConverter::new(script.to_str().unwrap())
            .with_timeout(Some(Duration::from_millis(100)))
            .convert(&dir.path().join("doc.docx"), dir.path())
            .await
            .unwrap_err();

        assert!(
            matches!(err, ConversionError::Timeout(limit) if limit == Duration::from_millis(100)),
            "got {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn unknown_binary_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let err = LibreOfficeConverter::new("definitely-not-a-converter-binary")
            .convert(&dir.path().join("doc.docx"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Spawn { .. }));
    }
}
