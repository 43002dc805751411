use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum_test::{TestRequest, TestServer};
use serde_json::{Value, json};
use storage_sdk::MemoryStorage;
use tempfile::TempDir;

use crate::{
    AppState, app,
    cnfg::AppConfig,
    converter::{ConversionError, Converter, expected_output},
    docx::testing::document_text,
};

pub const API_KEY: &str = "test-api-key";
pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n% fake\n";

/// Placeholder PDF bytes for a document with the given text.
pub fn fake_pdf(text: &str) -> Vec<u8> {
    [FAKE_PDF, text.as_bytes()].concat()
}

/// Writes a placeholder PDF where LibreOffice would, and remembers the text
/// of every document it was handed.
#[derive(Default)]
pub struct FakeConverter {
    failure: Option<String>,
    seen: Mutex<Vec<String>>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            failure: Some(stderr.to_string()),
            ..Self::default()
        }
    }

    pub fn seen_documents(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ConversionError> {
        let spawn = |source| ConversionError::Spawn {
            bin: "fake".to_string(),
            source,
        };
        let docx = tokio::fs::read(input).await.map_err(spawn)?;
        let text = document_text(&docx);
        self.seen.lock().unwrap().push(text.clone());

        if let Some(stderr) = &self.failure {
            return Err(ConversionError::Failed {
                status: "exit status: 1".to_string(),
                stderr: stderr.clone(),
            });
        }

        let pdf = expected_output(input, out_dir);
        tokio::fs::write(&pdf, fake_pdf(&text)).await.map_err(spawn)?;
        Ok(pdf)
    }
}

/// A router over in-memory storage and a fake converter, with its own
/// scratch directory.
pub struct TestApp {
    pub server: TestServer,
    pub storage: Arc<MemoryStorage>,
    pub converter: Arc<FakeConverter>,
    pub config: AppConfig,
    _scratch: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(FakeConverter::new(), Some(API_KEY))
    }

    pub fn without_api_key() -> Self {
        Self::build(FakeConverter::new(), None)
    }

    pub fn with_converter(converter: FakeConverter) -> Self {
        Self::build(converter, Some(API_KEY))
    }

    fn build(converter: FakeConverter, api_key: Option<&str>) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let config = AppConfig {
            supabase_url: "http://storage.invalid".to_string(),
            supabase_service_key: "service-key".to_string(),
            api_key: api_key.map(str::to_string),
            scratch_dir: scratch.path().join("temp"),
            ..AppConfig::default()
        };

        let storage = Arc::new(MemoryStorage::new());
        let converter = Arc::new(converter);
        let state = AppState::new(&config, storage.clone(), converter.clone());
        let server = TestServer::new(app(state)).unwrap();

        Self {
            server,
            storage,
            converter,
            config,
            _scratch: scratch,
        }
    }

    pub fn authorized_post(&self, path: &str) -> TestRequest {
        self.server.post(path).add_header("x-api-key", API_KEY)
    }

    pub fn seed_template(&self, key: &str, body: impl Into<Vec<u8>>) {
        self.storage
            .insert(&self.config.template_bucket, key, body, "application/octet-stream");
    }

    /// Files left behind in the scratch directory.
    pub fn scratch_files(&self) -> Vec<String> {
        match std::fs::read_dir(&self.config.scratch_dir) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn render_body(template: &str, version: &str, job_id: &str, data: Value) -> Value {
    json!({
        "template": template,
        "version": version,
        "job_id": job_id,
        "data": data,
    })
}
