use std::path::PathBuf;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Serialize;
use serde_json::Value;
use storage_sdk::UploadOptions;

use crate::{
    AppState,
    docx::{DocxTemplate, MergeOptions},
    error::RenderError,
    render::{RawRenderRequest, RenderRequest},
    workspace::ScratchFile,
};

const MERGE_OPTIONS: MergeOptions = MergeOptions {
    paragraph_loop: true,
    linebreaks: true,
};

#[derive(Debug, Serialize)]
pub struct RenderPdfResponse {
    pub success: bool,
    pub output_bucket: String,
    pub output_key: String,
}

pub async fn render_pdf(
    State(state): State<AppState>,
    payload: Result<Json<RawRenderRequest>, JsonRejection>,
) -> Result<Json<RenderPdfResponse>, RenderError> {
    let request = RenderRequest::from_payload(payload)?;
    let output_key = docx_to_pdf(&state, &request).await?;

    Ok(Json(RenderPdfResponse {
        success: true,
        output_bucket: state.output_bucket.clone(),
        output_key,
    }))
}

/// Download the `.docx` template, merge, convert and upload. Returns the
/// output key.
#[tracing::instrument(
    name = "render_pdf",
    skip_all,
    fields(job_id = %request.job_id, template = %request.template, version = %request.version)
)]
async fn docx_to_pdf(state: &AppState, request: &RenderRequest) -> Result<String, RenderError> {
    let workspace = &state.workspace;
    workspace.ensure_dir().await?;

    let base = workspace.scratch_base(&request.job_id, &request.template, &request.version);
    let docx = workspace.scratch_file(&base, "docx");
    let _pdf = workspace.scratch_file(&base, "pdf");

    let template_key = request.template_key("docx");
    tracing::info!(bucket = %state.template_bucket, key = %template_key, "downloading template");
    let template = state
        .storage
        .download(&state.template_bucket, &template_key)
        .await
        .map_err(RenderError::TemplateDownload)?;
    tokio::fs::write(docx.path(), &template).await?;

    let merged = merge_docx(docx.path().to_path_buf(), Value::Object(request.data.clone())).await?;
    tokio::fs::write(docx.path(), merged).await?;
    tracing::debug!(path = %docx.path().display(), "template merged");

    let produced = state
        .converter
        .convert(docx.path(), workspace.root())
        .await?;
    let produced = ScratchFile::new(produced);
    let pdf = tokio::fs::read(produced.path()).await?;
    tracing::debug!(bytes = pdf.len(), "pdf produced");

    let output_key = request.output_key();
    state
        .storage
        .upload(
            &state.output_bucket,
            &output_key,
            pdf,
            UploadOptions::new("application/pdf").upsert(),
        )
        .await
        .map_err(RenderError::Upload)?;

    tracing::info!(bucket = %state.output_bucket, key = %output_key, "pdf uploaded");
    Ok(output_key)
}

async fn merge_docx(path: PathBuf, data: Value) -> Result<Vec<u8>, RenderError> {
    let merged = tokio::task::spawn_blocking(move || {
        DocxTemplate::open(&path)?.render(&data, &MERGE_OPTIONS)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(merged)
}
