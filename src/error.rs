use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use storage_sdk::StorageError;
use thiserror::Error;

use crate::{converter::ConversionError, docx::TemplateError};

/// Every way a render request can fail, each mapped to one HTTP status.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Missing: template, version, job_id, data")]
    MissingFields,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Template download failed: {0}")]
    TemplateDownload(#[source] StorageError),

    #[error("PDF upload failed: {0}")]
    Upload(#[source] StorageError),

    #[error("PDF conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    DocxTemplate(#[from] TemplateError),

    #[error(transparent)]
    HtmlTemplate(#[from] handlebars::RenderError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn status(&self) -> StatusCode {
        match self {
            RenderError::MissingFields | RenderError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            RenderError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for RenderError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "render failed: {}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "request rejected: {}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
