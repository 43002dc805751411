use axum::{Json, extract::rejection::JsonRejection};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::RenderError;

/// Request body as received; every field is checked by [`RenderRequest`].
#[derive(Debug, Default, Deserialize)]
pub struct RawRenderRequest {
    #[serde(default)]
    pub template: Option<Value>,
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub job_id: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub template: String,
    pub version: String,
    pub job_id: String,
    pub data: Map<String, Value>,
}

/// A string or number field; blank strings count as missing.
fn required(name: &str, value: Option<Value>) -> Result<String, RenderError> {
    match value {
        None | Some(Value::Null) => Err(RenderError::MissingFields),
        Some(Value::String(s)) if s.trim().is_empty() => Err(RenderError::MissingFields),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(RenderError::InvalidBody(format!(
            "`{name}` must be a string or a number"
        ))),
    }
}

impl RenderRequest {
    /// Validate an extracted body. Runs before anything touches storage.
    pub fn from_payload(
        payload: Result<Json<RawRenderRequest>, JsonRejection>,
    ) -> Result<Self, RenderError> {
        let Json(raw) =
            payload.map_err(|rejection| RenderError::InvalidBody(rejection.body_text()))?;
        Self::validate(raw)
    }

    pub fn validate(raw: RawRenderRequest) -> Result<Self, RenderError> {
        let template = required("template", raw.template)?;
        let version = required("version", raw.version)?;
        let job_id = required("job_id", raw.job_id)?;
        let data = match raw.data {
            None | Some(Value::Null) => return Err(RenderError::MissingFields),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(RenderError::InvalidBody(
                    "`data` must be a JSON object".to_string(),
                ));
            }
        };

        Ok(Self {
            template,
            version,
            job_id,
            data,
        })
    }

    /// `{template}/{version}/{template}.{ext}` in the template bucket.
    pub fn template_key(&self, ext: &str) -> String {
        format!("{}/{}/{}.{}", self.template, self.version, self.template, ext)
    }

    /// `{job_id}/{template}/{template}-{version}.pdf` in the output bucket.
    pub fn output_key(&self) -> String {
        format!(
            "{}/{}/{}-{}.pdf",
            self.job_id, self.template, self.template, self.version
        )
    }
}
