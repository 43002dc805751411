use axum::{
    extract::{Request, State},
    middleware,
    response::Response,
};

use crate::{AppState, error::RenderError};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Let a request through only when `x-api-key` matches the configured key.
/// Without a configured key every request is rejected.
pub async fn auth_middleware(
    State(app_state): State<AppState>,
    request: Request,
    next: middleware::Next,
) -> Result<Response, RenderError> {
    let Some(expected) = app_state.api_key.as_deref() else {
        return Err(RenderError::Unauthorized);
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(request).await)
        }
        _ => Err(RenderError::Unauthorized),
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
