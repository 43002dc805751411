use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Html,
};
use handlebars::Handlebars;
use serde_json::Value;

use crate::{
    AppState,
    error::RenderError,
    render::{RawRenderRequest, RenderRequest},
};

/// Handlebars templates rendered to HTML. `{{var}}` is HTML-escaped,
/// `{{{var}}}` is not, and missing values render as nothing.
pub struct HtmlRenderer {
    registry: Handlebars<'static>,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(handlebars::html_escape);
        Self { registry }
    }

    /// Render `source` against the request data, with `job_id` added on top.
    pub fn render(
        &self,
        source: &str,
        request: &RenderRequest,
    ) -> Result<String, handlebars::RenderError> {
        let mut ctx = request.data.clone();
        ctx.insert("job_id".to_string(), Value::String(request.job_id.clone()));
        self.registry.render_template(source, &ctx)
    }
}

pub async fn render_html(
    State(state): State<AppState>,
    payload: Result<Json<RawRenderRequest>, JsonRejection>,
) -> Result<Html<String>, RenderError> {
    let request = RenderRequest::from_payload(payload)?;
    let html = html_from_template(&state, &request).await?;
    Ok(Html(html))
}

#[tracing::instrument(
    name = "render_html",
    skip_all,
    fields(job_id = %request.job_id, template = %request.template, version = %request.version)
)]
async fn html_from_template(state: &AppState, request: &RenderRequest) -> Result<String, RenderError> {
    let template_key = request.template_key("html");
    tracing::info!(bucket = %state.template_bucket, key = %template_key, "downloading template");
    let template = state
        .storage
        .download(&state.template_bucket, &template_key)
        .await
        .map_err(RenderError::TemplateDownload)?;

    let source = String::from_utf8_lossy(&template);
    let html = state.html.render(&source, request)?;
    tracing::info!(bytes = html.len(), "html rendered");
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::{Map, json};

    use crate::test_utils::{TestApp, render_body};

    fn request(data: Value) -> RenderRequest {
        let Value::Object(data) = data else {
            panic!("data must be an object");
        };
        RenderRequest {
            template: "welcome".to_string(),
            version: "v1".to_string(),
            job_id: "job-7".to_string(),
            data,
        }
    }

    fn render(source: &str, data: Value) -> String {
        HtmlRenderer::new().render(source, &request(data)).unwrap()
    }

    #[test]
    fn substitutes_and_escapes() {
        let html = render(
            "<p>Hello {{name}} ({{job_id}}) {{note}}</p>",
            json!({"name": "Ada", "note": "<b>&"}),
        );
        assert_eq!(html, "<p>Hello Ada (job-7) &lt;b&gt;&amp;</p>");
    }

    #[test]
    fn triple_stash_is_not_escaped() {
        let html = render("<div>{{{raw}}}</div>", json!({"raw": "<b>bold</b>"}));
        assert_eq!(html, "<div><b>bold</b></div>");
    }

    #[test]
    fn undefined_variables_render_empty() {
        assert_eq!(render("[{{missing}}]", Value::Object(Map::new())), "[]");
        assert_eq!(render("[{{customer.name}}]", json!({})), "[]");
    }

    #[test]
    fn job_id_overrides_data() {
        assert_eq!(render("{{job_id}}", json!({"job_id": "spoofed"})), "job-7");
    }

    #[test]
    fn each_blocks_iterate_arrays() {
        let html = render(
            "<ul>{{#each items}}<li>{{this}}</li>{{/each}}</ul>",
            json!({"items": ["Pen", "Ink"]}),
        );
        assert_eq!(html, "<ul><li>Pen</li><li>Ink</li></ul>");

        let html = render(
            "{{#each lines}}<td>{{name}}</td><td>{{../job_id}}</td>{{/each}}",
            json!({"lines": [{"name": "Pen"}, {"name": "Ink"}]}),
        );
        assert_eq!(html, "<td>Pen</td><td>job-7</td><td>Ink</td><td>job-7</td>");
    }

    #[test]
    fn if_blocks_choose_a_branch() {
        let source = "{{#if paid}}PAID{{else}}DUE{{/if}}";
        assert_eq!(render(source, json!({"paid": true})), "PAID");
        assert_eq!(render(source, json!({"paid": false})), "DUE");
        assert_eq!(render(source, json!({})), "DUE");
        assert_eq!(render("{{#unless paid}}DUE{{/unless}}", json!({})), "DUE");
    }

    #[test]
    fn nested_paths_and_hyphenated_keys() {
        let html = render(
            "{{customer.name}} {{first-name}}",
            json!({"customer": {"name": "Ada"}, "first-name": "Grace"}),
        );
        assert_eq!(html, "Ada Grace");
    }

    #[test]
    fn syntax_errors_surface() {
        let renderer = HtmlRenderer::new();
        for source in ["{{unclosed", "{{#if paid}}PAID", "{{#each items}}x{{/if}}"] {
            let err = renderer.render(source, &request(json!({}))).unwrap_err();
            assert!(!err.to_string().is_empty(), "{source}");
        }
    }

    #[tokio::test]
    async fn renders_template_from_storage() {
        let app = TestApp::new();
        app.seed_template(
            "welcome/v2/welcome.html",
            "<h1>Hello {{name}}</h1>{{#if vip}}<p>VIP</p>{{/if}}<p>{{job_id}}</p>",
        );

        let response = app
            .authorized_post("/render/html")
            .json(&render_body("welcome", "v2", "job-1", json!({"name": "Ada", "vip": true})))
            .await;

        response.assert_status_ok();
        assert_eq!(response.header("content-type"), "text/html; charset=utf-8");
        assert_eq!(response.text(), "<h1>Hello Ada</h1><p>VIP</p><p>job-1</p>");
        assert_eq!(app.storage.upload_count(), 0);
        assert!(app.converter.seen_documents().is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let app = TestApp::new();
        app.seed_template("raw/v1/raw.html", b"<p>caf\xe9 {{x}}</p>".to_vec());

        let response = app
            .authorized_post("/render/html")
            .json(&render_body("raw", "v1", "job-1", json!({"x": 1})))
            .await;

        response.assert_status_ok();
        assert_eq!(response.text(), "<p>caf\u{fffd} 1</p>");
    }

    #[tokio::test]
    async fn missing_template_is_a_download_failure() {
        let app = TestApp::new();

        let response = app
            .authorized_post("/render/html")
            .json(&render_body("welcome", "v2", "job-1", json!({})))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.json::<Value>();
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("Template download failed:")
        );
    }

    #[tokio::test]
    async fn template_syntax_error_is_a_server_error() {
        let app = TestApp::new();
        app.seed_template("broken/v1/broken.html", "{{#each items}}<li>");

        let response = app
            .authorized_post("/render/html")
            .json(&render_body("broken", "v1", "job-1", json!({})))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.json::<Value>()["error"].is_string());
    }

    #[tokio::test]
    async fn missing_data_is_rejected() {
        let app = TestApp::new();

        let response = app
            .authorized_post("/render/html")
            .json(&json!({"template": "welcome", "version": "v2", "job_id": "job-1"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(app.storage.calls().is_empty());
    }
}
