//! Roster HTTP surface.
//!
//! Browsable HTML pages, JSON endpoints for scripts and browser front ends, and the
//! rendered YAML for a single instance. Every handler is a thin mapping onto
//! [`InventoryApi`]; an unknown kind or instance is always a plain 404.

#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use roster_api::{InventoryApi, RosterError};
use roster_core::InstanceKey;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub listen: SocketAddr,
    /// Permissive CORS, for a front end served from another origin.
    pub cors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { listen: SocketAddr::from(([127, 0, 0, 1], 8080)), cors: false }
    }
}

type SharedApi = Arc<dyn InventoryApi>;

/// Build the router over a ready inventory.
pub fn router(api: SharedApi, cfg: &WebConfig) -> Router {
    let app = Router::new()
        .route("/", get(index_page))
        .route("/resources/{kind}", get(list_page))
        .route("/resource/{kind}/{namespace}/{name}", get(detail_text))
        .route("/api/kinds", get(kinds_json))
        .route("/api/list/{kind}", get(list_json))
        .route("/api/details/{kind}/{namespace}/{name}", get(detail_yaml))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(api);
    if cfg.cors { app.layer(CorsLayer::permissive()) } else { app }
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(app: Router, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    info!(addr = %listener.local_addr()?, "http: listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await.context("http server")?;
    info!("http: stopped");
    Ok(())
}

/// Error wrapper turning [`RosterError`] into an HTTP response.
struct ApiFailure(RosterError);

impl From<RosterError> for ApiFailure {
    fn from(e: RosterError) -> Self { Self(e) }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        match self.0 {
            RosterError::NotFound(msg) => {
                debug!(reason = %msg, "http: not found");
                (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
            }
            RosterError::Internal(msg) => {
                error!(error = %msg, "http: render failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error converting to YAML\n").into_response()
            }
            RosterError::Discovery(msg) => {
                error!(error = %msg, "http: unexpected discovery error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error\n").into_response()
            }
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

async fn index_page(State(api): State<SharedApi>) -> Html<String> {
    let mut body = String::from("<html><body>\n<h1>Kubernetes Resources</h1>\n<ul>\n");
    for kind in api.list_kinds() {
        let k = escape_html(&kind);
        let _ = writeln!(body, "  <li><a href=\"/resources/{k}\">{k}</a></li>");
    }
    body.push_str("</ul>\n</body></html>\n");
    Html(body)
}

async fn list_page(State(api): State<SharedApi>, Path(kind): Path<String>) -> Result<Html<String>, ApiFailure> {
    let keys = api.list_instances(&kind)?;
    let k = escape_html(&kind);
    let mut body = format!("<html><body>\n<h1>{k}</h1>\n<ul>\n");
    for key in keys {
        let ns = escape_html(&key.namespace);
        let name = escape_html(&key.name);
        let _ = writeln!(body, "  <li><a href=\"/resource/{k}/{ns}/{name}\">{ns}/{name}</a></li>");
    }
    body.push_str("</ul>\n</body></html>\n");
    Ok(Html(body))
}

async fn detail_text(
    State(api): State<SharedApi>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
) -> Result<Response, ApiFailure> {
    let yaml = api.get_instance_detail(&kind, &namespace, &name)?;
    let body = format!("Resource Type: {}\n\nYAML:\n{}\n", kind, yaml);
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

async fn kinds_json(State(api): State<SharedApi>) -> Json<Vec<String>> {
    Json(api.list_kinds())
}

async fn list_json(State(api): State<SharedApi>, Path(kind): Path<String>) -> Result<Json<Vec<InstanceKey>>, ApiFailure> {
    Ok(Json(api.list_instances(&kind)?))
}

async fn detail_yaml(
    State(api): State<SharedApi>,
    Path((kind, namespace, name)): Path<(String, String, String)>,
) -> Result<Response, ApiFailure> {
    let yaml = api.get_instance_detail(&kind, &namespace, &name)?;
    Ok(([(header::CONTENT_TYPE, "text/yaml; charset=utf-8")], yaml).into_response())
}

async fn healthz() -> &'static str {
    "ok"
}
