use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::scheduler::Orchestrator;
use crate::types::Snapshot;

#[derive(Clone)]
struct ApiState {
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_gateway(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct TextResponse {
    text: String,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/report", post(report))
        .route("/v1/reauth", post(reauth))
        .route("/v1/schedule", get(schedule))
        .route("/v1/snapshot", get(snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { orchestrator })
}

pub async fn run_server(orchestrator: Arc<Orchestrator>, bind: SocketAddr) -> Result<()> {
    let app = router(orchestrator);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("command API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse { status: "ok" })
}

async fn report(State(state): State<ApiState>) -> Json<ApiResponse<TextResponse>> {
    let text = state.orchestrator.request_full_report().await;
    ok(TextResponse { text })
}

async fn reauth(State(state): State<ApiState>) -> ApiResult<TextResponse> {
    state
        .orchestrator
        .request_reauthentication()
        .await
        .map_err(ApiError::bad_gateway)?;
    Ok(ok(TextResponse {
        text: "Re-authenticated with the portal.".to_string(),
    }))
}

async fn schedule(State(state): State<ApiState>) -> Json<ApiResponse<TextResponse>> {
    ok(TextResponse {
        text: state.orchestrator.request_schedule_status(),
    })
}

async fn snapshot(State(state): State<ApiState>) -> Json<ApiResponse<Snapshot>> {
    ok(state.orchestrator.previous_snapshot().await)
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::run_server;
    use crate::alert::sink::StdoutSink;
    use crate::config::Credentials;
    use crate::portal::session::testing::ScriptedTransport;
    use crate::portal::session::SessionManager;
    use crate::portal::PortalUrls;
    use crate::scheduler::{Destinations, Intervals, Orchestrator};

    #[tokio::test]
    async fn serves_schedule_and_reauth_failure() {
        let session = SessionManager::new(
            Arc::new(ScriptedTransport::new()),
            PortalUrls::from_base("https://portal.example.org"),
            Credentials::default(),
        );
        let orchestrator = Orchestrator::new(
            session,
            Arc::new(StdoutSink),
            Destinations {
                reports: "reports".to_string(),
                changes: "changes".to_string(),
            },
            Intervals {
                full_report: Duration::from_secs(3600),
                change_check: Duration::from_secs(60),
            },
        );

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let server = tokio::spawn(run_server(orchestrator, addr));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = reqwest::Client::new();
        let schedule: serde_json::Value = client
            .get(format!("http://{addr}/v1/schedule"))
            .send()
            .await
            .expect("schedule request")
            .json()
            .await
            .expect("schedule json");
        assert_eq!(schedule["ok"], true);
        assert!(schedule["data"]["text"]
            .as_str()
            .unwrap_or_default()
            .contains("Change check"));

        let reauth = client
            .post(format!("http://{addr}/v1/reauth"))
            .send()
            .await
            .expect("reauth request");
        assert_eq!(reauth.status(), reqwest::StatusCode::BAD_GATEWAY);

        server.abort();
    }
}
