use crate::routes::{ApiResponse, ok, store_failure};
use crate::server::AppState;
use axum::Extension;
use axum::routing::get;
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/stats", get(get_stats))
}

/// Due-date windows are computed against the server's local calendar day.
#[tracing::instrument(level = "debug", skip_all)]
async fn get_stats(Extension(state): Extension<Arc<AppState>>) -> ApiResponse {
    let today = chrono::Local::now().date_naive();
    match state.store.stats(today).await {
        Ok(stats) => ok(serde_json::json!(stats)),
        Err(e) => store_failure("stats", e),
    }
}
