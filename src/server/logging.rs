use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

const LOG_TARGET: &str = "wager_chess::server::http";

/// Logs every request and the status it completed with.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let acting_user = request
        .headers()
        .get(super::routes::USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    tracing::debug!(target = LOG_TARGET, %method, %path, "incoming request");
    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(
            target = LOG_TARGET,
            %method,
            %path,
            user = acting_user.as_deref().unwrap_or("-"),
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "request failed"
        );
    } else {
        tracing::info!(
            target = LOG_TARGET,
            %method,
            %path,
            user = acting_user.as_deref().unwrap_or("-"),
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );
    }
    response
}
