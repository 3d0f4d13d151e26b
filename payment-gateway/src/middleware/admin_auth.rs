use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::utils::secrets_match;

pub const INTERNAL_API_KEY_HEADER: &str = "X-Internal-Api-Key";

/// Guards `/admin` routes with the shared internal API key.
pub async fn require_internal_api_key(
    State(expected): State<Secret<String>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(INTERNAL_API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let expected = expected.expose_secret();
    if expected.is_empty() || !secrets_match(expected, provided) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return AppError::Unauthorized(anyhow::anyhow!("Invalid internal API key"))
            .into_response();
    }

    next.run(request).await
}
