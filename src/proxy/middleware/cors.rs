// CORS 中间件
use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};

/// 创建 CORS layer
///
/// The extension calls the relay from the Looker origin, so any origin is
/// accepted. Every `OPTIONS` request is answered here as a preflight.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Turns the CORS layer's `200 OK` preflight answer into `204 No Content`.
///
/// Must sit outside [`cors_layer`] so the CORS headers are kept.
pub async fn options_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}
