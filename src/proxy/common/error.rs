// 错误处理
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed body or missing user id in the supplied logging data.
    #[error("{0}")]
    ClientInput(String),

    /// No access token could be obtained from the identity provider.
    #[error("{0}")]
    Auth(String),

    /// Non-2xx from the model API, or a response without candidate content.
    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::ClientInput(_) => StatusCode::BAD_REQUEST,
            RelayError::Auth(_) | RelayError::Upstream(_) | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
