//! Authentication middleware.
//!
//! Every request must name the configured application in
//! `X-Parse-Application-Id`. A master key, when sent, must match the
//! configured one.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::error::AppError;
use crate::AppState;

pub const APPLICATION_ID_HEADER: &str = "x-parse-application-id";
pub const MASTER_KEY_HEADER: &str = "x-parse-master-key";
pub const SESSION_TOKEN_HEADER: &str = "x-parse-session-token";
pub const INSTALLATION_ID_HEADER: &str = "x-parse-installation-id";

/// Credentials extracted from an authorized request.
#[derive(Debug, Clone)]
pub struct AppAuth {
    /// Whether the request carried a valid master key
    pub master: bool,
    pub session_token: Option<String>,
    pub installation_id: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

impl FromRequestParts<AppState> for AppAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match header(&parts.headers, APPLICATION_ID_HEADER) {
            Some(app_id) if app_id == state.config.application_id => {}
            _ => return Err(AppError::Unauthorized),
        }

        let master = match (header(&parts.headers, MASTER_KEY_HEADER), &state.config.master_key) {
            (None, _) => false,
            (Some(sent), Some(expected)) if &sent == expected => true,
            (Some(_), _) => return Err(AppError::Unauthorized),
        };

        Ok(AppAuth {
            master,
            session_token: header(&parts.headers, SESSION_TOKEN_HEADER),
            installation_id: header(&parts.headers, INSTALLATION_ID_HEADER),
        })
    }
}
