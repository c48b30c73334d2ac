/*
 * Copyright (C) 2025 Jakub Žitník
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Request-path failure classification. Origin-side failures surface as a
/// short reason, never a raw error chain.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no site configured for this host")]
    NoMatchingSite,
    #[error("unsafe origin: {0}")]
    UnsafeOrigin(String),
    #[error("rate limit exceeded")]
    RateLimited { limit: usize, retry_after: u64 },
    #[error("origin request timed out")]
    OriginTimeout,
    #[error("origin request failed: {0}")]
    OriginNetwork(String),
    #[error("response exceeds the configured size limit")]
    OversizeResponse,
    #[error("could not decode origin response")]
    MalformedResponse,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoMatchingSite => StatusCode::NOT_FOUND,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::OversizeResponse => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UnsafeOrigin(_)
            | ProxyError::OriginTimeout
            | ProxyError::OriginNetwork(_)
            | ProxyError::MalformedResponse => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ProxyError::NoMatchingSite => status.into_response(),
            ProxyError::RateLimited { limit, retry_after } => (
                status,
                [
                    ("Retry-After", retry_after.to_string()),
                    ("X-RateLimit-Limit", limit.to_string()),
                    ("X-RateLimit-Remaining", "0".to_string()),
                ],
                "rate limit exceeded",
            )
                .into_response(),
            other => (status, other.to_string()).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ProxyError::NoMatchingSite.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ProxyError::UnsafeOrigin("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::RateLimited { limit: 1, retry_after: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ProxyError::OriginTimeout.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::OversizeResponse.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn rate_limited_response_carries_headers() {
        let resp = ProxyError::RateLimited { limit: 3, retry_after: 42 }.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers().get("Retry-After").unwrap(), "42");
        assert_eq!(resp.headers().get("X-RateLimit-Remaining").unwrap(), "0");
    }
}
