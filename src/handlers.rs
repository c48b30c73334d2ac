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

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use url::Url;

use crate::admin;
use crate::cookies;
use crate::error::ProxyError;
use crate::guard;
use crate::ratelimit::RateDecision;
use crate::rewrite;
use crate::session::{SESSION_COOKIE, SESSION_MAX_AGE_SECS};
use crate::site::{self, EffectiveConfig, MediaPolicy, SessionMode};
use crate::state::AppState;
use crate::urlmap::{self, MirrorContext};
use crate::utils;

/// Liveness probe, served on every host.
pub async fn health_handler() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// Splits traffic by `Host`: the admin host goes to the admin seam,
/// everything else into the proxy engine.
pub async fn dispatch_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    if let (Some(admin_host), Some(host)) = (&state.config.admin_host, request_host(&req)) {
        if host == urlmap::normalize_host(admin_host) {
            return admin::handle(req).await;
        }
    }
    proxy_handler(state, addr, req).await
}

/// The main proxy handler: one request in, one origin call, one rewritten
/// response out, and a structured log record per completed request.
async fn proxy_handler(state: AppState, addr: SocketAddr, req: Request) -> Response {
    let started = Instant::now();
    let client_ip = addr.ip().to_string();
    let mirror_host = request_host(&req).unwrap_or_default();
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let mut origin_url = None;
    // A guard denial is the proxy refusing, not the origin failing; it
    // logs as a warning even though the client sees a 502.
    let mut guard_denial = false;
    let response = match handle_proxy(&state, &client_ip, &mirror_host, req, &mut origin_url).await
    {
        Ok(response) => response,
        Err(err) => {
            guard_denial = matches!(err, ProxyError::UnsafeOrigin(_));
            err.into_response()
        }
    };

    let status_code = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;
    let origin_url = origin_url.as_deref().unwrap_or("-");
    let client_ip = client_ip.as_str();
    let mirror_host = mirror_host.as_str();
    let user_agent = user_agent.as_str();
    if status_code >= 500 && !guard_denial {
        tracing::error!(client_ip, mirror_host, origin_url, status_code, latency_ms, user_agent, "proxy request failed");
    } else if status_code >= 400 || guard_denial {
        tracing::warn!(client_ip, mirror_host, origin_url, status_code, latency_ms, user_agent, "proxy request rejected");
    } else {
        tracing::info!(client_ip, mirror_host, origin_url, status_code, latency_ms, user_agent, "proxy request");
    }
    response
}

struct Session {
    sid: String,
    /// Signed cookie value, present only when freshly minted.
    newly_signed: Option<String>,
}

async fn handle_proxy(
    state: &AppState,
    client_ip: &str,
    mirror_host: &str,
    req: Request,
    origin_url_out: &mut Option<String>,
) -> Result<Response, ProxyError> {
    let (sites, global) = state.sites.snapshot().await;
    let site = site::resolve(&sites, mirror_host).ok_or(ProxyError::NoMatchingSite)?;
    let config = EffectiveConfig::merge(site, &global);

    let rate = if state.config.enable_rate_limiting {
        let decision = state.limiter.check(client_ip).await;
        if !decision.allowed {
            return Err(ProxyError::RateLimited {
                limit: decision.limit,
                retry_after: decision
                    .retry_after
                    .unwrap_or(state.config.rate_limit_window.as_secs()),
            });
        }
        Some(decision)
    } else {
        None
    };

    let session = derive_session(state, req.headers());

    let path_query = req
        .uri()
        .path_and_query()
        .map(|v| v.as_str())
        .unwrap_or("/");
    let origin_url = urlmap::build_origin_url(mirror_host, path_query, site)
        .ok_or(ProxyError::NoMatchingSite)?;
    *origin_url_out = Some(origin_url.clone());

    guard::is_safe_origin_url(&origin_url).map_err(ProxyError::UnsafeOrigin)?;

    let origin_host = Url::parse(&origin_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| ProxyError::UnsafeOrigin("origin url has no host".to_string()))?;

    let method = req.method().clone();
    let mut headers = utils::prepare_request_headers(req.headers(), site);

    if config.session_mode == SessionMode::CookieJar {
        let jar = state.cookies.get(site.id, &session.sid, &origin_host).await;
        if !jar.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&cookies::render(&jar)) {
                headers.insert("cookie", value);
            }
        }
    }

    let body_bytes = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("failed to read request body: {e}");
            return Ok((StatusCode::BAD_REQUEST, "failed to read body").into_response());
        }
    };

    let resp = state
        .client
        .request(method, &origin_url)
        .headers(headers)
        .timeout(state.config.request_timeout)
        .body(body_bytes)
        .send()
        .await
        .map_err(classify_fetch_error)?;

    let status = resp.status();
    let origin_headers = resp.headers().clone();

    // Persist origin cookies before anything can fail; redirects set them
    // too (login flows).
    if config.session_mode == SessionMode::CookieJar {
        let lines: Vec<String> = origin_headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        if !lines.is_empty() {
            state
                .cookies
                .store(site.id, &session.sid, &origin_host, &lines)
                .await;
        }
    }

    let mut response_headers = utils::sanitize_response_headers(&origin_headers);
    let ctx = MirrorContext {
        site,
        config: &config,
        mirror_host,
        mirror_scheme: &state.config.mirror_scheme,
        page_origin_url: &origin_url,
    };

    if status.is_redirection() {
        if let Some(location) = origin_headers.get("location").and_then(|v| v.to_str().ok()) {
            let new_location = rewrite_location(location, &origin_url, &ctx);
            if let Ok(value) = HeaderValue::from_str(&new_location) {
                response_headers.insert("location", value);
            }
        }
        return Ok(assemble(status, response_headers, Body::empty(), &session, rate));
    }

    let content_type = origin_headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let is_html = content_type.trim_start().to_ascii_lowercase().starts_with("text/html");
    let origin_path = Url::parse(&origin_url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let is_media = is_media_content_type(&content_type) || urlmap::is_media_url(&origin_path);

    if !is_html && is_media && config.media_policy != MediaPolicy::SizeLimited {
        // Stream media straight through; the size cap does not apply.
        let body = Body::from_stream(resp.bytes_stream());
        return Ok(assemble(status, response_headers, body, &session, rate));
    }

    let bytes = read_capped(resp, state.config.max_response_size).await?;

    let body = if is_html {
        let page = String::from_utf8_lossy(&bytes).to_string();
        Body::from(rewrite::rewrite_html_page(&page, &ctx))
    } else {
        Body::from(bytes)
    };
    Ok(assemble(status, response_headers, body, &session, rate))
}

/// Resolves a `Location` header against the origin URL and maps it into
/// mirror space.
fn rewrite_location(location: &str, origin_url: &str, ctx: &MirrorContext) -> String {
    let resolved = Url::parse(origin_url)
        .ok()
        .and_then(|base| base.join(location).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| location.to_string());
    ctx.to_mirror(&resolved)
}

/// Extracts the verified session from the request, or mints a new one.
fn derive_session(state: &AppState, headers: &HeaderMap) -> Session {
    if let Some(cookie_header) = headers.get("cookie").and_then(|v| v.to_str().ok()) {
        for pair in cookie_header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name.trim() == SESSION_COOKIE {
                    if let Some(sid) = state.sessions.verify(value.trim()) {
                        return Session {
                            sid,
                            newly_signed: None,
                        };
                    }
                }
            }
        }
    }
    let sid = state.sessions.generate_sid();
    let signed = state.sessions.sign(&sid);
    Session {
        sid,
        newly_signed: Some(signed),
    }
}

fn classify_fetch_error(e: reqwest::Error) -> ProxyError {
    if e.is_timeout() {
        ProxyError::OriginTimeout
    } else if e.is_connect() {
        ProxyError::OriginNetwork("could not connect to origin".to_string())
    } else {
        ProxyError::OriginNetwork("origin request failed".to_string())
    }
}

fn is_media_content_type(content_type: &str) -> bool {
    let ct = content_type.trim_start().to_ascii_lowercase();
    ct.starts_with("image/")
        || ct.starts_with("video/")
        || ct.starts_with("audio/")
        || ct.starts_with("font/")
        || ct.starts_with("application/octet-stream")
}

/// Buffers a response body, failing once it grows past `cap`.
async fn read_capped(resp: reqwest::Response, cap: usize) -> Result<Vec<u8>, ProxyError> {
    if resp.content_length().is_some_and(|len| len as usize > cap) {
        return Err(ProxyError::OversizeResponse);
    }
    let mut buf = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                ProxyError::OriginTimeout
            } else {
                ProxyError::MalformedResponse
            }
        })?;
        if buf.len() + chunk.len() > cap {
            return Err(ProxyError::OversizeResponse);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Builds the outbound response: sanitized headers, then the session
/// cookie when newly minted, then the rate-limit headers.
fn assemble(
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    session: &Session,
    rate: Option<RateDecision>,
) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    if let Some(signed) = &session.newly_signed {
        let cookie = format!(
            "{SESSION_COOKIE}={signed}; HttpOnly; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; SameSite=Lax"
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append("set-cookie", value);
        }
    }
    if let Some(rate) = rate {
        if let Ok(value) = HeaderValue::from_str(&rate.limit.to_string()) {
            response.headers_mut().insert("x-ratelimit-limit", value);
        }
        if let Ok(value) = HeaderValue::from_str(&rate.remaining.to_string()) {
            response.headers_mut().insert("x-ratelimit-remaining", value);
        }
    }
    response
}

fn request_host(req: &Request) -> Option<String> {
    req.headers()
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(urlmap::normalize_host)
        .or_else(|| req.uri().host().map(urlmap::normalize_host))
}
