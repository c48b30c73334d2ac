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

use axum::http::{HeaderMap, HeaderValue};
use url::Url;

use crate::site::Site;
use crate::urlmap;

/// Headers copied from the client request onto the origin request. The
/// `Host` header follows the origin URL; everything else is dropped so
/// client-side proxy artifacts never leak upstream.
const FORWARDED_REQUEST_HEADERS: &[&str] =
    &["user-agent", "accept", "accept-language", "content-type"];

/// Builds the header set for the origin request.
///
/// A present `Referer` is translated from mirror space back to the origin
/// equivalent; one that does not map into this site is dropped.
pub fn prepare_request_headers(incoming: &HeaderMap, site: &Site) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = incoming.get(name) {
            if let Ok(name) = axum::http::HeaderName::from_bytes(name.as_bytes()) {
                headers.insert(name, value.clone());
            }
        }
    }

    if let Some(referer) = incoming.get("referer").and_then(|v| v.to_str().ok()) {
        if let Some(origin_referer) = translate_referer(referer, site) {
            if let Ok(value) = HeaderValue::from_str(&origin_referer) {
                headers.insert("referer", value);
            }
        }
    }

    headers
}

/// Converts a mirror-space referer to its origin equivalent.
pub fn translate_referer(referer: &str, site: &Site) -> Option<String> {
    let parsed = Url::parse(referer).ok()?;
    let host = parsed.host_str()?;
    let mut path_and_query = parsed.path().to_string();
    if let Some(q) = parsed.query() {
        path_and_query.push('?');
        path_and_query.push_str(q);
    }
    urlmap::build_origin_url(host, &path_and_query, site)
}

/// Response headers never forwarded to the client: cookies are consumed
/// into the jar, security policies would break the mirrored page, CORS is
/// the mirror's own concern, and the body-framing trio is recomputed.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "set-cookie",
    "content-security-policy",
    "content-security-policy-report-only",
    "strict-transport-security",
    "x-frame-options",
    "content-length",
    "content-encoding",
    "transfer-encoding",
];

/// Copies origin response headers, dropping the stripped set and every
/// `Access-Control-*` header.
pub fn sanitize_response_headers(origin_headers: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in origin_headers {
        let lower = name.as_str().to_ascii_lowercase();
        if STRIPPED_RESPONSE_HEADERS.contains(&lower.as_str())
            || lower.starts_with("access-control-")
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::test_site;

    #[test]
    fn forwards_only_the_allow_list() {
        let mut incoming = HeaderMap::new();
        incoming.insert("user-agent", HeaderValue::from_static("UA/1.0"));
        incoming.insert("accept", HeaderValue::from_static("text/html"));
        incoming.insert("accept-language", HeaderValue::from_static("en"));
        incoming.insert("content-type", HeaderValue::from_static("text/plain"));
        incoming.insert("cookie", HeaderValue::from_static("a=1"));
        incoming.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4"));
        incoming.insert("authorization", HeaderValue::from_static("Bearer x"));

        let out = prepare_request_headers(&incoming, &test_site());
        assert_eq!(out.get("user-agent").unwrap(), "UA/1.0");
        assert_eq!(out.get("accept").unwrap(), "text/html");
        assert_eq!(out.get("accept-language").unwrap(), "en");
        assert_eq!(out.get("content-type").unwrap(), "text/plain");
        assert!(out.get("cookie").is_none());
        assert!(out.get("x-forwarded-for").is_none());
        assert!(out.get("authorization").is_none());
    }

    #[test]
    fn translates_mirror_referer_to_origin() {
        let mut incoming = HeaderMap::new();
        incoming.insert(
            "referer",
            HeaderValue::from_static("https://m.test/page?q=1"),
        );
        let out = prepare_request_headers(&incoming, &test_site());
        assert_eq!(out.get("referer").unwrap(), "https://example.com/page?q=1");
    }

    #[test]
    fn subdomain_referer_keeps_its_prefix() {
        assert_eq!(
            translate_referer("https://sub.m.test/p", &test_site()).as_deref(),
            Some("https://sub.example.com/p")
        );
    }

    #[test]
    fn unmappable_referer_is_dropped() {
        let mut incoming = HeaderMap::new();
        incoming.insert("referer", HeaderValue::from_static("https://elsewhere.example/"));
        let out = prepare_request_headers(&incoming, &test_site());
        assert!(out.get("referer").is_none());
    }

    #[test]
    fn strips_dangerous_response_headers() {
        let mut origin = HeaderMap::new();
        origin.insert("content-type", HeaderValue::from_static("text/html"));
        origin.append("set-cookie", HeaderValue::from_static("a=1"));
        origin.insert("content-security-policy", HeaderValue::from_static("default-src 'none'"));
        origin.insert(
            "content-security-policy-report-only",
            HeaderValue::from_static("default-src 'none'"),
        );
        origin.insert("strict-transport-security", HeaderValue::from_static("max-age=1"));
        origin.insert("x-frame-options", HeaderValue::from_static("DENY"));
        origin.insert("access-control-allow-origin", HeaderValue::from_static("*"));
        origin.insert("access-control-allow-methods", HeaderValue::from_static("GET"));
        origin.insert("content-length", HeaderValue::from_static("100"));
        origin.insert("content-encoding", HeaderValue::from_static("gzip"));
        origin.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        origin.insert("cache-control", HeaderValue::from_static("no-store"));

        let out = sanitize_response_headers(&origin);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get("content-type").unwrap(), "text/html");
        assert_eq!(out.get("cache-control").unwrap(), "no-store");
    }
}
