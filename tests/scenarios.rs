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

//! End-to-end behavior of the mapping algebra, rewriter, and guards on the
//! reference site `{mirror_root: "m.test", source_root: "example.com"}`.

use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use proxibase::cookies::{self, CookieJar};
use proxibase::guard;
use proxibase::ratelimit::RateLimiter;
use proxibase::rewrite;
use proxibase::session::SessionCodec;
use proxibase::site::{EffectiveConfig, GlobalConfig, Site};
use proxibase::urlmap::{self, MirrorContext};
use proxibase::utils;

fn site() -> Site {
    Site {
        id: 1,
        mirror_root: "m.test".to_string(),
        source_root: "example.com".to_string(),
        enabled: true,
        proxy_subdomains: None,
        proxy_external_domains: None,
        rewrite_js_redirects: None,
        remove_ads: None,
        inject_ads: None,
        remove_analytics: None,
        media_policy: None,
        session_mode: None,
        custom_ad_html: None,
        custom_tracker_js: None,
    }
}

fn effective(site: &Site) -> EffectiveConfig {
    EffectiveConfig::merge(site, &GlobalConfig::default())
}

fn ctx<'a>(site: &'a Site, config: &'a EffectiveConfig, page: &'a str) -> MirrorContext<'a> {
    MirrorContext {
        site,
        config,
        mirror_host: "m.test",
        mirror_scheme: "https",
        page_origin_url: page,
    }
}

// Scenario 1: internal links on the mirror root come back mirrored.
#[test]
fn internal_links_are_mirrored() {
    let site = site();
    let config = effective(&site);
    let out = rewrite::rewrite_html_page(
        r#"<html><body><a href="https://example.com/x">x</a></body></html>"#,
        &ctx(&site, &config, "https://example.com/"),
    );
    assert!(out.contains(r#"<a href="https://m.test/x">"#), "{out}");
}

// Scenario 2: a subdomain of the mirror fetches the same subdomain of the
// source.
#[test]
fn subdomains_map_onto_source() {
    let site = site();
    assert_eq!(
        urlmap::build_origin_url("sub.m.test", "/", &site).unwrap(),
        "https://sub.example.com/"
    );
}

// Scenario 3: external links are encoded into the first path segment.
#[test]
fn external_links_are_encoded() {
    let site = site();
    let config = effective(&site);
    let out = rewrite::rewrite_html_page(
        r#"<html><body><a href="https://other.org/y">y</a></body></html>"#,
        &ctx(&site, &config, "https://example.com/"),
    );
    assert!(out.contains(r#"<a href="https://m.test/other.org/y">"#), "{out}");
}

// Scenario 4: an encoded external path fetches the external origin.
#[test]
fn encoded_external_paths_are_decoded() {
    let site = site();
    assert_eq!(
        urlmap::build_origin_url("m.test", "/other.org/y", &site).unwrap(),
        "https://other.org/y"
    );
}

// Scenario 5: redirect Locations come back in mirror space.
#[test]
fn redirect_locations_are_mirrored() {
    let site = site();
    let config = effective(&site);
    let c = ctx(&site, &config, "https://example.com/");
    assert_eq!(
        c.to_mirror("https://example.com/login"),
        "https://m.test/login"
    );
}

// Scenario 6: rate limit of 3 per window admits three and denies the
// fourth with full header data.
#[tokio::test]
async fn fourth_request_is_rate_limited() {
    let limiter = RateLimiter::new(3, Duration::from_secs(60));
    let mut decisions = Vec::new();
    for _ in 0..4 {
        decisions.push(limiter.check("203.0.113.9").await);
    }
    assert!(decisions[0].allowed && decisions[1].allowed && decisions[2].allowed);
    let denied = decisions[3];
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(denied.retry_after.is_some());
}

// Scenario 7: loopback origins are refused before any socket is opened.
#[test]
fn loopback_origins_are_refused() {
    assert!(guard::is_safe_origin_url("http://127.0.0.1/").is_err());
    assert!(guard::is_safe_origin_url("http://localhost/admin").is_err());
}

// Scenario 8: origin cookies are captured per tuple and replayed on the
// next request to the same origin host.
#[tokio::test]
async fn captured_cookies_replay_on_next_request() {
    let jar = CookieJar::new();
    jar.store(1, "sid", "example.com", &["a=1; Path=/".to_string()])
        .await;
    let map = jar.get(1, "sid", "example.com").await;
    assert_eq!(cookies::render(&map), "a=1");

    // never across sites, sessions, or origin hosts
    assert!(jar.get(2, "sid", "example.com").await.is_empty());
    assert!(jar.get(1, "sid2", "example.com").await.is_empty());
    assert!(jar.get(1, "sid", "static.example.com").await.is_empty());
}

// Invariant: the outbound header set never leaks origin security headers.
#[test]
fn response_headers_are_sanitized() {
    let mut origin = HeaderMap::new();
    origin.append("set-cookie", HeaderValue::from_static("a=1"));
    origin.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'self'"),
    );
    origin.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=63072000"),
    );
    origin.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
    origin.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    origin.insert("content-type", HeaderValue::from_static("text/html"));

    let out = utils::sanitize_response_headers(&origin);
    for stripped in [
        "set-cookie",
        "content-security-policy",
        "strict-transport-security",
        "x-frame-options",
        "access-control-allow-origin",
    ] {
        assert!(out.get(stripped).is_none(), "{stripped} leaked");
    }
    assert!(out.get("content-type").is_some());
}

// Invariant: signed sessions survive the round trip and nothing else does.
#[test]
fn signed_sessions_verify_and_tampering_fails() {
    let codec = SessionCodec::new("integration-secret");
    let sid = codec.generate_sid();
    let signed = codec.sign(&sid);
    assert_eq!(codec.verify(&signed).as_deref(), Some(sid.as_str()));

    let tampered = format!("{}x", signed);
    assert!(codec.verify(&tampered).is_none());
    let swapped = signed.replacen(&sid[..4], "ffff", 1);
    if swapped != signed {
        assert!(codec.verify(&swapped).is_none());
    }
}

// Invariant: the mirror mapping round-trips for source-root URLs.
#[test]
fn mirror_mapping_round_trips() {
    let site = site();
    let config = effective(&site);
    let c = ctx(&site, &config, "https://example.com/");
    for origin in [
        "https://example.com/x",
        "https://sub.example.com/a/b?q=1",
        "https://a.b.example.com/",
    ] {
        let mirrored = c.to_mirror(origin);
        let parsed = url::Url::parse(&mirrored).unwrap();
        let mut pq = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            pq.push('?');
            pq.push_str(q);
        }
        assert_eq!(
            urlmap::build_origin_url(parsed.host_str().unwrap(), &pq, &site).unwrap(),
            origin
        );
    }
}

// Invariant: rewriting an already-mirrored page changes nothing.
#[test]
fn rewriter_is_idempotent_on_mirrored_pages() {
    let site = site();
    let config = effective(&site);
    let c = ctx(&site, &config, "https://example.com/");
    let page = concat!(
        r#"<html><head><style>div { background: url(/bg.png) }</style></head>"#,
        r#"<body><a href="https://example.com/x">x</a>"#,
        r#"<img src="https://static.example.com/i.png">"#,
        r#"<script>location.href = "/next";</script>"#,
        r#"</body></html>"#
    );
    let once = rewrite::rewrite_html_page(page, &c);
    let twice = rewrite::rewrite_html_page(&once, &c);
    assert_eq!(once, twice);
}
