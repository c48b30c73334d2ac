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

use url::Url;

use crate::site::{EffectiveConfig, MediaPolicy, Site};

/// Lowercases a host and strips any port suffix.
///
/// IPv6 literals keep their brackets so `[::1]:8080` becomes `[::1]`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if let Some(end) = host.find(']') {
        &host[..=end]
    } else if let Some((h, _port)) = host.rsplit_once(':') {
        h
    } else {
        host
    };
    without_port.to_ascii_lowercase()
}

/// Computes the origin URL to fetch for an incoming mirror request.
///
/// The mirror subdomain prefix is carried over onto the source root, and a
/// first path segment that looks like a hostname is decoded as an external
/// origin. Returns `None` when the host is not served by `site` at all.
pub fn build_origin_url(mirror_host: &str, path_and_query: &str, site: &Site) -> Option<String> {
    let host = normalize_host(mirror_host);
    let prefix = if host == site.mirror_root {
        String::new()
    } else {
        let label = host.strip_suffix(site.mirror_root.as_str())?;
        let label = label.strip_suffix('.')?;
        if label.is_empty() {
            return None;
        }
        format!("{label}.")
    };

    let path_and_query = if path_and_query.is_empty() {
        "/"
    } else {
        path_and_query
    };
    let (path, query) = match path_and_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_and_query, None),
    };

    // An encoded external host hides in the first path segment.
    if let Some((external_host, rest)) = split_external_host(path) {
        let mut origin = format!("https://{external_host}{rest}");
        if let Some(q) = query {
            origin.push('?');
            origin.push_str(q);
        }
        return Some(origin);
    }

    let mut origin = format!("https://{prefix}{}{path}", site.source_root);
    if let Some(q) = query {
        origin.push('?');
        origin.push_str(q);
    }
    Some(origin)
}

/// Splits `/other.org/y` into `("other.org", "/y")` when the first segment
/// looks like a hostname. The remainder always starts with `/`.
fn split_external_host(path: &str) -> Option<(&str, String)> {
    let trimmed = path.strip_prefix('/')?;
    let (segment, rest) = match trimmed.split_once('/') {
        Some((seg, rest)) => (seg, format!("/{rest}")),
        None => (trimmed, String::from("/")),
    };
    if looks_like_host(segment) {
        Some((segment, rest))
    } else {
        None
    }
}

/// A segment is treated as an encoded hostname when it has at least two
/// non-empty dot-separated labels of plausible hostname characters. An
/// optional `:port` suffix is tolerated.
fn looks_like_host(segment: &str) -> bool {
    let host_part = match segment.rsplit_once(':') {
        Some((h, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => h,
        _ => segment,
    };
    if !host_part.contains('.') {
        return false;
    }
    let labels: Vec<&str> = host_part.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return false;
    }
    if !labels
        .iter()
        .all(|l| l.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-'))
    {
        return false;
    }
    // The last label must read like a TLD, not a file extension digit soup.
    let tld = labels[labels.len() - 1];
    tld.len() >= 2 && tld.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Per-response context for mapping origin URLs back into mirror space.
#[derive(Debug, Clone, Copy)]
pub struct MirrorContext<'a> {
    pub site: &'a Site,
    pub config: &'a EffectiveConfig,
    /// Normalized host the client used to reach us.
    pub mirror_host: &'a str,
    /// Scheme the mirror is publicly served on.
    pub mirror_scheme: &'a str,
    /// Absolute URL of the origin page being rewritten.
    pub page_origin_url: &'a str,
}

impl MirrorContext<'_> {
    /// Maps an absolute origin URL to its mirror equivalent.
    ///
    /// Source-root hosts (and their subdomains, when subdomain proxying is
    /// on) swap the suffix for the mirror root. Other hosts are encoded
    /// into the first path segment when external proxying is on. Anything
    /// unmappable is returned unchanged.
    pub fn to_mirror(&self, origin_url: &str) -> String {
        let parsed = match Url::parse(origin_url) {
            Ok(u) => u,
            Err(_) => return origin_url.to_string(),
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return origin_url.to_string();
        }
        let host = match parsed.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return origin_url.to_string(),
        };

        let mut tail = parsed.path().to_string();
        if let Some(q) = parsed.query() {
            tail.push('?');
            tail.push_str(q);
        }
        if let Some(f) = parsed.fragment() {
            tail.push('#');
            tail.push_str(f);
        }

        // Already in mirror space: leave it alone so rewriting an
        // already-mirrored page is a no-op.
        if host == self.site.mirror_root
            || host
                .strip_suffix(self.site.mirror_root.as_str())
                .and_then(|s| s.strip_suffix('.'))
                .is_some()
        {
            return origin_url.to_string();
        }

        if host == self.site.source_root {
            return format!(
                "{}://{}{tail}",
                self.mirror_scheme, self.site.mirror_root
            );
        }
        if self.config.proxy_subdomains {
            if let Some(sub) = host
                .strip_suffix(self.site.source_root.as_str())
                .and_then(|s| s.strip_suffix('.'))
            {
                return format!(
                    "{}://{sub}.{}{tail}",
                    self.mirror_scheme, self.site.mirror_root
                );
            }
        }
        if self.config.proxy_external_domains {
            let encoded_host = match parsed.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            };
            return format!(
                "{}://{}/{encoded_host}{tail}",
                self.mirror_scheme, self.mirror_host
            );
        }
        origin_url.to_string()
    }

    /// Rewrites a URL found inside a page body.
    ///
    /// Relative and protocol-relative forms are resolved against the page's
    /// origin URL first. Fragment-only references and non-network schemes
    /// pass through untouched, as do media URLs under the `bypass` policy.
    pub fn rewrite_in_page(&self, raw: &str) -> String {
        if raw.is_empty() || raw.starts_with('#') {
            return raw.to_string();
        }
        let lowered = raw.trim_start().to_ascii_lowercase();
        if lowered.starts_with("data:")
            || lowered.starts_with("javascript:")
            || lowered.starts_with("mailto:")
        {
            return raw.to_string();
        }

        let base = match Url::parse(self.page_origin_url) {
            Ok(u) => u,
            Err(_) => return raw.to_string(),
        };
        let resolved = match base.join(raw) {
            Ok(u) => u,
            Err(_) => return raw.to_string(),
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            return raw.to_string();
        }

        if self.config.media_policy == MediaPolicy::Bypass && is_media_url(resolved.path()) {
            return resolved.to_string();
        }
        self.to_mirror(resolved.as_str())
    }
}

const MEDIA_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "bmp",
    // video
    "mp4", "mkv", "avi", "mov", "webm", "m3u8", "flv", "wmv",
    // audio
    "mp3", "wav", "ogg", "aac", "flac", "m4a",
    // archives
    "zip", "rar", "7z", "tar", "gz", "bz2", "xz",
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // executables
    "exe", "msi", "apk", "dmg", "deb", "rpm", "iso",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
];

/// Classifies a URL path as media by its extension suffix. Paths without an
/// extension are never media.
pub fn is_media_url(path: &str) -> bool {
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((_, ext)) => MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}
