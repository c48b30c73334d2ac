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

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

/// Key under which origin cookies are partitioned: cookies set by
/// `upload.wikimedia.org` never leak into requests to `en.wikipedia.org`,
/// even within the same site and session.
pub type CookieTuple = (i64, String, String);

/// Server-side store of origin cookies, keyed by
/// `(site_id, session_id, origin_host)`.
///
/// Attributes on `Set-Cookie` lines are not enforced; only the name/value
/// pair is kept. Writes to a tuple happen under the store lock, so a
/// request that observed a completed response sees its cookies.
pub struct CookieJar {
    entries: RwLock<HashMap<CookieTuple, BTreeMap<String, String>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cookies stored for the tuple; empty map when none.
    pub async fn get(
        &self,
        site_id: i64,
        session_id: &str,
        origin_host: &str,
    ) -> BTreeMap<String, String> {
        self.entries
            .read()
            .await
            .get(&(site_id, session_id.to_string(), origin_host.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Merges `Set-Cookie` lines into the tuple's map, last-write-wins by
    /// name. An empty value is an origin-side deletion.
    pub async fn store(
        &self,
        site_id: i64,
        session_id: &str,
        origin_host: &str,
        set_cookie_lines: &[String],
    ) {
        let parsed: Vec<(String, String)> = set_cookie_lines
            .iter()
            .filter_map(|line| parse_set_cookie(line))
            .collect();
        if parsed.is_empty() {
            return;
        }

        let key = (site_id, session_id.to_string(), origin_host.to_string());
        let mut entries = self.entries.write().await;
        let map = entries.entry(key.clone()).or_default();
        for (name, value) in parsed {
            if value.is_empty() {
                map.remove(&name);
            } else {
                map.insert(name, value);
            }
        }
        if map.is_empty() {
            entries.remove(&key);
        }
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the name/value pair from a `Set-Cookie` header line. The
/// attribute tail (`Path`, `Domain`, `Expires`, ...) is passthrough
/// metadata and is dropped.
fn parse_set_cookie(line: &str) -> Option<(String, String)> {
    let pair = line.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Serializes a cookie map into a `Cookie` request header value. Names come
/// out in sorted order, which is stable and all HTTP requires.
pub fn render(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}
