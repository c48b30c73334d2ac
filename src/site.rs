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

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::urlmap::normalize_host;

/// How media responses are handled for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPolicy {
    /// Media URLs are left pointing at the origin; the browser fetches them
    /// directly.
    Bypass,
    /// Media is proxied and exempt from the response size cap.
    Proxy,
    /// Media is proxied and subject to the same size cap as everything else.
    SizeLimited,
}

/// Whether origin cookies are kept server-side per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Stateless,
    CookieJar,
}

/// A mirror mapping as configured by the operator.
///
/// All `Option` fields are per-site overrides; `None` means "inherit from
/// the global configuration".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub id: i64,
    /// Public domain this mapping is served under. Stored lowercase.
    pub mirror_root: String,
    /// Origin apex domain content is fetched from.
    pub source_root: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub proxy_subdomains: Option<bool>,
    #[serde(default)]
    pub proxy_external_domains: Option<bool>,
    #[serde(default)]
    pub rewrite_js_redirects: Option<bool>,
    #[serde(default)]
    pub remove_ads: Option<bool>,
    #[serde(default)]
    pub inject_ads: Option<bool>,
    #[serde(default)]
    pub remove_analytics: Option<bool>,
    #[serde(default)]
    pub media_policy: Option<MediaPolicy>,
    #[serde(default)]
    pub session_mode: Option<SessionMode>,
    #[serde(default)]
    pub custom_ad_html: Option<String>,
    #[serde(default)]
    pub custom_tracker_js: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Operator defaults shared by all sites. Same override set as [`Site`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub proxy_subdomains: Option<bool>,
    #[serde(default)]
    pub proxy_external_domains: Option<bool>,
    #[serde(default)]
    pub rewrite_js_redirects: Option<bool>,
    #[serde(default)]
    pub remove_ads: Option<bool>,
    #[serde(default)]
    pub inject_ads: Option<bool>,
    #[serde(default)]
    pub remove_analytics: Option<bool>,
    #[serde(default)]
    pub media_policy: Option<MediaPolicy>,
    #[serde(default)]
    pub session_mode: Option<SessionMode>,
    #[serde(default)]
    pub custom_ad_html: Option<String>,
    #[serde(default)]
    pub custom_tracker_js: Option<String>,
}

/// Fully resolved per-request configuration: site overrides layered over
/// global defaults layered over the hard-coded baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub proxy_subdomains: bool,
    pub proxy_external_domains: bool,
    pub rewrite_js_redirects: bool,
    pub remove_ads: bool,
    pub inject_ads: bool,
    pub remove_analytics: bool,
    pub media_policy: MediaPolicy,
    pub session_mode: SessionMode,
    pub custom_ad_html: String,
    pub custom_tracker_js: String,
}

impl EffectiveConfig {
    /// The hard-coded baseline used when neither the site nor the global
    /// configuration sets a field.
    pub fn defaults() -> Self {
        Self {
            proxy_subdomains: true,
            proxy_external_domains: true,
            rewrite_js_redirects: true,
            remove_ads: false,
            inject_ads: false,
            remove_analytics: false,
            media_policy: MediaPolicy::Proxy,
            session_mode: SessionMode::Stateless,
            custom_ad_html: String::new(),
            custom_tracker_js: String::new(),
        }
    }

    pub fn merge(site: &Site, global: &GlobalConfig) -> Self {
        let base = Self::defaults();
        Self {
            proxy_subdomains: site
                .proxy_subdomains
                .or(global.proxy_subdomains)
                .unwrap_or(base.proxy_subdomains),
            proxy_external_domains: site
                .proxy_external_domains
                .or(global.proxy_external_domains)
                .unwrap_or(base.proxy_external_domains),
            rewrite_js_redirects: site
                .rewrite_js_redirects
                .or(global.rewrite_js_redirects)
                .unwrap_or(base.rewrite_js_redirects),
            remove_ads: site.remove_ads.or(global.remove_ads).unwrap_or(base.remove_ads),
            inject_ads: site.inject_ads.or(global.inject_ads).unwrap_or(base.inject_ads),
            remove_analytics: site
                .remove_analytics
                .or(global.remove_analytics)
                .unwrap_or(base.remove_analytics),
            media_policy: site
                .media_policy
                .or(global.media_policy)
                .unwrap_or(base.media_policy),
            session_mode: site
                .session_mode
                .or(global.session_mode)
                .unwrap_or(base.session_mode),
            custom_ad_html: site
                .custom_ad_html
                .clone()
                .or_else(|| global.custom_ad_html.clone())
                .unwrap_or_default(),
            custom_tracker_js: site
                .custom_tracker_js
                .clone()
                .or_else(|| global.custom_tracker_js.clone())
                .unwrap_or_default(),
        }
    }
}

/// Picks the site serving `host`: an exact `mirror_root` match wins,
/// otherwise the longest `mirror_root` that `host` is a subdomain of.
/// Disabled sites never match.
pub fn resolve<'a>(sites: &'a [Site], host: &str) -> Option<&'a Site> {
    let host = normalize_host(host);
    let enabled = sites.iter().filter(|s| s.enabled);

    if let Some(exact) = enabled.clone().find(|s| s.mirror_root == host) {
        return Some(exact);
    }
    enabled
        .filter(|s| {
            host.strip_suffix(s.mirror_root.as_str())
                .and_then(|p| p.strip_suffix('.'))
                .is_some_and(|p| !p.is_empty())
        })
        .max_by_key(|s| s.mirror_root.len())
}

/// Seed file shape for [`MemoryConfigStore::from_json_file`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct SeedFile {
    #[serde(default)]
    global: GlobalConfig,
    #[serde(default)]
    sites: Vec<Site>,
}

/// In-memory store over sites and the global configuration.
///
/// This is the read interface the engine consumes; the admin collaborator
/// writes through [`MemoryConfigStore::upsert_site`] and
/// [`MemoryConfigStore::set_global`]. The engine takes a fresh snapshot per
/// request, so admin edits apply without restarts.
pub struct MemoryConfigStore {
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    sites: Vec<Site>,
    global: GlobalConfig,
    next_id: i64,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                sites: Vec::new(),
                global: GlobalConfig::default(),
                next_id: 1,
            }),
        }
    }

    /// Loads sites and global defaults from a JSON seed file. Hosts are
    /// normalized to lowercase on the way in.
    pub fn from_json_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let seed: SeedFile = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut sites = Vec::new();
        let mut next_id = 1;
        for mut site in seed.sites {
            site.mirror_root = normalize_host(&site.mirror_root);
            site.source_root = normalize_host(&site.source_root);
            if site.id == 0 {
                site.id = next_id;
            }
            next_id = next_id.max(site.id + 1);
            sites.push(site);
        }
        Ok(Self {
            inner: RwLock::new(StoreInner {
                sites,
                global: seed.global,
                next_id,
            }),
        })
    }

    /// Fresh snapshot of enabled-or-not sites plus global defaults.
    pub async fn snapshot(&self) -> (Vec<Site>, GlobalConfig) {
        let inner = self.inner.read().await;
        (inner.sites.clone(), inner.global.clone())
    }

    /// Inserts or replaces a site by `mirror_root`. Returns the stored
    /// record with its assigned id.
    pub async fn upsert_site(&self, mut site: Site) -> Site {
        site.mirror_root = normalize_host(&site.mirror_root);
        site.source_root = normalize_host(&site.source_root);
        let mut inner = self.inner.write().await;
        match inner
            .sites
            .iter()
            .position(|s| s.mirror_root == site.mirror_root)
        {
            Some(idx) => {
                site.id = inner.sites[idx].id;
                inner.sites[idx] = site.clone();
            }
            None => {
                site.id = inner.next_id;
                inner.next_id += 1;
                inner.sites.push(site.clone());
            }
        }
        site
    }

    pub async fn set_global(&self, global: GlobalConfig) {
        self.inner.write().await.global = global;
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub fn test_site() -> Site {
    Site {
        id: 1,
        mirror_root: "m.test".into(),
        source_root: "example.com".into(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: i64, mirror: &str, source: &str) -> Site {
        Site {
            id,
            mirror_root: mirror.into(),
            source_root: source.into(),
            ..test_site()
        }
    }

    #[test]
    fn exact_match_wins() {
        let sites = vec![site(1, "m.test", "example.com"), site(2, "b.m.test", "other.org")];
        assert_eq!(resolve(&sites, "b.m.test").unwrap().id, 2);
    }

    #[test]
    fn longest_suffix_match() {
        let sites = vec![site(1, "test", "a.com"), site(2, "m.test", "b.com")];
        assert_eq!(resolve(&sites, "sub.m.test").unwrap().id, 2);
    }

    #[test]
    fn suffix_needs_label_boundary() {
        let sites = vec![site(1, "m.test", "example.com")];
        assert!(resolve(&sites, "xm.test").is_none());
    }

    #[test]
    fn disabled_sites_never_match() {
        let mut s = site(1, "m.test", "example.com");
        s.enabled = false;
        assert!(resolve(&[s], "m.test").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive_and_port_blind() {
        let sites = vec![site(1, "m.test", "example.com")];
        assert!(resolve(&sites, "M.Test:8080").is_some());
    }

    #[test]
    fn merge_overlays_site_over_global_over_defaults() {
        let mut s = test_site();
        s.remove_ads = Some(true);
        let mut g = GlobalConfig::default();
        g.remove_ads = Some(false);
        g.media_policy = Some(MediaPolicy::Bypass);

        let eff = EffectiveConfig::merge(&s, &g);
        assert!(eff.remove_ads);
        assert_eq!(eff.media_policy, MediaPolicy::Bypass);
        // untouched fields fall to hard defaults
        assert!(eff.proxy_subdomains);
        assert_eq!(eff.session_mode, SessionMode::Stateless);
    }

    #[tokio::test]
    async fn upsert_assigns_ids_and_replaces_by_mirror_root() {
        let store = MemoryConfigStore::new();
        let a = store.upsert_site(site(0, "M.Test", "example.com")).await;
        assert_eq!(a.id, 1);
        assert_eq!(a.mirror_root, "m.test");

        let b = store.upsert_site(site(0, "m.test", "changed.com")).await;
        assert_eq!(b.id, 1);
        let (sites, _) = store.snapshot().await;
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].source_root, "changed.com");
    }
}
