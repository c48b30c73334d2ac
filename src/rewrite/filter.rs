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

use kuchikiki::{NodeData, NodeRef};

use crate::rewrite::html::AttrsExt;
use crate::site::EffectiveConfig;

/// Hostname fragments identifying third-party ad and analytics loaders.
const AD_HOST_TOKENS: &[&str] = &[
    "doubleclick",
    "googlesyndication",
    "adsystem",
    "adservice",
    "adsbygoogle",
    "googletagmanager",
    "google-analytics",
    "googleadservices",
];

/// Snippet fragments identifying inline analytics bootstraps.
const ANALYTICS_SNIPPET_TOKENS: &[&str] =
    &["gtag(", "ga(", "GoogleAnalyticsObject", "fbq(", "_gaq", "dataLayer"];

/// Removes ad/analytics `<script>` and `<iframe>` nodes from the parsed
/// document. Runs before URL rewriting; a no-op unless `remove_ads` or
/// `remove_analytics` is effective.
pub fn strip_ads(doc: &NodeRef, config: &EffectiveConfig) {
    if !config.remove_ads && !config.remove_analytics {
        return;
    }

    let mut doomed = Vec::new();
    for node in doc.inclusive_descendants() {
        if let NodeData::Element(ref el) = *node.data() {
            let tag = el.name.local.to_string().to_ascii_lowercase();
            if tag != "script" && tag != "iframe" {
                continue;
            }

            let src = el.attributes.borrow().get_str("src").map(|s| s.to_string());
            match src {
                Some(src) => {
                    if AD_HOST_TOKENS.iter().any(|t| src.contains(t)) {
                        doomed.push(node.clone());
                    }
                }
                None if tag == "script" => {
                    let mut body = String::new();
                    for child in node.children() {
                        if let NodeData::Text(ref t) = *child.data() {
                            body.push_str(&t.borrow());
                        }
                    }
                    if ANALYTICS_SNIPPET_TOKENS.iter().any(|t| body.contains(t)) {
                        doomed.push(node.clone());
                    }
                }
                None => {}
            }
        }
    }
    for node in doomed {
        node.detach();
    }
}

/// Appends operator content immediately before `</body>`: the ad HTML
/// first, then the tracker script. Returns the input unchanged unless
/// `inject_ads` is effective.
pub fn inject(html: String, config: &EffectiveConfig) -> String {
    if !config.inject_ads {
        return html;
    }
    let mut additions = String::new();
    if !config.custom_ad_html.is_empty() {
        additions.push_str(&config.custom_ad_html);
    }
    if !config.custom_tracker_js.is_empty() {
        additions.push_str("<script>");
        additions.push_str(&config.custom_tracker_js);
        additions.push_str("</script>");
    }
    if additions.is_empty() {
        return html;
    }

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + additions.len());
            out.push_str(&html[..idx]);
            out.push_str(&additions);
            out.push_str(&html[idx..]);
            out
        }
        None => html + &additions,
    }
}
