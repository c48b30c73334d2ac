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

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::urlmap::MirrorContext;

/// `url(...)` in double-quoted, single-quoted, or bare form.
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^"')][^)]*?))\s*\)"#)
        .expect("css url pattern compiles")
});

/// Rewrites every `url(...)` occurrence in a CSS fragment, preserving the
/// quoting form. `data:` URLs are left untouched. Used for `<style>`
/// bodies and `style=` attribute values; externally-linked stylesheets are
/// never rewritten.
pub fn rewrite_css_urls(css: &str, ctx: &MirrorContext) -> String {
    CSS_URL
        .replace_all(css, |caps: &Captures| {
            let (inner, quote) = if let Some(m) = caps.get(1) {
                (m.as_str(), "\"")
            } else if let Some(m) = caps.get(2) {
                (m.as_str(), "'")
            } else if let Some(m) = caps.get(3) {
                (m.as_str(), "")
            } else {
                return caps[0].to_string();
            };
            if inner.trim_start().to_ascii_lowercase().starts_with("data:") {
                return caps[0].to_string();
            }
            format!("url({quote}{}{quote})", ctx.rewrite_in_page(inner))
        })
        .into_owned()
}
