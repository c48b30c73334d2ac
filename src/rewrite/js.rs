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

// Coarse pattern matching over inline scripts. No variable tracking and no
// AST; only literal quoted URLs in the recognized redirect idioms are
// touched. The limitation is documented in the release notes.

/// `window.location.href = "..."`, `location.href = '...'`, `location = "..."`.
static LOCATION_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)(^|[^\w$.])((?:window\.)?location(?:\.href)?\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
        .expect("location assignment pattern compiles")
});

/// `location.replace("...")` and `window.location.replace('...')`.
static LOCATION_REPLACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)(^|[^\w$.])((?:window\.)?location\s*\.\s*replace\s*\(\s*)(?:"([^"]*)"|'([^']*)')"#,
    )
    .expect("location replace pattern compiles")
});

/// Rewrites recognized JS redirect idioms inside an inline script,
/// preserving the original quote style.
pub fn rewrite_inline_js(source: &str, ctx: &MirrorContext) -> String {
    let pass1 = LOCATION_ASSIGN.replace_all(source, |caps: &Captures| {
        let (url, quote) = quoted(caps, 3, 4);
        format!(
            "{}{}{quote}{}{quote}",
            &caps[1],
            &caps[2],
            ctx.rewrite_in_page(url)
        )
    });
    LOCATION_REPLACE
        .replace_all(&pass1, |caps: &Captures| {
            let (url, quote) = quoted(caps, 3, 4);
            format!(
                "{}{}{quote}{}{quote}",
                &caps[1],
                &caps[2],
                ctx.rewrite_in_page(url)
            )
        })
        .into_owned()
}

fn quoted<'a>(caps: &'a Captures, double: usize, single: usize) -> (&'a str, &'static str) {
    if let Some(m) = caps.get(double) {
        (m.as_str(), "\"")
    } else {
        (caps.get(single).map(|m| m.as_str()).unwrap_or(""), "'")
    }
}
