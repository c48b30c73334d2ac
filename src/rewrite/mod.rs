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

//! Response-body rewriting: HTML attributes, inline scripts, inline
//! styles, plus the ad filter / injector that wraps around the rewrite.
//!
//! Only `text/html` responses go through here. Externally-linked JS and
//! CSS files are proxied byte-for-byte.

pub mod css;
pub mod filter;
pub mod html;
pub mod js;

use crate::urlmap::MirrorContext;

/// Full HTML pipeline for one response body: strip ad/analytics nodes,
/// rewrite every domain-bearing reference, then inject operator content.
pub fn rewrite_html_page(input: &str, ctx: &MirrorContext) -> String {
    let rewritten = html::rewrite_document(input, ctx);
    filter::inject(rewritten, ctx.config)
}
