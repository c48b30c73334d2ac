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

use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use kuchikiki::traits::*;
use kuchikiki::{NodeData, NodeRef, parse_html};
use markup5ever::{namespace_url, ns};

use crate::rewrite::{css, filter, js};
use crate::urlmap::MirrorContext;

/// Rewrites a full HTML document so every domain-bearing reference stays
/// inside the mirror.
///
/// The parse is lenient; if serialization fails the original input is
/// returned untouched rather than surfacing an error to the client.
pub fn rewrite_document(input: &str, ctx: &MirrorContext) -> String {
    let doc = parse_html().one(input);

    filter::strip_ads(&doc, ctx.config);
    walk(&doc, ctx);

    let mut buf = Vec::new();
    let opts = SerializeOpts {
        scripting_enabled: true,
        traversal_scope: TraversalScope::IncludeNode,
        create_missing_parent: false,
    };
    match serialize(&mut buf, &doc, opts) {
        Ok(()) => String::from_utf8(buf).unwrap_or_else(|_| input.to_string()),
        Err(_) => input.to_string(),
    }
}

fn walk(node: &NodeRef, ctx: &MirrorContext) {
    if let NodeData::Element(ref el) = *node.data() {
        let tag = el.name.local.to_string().to_ascii_lowercase();
        let mut attrs = el.attributes.borrow_mut();

        for &attr in url_attrs_for(&tag) {
            if let Some(val) = attrs.get_str(attr).map(|s| s.to_string()) {
                let rewritten = if attr == "srcset" {
                    rewrite_srcset(&val, ctx)
                } else {
                    ctx.rewrite_in_page(&val)
                };
                attrs.set_str(attr, rewritten);
            }
        }

        if let Some(style) = attrs.get_str("style").map(|s| s.to_string()) {
            attrs.set_str("style", css::rewrite_css_urls(&style, ctx));
        }

        let has_src = attrs.get_str("src").is_some();
        drop(attrs);

        if tag == "style" {
            rewrite_text_content(node, |text| css::rewrite_css_urls(text, ctx));
        }
        if tag == "script" && !has_src && ctx.config.rewrite_js_redirects {
            rewrite_text_content(node, |text| js::rewrite_inline_js(text, ctx));
        }
    }

    for child in node.children() {
        walk(&child, ctx);
    }
}

/// URL-bearing attributes rewritten per element.
fn url_attrs_for(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" | "link" | "base" => &["href"],
        "form" => &["action"],
        "iframe" | "script" | "video" | "audio" => &["src"],
        "img" | "source" => &["src", "srcset"],
        _ => &[],
    }
}

/// Rewrites each comma-separated `srcset` candidate independently,
/// keeping its width/density descriptor.
fn rewrite_srcset(srcset: &str, ctx: &MirrorContext) -> String {
    srcset
        .split(',')
        .map(|entry| {
            let parts: Vec<&str> = entry.trim().splitn(2, char::is_whitespace).collect();
            match parts.as_slice() {
                [url, descriptor] => format!("{} {}", ctx.rewrite_in_page(url), descriptor),
                [url] => ctx.rewrite_in_page(url),
                _ => entry.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replaces the concatenated text children of `node` with `f(text)`.
fn rewrite_text_content(node: &NodeRef, f: impl FnOnce(&str) -> String) {
    let mut text = String::new();
    for child in node.children() {
        if let NodeData::Text(ref t) = *child.data() {
            text.push_str(&t.borrow());
        }
    }
    if text.is_empty() {
        return;
    }
    let rewritten = f(&text);
    if rewritten == text {
        return;
    }
    for child in node.children() {
        child.detach();
    }
    node.append(NodeRef::new_text(rewritten));
}

/// Direct access to kuchikiki attributes by local name.
pub(crate) trait AttrsExt {
    fn get_str(&self, name: &str) -> Option<&str>;
    fn set_str(&mut self, name: &str, value: String);
}

impl AttrsExt for kuchikiki::Attributes {
    fn get_str(&self, name: &str) -> Option<&str> {
        self.map
            .get(&kuchikiki::ExpandedName::new(
                ns!(),
                markup5ever::LocalName::from(name),
            ))
            .map(|a| a.value.as_str())
    }

    fn set_str(&mut self, name: &str, value: String) {
        let key = kuchikiki::ExpandedName::new(ns!(), markup5ever::LocalName::from(name));
        if let Some(attr) = self.map.get_mut(&key) {
            attr.value = value.into();
        }
    }
}
