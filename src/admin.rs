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

//! Dispatch seam for the admin surface.
//!
//! The admin collaborator owns login and site/settings CRUD; it writes
//! through [`crate::site::MemoryConfigStore`]. The core only reserves the
//! admin host and its paths so proxied sites can never shadow them.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Paths reserved on the admin host.
const RESERVED_PATHS: &[&str] = &["/login", "/logout"];

/// Answers requests on the admin host until the admin collaborator is
/// mounted: reserved paths are 401 (no valid admin session exists here),
/// everything else 404.
pub async fn handle(req: Request) -> Response {
    let path = req.uri().path();
    if RESERVED_PATHS.contains(&path) || path.starts_with("/admin/") || path == "/admin" {
        StatusCode::UNAUTHORIZED.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
