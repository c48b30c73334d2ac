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

use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::cookies::CookieJar;
use crate::ratelimit::RateLimiter;
use crate::session::SessionCodec;
use crate::site::MemoryConfigStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The HTTP client used to forward requests to origin servers.
    pub client: Client,
    /// The application configuration.
    pub config: Arc<Config>,
    /// Sites and global defaults, written by the admin collaborator.
    pub sites: Arc<MemoryConfigStore>,
    /// Server-side origin cookies, per (site, session, origin host).
    pub cookies: Arc<CookieJar>,
    /// Per-IP sliding-window admission control.
    pub limiter: Arc<RateLimiter>,
    /// Signs and verifies session identifiers.
    pub sessions: Arc<SessionCodec>,
}
