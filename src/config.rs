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

use std::env;
use std::time::Duration;

/// Configuration for the proxy server, immutable after startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// The port to listen on.
    pub port: u16,
    /// Host that serves the admin surface instead of being proxied.
    pub admin_host: Option<String>,
    /// Secret for signing session identifiers. Rotating it invalidates
    /// every outstanding session.
    pub secret_key: String,
    /// Scheme the mirror is publicly reachable on; rewritten URLs use it.
    pub mirror_scheme: String,
    /// Optional JSON file seeding sites and global defaults at startup.
    pub sites_file: Option<String>,
    /// Connection string for the storage collaborator. The core carries it
    /// but never opens it.
    pub database_url: Option<String>,
    /// Credentials consumed by the admin collaborator.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub enable_rate_limiting: bool,
    /// Cap on buffered (non-media) response bodies, in bytes.
    pub max_response_size: usize,
    /// Total per-request budget for an origin call.
    pub request_timeout: Duration,
}

impl Config {
    /// # Environment Variables
    /// * `PORT` - Port to listen on (default: 3000).
    /// * `ADMIN_HOST` - Host reserved for the admin surface (optional).
    /// * `SECRET_KEY` - Session signing secret. A random one is generated
    ///   when unset, so sessions then reset on restart.
    /// * `MIRROR_SCHEME` - "https" (default) or "http".
    /// * `SITES_FILE` - JSON seed for the in-memory site store (optional).
    /// * `DATABASE_URL`, `ADMIN_USERNAME`, `ADMIN_PASSWORD` - passed
    ///   through to the storage/admin collaborators.
    /// * `RATE_LIMIT_REQUESTS` - Requests per window per IP (default: 60).
    /// * `RATE_LIMIT_WINDOW` - Window length in seconds (default: 60).
    /// * `ENABLE_RATE_LIMITING` - Set to "false" or "0" to disable.
    /// * `MAX_RESPONSE_SIZE_MB` - Buffered body cap (default: 15).
    /// * `REQUEST_TIMEOUT` - Origin budget in seconds (default: 15).
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let admin_host = env::var("ADMIN_HOST")
            .ok()
            .map(|h| h.to_lowercase())
            .filter(|h| !h.is_empty());

        let secret_key = match env::var("SECRET_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!("SECRET_KEY not set; sessions will not survive a restart");
                generate_secret()
            }
        };

        let mirror_scheme = match env::var("MIRROR_SCHEME").as_deref() {
            Ok("http") => "http".to_string(),
            _ => "https".to_string(),
        };

        let rate_limit_requests = env::var("RATE_LIMIT_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let rate_limit_window = env::var("RATE_LIMIT_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        let enable_rate_limiting = env::var("ENABLE_RATE_LIMITING")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_response_size = env::var("MAX_RESPONSE_SIZE_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(15)
            * 1024
            * 1024;

        let request_timeout = env::var("REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(15));

        Self {
            port,
            admin_host,
            secret_key,
            mirror_scheme,
            sites_file: env::var("SITES_FILE").ok().filter(|v| !v.is_empty()),
            database_url: env::var("DATABASE_URL").ok(),
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            rate_limit_requests,
            rate_limit_window,
            enable_rate_limiting,
            max_response_size,
            request_timeout,
        }
    }
}

fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
