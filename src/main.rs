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

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::any};
use reqwest::Client;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proxibase::config::Config;
use proxibase::cookies::CookieJar;
use proxibase::handlers;
use proxibase::ratelimit::RateLimiter;
use proxibase::session::SessionCodec;
use proxibase::site::MemoryConfigStore;
use proxibase::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(Config::from_env());

    // Redirects are inspected by the engine, never followed by the client.
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build reqwest client");

    let sites = match &config.sites_file {
        Some(path) => Arc::new(
            MemoryConfigStore::from_json_file(path)
                .unwrap_or_else(|e| panic!("Failed to load sites file {path}: {e}")),
        ),
        None => Arc::new(MemoryConfigStore::new()),
    };

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_requests,
        config.rate_limit_window,
    ));
    limiter.start_eviction();

    let state = AppState {
        client,
        config: config.clone(),
        sites,
        cookies: Arc::new(CookieJar::new()),
        limiter,
        sessions: Arc::new(SessionCodec::new(&config.secret_key)),
    };

    let app = Router::new()
        .route("/health", any(handlers::health_handler))
        .fallback(handlers::dispatch_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr_str = format!("0.0.0.0:{}", config.port);
    let addr: SocketAddr = addr_str
        .parse()
        .expect("Invalid address/port configuration");

    tracing::info!("Proxy listening on http://{}", addr);
    if let Some(admin) = &config.admin_host {
        tracing::info!("Admin surface reserved for host {}", admin);
    }

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
