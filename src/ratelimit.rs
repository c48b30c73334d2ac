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

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, interval};

/// Outcome of one admission check, carrying everything the engine needs to
/// build the `X-RateLimit-*` response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Seconds until the oldest in-window request expires; set on denial.
    pub retry_after: Option<u64>,
}

/// Sliding-window request counter keyed by client IP.
///
/// Each key holds the timestamps of its requests inside the trailing
/// window; a request is admitted while the window holds at most
/// `max_requests` entries. The socket peer address is the key; any
/// `X-Forwarded-For` handling is left to the operator's load balancer.
pub struct RateLimiter {
    clients: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Records the request and decides admission.
    pub async fn check(&self, client_ip: &str) -> RateDecision {
        let now = Instant::now();
        let mut map = self.clients.lock().await;
        let deque = map.entry(client_ip.to_string()).or_default();

        while deque
            .front()
            .is_some_and(|t| now.duration_since(*t) > self.window)
        {
            deque.pop_front();
        }
        deque.push_back(now);

        let count = deque.len();
        let allowed = count <= self.max_requests;
        let retry_after = if allowed {
            None
        } else {
            deque.front().map(|oldest| {
                let remaining = self.window.saturating_sub(now.duration_since(*oldest));
                (remaining.as_secs_f64().ceil() as u64).max(1)
            })
        };

        RateDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(count),
            retry_after,
        }
    }

    /// Starts the background task that drops idle keys so the map stays
    /// bounded. Call once after the runtime is up.
    pub fn start_eviction(self: &Arc<Self>) {
        let clients = self.clients.clone();
        let window = self.window;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut map = clients.lock().await;
                map.retain(|_, deque| {
                    deque
                        .back()
                        .is_some_and(|t| now.duration_since(*t) <= window)
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(limiter.check("1.2.3.4").await);
        }
        assert_eq!(
            outcomes.iter().map(|d| d.allowed).collect::<Vec<_>>(),
            [true, true, true, false]
        );
        let denied = outcomes[3];
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.limit, 3);
        assert!(denied.retry_after.is_some_and(|s| (1..=60).contains(&s)));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("1.1.1.1").await.allowed);
        assert!(!limiter.check("1.1.1.1").await.allowed);
        assert!(limiter.check("2.2.2.2").await.allowed);
    }

    #[tokio::test]
    async fn window_expiry_readmits() {
        tokio::time::pause();
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("1.2.3.4").await.allowed);
        assert!(!limiter.check("1.2.3.4").await.allowed);
        tokio::time::advance(Duration::from_millis(80)).await;
        assert!(limiter.check("1.2.3.4").await.allowed);
    }

    #[tokio::test]
    async fn remaining_counts_down() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        assert_eq!(limiter.check("a").await.remaining, 2);
        assert_eq!(limiter.check("a").await.remaining, 1);
        assert_eq!(limiter.check("a").await.remaining, 0);
    }
}
