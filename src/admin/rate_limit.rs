//! Fixed-window rate limiting for the admin routes.
//!
//! One window per client identity (peer IP). The window resets `window`
//! after its first request; requests beyond `max` inside the window are
//! rejected with 429.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use super::{AdminState, error_response};

struct Window {
    started: Instant,
    count: u32,
}

pub struct FixedWindowLimiter {
    max: u32,
    window: Duration,
    slots: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `identity`; `false` means over the limit.
    pub fn allow(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut slots = self.slots.lock().expect("limiter lock poisoned");

        let slot = slots.entry(identity.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(slot.started) >= self.window {
            slot.started = now;
            slot.count = 0;
        }

        if slot.count >= self.max {
            return false;
        }
        slot.count += 1;
        true
    }
}

pub async fn fixed_window(
    State(state): State<AdminState>,
    req: Request,
    next: Next,
) -> Response {
    let identity = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.limiter.allow(&identity) {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Demasiadas peticiones, intenta de nuevo más tarde",
            None,
        );
    }

    next.run(req).await
}
