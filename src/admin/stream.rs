//! Live log streaming over server-sent events.
//!
//! Opens a [`LogSubscription`] on the process manager, forwards matching
//! lines as SSE `data:` events, and keeps the connection alive with a
//! `: ping` comment every 15 seconds. Once headers are committed, failures
//! surface as a terminal `error`-typed event rather than an HTTP status.
//!
//! Dropping the response stream (client disconnect, error, normal close)
//! drops the subscription receiver, which tears down the underlying log
//! followers — cleanup runs on every exit path.

use std::convert::Infallible;
use std::fmt;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::process::{LogEvent, LogStream};

use super::{AdminState, error_response};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Which streams the client wants to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamFilter {
    Out,
    Err,
    Both,
}

impl StreamFilter {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::to_lowercase).as_deref() {
            Some("out") => StreamFilter::Out,
            Some("err") => StreamFilter::Err,
            _ => StreamFilter::Both,
        }
    }

    fn matches(self, stream: LogStream) -> bool {
        match self {
            StreamFilter::Out => stream == LogStream::Out,
            StreamFilter::Err => stream == LogStream::Err,
            StreamFilter::Both => true,
        }
    }
}

impl fmt::Display for StreamFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFilter::Out => write!(f, "out"),
            StreamFilter::Err => write!(f, "err"),
            StreamFilter::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

pub async fn logs_stream(
    State(state): State<AdminState>,
    Query(q): Query<StreamQuery>,
) -> Response {
    let name = {
        let requested = q.name.unwrap_or_default();
        let trimmed = requested.trim().to_string();
        if trimmed.is_empty() {
            state.default_app.trim().to_string()
        } else {
            trimmed
        }
    };
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Falta query param \"name\"", None);
    }

    let filter = StreamFilter::parse(q.kind.as_deref());

    match state.process.subscribe(&name).await {
        Ok(subscription) => {
            let opening = json_event(&json!({
                "type": "info",
                "message": format!("Streaming de logs iniciado para \"{name}\" ({filter})")
            }));

            let events: EventStream = stream::once(async move { Ok(opening) })
                .chain(
                    ReceiverStream::new(subscription.rx).filter_map(move |event| async move {
                        to_sse_event(&event, filter).map(Ok)
                    }),
                )
                .boxed();

            Sse::new(events)
                .keep_alive(
                    KeepAlive::new()
                        .interval(KEEP_ALIVE_INTERVAL)
                        .text("ping"),
                )
                .into_response()
        }
        Err(e) => {
            warn!(%name, "log subscription failed: {e}");
            let terminal = json_event(&json!({
                "type": "error",
                "message": e.to_string()
            }));
            let events: EventStream = stream::once(async move { Ok(terminal) }).boxed();
            Sse::new(events).into_response()
        }
    }
}

fn to_sse_event(event: &LogEvent, filter: StreamFilter) -> Option<Event> {
    if !filter.matches(event.stream) {
        return None;
    }
    let kind = match event.stream {
        LogStream::Out => "out",
        LogStream::Err => "err",
    };
    Some(json_event(&json!({
        "type": kind,
        "name": event.name,
        "line": event.line
    })))
}

fn json_event(payload: &serde_json::Value) -> Event {
    Event::default().data(payload.to_string())
}
