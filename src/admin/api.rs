//! Handlers for the admin endpoints and the webhook trigger.
//!
//! Collaborator failures never propagate: every handler maps them to the
//! `{error, detail}` envelope with the status the original deployment's
//! clients expect (the user-facing strings are kept verbatim).

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::process::ProcessError;

use super::{AdminState, error_response};

/// Default line count when `lines` is absent, zero, or unparseable.
const DEFAULT_LINES: i64 = 200;
/// Hard cap on the requested line count.
const MAX_LINES: i64 = 2000;

// ── GET /health ───────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AdminState>) -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "env": &*state.run_env }))
}

// ── GET /admin/server/list ────────────────────────────────────────────────────

pub async fn list_processes(State(state): State<AdminState>) -> Response {
    match state.process.list().await {
        Ok(processes) => Json(json!({ "processes": processes })).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "No se pudo obtener la lista",
            Some(e.to_string()),
        ),
    }
}

// ── POST /admin/server/restart ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RestartBody {
    name: Option<String>,
}

pub async fn restart(State(state): State<AdminState>, body: String) -> Response {
    let parsed: RestartBody = if body.trim().is_empty() {
        RestartBody::default()
    } else {
        match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Cuerpo JSON inválido",
                    Some(e.to_string()),
                );
            }
        }
    };

    let name = resolve_name(parsed.name, &state);
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Falta el nombre de la app (name)", None);
    }

    match state.process.restart(&name).await {
        Ok(()) => Json(json!({
            "ok": true,
            "message": format!("Reinicio solicitado para \"{name}\"")
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "ok": false,
                "error": format!("No se pudo reiniciar \"{name}\""),
                "detail": e.to_string()
            })),
        )
            .into_response(),
    }
}

// ── GET /admin/server/logs ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    lines: Option<String>,
}

pub async fn logs(State(state): State<AdminState>, Query(q): Query<LogsQuery>) -> Response {
    let name = resolve_name(q.name, &state);
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Falta query param \"name\"", None);
    }

    let kind = q.kind.as_deref().unwrap_or("out").to_lowercase();
    let lines = clamp_lines(q.lines.as_deref());

    let result = async {
        let paths = state.process.log_paths(&name).await?;
        let body = match kind.as_str() {
            "out" => {
                let out = state.process.tail(&paths.out, lines).await?;
                json!({
                    "name": name, "type": "out", "lines": lines,
                    "outLogPath": paths.out, "out": out
                })
            }
            "err" => {
                let err = state.process.tail(&paths.err, lines).await?;
                json!({
                    "name": name, "type": "err", "lines": lines,
                    "errLogPath": paths.err, "err": err
                })
            }
            _ => {
                let (out, err) = tokio::join!(
                    state.process.tail(&paths.out, lines),
                    state.process.tail(&paths.err, lines)
                );
                json!({
                    "name": name, "type": "all", "lines": lines,
                    "outLogPath": paths.out, "errLogPath": paths.err,
                    "out": out?, "err": err?
                })
            }
        };
        Ok::<_, ProcessError>(body)
    }
    .await;

    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "No se pudieron leer los logs",
            Some(e.to_string()),
        ),
    }
}

/// Bound a requested line count into `[1, 2000]`.
///
/// Absent, zero, or unparseable values fall back to the default of 200;
/// negative values clamp to 1; anything above the cap clamps to 2000.
fn clamp_lines(raw: Option<&str>) -> usize {
    match raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<i64>)
    {
        Some(Ok(n)) if n > 0 => n.min(MAX_LINES) as usize,
        Some(Ok(n)) if n < 0 => 1,
        _ => DEFAULT_LINES as usize,
    }
}

// ── GET /admin/pm2/server/download ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub async fn download_log(
    State(state): State<AdminState>,
    Query(q): Query<DownloadQuery>,
) -> Response {
    let name = resolve_name(q.name, &state);
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Falta query param \"name\"", None);
    }

    let paths = match state.process.log_paths(&name).await {
        Ok(paths) => paths,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No se pudo descargar el log",
                Some(e.to_string()),
            );
        }
    };

    let path = if q.kind.as_deref().map(str::to_lowercase).as_deref() == Some("err") {
        paths.err
    } else {
        paths.out
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "log.txt".to_string());
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => error_response(
            StatusCode::NOT_FOUND,
            "Archivo de log no encontrado",
            None,
        ),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "No se pudo descargar el log",
            Some(e.to_string()),
        ),
    }
}

// ── POST /webhook ─────────────────────────────────────────────────────────────

/// Unauthenticated restart trigger. Restarts only the configured process
/// name — never a caller-supplied one — and reflects the command outcome as
/// plain text.
pub async fn webhook(State(state): State<AdminState>) -> Response {
    info!("webhook recibido, reiniciando bot...");

    match state.process.restart(&state.default_app).await {
        Ok(()) => (StatusCode::OK, "Bot reiniciado correctamente").into_response(),
        Err(e) => {
            error!("error al reiniciar el bot: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error al reiniciar el bot").into_response()
        }
    }
}

// ── helpers ───────────────────────────────────────────────────────────────────

/// Requested name, falling back to the configured default app.
fn resolve_name(requested: Option<String>, state: &AdminState) -> String {
    let requested = requested.unwrap_or_default();
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        state.default_app.trim().to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_in_range_pass_through() {
        assert_eq!(clamp_lines(Some("50")), 50);
        assert_eq!(clamp_lines(Some("2000")), 2000);
        assert_eq!(clamp_lines(Some("1")), 1);
    }

    #[test]
    fn lines_zero_defaults() {
        assert_eq!(clamp_lines(Some("0")), 200);
    }

    #[test]
    fn lines_above_cap_clamp() {
        assert_eq!(clamp_lines(Some("5000")), 2000);
    }

    #[test]
    fn lines_unparseable_defaults() {
        assert_eq!(clamp_lines(Some("abc")), 200);
        assert_eq!(clamp_lines(Some("")), 200);
        assert_eq!(clamp_lines(None), 200);
    }

    #[test]
    fn lines_negative_clamp_to_one() {
        assert_eq!(clamp_lines(Some("-5")), 1);
    }
}
