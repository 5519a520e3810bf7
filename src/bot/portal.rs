//! QR-pairing portal — a one-time web endpoint showing the pairing code.
//!
//! The portal binds exactly once per process, on the first successful flow
//! load. A port that is already in use is treated as "someone is already
//! serving the portal" and reported as bound; reloads never touch it.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bot::provider::MessagingProvider;
use crate::error::AppError;

/// Outcome of a bind attempt that should be treated as success.
#[derive(Debug, PartialEq)]
pub enum PortalBind {
    /// We bound the port and are serving the pairing page.
    Bound { local_port: u16 },
    /// The port was already taken — assume a portal is serving and carry on.
    AlreadyListening,
}

/// Bind the portal and spawn its serve loop.
///
/// Returns `Ok(AlreadyListening)` on an address-in-use collision. Any other
/// bind failure is a real error; the caller decides whether it is fatal.
pub async fn start(
    port: u16,
    provider: Arc<dyn MessagingProvider>,
    shutdown: CancellationToken,
) -> Result<PortalBind, AppError> {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            warn!(%port, "portal port already in use, assuming it is already being served");
            return Ok(PortalBind::AlreadyListening);
        }
        Err(e) => {
            return Err(AppError::Portal(format!("bind failed on port {port}: {e}")));
        }
    };

    let local_port = listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(port);

    info!(port = local_port, "portal listening");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("portal shutting down");
                    break;
                }

                accepted = listener.accept() => {
                    match accepted {
                        Ok((mut socket, peer)) => {
                            debug!(%peer, "portal client connected");
                            let page = render_page(provider.pairing_code());
                            if let Err(e) = write_response(&mut socket, &page).await {
                                warn!("portal response failed: {e}");
                            }
                        }
                        Err(e) => warn!("portal accept error: {e}"),
                    }
                }
            }
        }
    });

    Ok(PortalBind::Bound { local_port })
}

fn render_page(pairing_code: Option<String>) -> String {
    let body = match pairing_code {
        Some(code) => format!(
            "<h1>astro-bot</h1><p>Escanea para vincular:</p><p class=\"code\">{code}</p>"
        ),
        None => "<h1>astro-bot</h1><p>Sesión vinculada ✔</p>".to_string(),
    };
    format!(
        "<!doctype html>\n<html lang=\"es\">\n<head>\n  <meta charset=\"utf-8\" />\n  <title>astro-bot</title>\n  <style>\n    body {{ font-family: system-ui, sans-serif; background: #0f0f0f; color: #e0e0e0;\n           display: flex; align-items: center; justify-content: center; height: 100vh; }}\n    .card {{ text-align: center; padding: 2rem 3rem; border: 1px solid #333;\n            border-radius: 12px; background: #1a1a1a; }}\n    .code {{ font-size: 2rem; letter-spacing: 0.2em; }}\n  </style>\n</head>\n<body>\n  <div class=\"card\">{body}</div>\n</body>\n</html>\n"
    )
}

async fn write_response(
    socket: &mut tokio::net::TcpStream,
    body: &str,
) -> Result<(), AppError> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    socket.write_all(header.as_bytes()).await?;
    socket.write_all(body.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}
