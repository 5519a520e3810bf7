//! Generic component runtime — shared scaffolding for the subsystems.
//!
//! A [`Component`] is any independently-runnable unit: the live-reload
//! watcher, the reload worker, the bot message runner, the admin HTTP
//! server. Components capture their shared state at construction time, then
//! are handed to [`spawn_components`].
//!
//! [`spawn_components`] returns a [`SubsystemHandle`] that the caller can
//! `.await` (blocking until all components finish) or hold onto while doing
//! other work — the components run concurrently regardless. Any component
//! error cancels the shared [`CancellationToken`] so sibling components shut
//! down cleanly.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::AppError;

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A self-contained, concurrently-runnable unit.
///
/// [`Component::run`] is called once by [`spawn_components`] and should run
/// until `shutdown` is cancelled or the component's own work is done.
pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its async run-loop as a boxed future.
    ///
    /// The returned future must be `Send + 'static` so it can be spawned on
    /// the Tokio thread pool. Capture the `CancellationToken` inside it to
    /// respect cooperative shutdown.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// An opaque handle to a running component set.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Await all components and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Subsystem(format!("subsystem task panicked: {e}"))),
        }
    }
}

/// Spawn each [`Component`] as an independent Tokio task and return a
/// [`SubsystemHandle`] that resolves when all components have exited.
///
/// If any component returns `Err`, `shutdown` is cancelled so all siblings
/// receive the cancellation signal and stop cooperatively; the first error
/// encountered is returned from [`SubsystemHandle::join`].
pub fn spawn_components(
    components: Vec<Box<dyn Component>>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();

        for component in components {
            let id = component.id().to_string();
            let shutdown = shutdown.clone();
            debug!(component = %id, "spawning component");
            set.spawn(component.run(shutdown));
        }

        let mut first_err: Option<AppError> = None;

        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("component panicked: {e}");
                    shutdown.cancel();
                    first_err
                        .get_or_insert_with(|| AppError::Subsystem(format!("component panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("component error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    SubsystemHandle { inner: handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quick {
        fail: bool,
    }

    impl Component for Quick {
        fn id(&self) -> &str {
            "quick"
        }

        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ComponentFuture {
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(AppError::Subsystem("boom".into()))
                } else {
                    Ok(())
                }
            })
        }
    }

    struct WaitsForShutdown;

    impl Component for WaitsForShutdown {
        fn id(&self) -> &str {
            "waits"
        }

        fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn clean_exit_yields_ok() {
        let token = CancellationToken::new();
        let handle = spawn_components(vec![Box::new(Quick { fail: false })], token);
        assert!(handle.join().await.is_ok());
    }

    #[tokio::test]
    async fn component_error_cancels_siblings() {
        let token = CancellationToken::new();
        let handle = spawn_components(
            vec![Box::new(Quick { fail: true }), Box::new(WaitsForShutdown)],
            token.clone(),
        );
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(token.is_cancelled());
    }
}
