//! Bot lifecycle manager.
//!
//! Owns the three coarse states — uninitialized, running, reloading — and
//! everything that must survive a reload: the provider adapter, the session
//! store, and the portal-bound flag. The bot instance and its flow set are
//! recreated wholesale on every reload.
//!
//! All mutable state lives behind one async mutex that is held across the
//! whole reload, so overlapping triggers are serialized (single-flight):
//! the second trigger waits, re-fetches, and swaps again — it can never
//! interleave with the first.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bot::engine::Bot;
use crate::bot::portal;
use crate::bot::provider::MessagingProvider;
use crate::bot::session::SessionStore;
use crate::error::AppError;
use crate::flow::{FlowSet, loader};
use crate::store::FlowSource;

/// Coarse lifecycle state. There is no terminal state — the manager runs
/// until process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Uninitialized,
    Running,
    Reloading,
}

/// What a reload attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// First successful load: bot created, portal bound.
    Started,
    /// Flow set rebuilt, bot recreated, adapters and portal untouched.
    Reloaded,
    /// The collection yielded zero flows; nothing changed.
    NoFlows,
}

/// Builds the adapters the first time they are needed.
pub type ProviderFactory = Box<dyn Fn() -> Arc<dyn MessagingProvider> + Send + Sync>;
pub type SessionFactory = Box<dyn Fn() -> Arc<dyn SessionStore> + Send + Sync>;

struct Inner {
    state: BotState,
    provider: Option<Arc<dyn MessagingProvider>>,
    sessions: Option<Arc<dyn SessionStore>>,
    bot: Option<Arc<Bot>>,
    portal_bound: bool,
    /// Set after the first Uninitialized → Running transition; the portal is
    /// never retried afterwards, even if its bind failed.
    portal_attempted: bool,
}

pub struct BotManager {
    inner: Mutex<Inner>,
    source: Arc<dyn FlowSource>,
    provider_factory: ProviderFactory,
    session_factory: SessionFactory,
    portal_port: u16,
    shutdown: CancellationToken,
}

impl BotManager {
    pub fn new(
        source: Arc<dyn FlowSource>,
        provider_factory: ProviderFactory,
        session_factory: SessionFactory,
        portal_port: u16,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BotState::Uninitialized,
                provider: None,
                sessions: None,
                bot: None,
                portal_bound: false,
                portal_attempted: false,
            }),
            source,
            provider_factory,
            session_factory,
            portal_port,
            shutdown,
        }
    }

    pub async fn state(&self) -> BotState {
        self.inner.lock().await.state
    }

    /// The current bot instance, if the manager has bootstrapped.
    pub async fn current_bot(&self) -> Option<Arc<Bot>> {
        self.inner.lock().await.bot.clone()
    }

    pub async fn portal_bound(&self) -> bool {
        self.inner.lock().await.portal_bound
    }

    /// Load flows and (re)create the bot instance.
    ///
    /// The inner mutex is held for the full duration, including the store
    /// fetch, so concurrent callers serialize and the portal can only ever
    /// be bound once.
    pub async fn reload(&self) -> Result<ReloadOutcome, AppError> {
        let mut inner = self.inner.lock().await;

        let first_boot = inner.state == BotState::Uninitialized;
        if !first_boot {
            inner.state = BotState::Reloading;
        }

        info!("loading flows from store...");
        let flows = loader::load_flows(self.source.as_ref()).await;

        if flows.is_empty() {
            warn!("no flows found — check the flow collection; keeping current state");
            // Zero flows never transitions: an unbootstrapped bot stays
            // unbootstrapped, a running bot keeps its previous flow set.
            if !first_boot {
                inner.state = BotState::Running;
            }
            return Ok(ReloadOutcome::NoFlows);
        }

        let provider = match &inner.provider {
            Some(p) => p.clone(),
            None => {
                let p = (self.provider_factory)();
                inner.provider = Some(p.clone());
                p
            }
        };
        let sessions = match &inner.sessions {
            Some(s) => s.clone(),
            None => {
                let s = (self.session_factory)();
                inner.sessions = Some(s.clone());
                s
            }
        };

        let set = Arc::new(FlowSet::new(flows));
        let count = set.len();
        inner.bot = Some(Arc::new(Bot::new(set, provider.clone(), sessions)));

        if first_boot {
            info!(flows = count, "starting bot for the first time");
            if !inner.portal_attempted {
                inner.portal_attempted = true;
                match portal::start(self.portal_port, provider, self.shutdown.clone()).await {
                    Ok(_) => inner.portal_bound = true,
                    Err(e) => {
                        // Non-fatal: the bot still serves flows without the
                        // pairing page. Likely masks a real startup failure.
                        error!("portal failed to start: {e}");
                    }
                }
            }
            inner.state = BotState::Running;
            Ok(ReloadOutcome::Started)
        } else {
            info!(flows = count, "applying fresh flows (portal untouched)");
            inner.state = BotState::Running;
            Ok(ReloadOutcome::Reloaded)
        }
    }
}
