use crate::capability::Capability;
use crate::config::EngineConfig;
use crate::session::{AnalysisSession, SessionTimeouts};
use crate::CoreError;
use kibitz_runtime::{available_cores, HandleFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owner used by [`AccessManager::pre_warm`]. `release` never removes it;
/// only [`AccessManager::force_release`] or eviction by another owner does.
pub const SHARED_OWNER: &str = "shared";

#[derive(Clone)]
struct Ownership {
    owner: String,
    session: Arc<dyn AnalysisSession>,
}

/// Arbitrates a single live engine session between competing owners.
///
/// Acquire, release and force-release run under one async lock held for
/// their whole duration, so eviction, construction and initialization never
/// overlap and later callers wait for the attempt in flight. The snapshot
/// queries read a mirror of the ownership record and never wait on that lock.
pub struct AccessManager {
    capability: Capability,
    timeouts: SessionTimeouts,
    slot: tokio::sync::Mutex<Option<Ownership>>,
    snapshot: Mutex<Option<Ownership>>,
    pre_warming: AtomicBool,
}

impl AccessManager {
    pub fn new(capability: Capability, timeouts: SessionTimeouts) -> Self {
        Self {
            capability,
            timeouts,
            slot: tokio::sync::Mutex::new(None),
            snapshot: Mutex::new(None),
            pre_warming: AtomicBool::new(false),
        }
    }

    pub fn detect(factory: Arc<dyn HandleFactory>, timeouts: SessionTimeouts) -> Self {
        Self::new(Capability::detect(factory), timeouts)
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Hand the session to `owner`, evicting any other owner first.
    ///
    /// An owner that already holds a session whose engine is still running
    /// gets it back, with `config` applied when given. Otherwise a fresh session is built with
    /// `config` (or the default) and initialized; on failure nobody owns
    /// anything and the error is returned.
    pub async fn acquire(
        &self,
        owner: &str,
        config: Option<EngineConfig>,
    ) -> Result<Arc<dyn AnalysisSession>, CoreError> {
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot.as_ref().filter(|current| current.owner == owner) {
            if current.session.is_ready() {
                debug!("reusing engine session for '{owner}'");
                if let Some(config) = config {
                    current.session.update_config(config).await?;
                }
                return Ok(Arc::clone(&current.session));
            }
            warn!("engine session of '{owner}' is no longer running, rebuilding");
        }

        if let Some(previous) = slot.take() {
            info!("evicting engine owner '{}' for '{owner}'", previous.owner);
            self.publish(None);
            previous.session.dispose().await;
        }

        let session = self
            .capability
            .new_session(config.unwrap_or_default(), self.timeouts);
        if let Err(e) = session.initialize().await {
            session.dispose().await;
            return Err(e);
        }

        info!("engine session acquired by '{owner}'");
        let record = Ownership {
            owner: owner.to_owned(),
            session: Arc::clone(&session),
        };
        self.publish(Some(record.clone()));
        *slot = Some(record);
        Ok(session)
    }

    /// Give the session up if `owner` holds it. Anyone else, and the shared
    /// owner, is ignored.
    pub async fn release(&self, owner: &str) {
        if owner == SHARED_OWNER {
            debug!("ignoring release of the shared engine session");
            return;
        }
        let mut slot = self.slot.lock().await;
        if !slot.as_ref().is_some_and(|current| current.owner == owner) {
            debug!("release by non-owner '{owner}' ignored");
            return;
        }
        if let Some(record) = slot.take() {
            self.publish(None);
            record.session.dispose().await;
            info!("engine session released by '{owner}'");
        }
    }

    pub async fn force_release(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(record) = slot.take() {
            self.publish(None);
            record.session.dispose().await;
            info!("engine session force-released from '{}'", record.owner);
        }
    }

    /// Start an engine in the background under [`SHARED_OWNER`] so the
    /// next acquirer finds it warm. Returns `None` without doing anything
    /// when a session exists or a warm-up is already running. Failures are
    /// logged and otherwise dropped.
    pub fn pre_warm(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.is_in_use() || self.pre_warming.swap(true, Ordering::SeqCst) {
            return None;
        }
        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = manager.warm_up().await {
                warn!("engine pre-warm failed: {e}");
            }
            manager.pre_warming.store(false, Ordering::SeqCst);
        }))
    }

    async fn warm_up(&self) -> Result<(), CoreError> {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            debug!("engine already claimed, skipping pre-warm");
            return Ok(());
        }
        let session = self
            .capability
            .new_session(EngineConfig::prewarm(available_cores()), self.timeouts);
        if let Err(e) = session.initialize().await {
            session.dispose().await;
            return Err(e);
        }
        info!("engine pre-warmed");
        let record = Ownership {
            owner: SHARED_OWNER.to_owned(),
            session,
        };
        self.publish(Some(record.clone()));
        *slot = Some(record);
        Ok(())
    }

    fn publish(&self, record: Option<Ownership>) {
        let mut snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *snapshot = record;
    }

    fn read<T>(&self, f: impl FnOnce(Option<&Ownership>) -> T) -> T {
        let snapshot = self
            .snapshot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(snapshot.as_ref())
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.read(|record| record.is_some_and(|r| r.owner == owner))
    }

    pub fn is_in_use(&self) -> bool {
        self.read(|record| record.is_some())
    }

    /// Whether the held session is up and accepting commands.
    pub fn is_ready(&self) -> bool {
        self.read(|record| record.is_some_and(|r| r.session.is_ready()))
    }

    pub fn is_pre_warming(&self) -> bool {
        self.pre_warming.load(Ordering::SeqCst)
    }

    pub fn current_owner(&self) -> Option<String> {
        self.read(|record| record.map(|r| r.owner.clone()))
    }
}
