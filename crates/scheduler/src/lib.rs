//! The single cooperative background task that drives every session-bearing
//! engine forward, spec.md §4.1/§5 ("single cooperative task, tick period
//! ≤5s"). Mirrors the teacher's `lp_init` shape — spawn a loop, poll a stop
//! flag, sleep between iterations — rather than an event-driven reactor,
//! since every engine here is itself tick-based (`MixerEngine::tick_*`,
//! `BridgeServer::sweep_idle_rounds`) and has no internal event loop of its
//! own to hook into.

pub mod retry;

pub use retry::{default_backoff, retry_with_backoff};

use chain_adapter::ChainAdapter;
use coord_bridge::BridgeServer;
use mixer_engine::MixerEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Tick period from spec.md §4.2 "single cooperative task, tick period ≤5s".
pub const DEFAULT_TICK: Duration = Duration::from_secs(5);

pub struct Scheduler<C: ChainAdapter> {
    mixer: Arc<MixerEngine<C>>,
    bridge: Option<Arc<BridgeServer>>,
    tick: Duration,
}

impl<C: ChainAdapter> Scheduler<C> {
    pub fn new(mixer: Arc<MixerEngine<C>>, bridge: Option<Arc<BridgeServer>>) -> Self {
        Scheduler { mixer, bridge, tick: DEFAULT_TICK }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Runs until `stop` observes `true`. Each iteration ticks every engine
    /// in turn; a slow or failing tick delays the others rather than being
    /// retried out-of-band, matching the "single cooperative task" design.
    pub async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick_once().await,
                _ = stop.changed() => {
                    if *stop.borrow() {
                        log::info!("scheduler: stop requested, exiting");
                        break;
                    }
                },
            }
        }
    }

    async fn tick_once(&self) {
        if let Err(e) = self.mixer.tick_deposit_watcher().await {
            log::warn!("scheduler: deposit watcher tick failed: {e}");
        }
        if let Err(e) = self.mixer.tick_intermediate_watcher().await {
            log::warn!("scheduler: intermediate watcher tick failed: {e}");
        }
        if let Some(bridge) = &self.bridge {
            bridge.sweep_idle_rounds().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_adapter::mock::MockChainAdapter;
    use kaspa_privacy_common::clock::TestClock;
    use kaspa_privacy_common::config::SessionConfig;
    use kaspa_privacy_common::model::{Destination, MixingStatus};
    use kaspa_privacy_common::amount::Sompi;
    use privacy_db::sqlite::SqliteSessionStore;
    use privacy_db::SessionStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn a_tick_advances_a_fully_funded_session() {
        let chain = Arc::new(MockChainAdapter::new());
        let db: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open_in_memory().unwrap());
        let clock = Arc::new(TestClock::new(1_000_000));
        let mixer = Arc::new(MixerEngine::new(chain.clone(), db.clone(), clock, SessionConfig::default()));

        let session = mixer
            .create_session(vec![Destination { address: "kaspa:dest".to_string(), amount: Sompi(100_000_000) }], Sompi(100_000_000))
            .await
            .unwrap();
        chain.deposit(&session.deposit_address, 100_000_000);

        let scheduler = Arc::new(Scheduler::new(mixer.clone(), None));
        scheduler.tick_once().await;

        let refreshed = mixer.get_session(&session.id).await.unwrap();
        assert_ne!(refreshed.status, MixingStatus::Waiting);
    }
}
