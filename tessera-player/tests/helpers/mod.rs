//! Shared test harness: simulated collaborators and wait helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tessera_common::{EventBus, PlayerEvent};
use tessera_player::controller::{ControllerOptions, ControllerStatus, PlaybackController};
use tessera_player::media::{EngineFactory, Services};
use tessera_player::sim::{MemoryCache, SimBehavior, SimEngine, SimEngineFactory, SimResolver};
use tessera_player::store::MemoryStore;
use tokio::sync::broadcast;

pub const WAIT: Duration = Duration::from_secs(5);

/// Simulated collaborators shared by every controller in a test
pub struct Harness {
    pub factory: SimEngineFactory,
    pub resolver: Arc<SimResolver>,
    pub cache: Arc<MemoryCache>,
    pub store: Arc<MemoryStore>,
    pub events: EventBus,
}

impl Harness {
    pub fn new(behavior: SimBehavior) -> Self {
        Self::with_resolver(behavior, SimResolver::new(Duration::from_millis(20)))
    }

    pub fn with_resolver(behavior: SimBehavior, resolver: SimResolver) -> Self {
        Self {
            factory: SimEngineFactory::new(behavior),
            resolver: Arc::new(resolver),
            cache: Arc::new(MemoryCache::new("/cache", Duration::from_millis(20))),
            store: Arc::new(MemoryStore::new()),
            events: EventBus::new(1000),
        }
    }

    pub fn with_cache(mut self, cache: MemoryCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn services(&self) -> Services {
        Services {
            resolver: self.resolver.clone(),
            cache: self.cache.clone(),
            store: self.store.clone(),
        }
    }

    /// Spawn a controller and return it with its simulated engine
    pub fn spawn(
        &self,
        window_id: &str,
        options: ControllerOptions,
    ) -> (PlaybackController, Arc<SimEngine>) {
        let (engine, engine_events) = self.factory.create(window_id);
        let controller = PlaybackController::spawn(
            window_id,
            options,
            self.services(),
            engine,
            engine_events,
            self.events.clone(),
        );
        let sim = self
            .factory
            .engine(window_id)
            .expect("factory keeps created engines");
        (controller, sim)
    }
}

/// Options with short retry delays and no look-ahead
pub fn fast_options() -> ControllerOptions {
    let mut options = ControllerOptions::default();
    options.playback.retry_delay_ms = 5;
    options.playback.exhaustion_retry_delay_ms = 10;
    options.playback.prefetch_lookahead = 0;
    options
}

/// Wait until the controller publishes a status matching `pred`
pub async fn wait_status(
    controller: &PlaybackController,
    pred: impl Fn(&ControllerStatus) -> bool,
) -> ControllerStatus {
    let mut rx = controller.subscribe_status();
    let result = tokio::time::timeout(WAIT, async {
        loop {
            {
                let status = rx.borrow_and_update();
                if pred(&status) {
                    return status.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    })
    .await;

    match result {
        Ok(status) if pred(&status) => status,
        Ok(status) => panic!("controller closed in state {:?}", status),
        Err(_) => panic!(
            "timed out waiting for status; last: {:?}",
            controller.status()
        ),
    }
}

/// Poll `pred` until it holds
pub async fn wait_for(what: &str, mut pred: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !pred() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drain every event received so far
pub fn drain(rx: &mut broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Remote direct-media locator
pub fn media(name: &str) -> String {
    format!("https://cdn.example.com/{}.mp4", name)
}

/// Remote page locator handled by the simulated resolver
pub fn page(name: &str) -> String {
    format!("{}{}", tessera_player::sim::PAGE_PREFIX, name)
}
