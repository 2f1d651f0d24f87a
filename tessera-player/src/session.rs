//! Session assembly
//!
//! Builds one controller per configured window, wires sync groups (with a
//! shared clock where configured), starts the coordinator and hands out the
//! initial queues.

use crate::clock::SharedClock;
use crate::config::Config;
use crate::controller::{ControllerOptions, PlaybackController};
use crate::coordinator::{GroupHandle, SyncCoordinator};
use crate::error::Result;
use crate::failure::FailureClassifier;
use crate::media::{EngineFactory, Services};
use parking_lot::Mutex;
use tessera_common::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A running set of windows and groups
pub struct Session {
    config: Config,
    controllers: Vec<PlaybackController>,
    groups: Vec<GroupHandle>,
    events: EventBus,
    shutdown: CancellationToken,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Start every controller and the coordinator
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: Config,
        services: Services,
        factory: &dyn EngineFactory,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let classifier = FailureClassifier::new(&config.classifier);

        let mut controllers = Vec::with_capacity(config.windows.len());
        for window in &config.windows {
            let shared_clock = window
                .group
                .as_deref()
                .and_then(|name| config.group(name))
                .map(|group| group.shared_clock)
                .unwrap_or(false);

            let options = ControllerOptions {
                playback: config.playback.clone(),
                classifier: classifier.clone(),
                autoplay: !shared_clock,
                initial_volume: window.volume,
            };
            let (engine, engine_events) = factory.create(&window.id);
            controllers.push(PlaybackController::spawn(
                window.id.clone(),
                options,
                services.clone(),
                engine,
                engine_events,
                events.clone(),
            ));
        }

        let groups: Vec<GroupHandle> = config
            .groups
            .iter()
            .map(|group| {
                let members = config
                    .windows
                    .iter()
                    .zip(&controllers)
                    .filter(|(window, _)| window.group.as_deref() == Some(group.name.as_str()))
                    .map(|(_, controller)| controller.clone())
                    .collect();
                let clock = group.shared_clock.then(SharedClock::new);
                GroupHandle::new(group.name.clone(), members, clock)
            })
            .collect();

        let shutdown = CancellationToken::new();
        let coordinator =
            SyncCoordinator::new(config.sync.clone(), groups.clone()).spawn(shutdown.child_token());

        for (window, controller) in config.windows.iter().zip(&controllers) {
            if !window.queue.is_empty() {
                controller.set_queue(window.queue.clone());
            }
        }

        info!(
            windows = controllers.len(),
            groups = groups.len(),
            "Session started"
        );

        Ok(Self {
            config,
            controllers,
            groups,
            events,
            shutdown,
            coordinator: Mutex::new(Some(coordinator)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn controllers(&self) -> &[PlaybackController] {
        &self.controllers
    }

    pub fn controller(&self, window_id: &str) -> Option<&PlaybackController> {
        self.controllers.iter().find(|c| c.window_id() == window_id)
    }

    pub fn groups(&self) -> &[GroupHandle] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&GroupHandle> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Stop the coordinator and dispose every controller
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let coordinator = self.coordinator.lock().take();
        if let Some(handle) = coordinator {
            let _ = handle.await;
        }
        for controller in &self.controllers {
            controller.dispose().await;
        }
        info!("Session shut down");
    }
}
