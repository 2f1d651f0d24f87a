//! Controller actor: state, run loop and message dispatch

use super::{Command, ControllerOptions, ControllerStatus, Phase};
use crate::error::Error;
use crate::failure::FailureClassifier;
use crate::media::{EngineEvent, MediaEngine, Services};
use crate::prefetch::{PreFetcher, PrefetchOutcome};
use crate::queue::{FailureCounters, PlayedHistory, QueueItem};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tessera_common::timing::ticks_to_ms;
use tessera_common::{EventBus, PlayerEvent};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What caused a PlayNext
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Trigger {
    /// User or coordinator request
    External,
    /// Retry, resolution failure or end of media; counts toward the recursion ceiling
    Automatic,
}

/// Messages the actor sends to itself from spawned tasks
#[derive(Debug)]
pub(super) enum Internal {
    Resolved {
        generation: u64,
        index: usize,
        result: Result<String, Error>,
    },
    RetryDue {
        generation: u64,
    },
}

/// Open request awaiting its completion echo
#[derive(Debug, Clone, PartialEq)]
pub(super) struct PendingOpen {
    /// Load generation the open was submitted under
    pub(super) request: u64,
    pub(super) locator: String,
}

pub(super) struct ControllerActor {
    pub(super) window_id: String,
    pub(super) options: ControllerOptions,
    pub(super) classifier: FailureClassifier,
    pub(super) services: Services,
    pub(super) engine: Arc<dyn MediaEngine>,
    pub(super) events: EventBus,
    status_tx: watch::Sender<ControllerStatus>,
    pub(super) internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
    pub(super) prefetcher: PreFetcher,
    prefetch_rx: Option<mpsc::UnboundedReceiver<PrefetchOutcome>>,

    pub(super) queue: Vec<QueueItem>,
    pub(super) current: Option<usize>,
    pub(super) phase: Phase,
    /// A load owns the current index until this clears
    pub(super) loading: bool,
    /// Monotonic load token; results tagged with an older value are stale
    pub(super) generation: u64,
    pub(super) load_cancel: Option<CancellationToken>,
    /// The live open request
    pub(super) expected_source: Option<PendingOpen>,
    pub(super) recursion_depth: u32,
    pub(super) counters: FailureCounters,
    pub(super) history: PlayedHistory,
    pub(super) rng: StdRng,

    pub(super) opened: bool,
    pub(super) buffering: bool,
    pub(super) playing: bool,
    pub(super) volume: f32,
    pub(super) speed: f64,
    pub(super) position_ms: i64,
    pub(super) resume_seek: Option<i64>,
    pub(super) halted: bool,
}

impl ControllerActor {
    pub(super) fn new(
        window_id: String,
        options: ControllerOptions,
        services: Services,
        engine: Arc<dyn MediaEngine>,
        events: EventBus,
        status_tx: watch::Sender<ControllerStatus>,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (prefetch_tx, prefetch_rx) = mpsc::unbounded_channel();
        let prefetcher = PreFetcher::new(
            window_id.clone(),
            &services,
            options.playback.prefetch_lookahead,
            prefetch_tx,
        );
        let rng = match options.playback.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let counters = FailureCounters::new(
            options.playback.skip_threshold,
            options.playback.halt_threshold,
        );

        Self {
            classifier: options.classifier.clone(),
            volume: options.initial_volume.clamp(0.0, 1.0),
            window_id,
            options,
            services,
            engine,
            events,
            status_tx,
            internal_tx,
            internal_rx: Some(internal_rx),
            prefetcher,
            prefetch_rx: Some(prefetch_rx),
            queue: Vec::new(),
            current: None,
            phase: Phase::Idle,
            loading: false,
            generation: 0,
            load_cancel: None,
            expected_source: None,
            recursion_depth: 0,
            counters,
            history: PlayedHistory::default(),
            rng,
            opened: false,
            buffering: false,
            playing: false,
            speed: 1.0,
            position_ms: 0,
            resume_seek: None,
            halted: false,
        }
    }

    /// Actor main loop; returns after disposal
    pub(super) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        let (Some(mut internal_rx), Some(mut prefetch_rx)) =
            (self.internal_rx.take(), self.prefetch_rx.take())
        else {
            return;
        };

        if self.options.playback.shuffle {
            match self.services.store.played_history(&self.window_id).await {
                Ok(keys) => self.history = PlayedHistory::from_keys(keys),
                Err(e) => warn!(window = %self.window_id, "Failed to load played history: {}", e),
            }
        }

        debug!(window = %self.window_id, "Controller started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dispose(ack)) => {
                        self.dispose().await;
                        self.publish_status();
                        let _ = ack.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.dispose().await;
                        break;
                    }
                },
                Some(event) = engine_events.recv() => self.handle_engine_event(event).await,
                Some(message) = internal_rx.recv() => self.handle_internal(message).await,
                Some(outcome) = prefetch_rx.recv() => self.handle_prefetch_outcome(outcome),
            }
            self.publish_status();
        }

        self.publish_status();
        debug!(window = %self.window_id, "Controller stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetQueue(items) => self.set_queue(items).await,
            Command::PlayNext { force } => self.play_next(force, Trigger::External).await,
            Command::JumpTo(index) => self.jump_to(index).await,
            Command::Play => {
                if self.opened && !self.halted {
                    self.engine.play();
                    self.playing = true;
                    self.phase = Phase::Playing;
                } else {
                    debug!(window = %self.window_id, "Play ignored: nothing open");
                }
            }
            Command::Pause => {
                if self.opened {
                    self.engine.pause();
                    self.playing = false;
                    self.phase = Phase::Paused;
                }
            }
            Command::Seek(position_ms) => {
                let position_ms = position_ms.max(0);
                if self.opened {
                    self.engine.seek(position_ms);
                    self.position_ms = position_ms;
                } else if self.loading {
                    self.resume_seek = Some(position_ms);
                }
            }
            Command::SetVolume(volume) => {
                if !volume.is_finite() {
                    warn!(window = %self.window_id, "Ignoring invalid volume {}", volume);
                    return;
                }
                self.volume = volume.clamp(0.0, 1.0);
                if self.opened {
                    self.apply_volume();
                }
            }
            Command::SetSpeed(speed) => {
                if !speed.is_finite() || speed < 0.0 {
                    warn!(window = %self.window_id, "Ignoring invalid speed {}", speed);
                    return;
                }
                self.speed = speed;
                if self.opened {
                    self.engine.set_speed(speed);
                }
            }
            Command::Dispose(_) => {}
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::OpenCompleted {
                request,
                locator,
                error,
            } => self.on_open_completed(request, locator, error),
            EngineEvent::PositionChanged { ticks } => {
                if !self.opened {
                    return;
                }
                self.position_ms = ticks_to_ms(ticks);
                self.events.emit_lossy(PlayerEvent::PositionChanged {
                    window_id: self.window_id.clone(),
                    position_ms: self.position_ms,
                    timestamp: chrono::Utc::now(),
                });
            }
            EngineEvent::BufferingChanged { buffering } => {
                if self.buffering == buffering {
                    return;
                }
                self.buffering = buffering;
                if !buffering && self.opened && !self.loading {
                    self.emit_ready();
                }
            }
            EngineEvent::PlaybackEnded => self.on_playback_ended().await,
        }
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Resolved {
                generation,
                index,
                result,
            } => self.on_resolved(generation, index, result),
            Internal::RetryDue { generation } => {
                if generation != self.generation || self.phase != Phase::Failed || self.halted {
                    debug!(window = %self.window_id, "Discarding stale retry timer");
                    return;
                }
                self.play_next(false, Trigger::Automatic).await;
            }
        }
    }

    fn handle_prefetch_outcome(&mut self, outcome: PrefetchOutcome) {
        if !self.prefetcher.complete(&outcome) {
            debug!(window = %self.window_id, ticket = outcome.ticket_id, "Discarding superseded prefetch outcome");
            return;
        }

        let Some(resolved) = outcome.resolved_locator else {
            return;
        };
        // Only rewrite the item the ticket was issued for
        if let Some(item) = self.queue.get_mut(outcome.index) {
            if item.key() == outcome.source_locator && item.original_page_locator.is_none() {
                debug!(window = %self.window_id, index = outcome.index, "Resolved {} -> {}", item.locator, resolved);
                item.original_page_locator = Some(std::mem::replace(&mut item.locator, resolved));
            }
        }
    }

    async fn on_playback_ended(&mut self) {
        if !self.opened || self.loading {
            return;
        }
        let Some(index) = self.current else {
            return;
        };
        let key = self.queue[index].key().to_string();
        info!(window = %self.window_id, index, "Playback ended: {}", key);

        if self.options.playback.remember_position {
            if let Err(e) = self.services.store.clear_position(&key).await {
                warn!(window = %self.window_id, "Failed to clear position for {}: {}", key, e);
            }
        }
        self.position_ms = 0;
        self.opened = false;
        self.playing = false;
        self.counters.clear_item(&key);
        self.counters.reset_session();
        self.recursion_depth = 0;

        self.play_next(false, Trigger::Automatic).await;
    }

    /// Release everything; further commands are never processed
    async fn dispose(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }
        self.abandon_current().await;
        self.prefetcher.cancel();
        self.engine.detach();
        self.phase = Phase::Disposed;
        info!(window = %self.window_id, "Controller disposed");
    }

    /// Cancel any in-flight load, stop output and save the resume position
    pub(super) async fn abandon_current(&mut self) {
        if let Some(token) = self.load_cancel.take() {
            token.cancel();
        }
        if self.loading || self.opened {
            self.engine.stop();
        }

        if self.options.playback.remember_position && self.opened && self.position_ms > 0 {
            if let Some(item) = self.current.and_then(|i| self.queue.get(i)) {
                let key = item.key().to_string();
                if let Err(e) = self.services.store.set_position(&key, self.position_ms).await {
                    warn!(window = %self.window_id, "Failed to save position for {}: {}", key, e);
                }
            }
        }

        self.loading = false;
        self.opened = false;
        self.playing = false;
        self.buffering = false;
        self.expected_source = None;
        self.resume_seek = None;
    }

    pub(super) fn apply_volume(&self) {
        let item_volume = self
            .current
            .and_then(|i| self.queue.get(i))
            .map(|item| item.volume)
            .unwrap_or(1.0);
        self.engine.set_volume(self.volume * item_volume);
    }

    pub(super) fn emit_ready(&self) {
        if let Some(index) = self.current {
            self.events.emit_lossy(PlayerEvent::ReadyForCoordinatedStart {
                window_id: self.window_id.clone(),
                index,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn publish_status(&self) {
        let item = self.current.and_then(|i| self.queue.get(i));
        self.status_tx.send_replace(ControllerStatus {
            window_id: self.window_id.clone(),
            phase: self.phase,
            index: self.current,
            locator: item.map(|item| item.key().to_string()),
            title: item.and_then(|item| item.display_title.clone()),
            loading: self.loading,
            opened: self.opened,
            buffering: self.buffering,
            playing: self.playing,
            volume: self.volume,
            speed: self.speed,
            position_ms: self.position_ms,
            queue_len: self.queue.len(),
            consecutive_failures: self.counters.consecutive(),
            halted: self.halted,
            generation: self.generation,
        });
    }
}
