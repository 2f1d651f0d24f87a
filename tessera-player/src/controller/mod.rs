//! Per-window playback controller
//!
//! Each window is driven by one actor task that owns its queue, retry
//! bookkeeping and media engine. Every mutation (user commands, coordinator
//! corrections, engine callbacks, resolution results, retry timers) arrives
//! as a message on the actor's channels and is processed one at a time, so
//! no two operations ever interleave on the same state.
//!
//! Outsiders hold a cheap [`PlaybackController`] handle: commands are sent
//! fire-and-forget and state is read from a [`ControllerStatus`] snapshot
//! published through a `watch` channel after every message.
//!
//! # Module Organization
//!
//! - `actor.rs`: actor state, run loop, engine/internal message handling
//! - `selection.rs`: PlayNext, JumpTo, sweep selection, halt
//! - `loading.rs`: LoadCurrent, resolution, open completion, failure handling

mod actor;
mod loading;
mod selection;

use crate::config::PlaybackConfig;
use crate::failure::FailureClassifier;
use crate::media::{EngineEvent, MediaEngine, Services};
use crate::queue::QueueItem;
use serde::Serialize;
use std::sync::Arc;
use tessera_common::EventBus;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

/// Construction-time behavior of one controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub playback: PlaybackConfig,
    pub classifier: FailureClassifier,
    /// Start playback as soon as an item opens; shared-clock members wait
    /// in `Ready` for the coordinator instead
    pub autoplay: bool,
    pub initial_volume: f32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            classifier: FailureClassifier::default(),
            autoplay: true,
            initial_volume: 1.0,
        }
    }
}

/// Controller lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No queue, or queue not started
    Idle,
    /// Resolving or opening the current item
    Loading,
    /// Item open, waiting for a play command
    Ready,
    Playing,
    Paused,
    /// Last attempt failed; a retry is pending
    Failed,
    /// Jumped onto an item that cannot play; waits for the next jump or queue
    Parked,
    /// Terminal failure; nothing happens until the queue is replaced
    Halted,
    Disposed,
}

/// Read-only projection of a controller's state
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub window_id: String,
    pub phase: Phase,
    pub index: Option<usize>,
    /// Identity locator of the current item
    pub locator: Option<String>,
    pub title: Option<String>,
    pub loading: bool,
    pub opened: bool,
    pub buffering: bool,
    pub playing: bool,
    pub volume: f32,
    pub speed: f64,
    pub position_ms: i64,
    pub queue_len: usize,
    pub consecutive_failures: u32,
    pub halted: bool,
    /// Load attempt counter; bumps on every selection
    pub generation: u64,
}

impl ControllerStatus {
    fn initial(window_id: &str, volume: f32) -> Self {
        Self {
            window_id: window_id.to_string(),
            phase: Phase::Idle,
            index: None,
            locator: None,
            title: None,
            loading: false,
            opened: false,
            buffering: false,
            playing: false,
            volume,
            speed: 1.0,
            position_ms: 0,
            queue_len: 0,
            consecutive_failures: 0,
            halted: false,
            generation: 0,
        }
    }

    /// Item open and not buffering
    pub fn is_ready(&self) -> bool {
        self.opened && !self.buffering && !self.loading
    }

    /// Participates in group decisions
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Halted | Phase::Disposed)
    }

    /// Active and able to become ready; a parked member never will
    pub fn gates_clock(&self) -> bool {
        self.is_active() && self.phase != Phase::Parked
    }
}

/// Commands accepted by the controller actor
#[derive(Debug)]
pub(crate) enum Command {
    SetQueue(Vec<QueueItem>),
    PlayNext { force: bool },
    JumpTo(usize),
    Play,
    Pause,
    Seek(i64),
    SetVolume(f32),
    SetSpeed(f64),
    Dispose(oneshot::Sender<()>),
}

/// Handle to a controller actor
///
/// Cloning is cheap; all clones address the same actor. Commands sent after
/// disposal are silently dropped.
#[derive(Clone)]
pub struct PlaybackController {
    window_id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ControllerStatus>,
}

impl PlaybackController {
    /// Spawn the actor task for one window
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        window_id: impl Into<String>,
        options: ControllerOptions,
        services: Services,
        engine: Arc<dyn MediaEngine>,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        events: EventBus,
    ) -> Self {
        let window_id: String = window_id.into();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ControllerStatus::initial(
            &window_id,
            options.initial_volume,
        ));

        let actor = actor::ControllerActor::new(
            window_id.clone(),
            options,
            services,
            engine,
            events,
            status_tx,
        );
        tokio::spawn(actor.run(command_rx, engine_events));

        Self {
            window_id: Arc::from(window_id),
            commands: command_tx,
            status: status_rx,
        }
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    /// Latest published status
    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every published status
    pub fn subscribe_status(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!(window = %self.window_id, "Controller closed, dropping {:?}", e.0);
        }
    }

    /// Replace the queue and start from its first selection
    pub fn set_queue(&self, items: Vec<QueueItem>) {
        self.send(Command::SetQueue(items));
    }

    /// Advance to the next item; `force` abandons an in-flight load
    pub fn play_next(&self, force: bool) {
        self.send(Command::PlayNext { force });
    }

    /// Load `index` directly, bypassing sequential/shuffle selection
    pub fn jump_to(&self, index: usize) {
        self.send(Command::JumpTo(index));
    }

    pub fn play(&self) {
        self.send(Command::Play);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn seek(&self, position_ms: i64) {
        self.send(Command::Seek(position_ms));
    }

    pub fn set_volume(&self, volume: f32) {
        self.send(Command::SetVolume(volume));
    }

    pub fn set_speed(&self, speed: f64) {
        self.send(Command::SetSpeed(speed));
    }

    /// Stop the actor and wait until it has released its engine
    ///
    /// Idempotent: later calls return immediately.
    pub async fn dispose(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Dispose(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }
}
