//! Queue replacement, selection and terminal halt

use super::actor::{ControllerActor, Trigger};
use super::Phase;
use crate::queue::{next_sequential, validate, QueueItem};
use std::collections::HashSet;
use tessera_common::{FailureKind, PlayerEvent, TerminalReason};
use tracing::{debug, error, info, warn};

impl ControllerActor {
    /// Replace the queue and start a new session on it
    ///
    /// Failure counters, recursion depth and the halt flag are cleared; the
    /// shuffle history is kept.
    pub(super) async fn set_queue(&mut self, items: Vec<QueueItem>) {
        self.abandon_current().await;
        self.prefetcher.cancel();

        self.generation += 1;
        self.queue = items.into_iter().map(QueueItem::normalized).collect();
        self.current = None;
        self.counters.reset_all();
        self.recursion_depth = 0;
        self.halted = false;
        self.position_ms = 0;
        self.phase = Phase::Idle;

        info!(window = %self.window_id, items = self.queue.len(), "Queue replaced");

        if self.queue.is_empty() {
            return;
        }
        self.play_next(false, Trigger::External).await;
    }

    /// Select and load the next item
    pub(super) async fn play_next(&mut self, force: bool, trigger: Trigger) {
        if self.halted || self.phase == Phase::Disposed {
            debug!(window = %self.window_id, "PlayNext ignored: controller halted");
            return;
        }
        if self.loading && !force {
            warn!(
                window = %self.window_id,
                generation = self.generation,
                "PlayNext dropped: load already in progress"
            );
            return;
        }
        if self.queue.is_empty() {
            debug!(window = %self.window_id, "PlayNext ignored: queue empty");
            return;
        }

        if trigger == Trigger::Automatic {
            self.recursion_depth += 1;
            if self.recursion_depth > self.options.playback.max_recursion_depth {
                self.halt(TerminalReason::RecursionCeiling);
                return;
            }
        }

        if force && self.loading {
            debug!(window = %self.window_id, generation = self.generation, "Skipping in-flight load");
        }
        self.abandon_current().await;
        if force {
            self.prefetcher.cancel();
        }
        self.generation += 1;

        match self.select_next().await {
            Some(index) => {
                self.current = Some(index);
                self.load_current().await;
            }
            None => self.halt(TerminalReason::AllItemsExhausted),
        }
    }

    /// Load `index` directly; used by the coordinator to realign followers
    pub(super) async fn jump_to(&mut self, index: usize) {
        if self.halted || self.phase == Phase::Disposed {
            return;
        }
        if index >= self.queue.len() {
            warn!(window = %self.window_id, index, len = self.queue.len(), "JumpTo out of range");
            return;
        }

        debug!(window = %self.window_id, index, "Jumping to index");
        self.abandon_current().await;
        self.prefetcher.cancel();
        self.generation += 1;
        self.current = Some(index);

        let key = self.queue[index].key().to_string();
        if self.counters.is_exhausted(&key) {
            debug!(window = %self.window_id, index, "Jump target exhausted, parking");
            self.phase = Phase::Parked;
            return;
        }
        if let Err(e) = validate(&self.queue[index]) {
            self.counters.mark_exhausted(&key);
            self.emit_item_failed(index, FailureKind::Validation, e.to_string());
            self.phase = Phase::Parked;
            return;
        }

        self.load_current().await;
    }

    /// One sweep over the queue for an eligible item
    ///
    /// Items at the skip threshold are passed over; invalid items are marked
    /// exhausted on the spot. `None` means the whole sweep was ineligible.
    async fn select_next(&mut self) -> Option<usize> {
        let len = self.queue.len();
        let mut tried = HashSet::with_capacity(len);
        let mut cursor = self.current;

        loop {
            let index = if self.options.playback.shuffle {
                let (index, reset) = self.history.pick(&self.queue, &tried, &mut self.rng)?;
                self.persist_pick(index, reset).await;
                index
            } else {
                if tried.len() >= len {
                    return None;
                }
                let index = next_sequential(cursor, len)?;
                cursor = Some(index);
                index
            };
            tried.insert(index);

            let key = self.queue[index].key().to_string();
            if self.counters.is_exhausted(&key) {
                debug!(window = %self.window_id, index, "Skipping exhausted item: {}", key);
                continue;
            }
            if let Err(e) = validate(&self.queue[index]) {
                self.counters.mark_exhausted(&key);
                self.emit_item_failed(index, FailureKind::Validation, e.to_string());
                continue;
            }
            return Some(index);
        }
    }

    async fn persist_pick(&self, index: usize, reset: bool) {
        let store = &self.services.store;
        if reset {
            debug!(window = %self.window_id, "Shuffle history covers queue, resetting");
            if let Err(e) = store.clear_played(&self.window_id).await {
                warn!(window = %self.window_id, "Failed to clear played history: {}", e);
            }
        }
        if let Err(e) = store
            .append_played(&self.window_id, self.queue[index].key())
            .await
        {
            warn!(window = %self.window_id, "Failed to record played item: {}", e);
        }
    }

    /// Stop automatic retries until the queue is replaced
    ///
    /// Emits exactly one terminal failure per halt.
    pub(super) fn halt(&mut self, reason: TerminalReason) {
        if self.halted {
            return;
        }
        if let Some(token) = self.load_cancel.take() {
            token.cancel();
        }
        self.prefetcher.cancel();
        self.engine.stop();

        self.halted = true;
        self.phase = Phase::Halted;
        self.loading = false;
        self.opened = false;
        self.playing = false;
        self.expected_source = None;
        self.recursion_depth = 0;

        error!(window = %self.window_id, "Controller halted: {}", reason);
        self.events.emit_lossy(PlayerEvent::TerminalFailure {
            window_id: self.window_id.clone(),
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    pub(super) fn emit_item_failed(&self, index: usize, kind: FailureKind, reason: String) {
        let locator = self.queue[index].key().to_string();
        warn!(window = %self.window_id, index, %kind, "Item failed: {} ({})", locator, reason);
        self.events.emit_lossy(PlayerEvent::ItemFailed {
            window_id: self.window_id.clone(),
            index,
            locator,
            kind,
            reason,
            timestamp: chrono::Utc::now(),
        });
    }
}
