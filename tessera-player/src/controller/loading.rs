//! Loading the current item and handling its outcome

use super::actor::{ControllerActor, Internal, PendingOpen};
use super::Phase;
use crate::error::Error;
use crate::media::OpenError;
use crate::queue::QueueItem;
use tessera_common::{FailureKind, PlayerEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl ControllerActor {
    /// Open the item at the current index
    ///
    /// Page locators that are not cached are resolved on a spawned task
    /// under this load's cancellation token; the result comes back as
    /// [`Internal::Resolved`] tagged with the load generation.
    pub(super) async fn load_current(&mut self) {
        let Some(index) = self.current else {
            return;
        };
        let item = self.queue[index].clone();
        let generation = self.generation;

        self.loading = true;
        self.phase = Phase::Loading;
        self.opened = false;
        self.playing = false;
        self.buffering = false;
        self.position_ms = 0;
        self.expected_source = None;

        self.resume_seek = None;
        if self.options.playback.remember_position {
            match self.services.store.position(item.key()).await {
                Ok(Some(position)) if position > 0 => self.resume_seek = Some(position),
                Ok(_) => {}
                Err(e) => warn!(window = %self.window_id, "Failed to read position for {}: {}", item.key(), e),
            }
        }

        let cancel = CancellationToken::new();
        self.load_cancel = Some(cancel.clone());

        info!(
            window = %self.window_id,
            index,
            generation,
            "Loading {}",
            item.key()
        );

        if let Some(path) = self.cached_substitute(&item.locator) {
            self.open_item(index, path, None);
            return;
        }

        if item.is_remote && self.services.resolver.needs_resolution(&item.locator) {
            let resolver = self.services.resolver.clone();
            let internal_tx = self.internal_tx.clone();
            let page = item.locator.clone();
            tokio::spawn(async move {
                // The resolver observes the token itself; whatever it returns
                // is checked against the generation on arrival
                let result = resolver.resolve_direct_locator(&page, &cancel).await;
                let _ = internal_tx.send(Internal::Resolved {
                    generation,
                    index,
                    result,
                });
            });
            return;
        }

        let page = item.original_page_locator.clone();
        self.open_item(index, item.locator, page);
    }

    /// Cached file to open instead of `locator`, if usable
    ///
    /// A partial download is skipped when the saved resume position is far
    /// enough in that the file probably does not reach it.
    fn cached_substitute(&self, locator: &str) -> Option<String> {
        let cached = self.services.cache.cached(locator)?;
        if cached.partial {
            let resume = self.resume_seek.unwrap_or(0);
            if resume >= self.options.playback.stale_partial_resume_ms {
                debug!(
                    window = %self.window_id,
                    resume_ms = resume,
                    "Ignoring partial cache entry for {}",
                    locator
                );
                return None;
            }
        }
        Some(cached.path.to_string_lossy().into_owned())
    }

    pub(super) fn on_resolved(
        &mut self,
        generation: u64,
        index: usize,
        result: Result<String, Error>,
    ) {
        if generation != self.generation || !self.loading || self.current != Some(index) {
            debug!(
                window = %self.window_id,
                generation,
                current = self.generation,
                "Discarding stale resolution result"
            );
            return;
        }

        match result {
            Ok(direct) => {
                let page = self.queue[index].locator.clone();
                let target = self.cached_substitute(&direct).unwrap_or(direct);
                self.open_item(index, target, Some(page));
            }
            Err(e) => {
                self.load_cancel = None;
                self.handle_failure(index, FailureKind::Resolution, e.to_string());
            }
        }
    }

    /// Submit the open request and record the expected source
    ///
    /// The request id is the load generation, so a reopen of the same
    /// locator by a later load is still told apart from this one.
    fn open_item(&mut self, index: usize, target: String, page: Option<String>) {
        let headers = self
            .services
            .resolver
            .request_headers(&target, page.as_deref());

        let request = self.generation;
        self.expected_source = Some(PendingOpen {
            request,
            locator: target.clone(),
        });
        if let Err(e) = self.engine.open(request, &target, &headers) {
            self.expected_source = None;
            let kind = self.classifier.classify(&OpenError::new(e.to_string()));
            self.handle_failure(index, kind, e.to_string());
            return;
        }
        debug!(window = %self.window_id, index, request, "Open submitted: {}", target);
    }

    pub(super) fn on_open_completed(
        &mut self,
        request: u64,
        locator: String,
        error: Option<OpenError>,
    ) {
        let live = self
            .expected_source
            .as_ref()
            .is_some_and(|pending| pending.request == request && pending.locator == locator);
        if !self.loading || !live {
            debug!(
                window = %self.window_id,
                request,
                echo = %locator,
                expected = ?self.expected_source,
                "Ignoring stale open completion"
            );
            return;
        }
        let Some(index) = self.current else {
            return;
        };
        self.expected_source = None;
        self.load_cancel = None;

        match error {
            Some(error) => {
                let kind = self.classifier.classify(&error);
                self.handle_failure(index, kind, error.to_string());
            }
            None => self.on_opened(index, locator),
        }
    }

    /// `source` is the locator the engine actually opened
    fn on_opened(&mut self, index: usize, source: String) {
        let item: &QueueItem = &self.queue[index];
        let key = item.key().to_string();
        let title = item.display_title.clone();

        self.loading = false;
        self.opened = true;
        self.recursion_depth = 0;
        self.counters.clear_item(&key);
        self.counters.reset_session();

        self.apply_volume();
        self.engine.set_speed(self.speed);
        if let Some(position) = self.resume_seek.take() {
            debug!(window = %self.window_id, position_ms = position, "Resuming");
            self.engine.seek(position);
            self.position_ms = position;
        }

        if self.options.autoplay {
            self.engine.play();
            self.playing = true;
            self.phase = Phase::Playing;
        } else {
            self.phase = Phase::Ready;
        }

        info!(window = %self.window_id, index, "Opened {}", key);
        self.events.emit_lossy(PlayerEvent::ItemOpened {
            window_id: self.window_id.clone(),
            index,
            locator: source,
            title,
            timestamp: chrono::Utc::now(),
        });
        if !self.buffering {
            self.emit_ready();
        }

        let counters = &self.counters;
        self.prefetcher
            .schedule(&self.queue, index, |item| !counters.is_exhausted(item.key()));
    }

    /// Count a failed attempt and either halt or schedule a retry
    pub(super) fn handle_failure(&mut self, index: usize, kind: FailureKind, reason: String) {
        self.loading = false;
        self.opened = false;
        self.playing = false;
        self.expected_source = None;
        if let Some(token) = self.load_cancel.take() {
            token.cancel();
        }

        let key = self.queue[index].key().to_string();
        if kind.exhausts_item() {
            self.counters.mark_exhausted(&key);
        } else {
            self.counters.record_item_failure(&key);
        }
        self.emit_item_failed(index, kind, reason);

        if self.counters.record_session_failure() {
            self.halt(tessera_common::TerminalReason::ConsecutiveFailures);
            return;
        }

        self.phase = Phase::Failed;
        let delay = if kind == FailureKind::ResourceExhaustion {
            self.options.playback.exhaustion_retry_delay()
        } else {
            self.options.playback.retry_delay()
        };
        debug!(
            window = %self.window_id,
            failures = self.counters.consecutive(),
            "Retrying in {:?}",
            delay
        );

        let generation = self.generation;
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal_tx.send(Internal::RetryDue { generation });
        });
    }
}
