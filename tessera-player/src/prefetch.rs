//! Look-ahead pre-fetching
//!
//! After every successful open the controller asks its [`PreFetcher`] to
//! warm one upcoming queue entry: resolve its page locator (if any) and
//! download it fully into the content cache. At most one ticket is live per
//! controller; scheduling a new one cancels the previous ticket first.
//!
//! Outcomes are delivered back to the owning controller over a channel, so
//! the controller (not the background task) is the only writer of its queue.

use crate::media::{QualityHint, Services};
use crate::queue::QueueItem;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A live look-ahead request
#[derive(Debug)]
pub struct PreBufferTicket {
    pub id: u64,
    pub target_index: usize,
    /// Identity locator of the target item
    pub target_locator: String,
    /// Cached file once the ticket has completed
    pub cache_handle: Option<PathBuf>,
    cancel: CancellationToken,
}

impl PreBufferTicket {
    pub fn is_complete(&self) -> bool {
        self.cache_handle.is_some()
    }
}

/// Result of a completed ticket
#[derive(Debug, Clone)]
pub struct PrefetchOutcome {
    pub ticket_id: u64,
    pub index: usize,
    /// Identity locator of the item the ticket was issued for
    pub source_locator: String,
    /// Direct locator, if the item was a page reference
    pub resolved_locator: Option<String>,
    pub cache_path: PathBuf,
}

/// Per-controller prefetch manager
pub struct PreFetcher {
    window_id: String,
    services: Services,
    lookahead: usize,
    outcomes: mpsc::UnboundedSender<PrefetchOutcome>,
    current: Option<PreBufferTicket>,
    next_ticket_id: u64,
}

impl PreFetcher {
    pub fn new(
        window_id: impl Into<String>,
        services: &Services,
        lookahead: usize,
        outcomes: mpsc::UnboundedSender<PrefetchOutcome>,
    ) -> Self {
        Self {
            window_id: window_id.into(),
            services: services.clone(),
            lookahead,
            outcomes,
            current: None,
            next_ticket_id: 1,
        }
    }

    /// Pick the look-ahead target after `current`
    ///
    /// Scans up to `lookahead` positions forward (wrapping, never the current
    /// index). The first remote candidate with a high quality hint wins;
    /// otherwise the nearest remote candidate is taken.
    pub fn choose_target(
        &self,
        queue: &[QueueItem],
        current: usize,
        eligible: impl Fn(&QueueItem) -> bool,
    ) -> Option<usize> {
        let len = queue.len();
        if len < 2 {
            return None;
        }

        let mut nearest = None;
        for offset in 1..=self.lookahead.min(len - 1) {
            let index = (current + offset) % len;
            let item = &queue[index];
            if !item.is_remote || !eligible(item) {
                continue;
            }
            if self.services.resolver.quality_hint(&item.locator) == QualityHint::High {
                return Some(index);
            }
            if nearest.is_none() {
                nearest = Some(index);
            }
        }
        nearest
    }

    /// Replace the live ticket with one for the next look-ahead target
    ///
    /// Returns the new ticket id, or `None` if there was nothing to warm.
    pub fn schedule(
        &mut self,
        queue: &[QueueItem],
        current: usize,
        eligible: impl Fn(&QueueItem) -> bool,
    ) -> Option<u64> {
        self.cancel();

        let index = self.choose_target(queue, current, eligible)?;
        let item = queue[index].clone();
        let id = self.next_ticket_id;
        self.next_ticket_id += 1;

        let cancel = CancellationToken::new();
        let mut ticket = PreBufferTicket {
            id,
            target_index: index,
            target_locator: item.key().to_string(),
            cache_handle: None,
            cancel: cancel.clone(),
        };

        if let Some(cached) = self.services.cache.cached(&item.locator) {
            if !cached.partial {
                debug!(
                    window = %self.window_id,
                    index,
                    "Prefetch target already cached: {}",
                    cached.path.display()
                );
                ticket.cache_handle = Some(cached.path.clone());
                let _ = self.outcomes.send(PrefetchOutcome {
                    ticket_id: id,
                    index,
                    source_locator: ticket.target_locator.clone(),
                    resolved_locator: None,
                    cache_path: cached.path,
                });
                self.current = Some(ticket);
                return Some(id);
            }
        }

        debug!(window = %self.window_id, index, ticket = id, "Prefetching {}", item.key());
        tokio::spawn(run_ticket(
            self.window_id.clone(),
            self.services.clone(),
            id,
            index,
            item,
            cancel,
            self.outcomes.clone(),
        ));

        self.current = Some(ticket);
        Some(id)
    }

    /// Cancel and drop the live ticket, if any
    pub fn cancel(&mut self) {
        if let Some(ticket) = self.current.take() {
            if !ticket.is_complete() {
                debug!(window = %self.window_id, ticket = ticket.id, "Cancelling prefetch");
            }
            ticket.cancel.cancel();
        }
    }

    pub fn ticket(&self) -> Option<&PreBufferTicket> {
        self.current.as_ref()
    }

    /// Record a completed outcome; false if its ticket has been superseded
    pub fn complete(&mut self, outcome: &PrefetchOutcome) -> bool {
        match self.current.as_mut() {
            Some(ticket) if ticket.id == outcome.ticket_id => {
                ticket.cache_handle = Some(outcome.cache_path.clone());
                true
            }
            _ => false,
        }
    }
}

impl Drop for PreFetcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_ticket(
    window_id: String,
    services: Services,
    ticket_id: u64,
    index: usize,
    item: QueueItem,
    cancel: CancellationToken,
    outcomes: mpsc::UnboundedSender<PrefetchOutcome>,
) {
    let source_locator = item.key().to_string();
    let mut direct = item.locator.clone();
    let mut resolved_locator = None;

    if services.resolver.needs_resolution(&item.locator) {
        // Collaborators that honor the token report their own cancellation
        let result = tokio::select! {
            biased;
            result = services.resolver.resolve_direct_locator(&item.locator, &cancel) => result,
            _ = cancel.cancelled() => return,
        };
        match result {
            Ok(locator) => {
                direct = locator.clone();
                resolved_locator = Some(locator);
            }
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(window = %window_id, ticket = ticket_id, "Prefetch resolution failed: {}", e);
                }
                return;
            }
        }
    }

    let cache_path = match services.cache.cached(&direct) {
        Some(cached) if !cached.partial => cached.path,
        _ => {
            let page = item
                .original_page_locator
                .as_deref()
                .or(resolved_locator.as_ref().map(|_| item.locator.as_str()));
            let headers = services.resolver.request_headers(&direct, page);
            let result = tokio::select! {
                biased;
                result = services.cache.download(&direct, &headers, &cancel) => result,
                _ = cancel.cancelled() => return,
            };
            match result {
                Ok(path) => path,
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(window = %window_id, ticket = ticket_id, "Prefetch download failed: {}", e);
                    }
                    return;
                }
            }
        }
    };

    if cancel.is_cancelled() {
        return;
    }

    debug!(window = %window_id, ticket = ticket_id, "Prefetch complete: {}", cache_path.display());
    let _ = outcomes.send(PrefetchOutcome {
        ticket_id,
        index,
        source_locator,
        resolved_locator,
        cache_path,
    });
}
