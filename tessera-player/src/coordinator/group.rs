//! Sync group handle
//!
//! A group is plain composition: an ordered list of controller handles plus
//! an optional shared clock. Member 0 is the audio source. The handle exposes
//! the same command surface as a single controller and an aggregated status
//! projection.

use crate::clock::{ClockSnapshot, SharedClock};
use crate::controller::{ControllerStatus, PlaybackController};
use crate::queue::QueueItem;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Aggregated view of a group
#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub name: String,
    /// Index held by the first active, unparked member
    pub index: Option<usize>,
    pub all_ready: bool,
    pub any_loading: bool,
    /// Playback held by an explicit group pause
    pub held: bool,
    pub clock: Option<ClockSnapshot>,
    pub members: Vec<ControllerStatus>,
}

/// Handle to a named set of controllers
#[derive(Clone)]
pub struct GroupHandle {
    name: Arc<str>,
    members: Vec<PlaybackController>,
    clock: Option<SharedClock>,
    held: Arc<AtomicBool>,
}

impl GroupHandle {
    pub fn new(
        name: impl Into<String>,
        members: Vec<PlaybackController>,
        clock: Option<SharedClock>,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            members,
            clock,
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[PlaybackController] {
        &self.members
    }

    pub fn clock(&self) -> Option<&SharedClock> {
        self.clock.as_ref()
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> GroupStatus {
        let members: Vec<ControllerStatus> = self.members.iter().map(|m| m.status()).collect();
        let gating: Vec<&ControllerStatus> =
            members.iter().filter(|s| s.gates_clock()).collect();

        GroupStatus {
            name: self.name.to_string(),
            index: gating.iter().find_map(|s| s.index),
            all_ready: !gating.is_empty() && gating.iter().all(|s| s.is_ready()),
            any_loading: gating.iter().any(|s| s.loading),
            held: self.is_held(),
            clock: self.clock.as_ref().map(|c| c.snapshot()),
            members,
        }
    }

    /// Give every member the same queue
    pub fn set_queue(&self, items: Vec<QueueItem>) {
        self.held.store(false, Ordering::SeqCst);
        for member in &self.members {
            member.set_queue(items.clone());
        }
    }

    /// Release a hold; shared-clock groups restart once all members are ready
    pub fn play(&self) {
        self.held.store(false, Ordering::SeqCst);
        if self.clock.is_some() {
            return;
        }
        for member in &self.members {
            member.play();
        }
    }

    /// Pause every member and hold the shared clock
    pub fn pause(&self) {
        self.held.store(true, Ordering::SeqCst);
        if let Some(clock) = &self.clock {
            clock.pause();
        }
        for member in &self.members {
            member.pause();
        }
    }

    /// Coordinated skip: every member abandons its load and selects again
    pub fn next(&self) {
        for member in &self.members {
            member.play_next(true);
        }
    }

    /// Change playback speed; shared-clock members follow the clock
    pub fn set_speed(&self, speed: f64) -> bool {
        match &self.clock {
            Some(clock) => clock.set_speed(speed),
            None => {
                if !speed.is_finite() || speed < 0.0 {
                    return false;
                }
                for member in &self.members {
                    member.set_speed(speed);
                }
                true
            }
        }
    }
}
