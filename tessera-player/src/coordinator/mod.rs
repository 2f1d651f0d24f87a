//! Cross-window sync coordinator
//!
//! Runs on a fixed tick. Each tick it reads every group member's status
//! snapshot and issues corrective commands through the controllers' public
//! surface; it holds no playback state of its own beyond edge detection and
//! log rate limiting.
//!
//! Per group, in order:
//! 1. **Index alignment**: the first active, unparked member holding an
//!    index is the master; followers on another index get a forced jump
//! 2. **Clock gate** (shared-clock groups): reset on the all-loading edge,
//!    pause while anyone is unready, start and resume members once everyone
//!    is ready, mirror clock speed into members. A member parked on an item
//!    it cannot play is left out of the gate.
//! 3. **Follower muting**: every member after the first is held at zero volume

mod group;

pub use group::{GroupHandle, GroupStatus};

use crate::config::SyncConfig;
use crate::controller::ControllerStatus;
use std::collections::HashMap;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SPEED_EPSILON: f64 = 1e-9;

#[derive(Debug, Default)]
struct GroupTickState {
    all_loading: bool,
    last_stall_log: Option<Instant>,
}

/// Fixed-tick scheduler over all sync groups
pub struct SyncCoordinator {
    config: SyncConfig,
    groups: Vec<GroupHandle>,
    state: HashMap<String, GroupTickState>,
}

impl SyncCoordinator {
    pub fn new(config: SyncConfig, groups: Vec<GroupHandle>) -> Self {
        Self {
            config,
            groups,
            state: HashMap::new(),
        }
    }

    pub fn groups(&self) -> &[GroupHandle] {
        &self.groups
    }

    /// Run one coordination pass over every group
    ///
    /// Never blocks: reads watch snapshots and sends channel commands only.
    pub fn tick(&mut self) {
        for group in &self.groups {
            let state = self.state.entry(group.name().to_string()).or_default();
            tick_group(group, state, &self.config);
        }
    }

    /// Drive [`tick`](Self::tick) on the configured interval until `shutdown` fires
    pub fn spawn(mut self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.tick_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                groups = self.groups.len(),
                "Sync coordinator started (tick {:?})",
                self.config.tick_interval()
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.tick(),
                }
            }

            info!("Sync coordinator stopped");
        })
    }
}

fn tick_group(group: &GroupHandle, state: &mut GroupTickState, config: &SyncConfig) {
    let members = group.members();
    let statuses: Vec<ControllerStatus> = members.iter().map(|m| m.status()).collect();
    let active: Vec<usize> = (0..statuses.len())
        .filter(|&i| statuses[i].is_active())
        .collect();
    // Parked members stay aligned but never hold up the clock
    let gating: Vec<usize> = active
        .iter()
        .copied()
        .filter(|&i| statuses[i].gates_clock())
        .collect();

    if members.len() >= 2 {
        align_indices(group, &statuses, &active);
        mute_followers(group, &statuses);
    }

    if let Some(clock) = group.clock() {
        if gating.is_empty() {
            state.all_loading = false;
            return;
        }

        let all_loading = gating.iter().all(|&i| statuses[i].loading);
        if all_loading && !state.all_loading {
            debug!(group = group.name(), "All members loading, resetting clock");
            clock.reset();
        }
        state.all_loading = all_loading;

        let all_ready = gating.iter().all(|&i| statuses[i].is_ready());
        if !all_ready {
            if clock.is_running() {
                info!(group = group.name(), "Member not ready, pausing shared clock");
                clock.pause();
                for &i in &gating {
                    if statuses[i].playing {
                        members[i].pause();
                    }
                }
            }
            log_stall(group, state, config, &statuses, &gating);
        } else {
            state.last_stall_log = None;
            if !clock.is_running() && !group.is_held() {
                debug!(group = group.name(), "All members ready, starting shared clock");
                clock.start();
                for &i in &gating {
                    if !statuses[i].playing {
                        members[i].play();
                    }
                }
            }
        }

        let speed = clock.speed();
        for &i in &gating {
            if (statuses[i].speed - speed).abs() > SPEED_EPSILON {
                members[i].set_speed(speed);
            }
        }
    }
}

/// Force followers onto the master's index
///
/// The master is the first member that holds an index and is not parked.
fn align_indices(group: &GroupHandle, statuses: &[ControllerStatus], active: &[usize]) {
    let Some((master, target)) = active
        .iter()
        .filter(|&&i| statuses[i].gates_clock())
        .find_map(|&i| statuses[i].index.map(|index| (i, index)))
    else {
        return;
    };

    for &i in active {
        if i == master || statuses[i].index == Some(target) {
            continue;
        }
        if target >= statuses[i].queue_len {
            debug!(
                group = group.name(),
                window = %statuses[i].window_id,
                target,
                "Follower queue too short to align"
            );
            continue;
        }
        info!(
            group = group.name(),
            window = %statuses[i].window_id,
            from = ?statuses[i].index,
            to = target,
            "Aligning follower to master index"
        );
        group.members()[i].jump_to(target);
    }
}

/// Member 0 is the only audio source
fn mute_followers(group: &GroupHandle, statuses: &[ControllerStatus]) {
    for (member, status) in group.members().iter().zip(statuses).skip(1) {
        if status.volume > 0.0 && !matches!(status.phase, crate::controller::Phase::Disposed) {
            debug!(group = group.name(), window = %status.window_id, "Muting follower");
            member.set_volume(0.0);
        }
    }
}

fn log_stall(
    group: &GroupHandle,
    state: &mut GroupTickState,
    config: &SyncConfig,
    statuses: &[ControllerStatus],
    gating: &[usize],
) {
    let now = Instant::now();
    if let Some(last) = state.last_stall_log {
        if now.duration_since(last) < config.stall_log_interval() {
            return;
        }
    }
    state.last_stall_log = Some(now);

    let summary: Vec<String> = gating
        .iter()
        .map(|&i| {
            let s = &statuses[i];
            format!(
                "{}[index={:?} opened={} buffering={} loading={}]",
                s.window_id, s.index, s.opened, s.buffering, s.loading
            )
        })
        .collect();
    info!(group = group.name(), "Shared clock waiting: {}", summary.join(" "));
}
