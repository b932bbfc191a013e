//! Gate (traffic light) logic for the bridge simulation
//!
//! The gate decides which direction may enter the bridge. Switches are
//! requested by the fairness pass or forced by a car that waited too long.
//! With protection on, a requested switch only completes once the departing
//! direction has no car left on the bridge.

use log::{debug, info};

use super::config::CooldownPolicy;
use super::types::Direction;

/// Read-only gate status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    ExclusiveUp,
    ExclusiveDown,
    SwitchInProgress,
}

impl GateStatus {
    /// Numeric code reported in traffic status telemetry
    pub fn code(self) -> u8 {
        match self {
            GateStatus::ExclusiveUp => 1,
            GateStatus::ExclusiveDown => 2,
            GateStatus::SwitchInProgress => 3,
        }
    }
}

/// Why a switch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    Fairness,
    Timeout,
}

/// Admission control for the single lane
#[derive(Debug, Clone)]
pub struct GateController {
    current: Direction,
    pending: Option<Direction>,
    protect: bool,
    waiting: [u32; 2],
    cooldown_remaining: u32,
    cooldown_passes: u32,
    policy: CooldownPolicy,
    fair_switches: u64,
    forced_switches: u64,
}

impl GateController {
    pub fn new(
        initial: Direction,
        protect: bool,
        cooldown_passes: u32,
        policy: CooldownPolicy,
    ) -> Self {
        Self {
            current: initial,
            pending: None,
            protect,
            waiting: [0; 2],
            cooldown_remaining: 0,
            cooldown_passes,
            policy,
            fair_switches: 0,
            forced_switches: 0,
        }
    }

    pub fn current(&self) -> Direction {
        self.current
    }

    pub fn pending(&self) -> Option<Direction> {
        self.pending
    }

    pub fn protect(&self) -> bool {
        self.protect
    }

    pub fn waiting(&self, direction: Direction) -> u32 {
        self.waiting[direction.index()]
    }

    pub fn cooldown_remaining(&self) -> u32 {
        self.cooldown_remaining
    }

    pub fn fair_switches(&self) -> u64 {
        self.fair_switches
    }

    pub fn forced_switches(&self) -> u64 {
        self.forced_switches
    }

    pub fn status(&self) -> GateStatus {
        match (self.pending, self.current) {
            (Some(_), _) => GateStatus::SwitchInProgress,
            (None, Direction::Up) => GateStatus::ExclusiveUp,
            (None, Direction::Down) => GateStatus::ExclusiveDown,
        }
    }

    /// Whether a car of `direction` may enter right now
    pub fn admits(&self, direction: Direction) -> bool {
        if !self.protect {
            return true;
        }
        self.pending.is_none() && self.current == direction
    }

    /// A car started waiting at the entrance
    pub fn enqueue(&mut self, direction: Direction) {
        self.waiting[direction.index()] += 1;
    }

    /// A waiting car entered the bridge
    pub fn promote(&mut self, direction: Direction) {
        let count = &mut self.waiting[direction.index()];
        *count = count.saturating_sub(1);
    }

    pub fn set_protect(&mut self, enabled: bool) {
        self.protect = enabled;
        if !enabled {
            // Nothing to drain for when both sides may enter
            if let Some(target) = self.pending.take() {
                self.current = target;
            }
        }
    }

    pub fn set_cooldown(&mut self, passes: u32, policy: CooldownPolicy) {
        self.cooldown_passes = passes;
        self.policy = policy;
    }

    /// Direction the next fairness pass would switch to, if any
    pub fn fairness_due(&self) -> Option<Direction> {
        if self.pending.is_some() || self.cooldown_remaining > 0 {
            return None;
        }
        let opposite = self.current.opposite();
        (self.waiting(opposite) > self.waiting(self.current)).then_some(opposite)
    }

    /// Fairness pass
    ///
    /// Requests a switch when more cars wait on the other side and the
    /// cooldown has run out. Returns the requested direction.
    pub fn evaluate(&mut self) -> Option<Direction> {
        if self.pending.is_some() {
            return None;
        }
        if self.cooldown_remaining > 0 {
            self.cooldown_remaining -= 1;
            return None;
        }

        let opposite = self.current.opposite();
        let flip = self.waiting(opposite) > self.waiting(self.current);

        if self.policy == CooldownPolicy::OnEvaluation {
            self.cooldown_remaining = self.cooldown_passes;
        }
        if !flip {
            return None;
        }

        self.fair_switches += 1;
        self.request_switch(opposite, SwitchReason::Fairness);
        Some(opposite)
    }

    /// Anti-starvation escape, ignoring cooldown and counts
    ///
    /// Returns false when `direction` already has, or is about to get, the
    /// right of way.
    pub fn force_switch(&mut self, direction: Direction) -> bool {
        if self.pending == Some(direction) {
            return false;
        }
        if self.current == direction {
            // Either already allowed or a switch away is underway; a pending
            // switch is never cancelled so the other side cannot starve.
            return false;
        }
        self.forced_switches += 1;
        self.request_switch(direction, SwitchReason::Timeout);
        true
    }

    /// Complete a pending switch once the departing direction has drained
    ///
    /// `departing_on_bridge` is the number of cars of the current direction
    /// still on the bridge. Returns the newly allowed direction.
    pub fn try_complete_switch(&mut self, departing_on_bridge: usize) -> Option<Direction> {
        let target = self.pending?;
        if self.protect && departing_on_bridge > 0 {
            return None;
        }
        self.pending = None;
        self.current = target;
        info!("Gate now allows {} traffic", target);
        Some(target)
    }

    fn request_switch(&mut self, target: Direction, reason: SwitchReason) {
        if self.policy == CooldownPolicy::OnSwitch || reason == SwitchReason::Timeout {
            self.cooldown_remaining = self.cooldown_passes;
        }
        if self.protect {
            debug!(
                "Switch to {} requested ({:?}), waiting for {} traffic to drain",
                target, reason, self.current
            );
            self.pending = Some(target);
        } else {
            info!("Gate now allows {} traffic ({:?}, unprotected)", target, reason);
            self.current = target;
        }
    }
}
