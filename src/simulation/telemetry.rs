//! Telemetry emitted by the bridge simulation
//!
//! The controller pushes events into a sink registered at construction.

use log::{debug, trace};
use std::sync::mpsc::Sender;

use super::types::{CarId, Direction};

/// Events observable from outside the simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    CarCreated {
        car: CarId,
        direction: Direction,
    },
    /// Car promoted from the queue onto the bridge
    CarEntered {
        car: CarId,
        direction: Direction,
        waited: u64,
    },
    PositionChanged {
        car: CarId,
        position: i32,
    },
    CarExited {
        car: CarId,
    },
    /// Wait so far of the front queued car of a direction
    WaitTime {
        direction: Direction,
        elapsed: u64,
    },
    /// 1 = up allowed, 2 = down allowed, 3 = switch in progress
    TrafficStatus {
        code: u8,
    },
    CarCounts {
        up_waiting: u32,
        down_waiting: u32,
    },
}

/// Receiver of simulation events
pub trait TelemetrySink {
    fn emit(&mut self, event: BridgeEvent);
}

/// Writes events to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::PositionChanged { car, position } => trace!("{car} at {position}"),
            other => debug!("{other:?}"),
        }
    }
}

/// Drops every event
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&mut self, _event: BridgeEvent) {}
}

/// Forwards events over a channel; a closed receiver is ignored
impl TelemetrySink for Sender<BridgeEvent> {
    fn emit(&mut self, event: BridgeEvent) {
        let _ = self.send(event);
    }
}
