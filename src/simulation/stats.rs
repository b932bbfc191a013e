//! Run statistics for the bridge simulation

use super::types::Direction;

/// Counters aggregated by the controller over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub cars_created: u64,
    /// Cars promoted onto the bridge, per direction
    pub entered: [u64; 2],
    /// Cars that reached the far end, per direction
    pub exited: [u64; 2],
    /// Longest wait observed at promotion, per direction
    pub longest_wait: [u64; 2],
    pub fair_switches: u64,
    pub forced_switches: u64,
    /// Tick at which a head-on deadlock was first seen
    pub deadlock_detected_at: Option<u64>,
}

impl BridgeStats {
    pub fn entered(&self, direction: Direction) -> u64 {
        self.entered[direction.index()]
    }

    pub fn exited(&self, direction: Direction) -> u64 {
        self.exited[direction.index()]
    }

    pub fn longest_wait(&self, direction: Direction) -> u64 {
        self.longest_wait[direction.index()]
    }

    pub fn total_exited(&self) -> u64 {
        self.exited.iter().sum()
    }

    pub fn overall_longest_wait(&self) -> u64 {
        self.longest_wait.iter().copied().max().unwrap_or(0)
    }

    pub(crate) fn record_entry(&mut self, direction: Direction, waited: u64) {
        let index = direction.index();
        self.entered[index] += 1;
        self.longest_wait[index] = self.longest_wait[index].max(waited);
    }

    pub(crate) fn record_exit(&mut self, direction: Direction) {
        self.exited[direction.index()] += 1;
    }

    /// Get a summary string for display
    pub fn summary(&self) -> String {
        format!(
            "Created: {} | Exited up/down: {}/{} | Longest wait: {} ticks | Switches fair/forced: {}/{}",
            self.cars_created,
            self.exited(Direction::Up),
            self.exited(Direction::Down),
            self.overall_longest_wait(),
            self.fair_switches,
            self.forced_switches
        )
    }
}
