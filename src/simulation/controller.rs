//! Bridge controller that ties everything together
//!
//! The controller is the single point that mutates gate state and chain
//! membership. Each tick it takes arrivals, applies forced and fair switches,
//! promotes waiting cars and then moves every runnable car in chain order,
//! passing each position change on to the follower before the follower moves.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;

use super::arrival::ArrivalGenerator;
use super::car::{BridgeCar, CarStep};
use super::config::{
    interval_from_frequency, scale_speed, time_limit_for, BridgeConfig, ConfigError,
    CooldownPolicy,
};
use super::follow_chain::FollowChain;
use super::forecast::ChainForecast;
use super::gate::{GateController, GateStatus};
use super::stats::BridgeStats;
use super::telemetry::{BridgeEvent, LogSink, TelemetrySink};
use super::types::{CarId, CarState, Direction, SimId};

/// Ticks kept between a projected entry and the time limit
const DEADLINE_SLACK_TICKS: u64 = 2;

/// The simulation orchestrator
pub struct BridgeController {
    config: BridgeConfig,

    /// Arena of live cars; leaders and followers refer to each other by id
    cars: HashMap<CarId, BridgeCar>,

    /// Follow chains indexed by `Direction::index`
    chains: [FollowChain; 2],

    gate: GateController,
    arrivals: ArrivalGenerator,

    /// Simulation time in ticks
    time: u64,

    /// Tick at which the next arrival may be taken
    next_arrival_at: u64,

    next_id: usize,

    /// Cars let on since the gate last changed direction
    entries_this_phase: u32,

    stats: BridgeStats,
    sink: Box<dyn TelemetrySink>,
}

impl BridgeController {
    /// Create a controller that reports telemetry to the log
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        Self::with_sink(config, Box::new(LogSink))
    }

    /// Create a controller with an explicit telemetry sink
    pub fn with_sink(
        config: BridgeConfig,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let arrivals = ArrivalGenerator::new(
            config.mean_interval_ms,
            config.auto_create,
            config.up_probability,
            config.seed,
        )?;
        let gate = GateController::new(
            Direction::Up,
            config.protect,
            config.cooldown_passes,
            config.cooldown_policy,
        );
        Ok(Self {
            config,
            cars: HashMap::new(),
            chains: [
                FollowChain::new(Direction::Up),
                FollowChain::new(Direction::Down),
            ],
            gate,
            arrivals,
            time: 0,
            next_arrival_at: 0,
            next_id: 0,
            entries_this_phase: 0,
            stats: BridgeStats::default(),
            sink,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    pub fn gate(&self) -> &GateController {
        &self.gate
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn car(&self, id: CarId) -> Option<&BridgeCar> {
        self.cars.get(&id)
    }

    pub fn cars(&self) -> impl Iterator<Item = &BridgeCar> {
        self.cars.values()
    }

    pub fn chain(&self, direction: Direction) -> &FollowChain {
        &self.chains[direction.index()]
    }

    /// Cars of `direction` currently on the bridge
    pub fn crossing_count(&self, direction: Direction) -> usize {
        self.chain(direction).crossing_count(&self.cars)
    }

    /// Cars of `direction` waiting at the entrance
    pub fn waiting_count(&self, direction: Direction) -> u32 {
        self.gate.waiting(direction)
    }

    /// Explicit arrivals not yet turned into cars
    pub fn pending_requests(&self) -> usize {
        self.arrivals.pending_requests()
    }

    /// No cars left and nothing more will arrive on its own
    pub fn is_idle(&self) -> bool {
        self.cars.is_empty() && !self.arrivals.has_arrival()
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    fn emit(&mut self, event: BridgeEvent) {
        self.sink.emit(event);
    }

    // --- configuration -------------------------------------------------

    pub fn set_car_width(&mut self, width: i32) -> Result<(), ConfigError> {
        if width <= 0 {
            return Err(ConfigError::NonPositiveCarWidth(width));
        }
        self.config.car_width = width;
        Ok(())
    }

    /// Set the arrival rate in cars per minute
    pub fn set_create_frequency(&mut self, cars_per_minute: i32) -> Result<(), ConfigError> {
        let interval = interval_from_frequency(cars_per_minute)?;
        self.set_mean_interval_ms(interval)
    }

    pub fn set_mean_interval_ms(&mut self, mean_interval_ms: f64) -> Result<(), ConfigError> {
        self.arrivals.configure(mean_interval_ms)?;
        self.config.mean_interval_ms = mean_interval_ms;
        Ok(())
    }

    /// Set the speed from raw input, scaled to units per tick
    pub fn set_car_speed(&mut self, raw: i32) -> Result<(), ConfigError> {
        self.config.car_speed = scale_speed(raw)?;
        Ok(())
    }

    pub fn set_auto_create(&mut self, on: bool) {
        self.config.auto_create = on;
        self.arrivals.set_auto_create(on);
    }

    pub fn set_up_probability(&mut self, up_probability: f64) -> Result<(), ConfigError> {
        self.arrivals.set_up_probability(up_probability)?;
        self.config.up_probability = up_probability;
        Ok(())
    }

    pub fn set_time_limit(&mut self, on: bool) {
        self.config.time_limit = time_limit_for(on);
    }

    /// Toggle drain-before-switch protection
    pub fn set_protect(&mut self, enabled: bool) {
        if !enabled {
            warn!("Bridge protection disabled: both directions may enter at once");
        }
        self.config.protect = enabled;
        self.gate.set_protect(enabled);
    }

    pub fn set_cooldown(&mut self, passes: u32, policy: CooldownPolicy) {
        self.config.cooldown_passes = passes;
        self.config.cooldown_policy = policy;
        self.gate.set_cooldown(passes, policy);
    }

    // --- arrivals ------------------------------------------------------

    /// Enqueue one explicit arrival, created when the arrival process allows
    pub fn create_car(&mut self, direction: Direction) {
        self.arrivals.create_car(direction);
    }

    /// Create a car right now, bypassing arrival pacing
    pub fn spawn_car(&mut self, direction: Direction) -> Result<CarId> {
        let id = CarId(self.next_sim_id());
        let spec = self.config.car_spec();
        let index = direction.index();

        let cap = self.chains[index].initial_cap(
            &self.cars,
            spec.bridge_length,
            self.gate.admits(direction),
        )?;
        self.cars
            .insert(id, BridgeCar::new(id, direction, spec, cap, self.time));
        self.chains[index].attach(id, &mut self.cars)?;
        self.gate.enqueue(direction);
        self.stats.cars_created += 1;

        debug!("Created {} heading {} with cap {}", id, direction, cap);
        self.emit(BridgeEvent::CarCreated { car: id, direction });

        self.promote_waiting(direction)?;
        Ok(id)
    }

    fn process_arrivals(&mut self) -> Result<()> {
        while self.time >= self.next_arrival_at {
            let Some(direction) = self.arrivals.next_direction() else {
                break;
            };
            self.spawn_car(direction)?;
            self.next_arrival_at = self.time + self.arrivals.next_delay_ticks(self.config.tick_ms);
        }
        Ok(())
    }

    // --- admission -----------------------------------------------------

    /// Promote queued cars of `direction` front to back while the gate
    /// admits them and they have room to move
    ///
    /// After the first entry of a phase, a car that would keep a waiting car
    /// of the other direction off the bridge past the time limit is held
    /// back and a switch is forced instead.
    fn promote_waiting(&mut self, direction: Direction) -> Result<()> {
        let index = direction.index();
        while self.gate.admits(direction) {
            let Some(id) = self.chains[index].queued(&self.cars).next().map(|car| car.id) else {
                break;
            };
            let is_head = self.chains[index].head() == Some(id);
            let car = self.cars.get_mut(&id).context("Queued car not found")?;
            if is_head {
                car.set_max_advance(car.spec.bridge_length)?;
            }
            if car.max_advance() <= car.position() {
                break;
            }

            if self.entries_this_phase > 0 {
                if let Some(projected) = self.entry_risk(direction, id)? {
                    self.force_toward(direction.opposite(), projected);
                    break;
                }
            }

            let now = self.time;
            let car = self.cars.get_mut(&id).context("Queued car not found")?;
            car.start(now)?;
            let waited = car.wait_ticks(now);

            self.entries_this_phase += 1;
            self.gate.promote(direction);
            self.stats.record_entry(direction, waited);
            debug!("{} entered heading {} after {} ticks", id, direction, waited);
            self.emit(BridgeEvent::CarEntered {
                car: id,
                direction,
                waited,
            });
        }
        Ok(())
    }

    // --- time limit ----------------------------------------------------

    /// Copies of the cars of `direction` on the bridge, plus `entering` as
    /// if it got on now
    fn crossing_forecast(
        &self,
        direction: Direction,
        entering: Option<CarId>,
    ) -> Result<ChainForecast> {
        let mut cars = Vec::new();
        for id in self.chain(direction).iter() {
            let car = self.cars.get(&id).context("Chain car not found")?;
            if car.state() == CarState::Crossing {
                cars.push(car.clone());
            } else if entering == Some(id) {
                let mut car = car.clone();
                car.start(self.time)?;
                cars.push(car);
            }
        }
        Ok(ChainForecast::new(cars))
    }

    /// Copy of the first waiting car of `direction` crossing alone
    fn head_forecast(&self, direction: Direction) -> Result<ChainForecast> {
        let mut cars = Vec::new();
        if let Some(car) = self.chain(direction).queued(&self.cars).next() {
            let mut car = car.clone();
            car.set_max_advance(car.spec.bridge_length)?;
            car.start(self.time)?;
            cars.push(car);
        }
        Ok(ChainForecast::new(cars))
    }

    /// Projected wait of the first queued car of `side` that would get on
    /// too close to `limit`, if `side` is admitted once every chain in
    /// `ahead` has cleared the bridge, one after the other
    fn deadline_risk(
        &self,
        side: Direction,
        ahead: Vec<ChainForecast>,
        limit: u64,
    ) -> Result<Option<u64>> {
        let waits: Vec<u64> = self
            .chain(side)
            .queued(&self.cars)
            .map(|car| car.wait_ticks(self.time))
            .collect();
        if waits.is_empty() {
            return Ok(None);
        }
        let mut cars = Vec::new();
        for id in self.chain(side).iter() {
            cars.push(self.cars.get(&id).context("Chain car not found")?.clone());
        }
        let side_forecast = ChainForecast::new(cars);

        let rough_admit = ahead
            .iter()
            .map(ChainForecast::drain_bound)
            .fold(0, u64::saturating_add);
        let rough: Vec<u64> = waits
            .iter()
            .zip(side_forecast.entry_bounds(rough_admit))
            .map(|(wait, bound)| wait.saturating_add(bound))
            .collect();
        // Cars past the last roughly late one cannot be late
        let Some(last) = rough.iter().rposition(|wait| is_late(*wait, limit)) else {
            return Ok(None);
        };

        let mut admit = 0u64;
        for forecast in ahead {
            admit = admit.saturating_add(forecast.drain_ticks()?);
        }
        let mut checked = 0;
        let mut late = None;
        side_forecast.replay_entries(admit, |offset| {
            let wait = waits[checked].saturating_add(offset);
            checked += 1;
            if is_late(wait, limit) {
                late = Some(wait);
            }
            late.is_none() && checked <= last
        })?;
        if late.is_none() && checked <= last {
            // Some of them would never get on
            late = Some(u64::MAX);
        }
        Ok(late)
    }

    /// Time limit and protection both on
    fn enforced_limit(&self) -> Option<u64> {
        self.config.time_limit.filter(|_| self.gate.protect())
    }

    /// Whether letting `id` onto the bridge now would push a waiting car of
    /// the other direction past the time limit
    fn entry_risk(&self, direction: Direction, id: CarId) -> Result<Option<u64>> {
        let Some(limit) = self.enforced_limit() else {
            return Ok(None);
        };
        let ahead = vec![self.crossing_forecast(direction, Some(id))?];
        self.deadline_risk(direction.opposite(), ahead, limit)
    }

    fn force_toward(&mut self, direction: Direction, projected: u64) {
        if self.gate.force_switch(direction) {
            self.stats.forced_switches += 1;
            info!(
                "Forcing switch to {} traffic (projected wait {} ticks)",
                direction, projected
            );
        }
    }

    /// Force a switch when a car on the side without right of way would
    /// otherwise wait past the time limit
    ///
    /// The projection replays the departing cars with their own speeds and
    /// widths, then the waiting cars getting on one behind the other.
    fn check_timeouts(&mut self) -> Result<()> {
        let Some(limit) = self.enforced_limit() else {
            return Ok(());
        };
        if self.gate.pending().is_some() {
            return Ok(());
        }
        let allowed = self.gate.current();
        let starved = allowed.opposite();

        let ahead = vec![self.crossing_forecast(allowed, None)?];
        if let Some(projected) = self.deadline_risk(starved, ahead, limit)? {
            self.force_toward(starved, projected);
        }
        Ok(())
    }

    fn evaluate_fairness(&mut self) -> Result<()> {
        let waiting = self.gate.waiting(Direction::Up) + self.gate.waiting(Direction::Down);
        if waiting == 0 {
            return Ok(());
        }

        // Switching away strands the allowed side's waiting cars for the
        // drain plus one crossing of the other side
        if let (Some(target), Some(limit)) = (self.gate.fairness_due(), self.enforced_limit()) {
            let allowed = self.gate.current();
            let ahead = vec![
                self.crossing_forecast(allowed, None)?,
                self.head_forecast(target)?,
            ];
            if let Some(projected) = self.deadline_risk(allowed, ahead, limit)? {
                debug!(
                    "Fairness switch to {} deferred, {} cars could wait {} ticks",
                    target, allowed, projected
                );
                return Ok(());
            }
        }

        if let Some(direction) = self.gate.evaluate() {
            self.stats.fair_switches += 1;
            debug!(
                "Fairness switch to {} ({} up / {} down waiting)",
                direction,
                self.gate.waiting(Direction::Up),
                self.gate.waiting(Direction::Down)
            );
        }
        Ok(())
    }

    fn complete_switch(&mut self) {
        let departing = self.gate.current();
        let on_bridge = self.crossing_count(departing);
        if let Some(direction) = self.gate.try_complete_switch(on_bridge) {
            self.entries_this_phase = 0;
            debug!("{} traffic drained, {} may enter", departing, direction);
        }
    }

    // --- movement ------------------------------------------------------

    /// Furthest position a car of `direction` may reach before touching
    /// the front of the leading oncoming car
    fn oncoming_limit(&self, direction: Direction) -> i32 {
        match self.chain(direction.opposite()).lead_crossing(&self.cars) {
            Some(oncoming) => self.config.bridge_length - oncoming.position(),
            None => i32::MAX,
        }
    }

    fn move_cars(&mut self) -> Result<()> {
        for direction in Direction::ALL {
            let index = direction.index();
            let ids: Vec<CarId> = self.chains[index].iter().collect();

            for id in ids {
                let runnable = self.cars.get(&id).is_some_and(BridgeCar::is_runnable);
                if !runnable {
                    continue;
                }
                let limit = self.oncoming_limit(direction);
                let car = self.cars.get_mut(&id).context("Car not found")?;

                match car.step(limit) {
                    CarStep::Advanced(position) => {
                        self.emit(BridgeEvent::PositionChanged { car: id, position });
                        self.chains[index].on_leader_advance(id, &mut self.cars)?;
                    }
                    CarStep::Exited => {
                        let position = car.position();
                        self.emit(BridgeEvent::PositionChanged { car: id, position });
                        self.chains[index].on_leader_advance(id, &mut self.cars)?;
                        self.emit(BridgeEvent::CarExited { car: id });

                        self.chains[index].detach_head(id)?;
                        self.cars.remove(&id);
                        self.stats.record_exit(direction);
                        debug!("{} exited heading {}", id, direction);
                    }
                    CarStep::Blocked => {
                        debug!("{} blocked head-on at {}", id, car.position());
                    }
                    CarStep::Suspended => {}
                }
            }
        }
        Ok(())
    }

    // --- observation ---------------------------------------------------

    /// Lead cars of both directions are stuck front to front
    ///
    /// Only reachable with protection disabled. Neither car can ever move
    /// again, so this is a terminal state.
    pub fn is_deadlocked(&self) -> bool {
        let up = self.chain(Direction::Up).lead_crossing(&self.cars);
        let down = self.chain(Direction::Down).lead_crossing(&self.cars);
        match (up, down) {
            (Some(up), Some(down)) => up.is_blocked_head_on() && down.is_blocked_head_on(),
            _ => false,
        }
    }

    fn detect_deadlock(&mut self) {
        if self.stats.deadlock_detected_at.is_none() && self.is_deadlocked() {
            self.stats.deadlock_detected_at = Some(self.time);
            warn!(
                "Deadlock at tick {}: {} up and {} down cars stuck on the bridge",
                self.time,
                self.crossing_count(Direction::Up),
                self.crossing_count(Direction::Down)
            );
        }
    }

    fn emit_status(&mut self) {
        let code = self.gate.status().code();
        self.emit(BridgeEvent::TrafficStatus { code });
        self.emit(BridgeEvent::CarCounts {
            up_waiting: self.gate.waiting(Direction::Up),
            down_waiting: self.gate.waiting(Direction::Down),
        });
        for direction in Direction::ALL {
            let elapsed = self.chains[direction.index()]
                .queued(&self.cars)
                .next()
                .map(|car| car.wait_ticks(self.time));
            if let Some(elapsed) = elapsed {
                self.emit(BridgeEvent::WaitTime { direction, elapsed });
            }
        }
    }

    /// Current gate status
    pub fn traffic_status(&self) -> GateStatus {
        self.gate.status()
    }

    // --- main loop -----------------------------------------------------

    /// Main simulation tick
    pub fn tick(&mut self) -> Result<()> {
        self.time += 1;

        self.process_arrivals()?;
        self.check_timeouts()?;
        self.evaluate_fairness()?;
        self.complete_switch();
        for direction in Direction::ALL {
            self.promote_waiting(direction)?;
        }
        self.move_cars()?;
        self.detect_deadlock();

        if self.time % self.config.status_period_ticks == 0 {
            self.emit_status();
        }
        Ok(())
    }

    /// Run a fixed number of ticks
    pub fn run(&mut self, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Log a summary of the bridge state
    pub fn log_summary(&self) {
        info!("=== Bridge Simulation Summary ===");
        info!("Time: {} ticks", self.time);
        info!("Gate: {:?}, protect: {}", self.gate.status(), self.gate.protect());
        for direction in Direction::ALL {
            info!(
                "  {}: waiting={}, crossing={}, exited={}, longest wait={}",
                direction,
                self.gate.waiting(direction),
                self.crossing_count(direction),
                self.stats.exited(direction),
                self.stats.longest_wait(direction)
            );
        }
        for direction in Direction::ALL {
            for id in self.chain(direction).iter() {
                if let Some(car) = self.cars.get(&id) {
                    let state = match car.state() {
                        CarState::Queued => "queued",
                        CarState::Crossing if car.is_blocked_head_on() => "blocked",
                        CarState::Crossing => "crossing",
                        CarState::Exited => "exited",
                    };
                    debug!(
                        "  {} {}: {} at {}/{}",
                        id,
                        direction,
                        state,
                        car.position(),
                        car.max_advance()
                    );
                }
            }
        }
    }
}

/// A projected wait too close to the time limit
fn is_late(wait: u64, limit: u64) -> bool {
    wait.saturating_add(DEADLINE_SLACK_TICKS) >= limit
}
