use std::collections::HashMap;

use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaChaRng;
use simcore::Dispatcher;

use crate::events::{EventKind, EventTarget, SimEvent};
use crate::signal::SignalActuator;
use crate::stochastic::service_period;
use crate::{
    ActuatorId, ControllerId, Demand, DemandId, Error, LaneGroupId, LinkId, Network, Output,
    OutputId, QueueKind, Result, SplitMatrixProfile, StageController, StochasticProcess, Vehicle,
    VehicleId,
};

/// Rates below this are treated as "never" when rescheduling service timers
/// after an actuated capacity change.
const MIN_SERVICE_RATE_VPS: f64 = 1e-4;

/// The simulation spine: owns the dispatcher, the network, and every dynamic
/// entity, and executes event actions.
///
/// All mutation happens inside [`Scenario::step`] (one event action run to
/// completion) and the registration methods called while assembling the
/// scenario. An action may register or cancel events but never executes
/// another action synchronously.
pub struct Scenario {
    /// Pending events and the simulation clock.
    pub dispatcher: Dispatcher<SimEvent>,
    /// The network substrate.
    pub network: Network,
    vehicles: HashMap<VehicleId, Vehicle>,
    next_vehicle_id: usize,
    vehicles_exited: u64,
    demands: Vec<Demand>,
    splits: HashMap<LinkId, SplitMatrixProfile>,
    actuators: Vec<SignalActuator>,
    controllers: Vec<StageController>,
    outputs: Vec<Output>,
    process: StochasticProcess,
    rng: ChaChaRng,
    initialized: bool,
    horizon: f64,
}

impl Scenario {
    /// Constructs a scenario over a built network. With no seed the RNG is
    /// initialized from entropy; pass one for reproducible runs.
    #[must_use]
    pub fn new(network: Network, process: StochasticProcess, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaChaRng::seed_from_u64(seed),
            None => ChaChaRng::from_entropy(),
        };
        Self {
            dispatcher: Dispatcher::new(),
            network,
            vehicles: HashMap::new(),
            next_vehicle_id: 0,
            vehicles_exited: 0,
            demands: Vec::new(),
            splits: HashMap::new(),
            actuators: Vec::new(),
            controllers: Vec::new(),
            outputs: Vec::new(),
            process,
            rng,
            initialized: false,
            horizon: 0.0,
        }
    }

    // ── assembly ─────────────────────────────────────────────────────────

    /// Attaches a demand generator, returning its ID.
    pub fn add_demand(&mut self, demand: Demand) -> DemandId {
        self.demands.push(demand);
        DemandId::from(self.demands.len() - 1)
    }

    /// Attaches a split profile to its link.
    ///
    /// # Errors
    ///
    /// Returns an error if the link already has one.
    pub fn set_split_profile(
        &mut self,
        profile: SplitMatrixProfile,
        ext_link_id: u64,
    ) -> Result<()> {
        if self.splits.contains_key(&profile.link) {
            return Err(Error::DuplicateSplitProfile(ext_link_id));
        }
        self.splits.insert(profile.link, profile);
        Ok(())
    }

    /// Attaches a signal actuator, claiming the lane groups of its phases.
    ///
    /// # Errors
    ///
    /// Returns an error if any lane group is already claimed by a phase,
    /// here or on another signal.
    pub fn add_signal(&mut self, actuator: SignalActuator) -> Result<ActuatorId> {
        for phase in &actuator.phases {
            for &lane_group in &phase.lane_groups {
                let lg = self.network.lane_group_mut(lane_group);
                if lg.signalized {
                    return Err(Error::LaneGroupClaimed(lane_group));
                }
                lg.signalized = true;
            }
        }
        self.actuators.push(actuator);
        Ok(ActuatorId::from(self.actuators.len() - 1))
    }

    /// Attaches a controller, returning its ID.
    pub fn add_controller(&mut self, controller: StageController) -> ControllerId {
        self.controllers.push(controller);
        ControllerId::from(self.controllers.len() - 1)
    }

    /// Attaches an output writer, returning its ID.
    pub fn add_output(&mut self, output: Output) -> OutputId {
        self.outputs.push(output);
        OutputId::from(self.outputs.len() - 1)
    }

    /// Places `count` vehicles into one queue of a lane group before (or
    /// between) runs. Vehicles seeded into the transit queue are scheduled to
    /// finish their dwell; waiting vehicles are immediately eligible for
    /// release.
    ///
    /// The next link is the explicit one if given, the only outlink if there
    /// is exactly one, and `None` on a sink link.
    ///
    /// # Errors
    ///
    /// Returns an error when the vehicles do not fit the lane group, or when
    /// no next link is given and the end node has several outlinks.
    pub fn seed_vehicles(
        &mut self,
        lane_group: LaneGroupId,
        queue: QueueKind,
        count: usize,
        next_link: Option<LinkId>,
    ) -> Result<()> {
        let link = self.network.lane_group(lane_group).link;
        let next = if self.network.link(link).is_sink {
            None
        } else {
            match next_link {
                Some(next) => Some(next),
                None => {
                    let outs = &self.network.node(self.network.link(link).end_node).out_links;
                    if outs.len() == 1 {
                        Some(outs[0])
                    } else {
                        return Err(Error::AmbiguousNextLink(link));
                    }
                }
            }
        };
        let lg = self.network.lane_group(lane_group);
        let occupied = lg.total_vehicles();
        if (occupied + count) as f64 > lg.max_vehicles {
            return Err(Error::SeedExceedsCapacity {
                lane_group,
                requested: count,
                capacity: lg.max_vehicles,
                occupied,
            });
        }
        let now = self.dispatcher.current_time();
        let dwell = lg.transit_time_sec;
        for _ in 0..count {
            let vehicle = self.alloc_vehicle();
            self.vehicles.insert(
                vehicle,
                Vehicle {
                    id: vehicle,
                    next_link: next,
                    lane_group,
                    queue,
                },
            );
            let lg = self.network.lane_group_mut(lane_group);
            match queue {
                QueueKind::Transit => lg.transit_queue.push_back(vehicle),
                QueueKind::Waiting => lg.waiting_queue.push_back(vehicle),
            }
            if queue == QueueKind::Transit {
                self.dispatcher
                    .register(now + dwell, SimEvent::TransitToWaiting { vehicle })?;
            }
        }
        self.network.lane_group_mut(lane_group).update_long_supply();
        Ok(())
    }

    // ── running ──────────────────────────────────────────────────────────

    /// Runs for `duration` simulated seconds past the previous stop bound,
    /// then returns the clock. See [`Scenario::run_until`].
    ///
    /// # Errors
    ///
    /// Returns an error when an event action hits a fatal condition.
    pub fn advance(&mut self, duration: f64) -> Result<f64> {
        self.run_until(self.horizon + duration)
    }

    /// Runs until every event up to and including `stop_time` has been
    /// executed, then returns the clock.
    ///
    /// The stop bound is non-destructive: events beyond it stay pending, so
    /// consecutive calls resume the run.
    ///
    /// # Errors
    ///
    /// Returns an error when an event action hits a fatal condition.
    pub fn run_until(&mut self, stop_time: f64) -> Result<f64> {
        if !self.initialized {
            self.initialize()?;
        }
        let start = self.dispatcher.current_time();
        let pb = ProgressBar::new((stop_time - start).max(0.0).ceil() as u64)
            .with_style(ProgressStyle::default_bar().template("{msg} {wide_bar} {percent}%"));
        while self.dispatcher.peek_time().map_or(false, |t| t <= stop_time) {
            let entry = self.dispatcher.pop().expect("peeked event disappeared");
            let time = entry.time();
            self.act(time, entry.into_event())?;
            let secs = (time - start) as u64;
            if pb.position() < secs {
                pb.set_position(secs);
                pb.set_message(&format!(
                    "[{time}s] [V={created}] [A={active}] [X={exited}]",
                    time = time as u64,
                    created = self.vehicles_created(),
                    active = self.vehicles.len(),
                    exited = self.vehicles_exited,
                ));
            }
        }
        pb.finish();
        self.horizon = self.horizon.max(stop_time);
        self.flush_outputs()?;
        Ok(self.dispatcher.current_time())
    }

    /// Runs until the pending event set is empty. Only meaningful for
    /// scenarios whose event chains terminate (e.g., all rates fall to
    /// zero); self-perpetuating service timers never exhaust.
    ///
    /// # Errors
    ///
    /// Returns an error when an event action hits a fatal condition.
    pub fn run_to_exhaustion(&mut self) -> Result<f64> {
        if !self.initialized {
            self.initialize()?;
        }
        while self.step()? {}
        self.flush_outputs()?;
        Ok(self.dispatcher.current_time())
    }

    /// Executes the action of the earliest pending event. Returns `false`
    /// when no events are pending.
    ///
    /// # Errors
    ///
    /// Returns an error when the action hits a fatal condition.
    pub fn step(&mut self) -> Result<bool> {
        match self.dispatcher.pop() {
            Some(entry) => {
                let time = entry.time();
                self.act(time, entry.into_event())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Seeds the initial event chains: a service opportunity per lane group,
    /// the demand and split change chains, controller pokes, periodic
    /// actuator pokes, and output sampling pokes.
    fn initialize(&mut self) -> Result<()> {
        let now = self.dispatcher.current_time();
        for index in 0..self.network.lane_groups.len() {
            self.schedule_service(LaneGroupId::from(index))?;
        }
        for index in 0..self.demands.len() {
            let step = self.demands[index].step_for_time(now);
            self.dispatcher.register(
                now,
                SimEvent::DemandChange {
                    demand: DemandId::from(index),
                    step,
                },
            )?;
        }
        let links: Vec<LinkId> = self.splits.keys().copied().collect();
        for link in links {
            let step = self.splits[&link].profile().step_for_time(now);
            self.dispatcher
                .register(now, SimEvent::SplitChange { link, step })?;
        }
        for index in 0..self.controllers.len() {
            self.dispatcher.register(
                now,
                SimEvent::ControllerPoke {
                    controller: ControllerId::from(index),
                    periodic: true,
                },
            )?;
        }
        for index in 0..self.actuators.len() {
            if self.actuators[index].dt.is_some() {
                self.dispatcher.register(
                    now,
                    SimEvent::ActuatorPoke {
                        actuator: ActuatorId::from(index),
                    },
                )?;
            }
        }
        for index in 0..self.outputs.len() {
            if self.outputs[index].kind.is_timed() {
                self.dispatcher.register(
                    now,
                    SimEvent::OutputPoke {
                        output: OutputId::from(index),
                    },
                )?;
            }
        }
        self.initialized = true;
        Ok(())
    }

    // ── event actions ────────────────────────────────────────────────────

    fn act(&mut self, time: f64, event: SimEvent) -> Result<()> {
        match event {
            SimEvent::DemandChange { demand, step } => self.act_demand_change(time, demand, step),
            SimEvent::SplitChange { link, step } => self.act_split_change(link, step),
            SimEvent::CreateVehicle { demand } => self.act_create_vehicle(time, demand),
            SimEvent::TransitToWaiting { vehicle } => self.act_transit_to_waiting(vehicle),
            SimEvent::ServiceWaitingQueue { lane_group } => {
                self.act_service_waiting_queue(time, lane_group)
            }
            SimEvent::ControllerPoke {
                controller,
                periodic,
            } => self.act_controller_poke(time, controller, periodic),
            SimEvent::ActuatorPoke { actuator } => self.act_actuator_poke(time, actuator),
            SimEvent::OutputPoke { output } => self.act_output_poke(time, output),
        }
    }

    fn act_demand_change(&mut self, time: f64, demand: DemandId, step: usize) -> Result<()> {
        let index = usize::from(demand);
        let value_vph = self.demands[index].value_at_step(step);
        self.demands[index].set_current_vph(value_vph);
        log::debug!(
            "[{:.2}] demand on link {} set to {} vph",
            time,
            self.network.link(self.demands[index].link).ext_id,
            value_vph
        );
        if let Some((change_time, next_step)) = self.demands[index].change_following(step) {
            self.dispatcher.register(
                change_time,
                SimEvent::DemandChange {
                    demand,
                    step: next_step,
                },
            )?;
        }
        if self.demands[index].current_rate_vps() > 0.0 {
            self.schedule_next_vehicle(demand)?;
        }
        Ok(())
    }

    fn act_split_change(&mut self, link: LinkId, step: usize) -> Result<()> {
        let profile = self
            .splits
            .get_mut(&link)
            .expect("split change addressed to a link without a profile");
        profile.install_step(step);
        let following = profile.profile().change_following(step);
        if let Some((change_time, next_step)) = following {
            self.dispatcher.register(
                change_time,
                SimEvent::SplitChange {
                    link,
                    step: next_step,
                },
            )?;
        }
        Ok(())
    }

    fn act_create_vehicle(&mut self, time: f64, demand: DemandId) -> Result<()> {
        let index = usize::from(demand);
        self.demands[index].set_vehicle_scheduled(false);
        let link = self.demands[index].link;
        match self.place_vehicle(link)? {
            Some((target, next)) => {
                let vehicle = self.alloc_vehicle();
                log::trace!(
                    "[{:.2}] vehicle {} created on link {}",
                    time,
                    vehicle,
                    self.network.link(link).ext_id
                );
                self.commit_entry(vehicle, target, next)?;
            }
            None => log::warn!(
                "[{:.2}] vehicle dropped at source link {}: no supply",
                time,
                self.network.link(link).ext_id
            ),
        }
        self.schedule_next_vehicle(demand)
    }

    fn act_transit_to_waiting(&mut self, vehicle: VehicleId) -> Result<()> {
        let lane_group = self
            .vehicles
            .get(&vehicle)
            .expect("dwelling vehicle missing from the arena")
            .lane_group;
        let lg = self.network.lane_group_mut(lane_group);
        let lead = lg
            .transit_queue
            .pop_front()
            .expect("transit queue empty on transit-to-waiting");
        assert_eq!(
            lead, vehicle,
            "transit queue head does not match the dwelling vehicle"
        );
        lg.waiting_queue.push_back(vehicle);
        lg.update_long_supply();
        self.vehicles
            .get_mut(&vehicle)
            .expect("dwelling vehicle missing from the arena")
            .queue = QueueKind::Waiting;
        Ok(())
    }

    fn act_service_waiting_queue(&mut self, time: f64, lane_group: LaneGroupId) -> Result<()> {
        // The next opportunity first, at the current (possibly updated) rate.
        self.schedule_service(lane_group)?;
        let lead = match self.network.lane_group(lane_group).waiting_queue.front() {
            Some(vehicle) => vehicle,
            None => return Ok(()),
        };
        let link = self.network.lane_group(lane_group).link;
        if self.network.link(link).is_sink {
            self.pop_waiting_head(lane_group, lead);
            self.vehicles
                .remove(&lead)
                .expect("released vehicle missing from the arena");
            self.vehicles_exited += 1;
            log::trace!(
                "[{:.2}] vehicle {} left the network at link {}",
                time,
                lead,
                self.network.link(link).ext_id
            );
        } else {
            let next = self.vehicles[&lead]
                .next_link
                .expect("vehicle on a non-sink link has no next link");
            if let Some((target, onward)) = self.place_vehicle(next)? {
                self.pop_waiting_head(lane_group, lead);
                log::trace!(
                    "[{:.2}] vehicle {} released from link {} to link {}",
                    time,
                    lead,
                    self.network.link(link).ext_id,
                    self.network.link(next).ext_id
                );
                self.commit_entry(lead, target, onward)?;
            }
            // Otherwise the downstream supply is below one whole vehicle and
            // the head stays put.
        }
        Ok(())
    }

    fn act_controller_poke(
        &mut self,
        time: f64,
        controller: ControllerId,
        periodic: bool,
    ) -> Result<()> {
        let index = usize::from(controller);
        let (stage, stage_end, changed, ext_id, command, actuator_ids, dt) = {
            let ctrl = &mut self.controllers[index];
            let at = ctrl.stage_for_time(time);
            let changed = ctrl.current_stage != Some(at.index);
            ctrl.current_stage = Some(at.index);
            (
                at.index,
                time - at.reltime + ctrl.stages[at.index].duration,
                changed,
                ctrl.ext_id,
                ctrl.command_for_stage(at.index),
                ctrl.actuators.clone(),
                ctrl.dt,
            )
        };
        // Wake again when the stage ends. Exactly one stage-boundary chain
        // stays alive: boundary pokes always extend it, while a periodic
        // poke only starts one when it observed the change itself (stage
        // pokes run first on shared timestamps, so mid-stage periodic
        // wake-ups see no change and register nothing).
        if !periodic || changed {
            self.dispatcher.register(
                stage_end,
                SimEvent::ControllerPoke {
                    controller,
                    periodic: false,
                },
            )?;
        }
        for actuator in actuator_ids {
            self.actuators[usize::from(actuator)].command = Some(command.clone());
            if self.actuators[usize::from(actuator)].dt.is_none() {
                self.apply_actuator_command(actuator)?;
            }
        }
        if periodic {
            if let Some(dt) = dt {
                self.dispatcher.register(
                    time + dt,
                    SimEvent::ControllerPoke {
                        controller,
                        periodic: true,
                    },
                )?;
            }
        }
        if changed {
            log::debug!("[{:.2}] controller {} entered stage {}", time, ext_id, stage);
            for output in &mut self.outputs {
                output.write_controller_event(time, ext_id, stage)?;
            }
        }
        Ok(())
    }

    fn act_actuator_poke(&mut self, time: f64, actuator: ActuatorId) -> Result<()> {
        self.apply_actuator_command(actuator)?;
        if let Some(dt) = self.actuators[usize::from(actuator)].dt {
            self.dispatcher
                .register(time + dt, SimEvent::ActuatorPoke { actuator })?;
        }
        Ok(())
    }

    fn act_output_poke(&mut self, time: f64, output: OutputId) -> Result<()> {
        let index = usize::from(output);
        self.outputs[index].write_sample(time, &self.network)?;
        let dt = self.outputs[index].dt.expect("timed output without a cadence");
        self.dispatcher
            .register(time + dt, SimEvent::OutputPoke { output })?;
        Ok(())
    }

    // ── queueing and routing ─────────────────────────────────────────────

    /// Resolves where a vehicle entering `link` would land: samples its next
    /// link, picks the candidate lane group with the greatest supply per
    /// lane, and gates on room for one whole vehicle. Returns `None` when
    /// the entry is blocked.
    fn place_vehicle(&mut self, link: LinkId) -> Result<Option<(LaneGroupId, Option<LinkId>)>> {
        let next = if self.network.link(link).is_sink {
            None
        } else {
            Some(self.sample_next_link(link)?)
        };
        let target = {
            let candidates = match self.network.link(link).lanegroups_for_outlink(next) {
                Some(candidates) if !candidates.is_empty() => candidates,
                _ => {
                    let outlink = next.expect("link was built without lane groups");
                    return Err(Error::NoCandidateLaneGroups { link, outlink });
                }
            };
            self.network
                .argmax_supply(candidates)
                .expect("candidate set is non-empty")
        };
        if self.network.lane_group(target).long_supply() < 1.0 {
            return Ok(None);
        }
        Ok(Some((target, next)))
    }

    /// Samples the next link for a vehicle entering `link`: the link's split
    /// profile when it has one, otherwise a uniform choice among outlinks.
    fn sample_next_link(&mut self, link: LinkId) -> Result<LinkId> {
        if let Some(profile) = self.splits.get(&link) {
            profile.sample_outlink(&mut self.rng)
        } else {
            let end_node = self.network.link(link).end_node;
            let outs = &self.network.node(end_node).out_links;
            debug_assert!(!outs.is_empty(), "non-sink link has no outlinks");
            Ok(outs[self.rng.gen_range(0..outs.len())])
        }
    }

    /// Moves a vehicle into the target lane group's transit queue and
    /// schedules the end of its dwell. The vehicle's bookkeeping is updated
    /// atomically with the queue insertion.
    fn commit_entry(
        &mut self,
        vehicle: VehicleId,
        target: LaneGroupId,
        next: Option<LinkId>,
    ) -> Result<()> {
        let now = self.dispatcher.current_time();
        let dwell = {
            let lg = self.network.lane_group_mut(target);
            lg.transit_queue.push_back(vehicle);
            lg.update_long_supply();
            lg.transit_time_sec
        };
        self.vehicles.insert(
            vehicle,
            Vehicle {
                id: vehicle,
                next_link: next,
                lane_group: target,
                queue: QueueKind::Transit,
            },
        );
        self.dispatcher
            .register(now + dwell, SimEvent::TransitToWaiting { vehicle })?;
        Ok(())
    }

    /// Removes the lead vehicle from a waiting queue, counting the exit and
    /// recomputing the supply.
    fn pop_waiting_head(&mut self, lane_group: LaneGroupId, expected: VehicleId) {
        let lg = self.network.lane_group_mut(lane_group);
        let popped = lg
            .waiting_queue
            .pop_front()
            .expect("waiting queue emptied while servicing its head");
        assert_eq!(popped, expected, "waiting queue head changed during service");
        lg.record_exit();
        lg.update_long_supply();
    }

    /// Schedules the next creation event for a demand unless one is already
    /// pending or the rate is zero.
    fn schedule_next_vehicle(&mut self, demand: DemandId) -> Result<()> {
        let index = usize::from(demand);
        if self.demands[index].is_vehicle_scheduled() {
            return Ok(());
        }
        let rate = self.demands[index].current_rate_vps();
        if let Some(wait) = service_period(rate, self.process, &mut self.rng) {
            let time = self.dispatcher.current_time() + wait;
            self.dispatcher
                .register(time, SimEvent::CreateVehicle { demand })?;
            self.demands[index].set_vehicle_scheduled(true);
        }
        Ok(())
    }

    /// Schedules the next service opportunity for a lane group at its
    /// current rate. A zero rate schedules nothing.
    fn schedule_service(&mut self, lane_group: LaneGroupId) -> Result<()> {
        let rate = self.network.lane_group(lane_group).saturation_flow_rate();
        if let Some(wait) = service_period(rate, self.process, &mut self.rng) {
            let time = self.dispatcher.current_time() + wait;
            self.dispatcher
                .register(time, SimEvent::ServiceWaitingQueue { lane_group })?;
        }
        Ok(())
    }

    /// Applies an actuated rate to a lane group. The pending service timer
    /// was computed under the old rate and is invalid, so it is cancelled
    /// before a replacement is scheduled from the new rate.
    fn set_actuator_capacity(&mut self, lane_group: LaneGroupId, rate_vps: f64) -> Result<()> {
        let effective = self
            .network
            .lane_group_mut(lane_group)
            .apply_actuated_rate(rate_vps);
        self.dispatcher
            .cancel_for(EventTarget::LaneGroup(lane_group), EventKind::ServiceWaitingQueue);
        if effective > MIN_SERVICE_RATE_VPS {
            self.schedule_service(lane_group)?;
        }
        Ok(())
    }

    /// Pushes an actuator's pending command to its lane groups: commanded
    /// phases get their color, absent phases go red.
    fn apply_actuator_command(&mut self, actuator: ActuatorId) -> Result<()> {
        let index = usize::from(actuator);
        let command = match self.actuators[index].command.clone() {
            Some(command) => command,
            None => return Ok(()),
        };
        for phase_index in 0..self.actuators[index].phases.len() {
            let phase_id = self.actuators[index].phases[phase_index].phase_id;
            let color = SignalActuator::commanded_color(&command, phase_id);
            self.actuators[index].phases[phase_index].bulb_color = color;
            let lane_groups = self.actuators[index].phases[phase_index].lane_groups.clone();
            for lane_group in lane_groups {
                self.set_actuator_capacity(lane_group, color.rate_vps())?;
            }
        }
        Ok(())
    }

    fn alloc_vehicle(&mut self) -> VehicleId {
        let id = VehicleId::from(self.next_vehicle_id);
        self.next_vehicle_id += 1;
        id
    }

    fn flush_outputs(&mut self) -> Result<()> {
        for output in &mut self.outputs {
            output.flush()?;
        }
        Ok(())
    }

    // ── observation ──────────────────────────────────────────────────────

    /// The current simulation time.
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.dispatcher.current_time()
    }

    /// Number of vehicles created since construction, including seeded ones.
    #[must_use]
    pub fn vehicles_created(&self) -> u64 {
        self.next_vehicle_id as u64
    }

    /// Number of vehicles currently in the network.
    #[must_use]
    pub fn vehicles_active(&self) -> usize {
        self.vehicles.len()
    }

    /// Number of vehicles that have left the network at a sink.
    #[must_use]
    pub fn vehicles_exited(&self) -> u64 {
        self.vehicles_exited
    }

    /// The vehicle with the given ID, if it is still in the network.
    #[must_use]
    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    /// Iterates over the vehicles currently in the network.
    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// The demand with the given ID.
    #[must_use]
    pub fn demand(&self, id: DemandId) -> &Demand {
        &self.demands[usize::from(id)]
    }

    /// The controller with the given ID.
    #[must_use]
    pub fn controller(&self, id: ControllerId) -> &StageController {
        &self.controllers[usize::from(id)]
    }

    /// The actuator with the given ID.
    #[must_use]
    pub fn actuator(&self, id: ActuatorId) -> &SignalActuator {
        &self.actuators[usize::from(id)]
    }

    /// The split profile attached to a link, if any.
    #[must_use]
    pub fn split_profile(&self, link: LinkId) -> Option<&SplitMatrixProfile> {
        self.splits.get(&link)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::{LaneGroup, Link, Node, RoadParams};
    use crate::signal::{BulbColor, SignalPhase};
    use crate::{NodeId, Stage};

    fn params() -> RoadParams {
        RoadParams {
            capacity: 1800.0,
            speed: 60.0,
            jam_density: 100.0,
        }
    }

    /// A single constrained link with one lane group; node 0 has no inbound
    /// links, but the lane group is built finite to observe its capacity.
    fn single_link_network() -> Network {
        let mut network = Network::default();
        network.nodes.push(Node::new(1));
        network.nodes.push(Node::new(2));
        network.nodes[0].out_links.push(LinkId::from(0));
        network.nodes[1].in_links.push(LinkId::from(0));
        network.links.push(Link {
            ext_id: 10,
            length: 500.0,
            full_lanes: 1,
            start_node: NodeId::from(0),
            end_node: NodeId::from(1),
            roadparam: params(),
            lane_groups: vec![LaneGroupId::from(0)],
            outlink_to_lanegroups: HashMap::new(),
            is_source: false,
            is_sink: false,
        });
        network.derive_flags();
        network
            .lane_groups
            .push(LaneGroup::new(LinkId::from(0), 1, 1, 500.0, params(), false));
        network
    }

    #[test]
    fn test_capacity_change_cancels_and_reschedules_service() {
        let mut scenario =
            Scenario::new(single_link_network(), StochasticProcess::Poisson, Some(17));
        let lane_group = LaneGroupId::from(0);
        scenario.schedule_service(lane_group).unwrap();
        assert_eq!(scenario.dispatcher.len(), 1);

        // Red: the stale timer goes away and nothing replaces it.
        scenario.set_actuator_capacity(lane_group, 0.0).unwrap();
        assert_eq!(scenario.dispatcher.len(), 0);
        assert_eq!(scenario.network.lane_group(lane_group).saturation_flow_rate(), 0.0);

        // Green: clamped to nominal, one fresh timer.
        scenario
            .set_actuator_capacity(lane_group, f64::INFINITY)
            .unwrap();
        assert_eq!(scenario.dispatcher.len(), 1);
        assert_eq!(scenario.network.lane_group(lane_group).saturation_flow_rate(), 0.5);
    }

    #[test]
    fn test_second_claim_on_a_lane_group_is_fatal() {
        let mut scenario =
            Scenario::new(single_link_network(), StochasticProcess::Poisson, Some(17));
        let lane_group = LaneGroupId::from(0);
        scenario
            .add_signal(SignalActuator::new(
                5,
                NodeId::from(1),
                None,
                vec![SignalPhase::new(0, vec![lane_group])],
            ))
            .unwrap();
        let second = SignalActuator::new(
            6,
            NodeId::from(1),
            None,
            vec![SignalPhase::new(0, vec![lane_group])],
        );
        assert!(matches!(
            scenario.add_signal(second),
            Err(Error::LaneGroupClaimed(lg)) if lg == lane_group
        ));
    }

    #[test]
    fn test_controller_commands_green_then_red() {
        let mut scenario =
            Scenario::new(single_link_network(), StochasticProcess::Poisson, Some(17));
        let lane_group = LaneGroupId::from(0);
        let actuator = scenario
            .add_signal(SignalActuator::new(
                5,
                NodeId::from(1),
                None,
                vec![SignalPhase::new(0, vec![lane_group])],
            ))
            .unwrap();
        scenario.add_controller(
            StageController::new(
                0,
                vec![actuator],
                None,
                60.0,
                0.0,
                vec![
                    Stage {
                        duration: 30.0,
                        phase_ids: vec![0],
                    },
                    Stage {
                        duration: 30.0,
                        phase_ids: vec![],
                    },
                ],
            )
            .unwrap(),
        );

        // The initial poke turns the phase green at its nominal rate.
        scenario.advance(0.0).unwrap();
        assert_eq!(scenario.actuator(actuator).phases[0].bulb_color, BulbColor::Green);
        assert_eq!(scenario.network.lane_group(lane_group).saturation_flow_rate(), 0.5);

        // The second stage has no phases, so the phase goes red, not
        // "unchanged".
        scenario.advance(31.0).unwrap();
        assert_eq!(scenario.actuator(actuator).phases[0].bulb_color, BulbColor::Red);
        assert_eq!(scenario.network.lane_group(lane_group).saturation_flow_rate(), 0.0);
    }
}
