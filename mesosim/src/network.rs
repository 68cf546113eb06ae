use std::collections::{HashMap, VecDeque};

use ordered_float::NotNan;

use crate::{LaneGroupId, LinkId, NodeId, VehicleId};

/// Road parameters shared by all lanes of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadParams {
    /// Capacity in vehicles per hour per lane.
    pub capacity: f64,
    /// Free-flow speed in km/h.
    pub speed: f64,
    /// Jam density in vehicles per km per lane.
    pub jam_density: f64,
}

/// A junction in the network graph.
#[derive(Debug)]
pub struct Node {
    /// External ID from the scenario description.
    pub ext_id: u64,
    /// Links ending at this node.
    pub in_links: Vec<LinkId>,
    /// Links starting at this node.
    pub out_links: Vec<LinkId>,
    /// `true` if no link ends here.
    pub is_source: bool,
    /// `true` if no link starts here.
    pub is_sink: bool,
    /// `true` for a merge: more than one inbound link, exactly one outbound.
    pub is_many2one: bool,
}

impl Node {
    pub(crate) fn new(ext_id: u64) -> Self {
        Self {
            ext_id,
            in_links: Vec::new(),
            out_links: Vec::new(),
            is_source: true,
            is_sink: true,
            is_many2one: false,
        }
    }
}

/// A directed road segment between two nodes.
#[derive(Debug)]
pub struct Link {
    /// External ID from the scenario description.
    pub ext_id: u64,
    /// Length in meters.
    pub length: f64,
    /// Total number of lanes.
    pub full_lanes: usize,
    /// Upstream node.
    pub start_node: NodeId,
    /// Downstream node.
    pub end_node: NodeId,
    /// Road parameters.
    pub roadparam: RoadParams,
    /// Lane groups of this link, ordered by start lane.
    pub lane_groups: Vec<LaneGroupId>,
    /// Which of this link's lane groups can reach a given outlink. An empty
    /// table means every lane group reaches every outlink.
    pub outlink_to_lanegroups: HashMap<LinkId, Vec<LaneGroupId>>,
    /// `true` if vehicles originate here (start node has no inbound links).
    pub is_source: bool,
    /// `true` if vehicles leave the network here (end node has no outbound
    /// links).
    pub is_sink: bool,
}

impl Link {
    /// The lane groups a vehicle headed for `next_link` may join. With no
    /// next link (sink) or no reachability table, every lane group is a
    /// candidate. Returns `None` when the table exists but has no entry for
    /// `next_link`, which indicates a broken topology invariant.
    pub fn lanegroups_for_outlink(&self, next_link: Option<LinkId>) -> Option<&[LaneGroupId]> {
        match next_link {
            Some(outlink) if !self.outlink_to_lanegroups.is_empty() => self
                .outlink_to_lanegroups
                .get(&outlink)
                .map(Vec::as_slice),
            _ => Some(&self.lane_groups),
        }
    }
}

/// FIFO queue of vehicles.
#[derive(Debug, Default)]
pub struct VehicleQueue {
    inner: VecDeque<VehicleId>,
}

impl VehicleQueue {
    /// Appends a vehicle at the back.
    pub fn push_back(&mut self, vehicle: VehicleId) {
        self.inner.push_back(vehicle);
    }

    /// Removes and returns the lead vehicle.
    pub fn pop_front(&mut self) -> Option<VehicleId> {
        self.inner.pop_front()
    }

    /// The lead vehicle, if any.
    #[must_use]
    pub fn front(&self) -> Option<VehicleId> {
        self.inner.front().copied()
    }

    /// Number of vehicles in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// `true` if the queue holds no vehicles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over the queued vehicles front to back.
    pub fn iter(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.inner.iter().copied()
    }

    /// Removes all vehicles.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// A cross-section of a link's lanes sharing capacity and routing behavior.
#[derive(Debug)]
pub struct LaneGroup {
    /// Owning link.
    pub link: LinkId,
    /// First lane covered by this group (1-based).
    pub start_lane: usize,
    /// Number of lanes covered.
    pub num_lanes: usize,
    /// Capacity in vehicles; infinite for source links.
    pub max_vehicles: f64,
    /// Fixed dwell before a vehicle becomes eligible for release.
    pub transit_time_sec: f64,
    /// Vehicles in transit across the lane group.
    pub transit_queue: VehicleQueue,
    /// Vehicles eligible for release to the next link.
    pub waiting_queue: VehicleQueue,
    nom_saturation_flow_rate_vps: f64,
    saturation_flow_rate_vps: f64,
    longitudinal_supply: f64,
    cumulative_exits: u64,
    pub(crate) signalized: bool,
}

impl LaneGroup {
    /// Constructs a lane group covering `num_lanes` lanes starting at
    /// `start_lane` of the given link. Source links are unconstrained.
    #[must_use]
    pub fn new(
        link: LinkId,
        start_lane: usize,
        num_lanes: usize,
        length: f64,
        rp: RoadParams,
        unconstrained: bool,
    ) -> Self {
        let max_vehicles = if unconstrained {
            f64::INFINITY
        } else {
            rp.jam_density * (length / 1000.0) * num_lanes as f64
        };
        let rate = rp.capacity * num_lanes as f64 / 3600.0;
        Self {
            link,
            start_lane,
            num_lanes,
            max_vehicles,
            // [m] / [kph] -> [sec]
            transit_time_sec: (length / rp.speed) * 3.6,
            transit_queue: VehicleQueue::default(),
            waiting_queue: VehicleQueue::default(),
            nom_saturation_flow_rate_vps: rate,
            saturation_flow_rate_vps: rate,
            longitudinal_supply: max_vehicles,
            cumulative_exits: 0,
            signalized: false,
        }
    }

    /// Total vehicles in both queues.
    #[must_use]
    pub fn total_vehicles(&self) -> usize {
        self.transit_queue.len() + self.waiting_queue.len()
    }

    /// Remaining vehicle capacity.
    #[must_use]
    pub fn long_supply(&self) -> f64 {
        self.longitudinal_supply
    }

    /// Remaining capacity per lane, the key used to balance load across
    /// candidate lane groups.
    #[must_use]
    pub fn supply_per_lane(&self) -> f64 {
        self.longitudinal_supply / self.num_lanes as f64
    }

    /// Recomputes the longitudinal supply from the queue contents. Must be
    /// called after every queue mutation; supply is never assigned directly.
    pub fn update_long_supply(&mut self) {
        self.longitudinal_supply = self.max_vehicles - self.total_vehicles() as f64;
    }

    /// The current effective release rate of the waiting queue.
    #[must_use]
    pub fn saturation_flow_rate(&self) -> f64 {
        self.saturation_flow_rate_vps
    }

    /// The nominal (unactuated) release rate.
    #[must_use]
    pub fn nominal_saturation_flow_rate(&self) -> f64 {
        self.nom_saturation_flow_rate_vps
    }

    /// Applies an actuated rate, clamped to the nominal rate, and returns the
    /// effective rate. The caller is responsible for invalidating any service
    /// timers computed under the old rate.
    pub(crate) fn apply_actuated_rate(&mut self, rate_vps: f64) -> f64 {
        debug_assert!(rate_vps >= 0.0, "actuated rate must not be negative");
        self.saturation_flow_rate_vps = self.nom_saturation_flow_rate_vps.min(rate_vps);
        self.saturation_flow_rate_vps
    }

    /// Restores the nominal release rate.
    pub fn set_to_nominal_capacity(&mut self) {
        self.saturation_flow_rate_vps = self.nom_saturation_flow_rate_vps;
    }

    /// Number of vehicles that have left this lane group's waiting queue
    /// since the start of the run.
    #[must_use]
    pub fn cumulative_exits(&self) -> u64 {
        self.cumulative_exits
    }

    pub(crate) fn record_exit(&mut self) {
        self.cumulative_exits += 1;
    }
}

/// The static topology plus per-lane-group dynamic state. All cross
/// references are indices into the three flat arenas.
#[derive(Debug, Default)]
pub struct Network {
    /// Node arena.
    pub nodes: Vec<Node>,
    /// Link arena.
    pub links: Vec<Link>,
    /// Lane group arena.
    pub lane_groups: Vec<LaneGroup>,
}

impl Network {
    /// The node with the given ID.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[usize::from(id)]
    }

    /// The link with the given ID.
    #[must_use]
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[usize::from(id)]
    }

    /// The lane group with the given ID.
    #[must_use]
    pub fn lane_group(&self, id: LaneGroupId) -> &LaneGroup {
        &self.lane_groups[usize::from(id)]
    }

    pub(crate) fn lane_group_mut(&mut self, id: LaneGroupId) -> &mut LaneGroup {
        &mut self.lane_groups[usize::from(id)]
    }

    /// Total vehicles across all lane groups of a link.
    #[must_use]
    pub fn link_vehicles(&self, id: LinkId) -> usize {
        self.link(id)
            .lane_groups
            .iter()
            .map(|&lg| self.lane_group(lg).total_vehicles())
            .sum()
    }

    /// Cumulative exits across all lane groups of a link.
    #[must_use]
    pub fn link_exits(&self, id: LinkId) -> u64 {
        self.link(id)
            .lane_groups
            .iter()
            .map(|&lg| self.lane_group(lg).cumulative_exits())
            .sum()
    }

    /// The candidate with the greatest supply per lane. Ties go to the first
    /// candidate. Returns `None` for an empty candidate set.
    #[must_use]
    pub fn argmax_supply(&self, candidates: &[LaneGroupId]) -> Option<LaneGroupId> {
        let mut best: Option<(LaneGroupId, NotNan<f64>)> = None;
        for &id in candidates {
            let supply = NotNan::new(self.lane_group(id).supply_per_lane())
                .expect("supply per lane is NaN");
            match best {
                Some((_, max)) if supply <= max => {}
                _ => best = Some((id, supply)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Derives node `is_source`/`is_sink`/`is_many2one` and the corresponding
    /// link flags from the wiring. Called once after all links are added.
    pub(crate) fn derive_flags(&mut self) {
        for node in &mut self.nodes {
            node.is_source = node.in_links.is_empty();
            node.is_sink = node.out_links.is_empty();
            node.is_many2one = node.in_links.len() > 1 && node.out_links.len() == 1;
        }
        for index in 0..self.links.len() {
            let start = self.links[index].start_node;
            let end = self.links[index].end_node;
            self.links[index].is_source = self.nodes[usize::from(start)].is_source;
            self.links[index].is_sink = self.nodes[usize::from(end)].is_sink;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> RoadParams {
        RoadParams {
            capacity: 1800.0,
            speed: 60.0,
            jam_density: 100.0,
        }
    }

    #[test]
    fn test_lane_group_derived_quantities() {
        let lg = LaneGroup::new(LinkId::from(0), 1, 2, 500.0, params(), false);
        // 100 veh/km/lane * 0.5 km * 2 lanes
        assert_eq!(lg.max_vehicles, 100.0);
        // 500 m at 60 kph
        assert_eq!(lg.transit_time_sec, 30.0);
        // 1800 vph/lane * 2 lanes
        assert_eq!(lg.saturation_flow_rate(), 1.0);
        assert_eq!(lg.long_supply(), 100.0);
        assert_eq!(lg.supply_per_lane(), 50.0);
    }

    #[test]
    fn test_source_lane_group_is_unconstrained() {
        let lg = LaneGroup::new(LinkId::from(0), 1, 1, 100.0, params(), true);
        assert!(lg.max_vehicles.is_infinite());
        assert!(lg.long_supply().is_infinite());
    }

    #[test]
    fn test_supply_tracks_queue_contents() {
        let mut lg = LaneGroup::new(LinkId::from(0), 1, 1, 1000.0, params(), false);
        lg.transit_queue.push_back(VehicleId::from(0));
        lg.waiting_queue.push_back(VehicleId::from(1));
        lg.update_long_supply();
        assert_eq!(lg.total_vehicles(), 2);
        assert_eq!(lg.long_supply(), lg.max_vehicles - 2.0);
    }

    #[test]
    fn test_actuated_rate_clamps_to_nominal() {
        let mut lg = LaneGroup::new(LinkId::from(0), 1, 1, 1000.0, params(), false);
        let nominal = lg.nominal_saturation_flow_rate();
        assert_eq!(lg.apply_actuated_rate(f64::INFINITY), nominal);
        assert_eq!(lg.apply_actuated_rate(0.0), 0.0);
        assert_eq!(lg.apply_actuated_rate(nominal / 2.0), nominal / 2.0);
        lg.set_to_nominal_capacity();
        assert_eq!(lg.saturation_flow_rate(), nominal);
    }

    #[test]
    fn test_argmax_supply_prefers_most_room_per_lane() {
        let mut network = Network::default();
        let link = LinkId::from(0);
        let mut a = LaneGroup::new(link, 1, 2, 1000.0, params(), false);
        let b = LaneGroup::new(link, 3, 1, 1000.0, params(), false);
        // Fill the two-lane group until its per-lane supply drops below the
        // one-lane group's.
        for index in 0..150 {
            a.transit_queue.push_back(VehicleId::from(index));
        }
        a.update_long_supply();
        network.lane_groups.push(a);
        network.lane_groups.push(b);
        let candidates = [LaneGroupId::from(0), LaneGroupId::from(1)];
        assert_eq!(network.argmax_supply(&candidates), Some(LaneGroupId::from(1)));
        assert_eq!(network.argmax_supply(&[]), None);
    }
}
