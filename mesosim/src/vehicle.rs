use crate::{LaneGroupId, LinkId, VehicleId};

/// Which of a lane group's two queues a vehicle occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// In transit across the lane group for the fixed dwell.
    Transit,
    /// Eligible for release to the next link.
    Waiting,
}

/// The mobile entity migrating between lane-group queues.
///
/// A vehicle is a member of exactly one queue at any instant; the scenario
/// moves it with an atomic remove-then-insert and keeps these fields in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vehicle {
    /// Unique ID assigned by the scenario.
    pub id: VehicleId,
    /// The link this vehicle intends to enter next, sampled when it entered
    /// its current link. `None` on a sink link.
    pub next_link: Option<LinkId>,
    /// The lane group whose queue currently holds this vehicle.
    pub lane_group: LaneGroupId,
    /// The queue within that lane group.
    pub queue: QueueKind,
}
