use strum::EnumDiscriminants;

use crate::{ActuatorId, ControllerId, DemandId, LaneGroupId, LinkId, OutputId, VehicleId};

// Dispatch orders break ties between events sharing a timestamp; lower runs
// first. Profile changes land before control pokes, pokes before vehicle
// motion, and output sampling last, so a sample at time t observes every
// change applied at t.
const ORDER_PROFILE_CHANGE: u32 = 0;
const ORDER_STAGE_POKE: u32 = 2;
const ORDER_ACTUATOR_POKE: u32 = 3;
const ORDER_PERIODIC_POKE: u32 = 20;
const ORDER_CREATE_VEHICLE: u32 = 40;
const ORDER_TRANSIT_TO_WAITING: u32 = 44;
const ORDER_SERVICE_QUEUE: u32 = 45;
const ORDER_OUTPUT_SAMPLE: u32 = 70;

/// The closed set of event kinds driving the simulation.
///
/// Every mutation of simulation state happens inside the action of one of
/// these variants, executed by [`Scenario`](crate::Scenario) when the
/// dispatcher hands the event out.
#[derive(Debug, Clone, Copy, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(EventKind))]
pub enum SimEvent {
    /// Apply step `step` of a demand's rate profile and chain the next step.
    DemandChange {
        /// The demand whose rate changes.
        demand: DemandId,
        /// Profile step to install.
        step: usize,
    },
    /// Install step `step` of a link's split profile and chain the next step.
    SplitChange {
        /// The link whose split profile changes.
        link: LinkId,
        /// Profile step to install.
        step: usize,
    },
    /// Create one vehicle at a demand's source link.
    CreateVehicle {
        /// The demand creating the vehicle.
        demand: DemandId,
    },
    /// Move a vehicle from its lane group's transit queue to the waiting
    /// queue after the fixed dwell.
    TransitToWaiting {
        /// The vehicle that finished its dwell.
        vehicle: VehicleId,
    },
    /// A service opportunity for a lane group's waiting queue.
    ServiceWaitingQueue {
        /// The serviced lane group.
        lane_group: LaneGroupId,
    },
    /// Wake a controller to recompute and push its command.
    ControllerPoke {
        /// The controller to wake.
        controller: ControllerId,
        /// `true` for the fixed-period chain, `false` for stage-boundary
        /// wake-ups.
        periodic: bool,
    },
    /// Wake an actuator with its own period to process its pending command.
    ActuatorPoke {
        /// The actuator to wake.
        actuator: ActuatorId,
    },
    /// Wake a timed output writer to sample the network.
    OutputPoke {
        /// The output to wake.
        output: OutputId,
    },
}

/// Identity of the entity an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    /// A demand generator.
    Demand(DemandId),
    /// A link (split profiles are keyed by their link).
    Link(LinkId),
    /// A vehicle.
    Vehicle(VehicleId),
    /// A lane group.
    LaneGroup(LaneGroupId),
    /// A controller.
    Controller(ControllerId),
    /// An actuator.
    Actuator(ActuatorId),
    /// An output writer.
    Output(OutputId),
}

impl simcore::Event for SimEvent {
    type Kind = EventKind;
    type Target = EventTarget;

    fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    fn target(&self) -> Option<EventTarget> {
        match *self {
            SimEvent::DemandChange { demand, .. } | SimEvent::CreateVehicle { demand } => {
                Some(EventTarget::Demand(demand))
            }
            SimEvent::SplitChange { link, .. } => Some(EventTarget::Link(link)),
            SimEvent::TransitToWaiting { vehicle } => Some(EventTarget::Vehicle(vehicle)),
            SimEvent::ServiceWaitingQueue { lane_group } => {
                Some(EventTarget::LaneGroup(lane_group))
            }
            SimEvent::ControllerPoke { controller, .. } => {
                Some(EventTarget::Controller(controller))
            }
            SimEvent::ActuatorPoke { actuator } => Some(EventTarget::Actuator(actuator)),
            SimEvent::OutputPoke { output } => Some(EventTarget::Output(output)),
        }
    }

    fn dispatch_order(&self) -> u32 {
        match *self {
            SimEvent::DemandChange { .. } | SimEvent::SplitChange { .. } => ORDER_PROFILE_CHANGE,
            SimEvent::ControllerPoke { periodic, .. } => {
                if periodic {
                    ORDER_PERIODIC_POKE
                } else {
                    ORDER_STAGE_POKE
                }
            }
            SimEvent::ActuatorPoke { .. } => ORDER_ACTUATOR_POKE,
            SimEvent::CreateVehicle { .. } => ORDER_CREATE_VEHICLE,
            SimEvent::TransitToWaiting { .. } => ORDER_TRANSIT_TO_WAITING,
            SimEvent::ServiceWaitingQueue { .. } => ORDER_SERVICE_QUEUE,
            SimEvent::OutputPoke { .. } => ORDER_OUTPUT_SAMPLE,
        }
    }
}
