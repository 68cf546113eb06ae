//! Mesoscopic traffic-network simulation.
//!
//! Vehicles flow through a directed graph of road links, each link split into
//! lane groups holding a transit queue (fixed travel-time dwell) and a waiting
//! queue (serviced at a stochastic, signal-controlled rate). A discrete-event
//! dispatcher from [`simcore`] advances the global clock; demand sources,
//! split-matrix routing, and staged pretimed signal controllers all act by
//! registering events on it.

#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use derive_more::{Display, From, Into};
use thiserror::Error;

mod config;
pub use config::{
    build_scenario, load_scenario, ActuatorConfig, ControllerConfig, DemandConfig, LinkConfig,
    NetworkConfig, NodeConfig, OutputConfig, PhaseConfig, RoadConnectionConfig, RoadParamsConfig,
    ScenarioConfig, SplitConfig, StageConfig, TargetConfig,
};

mod controller;
pub use controller::{Stage, StageAt, StageController};

mod demand;
pub use demand::Demand;

mod events;
pub use events::{EventKind, EventTarget, SimEvent};

mod network;
pub use network::{LaneGroup, Link, Network, Node, RoadParams, VehicleQueue};

mod output;
pub use output::{Output, OutputKind};

mod scenario;
pub use scenario::Scenario;

mod signal;
pub use signal::{BulbColor, SignalActuator, SignalCommand, SignalPhase};

mod splits;
pub use splits::{Profile2D, SplitMatrixProfile};

mod stochastic;
pub use stochastic::{service_period, StochasticProcess};

mod vehicle;
pub use vehicle::{QueueKind, Vehicle};

/// Node ID.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct NodeId(usize);

/// Link ID.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct LinkId(usize);

/// Lane group ID.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct LaneGroupId(usize);

/// Vehicle ID, unique for the lifetime of a scenario and assigned by it.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct VehicleId(usize);

/// Demand generator ID.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct DemandId(usize);

/// Actuator ID.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct ActuatorId(usize);

/// Controller ID.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct ControllerId(usize);

/// Output writer ID.
#[derive(From, Into, Debug, PartialEq, PartialOrd, Eq, Ord, Copy, Clone, Hash, Display)]
pub struct OutputId(usize);

/// Fatal simulation and configuration errors.
#[derive(Debug, Error)]
pub enum Error {
    /// An event was registered in the past or with a NaN timestamp.
    #[error(transparent)]
    Scheduler(#[from] simcore::SchedulerError),

    /// Actuator type other than the known ones in the scenario description.
    #[error("unknown actuator type `{0}`")]
    UnknownActuatorKind(String),

    /// Actuator target type other than the known ones.
    #[error("unknown actuator target type `{0}`")]
    UnknownActuatorTarget(String),

    /// Controller type other than the known ones in the scenario description.
    #[error("unknown controller type `{0}`")]
    UnknownControllerKind(String),

    /// Output type other than the known ones in the output requests.
    #[error("unknown output type `{0}`")]
    UnknownOutputKind(String),

    /// Stochastic process name other than the known ones.
    #[error("unknown stochastic process `{0}`")]
    UnknownStochasticProcess(String),

    /// A lane group was claimed by a second signal phase.
    #[error("lane group {0} is already claimed by a signal phase")]
    LaneGroupClaimed(LaneGroupId),

    /// A split profile was redefined for a link that already has one.
    #[error("link {0} already has a split profile")]
    DuplicateSplitProfile(u64),

    /// Split rows for one link differ in length.
    #[error("split profile rows for link {0} differ in length")]
    RaggedSplitProfile(u64),

    /// A split value was negative or not finite.
    #[error("invalid split value for link {0}")]
    InvalidSplitValue(u64),

    /// The current split slice sums to zero, so sampling an outlink is
    /// undefined.
    #[error("split profile for link {0} has an all-zero slice")]
    ZeroSplitSlice(LinkId),

    /// More initial vehicles were assigned to a queue than its lane group can
    /// hold.
    #[error("cannot seed {requested} vehicles into lane group {lane_group} with capacity {capacity} and {occupied} already present")]
    SeedExceedsCapacity {
        /// The target lane group.
        lane_group: LaneGroupId,
        /// Number of vehicles requested.
        requested: usize,
        /// Capacity of the lane group in vehicles.
        capacity: f64,
        /// Vehicles already present.
        occupied: usize,
    },

    /// No lane group of a link reaches the requested outlink. This is a
    /// broken topology invariant, not a runtime condition.
    #[error("no lane group of link {link} reaches outlink {outlink}")]
    NoCandidateLaneGroups {
        /// The link being entered.
        link: LinkId,
        /// The outlink no lane group reaches.
        outlink: LinkId,
    },

    /// Initial vehicles were seeded on a link whose next link cannot be
    /// inferred.
    #[error("next link for vehicles seeded on link {0} is ambiguous")]
    AmbiguousNextLink(LinkId),

    /// A profile had no entries.
    #[error("empty {0} profile")]
    EmptyProfile(&'static str),

    /// Reference to an unknown entity in the scenario description.
    #[error("unknown {entity} id {id} in scenario description")]
    UnknownEntity {
        /// Entity kind, e.g. `"link"`.
        entity: &'static str,
        /// The unresolved external ID.
        id: u64,
    },

    /// A lane range string could not be parsed.
    #[error("invalid lane range `{0}`")]
    InvalidLaneRange(String),

    /// Malformed or incomplete scenario description.
    #[error("invalid scenario description: {0}")]
    InvalidConfig(String),

    /// I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON parsing failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// CSV writing failure.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Result alias for fatal simulation errors.
pub type Result<T> = std::result::Result<T, Error>;
