use std::collections::HashMap;

use crate::{LaneGroupId, NodeId};

/// State of a signal bulb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulbColor {
    /// No service.
    Red,
    /// Unconstrained service (clamped to the nominal rate).
    Green,
    /// Signal off; treated as red.
    Dark,
}

impl BulbColor {
    /// The lane-group service rate this color maps to.
    #[must_use]
    pub fn rate_vps(self) -> f64 {
        match self {
            BulbColor::Red | BulbColor::Dark => 0.0,
            BulbColor::Green => f64::INFINITY,
        }
    }
}

/// A command addressed to a signal actuator: bulb colors by phase ID. Phases
/// absent from the map are set to red, not left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalCommand(pub HashMap<usize, BulbColor>);

/// A set of lane groups served together, with a bulb color.
#[derive(Debug)]
pub struct SignalPhase {
    /// Phase ID within the signal, as referenced by controller stages.
    pub phase_id: usize,
    /// Current bulb color.
    pub bulb_color: BulbColor,
    /// Lane groups controlled by this phase.
    pub lane_groups: Vec<LaneGroupId>,
}

impl SignalPhase {
    /// Constructs a dark phase over the given lane groups.
    #[must_use]
    pub fn new(phase_id: usize, lane_groups: Vec<LaneGroupId>) -> Self {
        Self {
            phase_id,
            bulb_color: BulbColor::Dark,
            lane_groups,
        }
    }
}

/// A signal at a node, throttling the service rates of the lane groups in
/// its phases according to the last command pushed by a controller.
#[derive(Debug)]
pub struct SignalActuator {
    /// External ID from the scenario description.
    pub ext_id: u64,
    /// The node this signal controls.
    pub node: NodeId,
    /// Wake-up period; an actuator without one is poked synchronously by its
    /// controller instead of on its own timer.
    pub dt: Option<f64>,
    /// The signal's phases.
    pub phases: Vec<SignalPhase>,
    pub(crate) command: Option<SignalCommand>,
}

impl SignalActuator {
    /// Constructs a signal actuator with all phases dark and no pending
    /// command.
    #[must_use]
    pub fn new(ext_id: u64, node: NodeId, dt: Option<f64>, phases: Vec<SignalPhase>) -> Self {
        Self {
            ext_id,
            node,
            dt,
            phases,
            command: None,
        }
    }

    /// The color a pending command assigns to `phase_id`; absent phases go
    /// red.
    #[must_use]
    pub fn commanded_color(command: &SignalCommand, phase_id: usize) -> BulbColor {
        command.0.get(&phase_id).copied().unwrap_or(BulbColor::Red)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_color_to_rate() {
        assert_eq!(BulbColor::Red.rate_vps(), 0.0);
        assert_eq!(BulbColor::Dark.rate_vps(), 0.0);
        assert!(BulbColor::Green.rate_vps().is_infinite());
    }

    #[test]
    fn test_phases_absent_from_command_go_red() {
        let mut command = SignalCommand::default();
        command.0.insert(1, BulbColor::Green);
        assert_eq!(SignalActuator::commanded_color(&command, 1), BulbColor::Green);
        assert_eq!(SignalActuator::commanded_color(&command, 2), BulbColor::Red);
    }
}
