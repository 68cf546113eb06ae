use crate::signal::{BulbColor, SignalCommand};
use crate::{ActuatorId, Error, Result};

/// A fixed-duration interval within a signal's repeating cycle during which
/// a set of phases is green.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Duration of the stage in seconds.
    pub duration: f64,
    /// Phases green during this stage; every other phase is red.
    pub phase_ids: Vec<usize>,
}

/// A stage index with the time elapsed since the stage started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageAt {
    /// Index into the controller's stage list.
    pub index: usize,
    /// Seconds since the start of the stage.
    pub reltime: f64,
}

/// A pretimed staged signal controller: stages partition the cycle
/// `[0, cycle)` shifted by `offset`, extended periodically in both
/// directions.
#[derive(Debug)]
pub struct StageController {
    /// External ID from the scenario description.
    pub ext_id: u64,
    /// Actuators this controller pushes commands to.
    pub actuators: Vec<ActuatorId>,
    /// Optional fixed wake-up period, in addition to stage-boundary wake-ups.
    pub dt: Option<f64>,
    /// Cycle length in seconds.
    pub cycle: f64,
    /// Cycle offset in seconds.
    pub offset: f64,
    /// Ordered stages.
    pub stages: Vec<Stage>,
    pub(crate) current_stage: Option<usize>,
}

impl StageController {
    /// Constructs a controller.
    ///
    /// # Errors
    ///
    /// Returns an error when there are no stages, a stage duration is not
    /// positive, or the cycle is not positive.
    pub fn new(
        ext_id: u64,
        actuators: Vec<ActuatorId>,
        dt: Option<f64>,
        cycle: f64,
        offset: f64,
        stages: Vec<Stage>,
    ) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "controller {} has no stages",
                ext_id
            )));
        }
        if cycle <= 0.0 || !cycle.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "controller {} has non-positive cycle {}",
                ext_id, cycle
            )));
        }
        if stages.iter().any(|s| s.duration <= 0.0 || !s.duration.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "controller {} has a non-positive stage duration",
                ext_id
            )));
        }
        Ok(Self {
            ext_id,
            actuators,
            dt,
            cycle,
            offset,
            stages,
            current_stage: None,
        })
    }

    /// For an absolute time, the stage index and the time since the stage
    /// started. Periodic: `stage_for_time(t) == stage_for_time(t + cycle)`
    /// for all real `t`, negative offsets included.
    #[must_use]
    pub fn stage_for_time(&self, time: f64) -> StageAt {
        let reltime = (time - self.offset).rem_euclid(self.cycle);
        let mut start = 0.0;
        for (index, stage) in self.stages.iter().enumerate() {
            let end = start + stage.duration;
            if end > reltime {
                return StageAt {
                    index,
                    reltime: reltime - start,
                };
            }
            start = end;
        }
        // Stage durations summing to less than the cycle leave a tail that
        // wraps to the first stage.
        StageAt {
            index: 0,
            reltime: 0.0,
        }
    }

    /// The command representing a stage: green for the stage's phases. Phases
    /// outside the command default to red at the actuator.
    #[must_use]
    pub fn command_for_stage(&self, index: usize) -> SignalCommand {
        let mut command = SignalCommand::default();
        for &phase_id in &self.stages[index].phase_ids {
            command.0.insert(phase_id, BulbColor::Green);
        }
        command
    }

    /// The stage applied by the last wake-up, if any.
    #[must_use]
    pub fn current_stage(&self) -> Option<usize> {
        self.current_stage
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use float_cmp::approx_eq;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;
    use rstest::rstest;

    fn two_stage_controller(offset: f64) -> StageController {
        StageController::new(
            0,
            vec![],
            None,
            60.0,
            offset,
            vec![
                Stage {
                    duration: 30.0,
                    phase_ids: vec![0],
                },
                Stage {
                    duration: 30.0,
                    phase_ids: vec![1],
                },
            ],
        )
        .unwrap()
    }

    #[rstest(
        time,
        index,
        reltime,
        case(0.0, 0, 0.0),
        case(15.0, 0, 15.0),
        case(29.999, 0, 29.999),
        case(30.0, 1, 0.0),
        case(59.0, 1, 29.0),
        case(60.0, 0, 0.0),
        case(90.0, 1, 0.0),
        case(-30.0, 1, 0.0),
        case(-1.0, 1, 29.0)
    )]
    fn test_stage_for_time(time: f64, index: usize, reltime: f64) {
        let controller = two_stage_controller(0.0);
        let at = controller.stage_for_time(time);
        assert_eq!(at.index, index);
        assert!(approx_eq!(f64, at.reltime, reltime, epsilon = 1e-9));
    }

    #[test]
    fn test_offset_shifts_stages() {
        let controller = two_stage_controller(10.0);
        assert_eq!(controller.stage_for_time(10.0).index, 0);
        assert_eq!(controller.stage_for_time(40.0).index, 1);
        assert_eq!(controller.stage_for_time(9.0).index, 1);
        let negative = two_stage_controller(-10.0);
        assert_eq!(negative.stage_for_time(0.0).index, 0);
        assert_eq!(negative.stage_for_time(20.0).index, 1);
    }

    #[quickcheck]
    fn prop_stage_for_time_is_periodic(time: f64, offset: f64) -> TestResult {
        if !time.is_finite() || !offset.is_finite() || time.abs() > 1e6 || offset.abs() > 1e6 {
            return TestResult::discard();
        }
        let controller = StageController::new(
            0,
            vec![],
            None,
            90.0,
            offset,
            vec![
                Stage {
                    duration: 20.0,
                    phase_ids: vec![0],
                },
                Stage {
                    duration: 30.0,
                    phase_ids: vec![1],
                },
                Stage {
                    duration: 40.0,
                    phase_ids: vec![2],
                },
            ],
        )
        .unwrap();
        let here = controller.stage_for_time(time);
        let next_cycle = controller.stage_for_time(time + controller.cycle);
        TestResult::from_bool(
            here.index == next_cycle.index
                && approx_eq!(f64, here.reltime, next_cycle.reltime, epsilon = 1e-6),
        )
    }

    #[test]
    fn test_short_stage_list_wraps_to_first_stage() {
        // Durations sum to 40 over a 60 second cycle; the tail maps to the
        // first stage, matching the periodic extension of the table.
        let controller = StageController::new(
            0,
            vec![],
            None,
            60.0,
            0.0,
            vec![Stage {
                duration: 40.0,
                phase_ids: vec![0],
            }],
        )
        .unwrap();
        assert_eq!(controller.stage_for_time(50.0), StageAt { index: 0, reltime: 0.0 });
    }

    #[test]
    fn test_command_for_stage_greens_stage_phases() {
        let controller = two_stage_controller(0.0);
        let command = controller.command_for_stage(1);
        assert_eq!(command.0.get(&1), Some(&BulbColor::Green));
        assert_eq!(command.0.get(&0), None);
    }

    #[test]
    fn test_invalid_controllers_are_rejected() {
        assert!(StageController::new(0, vec![], None, 60.0, 0.0, vec![]).is_err());
        assert!(StageController::new(
            0,
            vec![],
            None,
            0.0,
            0.0,
            vec![Stage {
                duration: 30.0,
                phase_ids: vec![]
            }]
        )
        .is_err());
        assert!(StageController::new(
            0,
            vec![],
            None,
            60.0,
            0.0,
            vec![Stage {
                duration: 0.0,
                phase_ids: vec![]
            }]
        )
        .is_err());
    }
}
