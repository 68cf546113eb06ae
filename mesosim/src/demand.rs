use crate::{Error, LinkId, Result};

/// A stochastic vehicle source attached to a link.
///
/// The rate profile is piecewise constant with step `dt` and configured in
/// vehicles per hour; the applied rate is vehicles per second. A profile with
/// a single entry never changes and carries no `dt`. The pending flag keeps
/// at most one creation event outstanding at a time.
#[derive(Debug)]
pub struct Demand {
    /// The source link vehicles are inserted on.
    pub link: LinkId,
    profile_vph: Vec<f64>,
    dt: Option<f64>,
    current_vps: f64,
    vehicle_scheduled: bool,
}

impl Demand {
    /// Constructs a demand from a vehicles-per-hour profile.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty profile.
    pub fn new(link: LinkId, profile_vph: Vec<f64>, dt: Option<f64>) -> Result<Self> {
        if profile_vph.is_empty() {
            return Err(Error::EmptyProfile("demand"));
        }
        let dt = if profile_vph.len() == 1 {
            None
        } else {
            dt.filter(|&v| v > 0.0)
        };
        Ok(Self {
            link,
            profile_vph,
            dt,
            current_vps: 0.0,
            vehicle_scheduled: false,
        })
    }

    /// The profile value at `step`, clamped to the last entry, in vehicles
    /// per hour.
    #[must_use]
    pub fn value_at_step(&self, step: usize) -> f64 {
        let step = step.min(self.profile_vph.len() - 1);
        self.profile_vph[step]
    }

    /// The time and index of the breakpoint following `step`, or `None` when
    /// the profile is exhausted or constant.
    #[must_use]
    pub fn change_following(&self, step: usize) -> Option<(f64, usize)> {
        let dt = self.dt?;
        let next = step + 1;
        if next < self.profile_vph.len() {
            Some((next as f64 * dt, next))
        } else {
            None
        }
    }

    /// The profile step in effect at an absolute time.
    #[must_use]
    pub fn step_for_time(&self, time: f64) -> usize {
        match self.dt {
            Some(dt) => ((time / dt) as usize).min(self.profile_vph.len() - 1),
            None => 0,
        }
    }

    /// The currently applied rate in vehicles per second.
    #[must_use]
    pub fn current_rate_vps(&self) -> f64 {
        self.current_vps
    }

    /// `true` while a creation event is outstanding.
    #[must_use]
    pub fn is_vehicle_scheduled(&self) -> bool {
        self.vehicle_scheduled
    }

    pub(crate) fn set_current_vph(&mut self, value_vph: f64) {
        self.current_vps = value_vph / 3600.0;
    }

    pub(crate) fn set_vehicle_scheduled(&mut self, scheduled: bool) {
        self.vehicle_scheduled = scheduled;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_profile_is_rejected() {
        assert!(Demand::new(LinkId::from(0), vec![], Some(300.0)).is_err());
    }

    #[test]
    fn test_single_entry_profile_never_changes() {
        let demand = Demand::new(LinkId::from(0), vec![1800.0], Some(300.0)).unwrap();
        assert_eq!(demand.change_following(0), None);
        assert_eq!(demand.value_at_step(0), 1800.0);
        assert_eq!(demand.value_at_step(7), 1800.0);
    }

    #[test]
    fn test_breakpoint_chain() {
        let demand =
            Demand::new(LinkId::from(0), vec![0.0, 1800.0, 900.0], Some(100.0)).unwrap();
        assert_eq!(demand.change_following(0), Some((100.0, 1)));
        assert_eq!(demand.change_following(1), Some((200.0, 2)));
        assert_eq!(demand.change_following(2), None);
    }

    #[test]
    fn test_rate_is_converted_to_vps() {
        let mut demand = Demand::new(LinkId::from(0), vec![1800.0], None).unwrap();
        assert_eq!(demand.current_rate_vps(), 0.0);
        demand.set_current_vph(1800.0);
        assert_eq!(demand.current_rate_vps(), 0.5);
    }
}
