use rand::Rng;
use rand_distr::weighted_alias::WeightedAliasIndex;
use rand_distr::Distribution;

use crate::{Error, LinkId, Result};

/// A time-indexed table of per-outlink values: one row per outlink, all rows
/// the same length, indexed by `floor(t / dt)` clamped to the last step. An
/// absent `dt` makes the profile static (step 0 always).
#[derive(Debug)]
pub struct Profile2D {
    outlinks: Vec<LinkId>,
    values: Vec<Vec<f64>>,
    dt: Option<f64>,
    num_times: usize,
}

impl Profile2D {
    /// Constructs an empty profile with the given step size.
    #[must_use]
    pub fn new(dt: Option<f64>) -> Self {
        Self {
            outlinks: Vec::new(),
            values: Vec::new(),
            dt,
            num_times: 0,
        }
    }

    /// Adds a value row for an outlink. Re-adding an outlink replaces the
    /// existing row and logs a warning.
    pub fn add_entry(&mut self, outlink: LinkId, values: Vec<f64>) {
        if let Some(position) = self.outlinks.iter().position(|&out| out == outlink) {
            log::warn!("overwriting split profile entry for outlink {}", outlink);
            self.num_times = self.num_times.max(values.len());
            self.values[position] = values;
            return;
        }
        self.num_times = self.num_times.max(values.len());
        self.outlinks.push(outlink);
        self.values.push(values);
    }

    /// The outlinks with a value row, in insertion order.
    #[must_use]
    pub fn outlinks(&self) -> &[LinkId] {
        &self.outlinks
    }

    /// Number of time steps.
    #[must_use]
    pub fn num_times(&self) -> usize {
        self.num_times
    }

    /// The profile step for an absolute time.
    #[must_use]
    pub fn step_for_time(&self, time: f64) -> usize {
        match self.dt {
            Some(dt) if dt > 0.0 => ((time / dt) as usize).min(self.num_times.saturating_sub(1)),
            _ => 0,
        }
    }

    /// Per-outlink values at `step`, clamped to the last step.
    #[must_use]
    pub fn slice(&self, step: usize) -> Vec<f64> {
        let step = step.min(self.num_times.saturating_sub(1));
        self.values.iter().map(|row| row[step]).collect()
    }

    /// The time and index of the step following `step`, or `None` when the
    /// profile is exhausted or static.
    #[must_use]
    pub fn change_following(&self, step: usize) -> Option<(f64, usize)> {
        let dt = self.dt.filter(|&dt| dt > 0.0)?;
        let next = step + 1;
        if next < self.num_times {
            Some((next as f64 * dt, next))
        } else {
            None
        }
    }
}

/// A time-varying discrete probability distribution over a link's outgoing
/// links, used to route vehicles entering the link.
#[derive(Debug)]
pub struct SplitMatrixProfile {
    /// The link whose departures this profile routes.
    pub link: LinkId,
    profile: Profile2D,
    current: Option<WeightedAliasIndex<f64>>,
}

impl SplitMatrixProfile {
    /// Constructs a profile for a link and validates its rows: equal length,
    /// finite and non-negative values, at least one outlink.
    ///
    /// # Errors
    ///
    /// Returns an error on an empty table, ragged rows, or invalid values.
    /// External link IDs are used in messages since this runs at
    /// configuration time.
    pub fn new(link: LinkId, ext_link_id: u64, profile: Profile2D) -> Result<Self> {
        if profile.outlinks.is_empty() {
            return Err(Error::EmptyProfile("split"));
        }
        if profile
            .values
            .iter()
            .any(|row| row.len() != profile.num_times)
        {
            return Err(Error::RaggedSplitProfile(ext_link_id));
        }
        if profile
            .values
            .iter()
            .flatten()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(Error::InvalidSplitValue(ext_link_id));
        }
        Ok(Self {
            link,
            profile,
            current: None,
        })
    }

    /// The underlying time-indexed table.
    #[must_use]
    pub fn profile(&self) -> &Profile2D {
        &self.profile
    }

    /// Installs the slice at `step` as the current distribution. A slice
    /// summing to zero leaves sampling undefined until the next change; the
    /// error is raised by [`Self::sample_outlink`] if it is ever consulted.
    pub(crate) fn install_step(&mut self, step: usize) {
        let weights = self.profile.slice(step);
        self.current = WeightedAliasIndex::new(weights).ok();
    }

    /// Samples an outgoing link according to the current slice.
    ///
    /// # Errors
    ///
    /// Returns an error when the current slice sums to zero (or no slice has
    /// been installed), which makes the weighted choice undefined.
    pub fn sample_outlink<R: Rng>(&self, rng: &mut R) -> Result<LinkId> {
        let distribution = self
            .current
            .as_ref()
            .ok_or(Error::ZeroSplitSlice(self.link))?;
        Ok(self.profile.outlinks[distribution.sample(rng)])
    }
}
