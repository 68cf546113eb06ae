use rand::Rng;

/// The law governing inter-event waiting times for vehicle creation and lane
/// group service. Selected once per scenario; call sites never branch on it
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::ToString)]
#[strum(serialize_all = "snake_case")]
pub enum StochasticProcess {
    /// Exponential waits: `-ln(1 - U) / rate` with `U` uniform in `[0, 1)`.
    Poisson,
    /// Constant waits of `1 / rate`.
    Deterministic,
}

impl Default for StochasticProcess {
    fn default() -> Self {
        StochasticProcess::Poisson
    }
}

/// Samples the waiting time until the next event of a process with the given
/// rate, in seconds. Returns `None` for a non-positive rate, which means the
/// event is never scheduled.
pub fn service_period<R: Rng>(
    rate_vps: f64,
    process: StochasticProcess,
    rng: &mut R,
) -> Option<f64> {
    if rate_vps <= 0.0 {
        return None;
    }
    Some(match process {
        StochasticProcess::Poisson => -(1.0 - rng.gen::<f64>()).ln() / rate_vps,
        StochasticProcess::Deterministic => 1.0 / rate_vps,
    })
}
