use std::fs::File;
use std::path::Path;

use itertools::Itertools;

use crate::{Error, Network, Result};

/// The kinds of output writers a scenario can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::ToString)]
#[strum(serialize_all = "snake_case")]
pub enum OutputKind {
    /// Vehicle counts per link, sampled on a fixed cadence.
    LinkVehicles,
    /// Vehicle counts per lane group, sampled on a fixed cadence.
    LaneGroupVehicles,
    /// Cumulative exits per lane group, sampled on a fixed cadence.
    LaneGroupFlow,
    /// Controller stage changes, written as they happen.
    ControllerEvents,
}

impl OutputKind {
    /// `true` for outputs sampled on a poke cadence (which require a `dt`).
    #[must_use]
    pub fn is_timed(self) -> bool {
        !matches!(self, OutputKind::ControllerEvents)
    }
}

/// A CSV output writer. Timed kinds are woken through dispatcher poke events
/// at their cadence, so sampling uses the same event ordering as the
/// simulation itself.
pub struct Output {
    /// What this writer records.
    pub kind: OutputKind,
    /// Sampling cadence for timed kinds.
    pub dt: Option<f64>,
    writer: csv::Writer<File>,
}

impl Output {
    /// Opens `<folder>/<prefix>_<kind>.csv` and writes its header row.
    ///
    /// # Errors
    ///
    /// Returns an error when a timed kind lacks a `dt` or the file cannot be
    /// written.
    pub fn to_file(
        kind: OutputKind,
        dt: Option<f64>,
        folder: &Path,
        prefix: &str,
        network: &Network,
    ) -> Result<Self> {
        if kind.is_timed() && dt.is_none() {
            return Err(Error::InvalidConfig(format!(
                "output `{}` requires a dt",
                kind.to_string()
            )));
        }
        let path = folder.join(format!("{}_{}.csv", prefix, kind.to_string()));
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(Self::header(kind, network))?;
        Ok(Self { kind, dt, writer })
    }

    fn header(kind: OutputKind, network: &Network) -> Vec<String> {
        let mut header = vec![String::from("time")];
        match kind {
            OutputKind::LinkVehicles => {
                header.extend(network.links.iter().map(|link| link.ext_id.to_string()));
            }
            OutputKind::LaneGroupVehicles | OutputKind::LaneGroupFlow => {
                header.extend(network.lane_groups.iter().map(|lg| {
                    format!(
                        "{}:{}-{}",
                        network.link(lg.link).ext_id,
                        lg.start_lane,
                        lg.start_lane + lg.num_lanes - 1
                    )
                }));
            }
            OutputKind::ControllerEvents => {
                header = ["time", "controller", "stage"]
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect();
            }
        }
        header
    }

    /// Writes one sample row for a timed output.
    ///
    /// # Errors
    ///
    /// Returns an error on a write failure.
    pub fn write_sample(&mut self, time: f64, network: &Network) -> Result<()> {
        let row: Vec<String> = match self.kind {
            OutputKind::LinkVehicles => (0..network.links.len())
                .map(|i| network.link_vehicles(i.into()).to_string())
                .collect(),
            OutputKind::LaneGroupVehicles => network
                .lane_groups
                .iter()
                .map(|lg| lg.total_vehicles().to_string())
                .collect(),
            OutputKind::LaneGroupFlow => network
                .lane_groups
                .iter()
                .map(|lg| lg.cumulative_exits().to_string())
                .collect(),
            OutputKind::ControllerEvents => return Ok(()),
        };
        self.writer
            .write_record(std::iter::once(time.to_string()).chain(row))?;
        Ok(())
    }

    /// Writes one stage-change row for a controller-events output.
    ///
    /// # Errors
    ///
    /// Returns an error on a write failure.
    pub fn write_controller_event(
        &mut self,
        time: f64,
        controller_ext_id: u64,
        stage: usize,
    ) -> Result<()> {
        if self.kind == OutputKind::ControllerEvents {
            self.writer.write_record(&[
                time.to_string(),
                controller_ext_id.to_string(),
                stage.to_string(),
            ])?;
        }
        Ok(())
    }

    /// Flushes buffered rows to disk.
    ///
    /// # Errors
    ///
    /// Returns an error on a write failure.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Output({}, dt: {})",
            self.kind.to_string(),
            self.dt.iter().format(",")
        )
    }
}
