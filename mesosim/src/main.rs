//! Mesoscopic traffic simulation application.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::WrapErr;

use mesosim::{build_scenario, load_scenario};

/// Runs a mesoscopic traffic simulation.
#[derive(Parser)]
#[clap(version, author)]
struct Opt {
    /// Path to the scenario description in JSON format.
    #[clap(long)]
    scenario: PathBuf,

    /// Simulated duration in seconds.
    #[clap(long, default_value = "3600")]
    duration: f64,

    /// Seed for the random number generator; random when absent.
    #[clap(long)]
    seed: Option<u64>,

    /// Folder for CSV outputs requested by the scenario.
    #[clap(long)]
    output_folder: Option<PathBuf>,

    /// File name prefix for CSV outputs.
    #[clap(long, default_value = "run")]
    prefix: String,

    /// Verbosity.
    #[clap(short, long, parse(from_occurrences))]
    verbose: i32,

    /// Store the logs in this file.
    #[clap(long)]
    log_output: Option<PathBuf>,

    /// Do not log to the stderr.
    #[clap(long)]
    no_stderr: bool,
}

/// Set up a logger based on the given user options.
fn set_up_logger(opt: &Opt) -> Result<(), fern::InitError> {
    let log_level = match opt.verbose {
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        3 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Warn,
    };
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .level(log_level);
    let dispatch = if let Some(path) = &opt.log_output {
        let _ = fs::remove_file(path);
        dispatch.chain(
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .append(false)
                .open(path)?,
        )
    } else {
        dispatch
    };
    let dispatch = if opt.no_stderr {
        dispatch
    } else {
        dispatch.chain(std::io::stderr())
    };
    dispatch.apply()?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    set_up_logger(&opt)?;

    let config = load_scenario(&opt.scenario).wrap_err_with(|| {
        format!(
            "unable to load scenario description: {}",
            opt.scenario.display()
        )
    })?;
    let output = match &opt.output_folder {
        Some(folder) => {
            fs::create_dir_all(folder).wrap_err("unable to create output folder")?;
            Some((folder.as_path(), opt.prefix.as_str()))
        }
        None => None,
    };
    let mut scenario =
        build_scenario(&config, opt.seed, output).wrap_err("unable to build scenario")?;

    let end = scenario.advance(opt.duration)?;
    log::info!(
        "finished at {:.2}s: {} vehicles created, {} in the network, {} exited",
        end,
        scenario.vehicles_created(),
        scenario.vehicles_active(),
        scenario.vehicles_exited(),
    );
    Ok(())
}
