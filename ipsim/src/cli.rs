//! Parses the command line arguments and runs the chosen simulation.
//!
//! Basic usage for running the fragmentation simulation with logging on:
//!
//! ```cargo run -- --log --scenario fragmentation --mtu 576```

use crate::simulations::{Params, Scenario};
use clap::Parser;
use ipsim_core::ExitStatus;
use std::{
    fs::{create_dir_all, OpenOptions},
    io,
    sync::Arc,
    time::Duration,
};
use thiserror::Error as ThisError;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

use crate::internet::InternetError;

/// Stores the different command line arguments.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Logging flag. Writes a JSON log to ./logs
    #[arg(short, long)]
    log: bool,
    /// The simulation to run
    #[arg(short, long, value_enum, default_value_t = Scenario::Fragmentation)]
    scenario: Scenario,
    /// Bytes of transport data per datagram
    #[arg(long, default_value_t = 4000)]
    size: usize,
    /// MTU of the link in front of the server
    #[arg(long, default_value_t = 576)]
    mtu: u16,
    /// Time to live of datagrams from the client
    #[arg(long)]
    ttl: Option<u8>,
    /// Seconds an incomplete reassembly is kept
    #[arg(long, default_value_t = 60)]
    fragment_timeout: u64,
    /// Chance of losing a datagram in front of the server
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Chance of corrupting a datagram in front of the server
    #[arg(long, default_value_t = 0.0)]
    bit_errors: f64,
    /// Datagrams to send in the lossy simulation
    #[arg(long, default_value_t = 100)]
    messages: usize,
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated seconds after which to stop
    #[arg(long)]
    deadline: Option<u64>,
}

impl Args {
    fn params(&self) -> Params {
        let defaults = Params::default();
        Params {
            payload_size: self.size,
            bottleneck_mtu: self.mtu,
            time_to_live: self.ttl,
            fragment_timeout: Duration::from_secs(self.fragment_timeout),
            loss_rate: self.loss,
            bit_error_rate: self.bit_errors,
            messages: self.messages,
            seed: self.seed.unwrap_or(defaults.seed),
            deadline: self.deadline.map(Duration::from_secs),
            ..defaults
        }
    }
}

#[derive(Debug, ThisError)]
pub enum CliError {
    #[error("Could not set up the simulation: {0}")]
    Setup(#[from] InternetError),
    #[error("Could not create the log file: {0}")]
    Log(#[from] io::Error),
    #[error("{0}")]
    Subscriber(#[from] SetGlobalDefaultError),
    #[error("The simulation panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Parses the arguments, then runs the simulation they describe until it
/// finishes or the process is interrupted.
pub async fn initialize_from_arguments() -> Result<ExitStatus, CliError> {
    let cli = Args::parse();
    if cli.log {
        initialize_logging()?;
    }
    let scenario = cli.scenario;
    let params = cli.params();
    tracing::info!(?scenario, ?params, "Running simulation");

    let simulation = tokio::task::spawn_blocking(move || scenario.run(&params));
    tokio::select! {
        run = simulation => {
            let run = run??;
            print!("{run}");
            Ok(run.status)
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
            Ok(ExitStatus::Interrupted)
        }
    }
}

/// Writes every event at debug level or above to a new file in ./logs. Only
/// should be called once, before the simulation starts.
fn initialize_logging() -> Result<(), CliError> {
    let main_path = "./logs";
    create_dir_all(main_path)?;
    let file_path = format!(
        "{}/debug-{}.log",
        main_path,
        chrono::offset::Local::now().format("%y-%m-%d_%H-%M-%S")
    );
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(file_path)?;
    let subscriber = FmtSubscriber::builder()
        .with_writer(Arc::new(file))
        .with_max_level(tracing::Level::DEBUG)
        .json()
        .finish();
    // Every node logs to the same subscriber and so the same file
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_map_to_params() {
        let args = Args::parse_from([
            "ipsim",
            "--scenario",
            "reassembly-timeout",
            "--mtu",
            "1000",
            "--ttl",
            "5",
            "--fragment-timeout",
            "10",
            "--deadline",
            "30",
        ]);
        assert_eq!(args.scenario, Scenario::ReassemblyTimeout);
        let params = args.params();
        assert_eq!(params.bottleneck_mtu, 1000);
        assert_eq!(params.time_to_live, Some(5));
        assert_eq!(params.fragment_timeout, Duration::from_secs(10));
        assert_eq!(params.deadline, Some(Duration::from_secs(30)));
        assert_eq!(params.seed, Params::default().seed);
    }

    #[test]
    fn defaults_match_the_simulations() {
        let args = Args::parse_from(["ipsim"]);
        assert!(!args.log);
        assert_eq!(args.scenario, Scenario::Fragmentation);
        assert_eq!(args.params(), Params::default());
    }
}
