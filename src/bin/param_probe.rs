//! param-probe - Check a link's parameter and telemetry round trip
//!
//! Captures one telemetry frame, then writes 2 and 1 to every kinematic
//! parameter of GROUP and prints what the vehicle reports back.

use clap::Parser;
use kinreplay::{
    config::DEFAULT_URI,
    link::{LinkGuard, SimConfig, SimulatedConnector},
    logging,
    param_probe::{capture_frame, ParameterProbe},
    replay::ThreadPacer,
    ChannelConfig,
};
use std::time::Duration;

const DEFAULT_GROUP: &str = "stateEstimateZ";

#[derive(Parser, Debug)]
#[command(name = "param-probe")]
#[command(about = "Set kinematic parameters on a vehicle and print the updates it reports")]
#[command(version)]
struct Cli {
    /// Vehicle URI
    #[arg(default_value = DEFAULT_URI)]
    uri: String,

    /// Parameter group to exercise
    #[arg(default_value = DEFAULT_GROUP)]
    group: String,

    /// Telemetry sampling period in milliseconds
    #[arg(long, default_value_t = 10)]
    period_ms: u32,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(None)?;

    let connector = SimulatedConnector::new(SimConfig::default());
    let mut link = LinkGuard::connect(&connector, &cli.uri)?;

    let channels = ChannelConfig::full_kinematics(cli.period_ms);
    let sample = capture_frame(&mut *link, &channels, Duration::from_secs(2))?;
    println!("[{}] position {}", sample.timestamp(), sample.position());

    let mut probe = ParameterProbe::kinematics(cli.group, ThreadPacer);
    let updates = probe.run(&mut *link)?;
    for update in &updates {
        println!("{} = {}", update.name, update.value);
    }
    println!("{} parameter updates", updates.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["param-probe"]).unwrap();
        assert_eq!(cli.uri, DEFAULT_URI);
        assert_eq!(cli.group, DEFAULT_GROUP);
        assert_eq!(cli.period_ms, 10);
    }

    #[test]
    fn test_positionals() {
        let cli = Cli::try_parse_from(["param-probe", "sim://bench", "stateEstimate"]).unwrap();
        assert_eq!(cli.uri, "sim://bench");
        assert_eq!(cli.group, "stateEstimate");
    }
}
