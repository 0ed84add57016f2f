use clap::Parser;

use crate::config::daemon::TelemetryArgs;

#[derive(Parser, Debug, Clone)]
pub struct ListDevicesArgs {
    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[arg(long, help = "Print the inventory as JSON instead of a table")]
    pub json: bool,
}
