use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::daemon::DaemonArgs;
use crate::config::list::ListDevicesArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the device plugin
    Daemon(Box<DaemonArgs>),
    /// Poll the devices once and print them
    #[command(name = "list-devices")]
    ListDevices(ListDevicesArgs),
}
