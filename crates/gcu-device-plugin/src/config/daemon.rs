use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use erml::FixedPathLocator;
use erml::LibraryLocator;
use erml::SearchPathLocator;
use utils::logging::LOG_PATH_ENV_VAR;

use crate::device::MonitorConfig;
use crate::plugin::DeviceLayout;

/// How to reach the ERML library.
#[derive(Args, Debug, Clone)]
pub struct TelemetryArgs {
    #[arg(
        long,
        env = "ERML_LIBRARY_PATH",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to liberml.so; searched in the system library paths when unset"
    )]
    pub erml_library: Option<PathBuf>,

    #[arg(long, help = "Initialise ERML without the kernel driver")]
    pub no_driver: bool,
}

impl TelemetryArgs {
    pub fn locator(&self) -> Box<dyn LibraryLocator> {
        match &self.erml_library {
            Some(path) => Box::new(FixedPathLocator(path.clone())),
            None => Box::new(SearchPathLocator::default()),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "DEVICE_PLUGIN_PATH",
        value_hint = clap::ValueHint::DirPath,
        default_value = "/var/lib/kubelet/device-plugins/",
        help = "Directory holding the kubelet and plugin sockets"
    )]
    pub device_plugin_dir: PathBuf,

    #[arg(
        long,
        default_value = "kubelet.sock",
        help = "Kubelet registration socket name inside the device plugin directory"
    )]
    pub kubelet_socket: String,

    #[arg(
        long,
        default_value = "jiangyuan.sock",
        help = "Plugin socket name inside the device plugin directory"
    )]
    pub endpoint: String,

    #[arg(
        long,
        env = "RESOURCE_NAME",
        default_value = "jiangyuan.com/gpu",
        help = "Extended resource name announced to the kubelet"
    )]
    pub resource_name: String,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[arg(long, default_value = "60", help = "Seconds between device polls")]
    pub poll_interval_secs: u64,

    #[arg(
        long,
        default_value = "3",
        help = "Consecutive failed polls before the plugin exits"
    )]
    pub max_poll_failures: u32,

    #[arg(
        long,
        default_value = "5",
        help = "Timeout in seconds for connecting and registering with the kubelet"
    )]
    pub connect_timeout_secs: u64,

    #[arg(
        long,
        default_value = "5",
        help = "Seconds between fallback checks of the kubelet socket"
    )]
    pub kubelet_watch_secs: u64,

    #[arg(long, default_value = "/dev/", help = "Directory of the device nodes")]
    pub device_node_prefix: String,

    #[arg(long, default_value = "gcu", help = "Device node family, e.g. gcu for /dev/gcu0")]
    pub device_family: String,

    #[arg(
        long,
        default_value = "gcuctl",
        help = "Control node handed to every container with devices"
    )]
    pub control_node: String,

    #[arg(
        long,
        default_value = "ALLOCATED_JY_GPU_DEVICES",
        help = "Environment variable listing the allocated device ids"
    )]
    pub device_env: String,

    #[arg(
        long,
        env = LOG_PATH_ENV_VAR,
        value_hint = clap::ValueHint::FilePath,
        help = "Write logs to a daily rotated file instead of stderr"
    )]
    pub log_path: Option<String>,
}

impl DaemonArgs {
    pub fn kubelet_socket_path(&self) -> PathBuf {
        self.device_plugin_dir.join(&self.kubelet_socket)
    }

    pub fn plugin_socket_path(&self) -> PathBuf {
        self.device_plugin_dir.join(&self.endpoint)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn kubelet_watch_period(&self) -> Duration {
        Duration::from_secs(self.kubelet_watch_secs.max(1))
    }
}

impl From<&DaemonArgs> for MonitorConfig {
    fn from(args: &DaemonArgs) -> Self {
        Self {
            poll_interval: Duration::from_secs(args.poll_interval_secs.max(1)),
            max_consecutive_failures: args.max_poll_failures.max(1),
        }
    }
}

impl From<&DaemonArgs> for DeviceLayout {
    fn from(args: &DaemonArgs) -> Self {
        Self {
            node_prefix: args.device_node_prefix.clone(),
            device_family: args.device_family.clone(),
            control_node: args.control_node.clone(),
            env_name: args.device_env.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::config::Cli;
    use crate::config::Commands;

    fn daemon_args(extra: &[&str]) -> DaemonArgs {
        let args = ["gcu-device-plugin", "daemon"].iter().chain(extra.iter());
        match Cli::try_parse_from(args).expect("should parse").command {
            Commands::Daemon(args) => *args,
            Commands::ListDevices(_) => panic!("expected daemon"),
        }
    }

    #[test]
    fn defaults() {
        let args = daemon_args(&[]);
        assert_eq!(
            args.kubelet_socket_path(),
            PathBuf::from("/var/lib/kubelet/device-plugins/kubelet.sock")
        );
        assert_eq!(
            args.plugin_socket_path(),
            PathBuf::from("/var/lib/kubelet/device-plugins/jiangyuan.sock")
        );
        assert_eq!(args.resource_name, "jiangyuan.com/gpu");
        assert_eq!(args.connect_timeout(), Duration::from_secs(5));
        assert_eq!(args.kubelet_watch_period(), Duration::from_secs(5));

        let monitor = MonitorConfig::from(&args);
        assert_eq!(monitor.poll_interval, Duration::from_secs(60));
        assert_eq!(monitor.max_consecutive_failures, 3);

        assert_eq!(DeviceLayout::from(&args), DeviceLayout::default());
    }

    #[test]
    fn overrides() {
        let args = daemon_args(&[
            "--device-plugin-dir",
            "/tmp/plugins",
            "--endpoint",
            "test.sock",
            "--poll-interval-secs",
            "5",
            "--max-poll-failures",
            "0",
            "--erml-library",
            "/opt/erml/liberml.so",
            "--no-driver",
        ]);
        assert_eq!(args.plugin_socket_path(), PathBuf::from("/tmp/plugins/test.sock"));
        assert_eq!(MonitorConfig::from(&args).max_consecutive_failures, 1);
        assert_eq!(
            args.telemetry.erml_library,
            Some(PathBuf::from("/opt/erml/liberml.so"))
        );
        assert!(args.telemetry.no_driver);
        assert_eq!(
            args.telemetry.locator().candidates(),
            vec!["/opt/erml/liberml.so".to_string()]
        );
    }

    #[test]
    fn zero_durations_are_clamped_to_one_second() {
        let args = daemon_args(&[
            "--connect-timeout-secs",
            "0",
            "--kubelet-watch-secs",
            "0",
            "--poll-interval-secs",
            "0",
        ]);
        assert_eq!(args.connect_timeout(), Duration::from_secs(1));
        assert_eq!(args.kubelet_watch_period(), Duration::from_secs(1));
        assert_eq!(MonitorConfig::from(&args).poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn list_devices_json_flag() {
        let cli = Cli::try_parse_from(["gcu-device-plugin", "list-devices", "--json"])
            .expect("should parse");
        match cli.command {
            Commands::ListDevices(args) => assert!(args.json),
            Commands::Daemon(_) => panic!("expected list-devices"),
        }
    }
}
