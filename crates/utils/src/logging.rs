//! provides logging helpers

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::registry::LookupSpan;

/// When set, logs go to a daily-rotated file at this path instead of stderr.
pub const LOG_PATH_ENV_VAR: &str = "LOG_PATH";

type BoxedLayer<S> = Box<dyn tracing_subscriber::Layer<S> + Send + Sync + 'static>;

/// initiate the global tracing subscriber
///
/// The returned guard must be held for the lifetime of the process when
/// logging to a file, otherwise buffered lines are lost on exit.
pub fn init(log_path: Option<String>) -> Option<WorkerGuard> {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let (fmt_layer, guard) = get_fmt_layer(log_path);

    registry().with(fmt_layer.with_filter(env_filter)).init();
    guard
}

/// Build the formatting layer, either for stderr or for a rolling file.
pub fn get_fmt_layer<S>(log_path: Option<String>) -> (BoxedLayer<S>, Option<WorkerGuard>)
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    if let Some(log_path) = log_path {
        match rolling_appender(Path::new(&log_path)) {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let fmt_layer = layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed();
                return (fmt_layer, Some(guard));
            }
            Err(e) => {
                // the subscriber is not installed yet, so stderr is the only channel
                eprintln!("failed to open log file {log_path}, logging to stderr: {e}");
            }
        }
    }

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .boxed();
    (fmt_layer, None)
}

fn rolling_appender(log_path: &Path) -> Result<RollingFileAppender, String> {
    let dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file = log_path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| format!("log path {} has no file name", log_path.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file)
        .max_log_files(3)
        .build(dir)
        .map_err(|e| e.to_string())
}
