use anyhow::Result;
use utils::version;

use crate::app::ApplicationBuilder;
use crate::config::DaemonArgs;

pub async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let _guard = utils::logging::init(daemon_args.log_path.clone());

    tracing::info!("Starting gcu device plugin {}", &**version::VERSION);

    let app = ApplicationBuilder::new(daemon_args).build().await?;

    let result = app.run().await;
    app.shutdown().await?;

    result
}
