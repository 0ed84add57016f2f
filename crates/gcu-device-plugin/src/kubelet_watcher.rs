//! Kubelet restart detection
//!
//! The kubelet recreates its registration socket when it restarts and
//! forgets every plugin that registered before. Watching the socket file is
//! enough to notice: it either disappears or comes back as a new inode.
//!
//! Filesystem events on the socket's directory give prompt detection. An
//! inode poll runs alongside and takes over when the watcher cannot be set up.

use std::ffi::OsString;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use derive_more::Display;
use error_stack::Report;
use error_stack::ResultExt;
use notify::event::ModifyKind;
use notify::Config;
use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Why the watcher returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The socket was removed or replaced.
    KubeletRestarted,
    Cancelled,
}

#[derive(Debug, Display)]
#[display("failed to watch the kubelet socket directory")]
pub struct WatchSetupError;

impl core::error::Error for WatchSetupError {}

#[derive(Debug, Clone)]
pub struct KubeletWatcher {
    socket_path: PathBuf,
    period: Duration,
}

impl KubeletWatcher {
    /// `period` is the interval of the fallback inode poll.
    pub fn new(socket_path: impl Into<PathBuf>, period: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            period,
        }
    }

    #[tracing::instrument(skip(self, cancellation_token), fields(socket = %self.socket_path.display()))]
    pub async fn run(&self, cancellation_token: CancellationToken) -> WatchOutcome {
        let Some(initial) = inode(&self.socket_path).await else {
            warn!("kubelet socket is already gone");
            return WatchOutcome::KubeletRestarted;
        };

        let (events_tx, mut events) = mpsc::channel(1);
        // dropping the watcher stops the event stream
        let _watcher = match self.watch_directory(events_tx) {
            Ok(watcher) => {
                info!("watching kubelet socket for restarts");
                Some(watcher)
            }
            Err(e) => {
                warn!("Failed to setup filesystem watcher, falling back to polling only: {e:?}");
                None
            }
        };

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("kubelet watcher shutdown requested");
                    return WatchOutcome::Cancelled;
                }
                Some(()) = events.recv() => {
                    debug!("kubelet socket event, checking inode");
                }
                _ = interval.tick() => {}
            }

            match inode(&self.socket_path).await {
                None => {
                    info!("kubelet socket removed, kubelet restarted");
                    return WatchOutcome::KubeletRestarted;
                }
                Some(current) if current != initial => {
                    info!("kubelet socket recreated, kubelet restarted");
                    return WatchOutcome::KubeletRestarted;
                }
                Some(_) => {}
            }
        }
    }

    /// Watch the socket's directory and send a wake-up for every create,
    /// remove or rename of the socket name. Wake-ups coalesce in the
    /// single-slot channel.
    fn watch_directory(
        &self,
        wake: mpsc::Sender<()>,
    ) -> Result<RecommendedWatcher, Report<WatchSetupError>> {
        let dir = self
            .socket_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| Report::new(WatchSetupError))
            .attach_printable_lazy(|| format!("no parent directory: {:?}", self.socket_path))?;
        let socket_name = self.socket_path.file_name().map(OsString::from);

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if touches_socket(&event, socket_name.as_deref()) {
                        debug!("Filesystem event: {:?}", event);
                        let _ = wake.try_send(());
                    }
                }
                Err(e) => {
                    error!("Filesystem watch error: {:?}", e);
                }
            },
            Config::default(),
        )
        .change_context(WatchSetupError)?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .change_context(WatchSetupError)
            .attach_printable_lazy(|| format!("directory: {dir:?}"))?;
        Ok(watcher)
    }
}

fn touches_socket(event: &Event, socket_name: Option<&std::ffi::OsStr>) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    relevant && event.paths.iter().any(|p| p.file_name() == socket_name)
}

async fn inode(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.ino())
}
