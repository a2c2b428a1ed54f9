// Host power state source
//
// The state is polled from a file holding the host state property string,
// e.g. "xyz.openbmc_project.State.Host.HostState.Off". Without a file the
// state stays Unknown, which is treated like a running host.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const HOST_STATE_OFF: &str = "xyz.openbmc_project.State.Host.HostState.Off";

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostState {
    On,
    Off,
    #[default]
    Unknown,
}

impl HostState {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let last = value.rsplit('.').next().unwrap_or(value);
        match last {
            "Off" => HostState::Off,
            "On" | "Running" => HostState::On,
            _ => HostState::Unknown,
        }
    }

    pub fn is_off(&self) -> bool {
        *self == HostState::Off
    }
}

pub struct HostStateMonitor {
    path: PathBuf,
    tx: watch::Sender<HostState>,
}

impl HostStateMonitor {
    pub fn new(path: PathBuf) -> (Self, watch::Receiver<HostState>) {
        let (tx, rx) = watch::channel(HostState::Unknown);
        (Self { path, tx }, rx)
    }

    /// Receiver for a host state nobody reports
    pub fn unknown() -> watch::Receiver<HostState> {
        let (tx, rx) = watch::channel(HostState::Unknown);
        drop(tx);
        rx
    }

    /// Read the file once and publish the state if it changed
    pub async fn poll(&self) -> HostState {
        let state = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => HostState::parse(&contents),
            Err(e) => {
                tracing::debug!("Failed to read host state from {}: {}", self.path.display(), e);
                HostState::Unknown
            }
        };

        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::info!("Host state changed: {:?} -> {:?}", current, state);
            *current = state;
            true
        });
        state
    }

    pub fn start(self, cancel_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tracing::info!("Polling host state from {}", self.path.display());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::info!("Host state monitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        self.poll().await;
                    }
                }
            }
        })
    }
}
