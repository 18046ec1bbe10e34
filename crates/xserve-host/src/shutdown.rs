//! Stop signalling shared by the hosts.
//!
//! A host owns a `watch` channel holding `Option<StopMode>`. `None` means
//! running. Dropping the sender counts as a drain request, so a host whose
//! handle is dropped winds down gracefully in the background.

use tokio::sync::watch;

/// How in-flight work is treated when a server stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Stop accepting, let in-flight requests finish.
    Drain,
    /// Stop accepting and terminate in-flight requests.
    Force,
}

impl StopMode {
    /// Map the lifecycle `close_all` flag onto a mode.
    pub fn from_close_all(close_all: bool) -> Self {
        if close_all { Self::Force } else { Self::Drain }
    }
}

pub(crate) type StopSender = watch::Sender<Option<StopMode>>;
pub(crate) type StopReceiver = watch::Receiver<Option<StopMode>>;

pub(crate) fn stop_channel() -> (StopSender, StopReceiver) {
    watch::channel(None)
}

/// Resolves once a stop is requested.
pub(crate) async fn stop_requested(rx: &mut StopReceiver) -> StopMode {
    let mode = rx.wait_for(Option::is_some).await.ok().and_then(|mode| *mode);
    mode.unwrap_or(StopMode::Drain)
}

/// Resolves only if a forced stop is requested.
pub(crate) async fn force_requested(mut rx: StopReceiver) {
    let forced = rx
        .wait_for(|mode| *mode == Some(StopMode::Force))
        .await
        .is_ok();
    if !forced {
        std::future::pending::<()>().await;
    }
}
