//! # Geolocation Watcher
//!
//! Owns the hardware watch handle and turns provider callbacks into an
//! awaitable event stream with a bounded wait per fix.
//!
//! The handle is released on every exit path: explicit [`stop`], restart,
//! and drop. Once stopped, the receiving end of the sample channel is gone,
//! so late callbacks from the device land nowhere.
//!
//! [`stop`]: GeolocationWatcher::stop

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::provider::{PositionEvent, PositionProvider, WatchId, WatchOptions};
use crate::error::DeviceError;

struct ActiveWatch {
    id: WatchId,
    events: mpsc::UnboundedReceiver<PositionEvent>,
}

pub struct GeolocationWatcher {
    provider: Arc<dyn PositionProvider>,
    options: WatchOptions,
    active: Option<ActiveWatch>,
}

impl std::fmt::Debug for GeolocationWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeolocationWatcher")
            .field("options", &self.options)
            .field("watch_id", &self.active.as_ref().map(|a| a.id))
            .finish_non_exhaustive()
    }
}

impl GeolocationWatcher {
    pub fn new(provider: Arc<dyn PositionProvider>, options: WatchOptions) -> Self {
        Self {
            provider,
            options,
            active: None,
        }
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start continuous sampling, releasing any watch already running
    ///
    /// # Errors
    ///
    /// Returns the provider's [`DeviceError`] if the device refuses the watch
    /// (permission denied, no positioning hardware).
    pub fn start(&mut self) -> Result<(), DeviceError> {
        self.stop();

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.provider.watch_position(&self.options, tx)?;
        info!(
            "Started position watch {:?} (high_accuracy={}, timeout={:?})",
            id, self.options.high_accuracy, self.options.timeout
        );
        self.active = Some(ActiveWatch { id, events: rx });
        Ok(())
    }

    /// Release the hardware handle. Returns whether a watch was running.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(mut watch) => {
                watch.events.close();
                self.provider.clear_watch(watch.id);
                debug!("Cleared position watch {:?}", watch.id);
                true
            }
            None => false,
        }
    }

    /// Wait for the next sample or error
    ///
    /// Returns `None` when no watch is running or the provider closed the
    /// stream. A wait longer than the configured timeout yields
    /// `Some(Err(DeviceError::Timeout))`; the watch keeps running so the
    /// caller can keep waiting or switch to manual.
    pub async fn next_event(&mut self) -> Option<PositionEvent> {
        let timeout = self.options.timeout;
        let watch = self.active.as_mut()?;

        match tokio::time::timeout(timeout, watch.events.recv()).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                debug!("Position provider closed watch {:?}", watch.id);
                self.stop();
                None
            }
            Err(_) => {
                warn!("No position fix within {:?}", timeout);
                Some(Err(DeviceError::Timeout))
            }
        }
    }
}

impl Drop for GeolocationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::provider::mocks::ScriptedProvider;
    use std::time::Duration;

    fn watcher(provider: &ScriptedProvider) -> GeolocationWatcher {
        let options = WatchOptions {
            timeout: Duration::from_millis(50),
            ..WatchOptions::default()
        };
        GeolocationWatcher::new(Arc::new(provider.clone()), options)
    }

    #[tokio::test]
    async fn test_start_and_receive_sample() {
        let provider = ScriptedProvider::new();
        let mut w = watcher(&provider);
        w.start().unwrap();
        assert!(w.is_active());

        assert!(provider.push_fix(51.5, -0.12, 12.0));
        let event = w.next_event().await.unwrap().unwrap();
        assert_eq!(event.accuracy_m, 12.0);
    }

    #[tokio::test]
    async fn test_stop_releases_handle_and_late_samples_are_dropped() {
        let provider = ScriptedProvider::new();
        let mut w = watcher(&provider);
        w.start().unwrap();

        assert!(w.stop());
        assert_eq!(provider.active_watches(), 0);
        assert!(!provider.push_fix(51.5, -0.12, 3.0));
        assert!(w.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let provider = ScriptedProvider::new();
        let mut w = watcher(&provider);
        w.start().unwrap();
        assert!(w.stop());
        assert!(!w.stop());
        assert_eq!(provider.cleared_count(), 1);
    }

    #[tokio::test]
    async fn test_restart_clears_previous_watch() {
        let provider = ScriptedProvider::new();
        let mut w = watcher(&provider);
        w.start().unwrap();
        w.start().unwrap();
        assert_eq!(provider.active_watches(), 1);
        assert_eq!(provider.cleared_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_handle() {
        let provider = ScriptedProvider::new();
        {
            let mut w = watcher(&provider);
            w.start().unwrap();
        }
        assert_eq!(provider.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let provider = ScriptedProvider::new();
        let mut w = watcher(&provider);
        w.start().unwrap();
        let event = w.next_event().await.unwrap();
        assert_eq!(event, Err(DeviceError::Timeout));
        assert!(w.is_active());
    }

    #[tokio::test]
    async fn test_device_error_forwarded() {
        let provider = ScriptedProvider::new();
        let mut w = watcher(&provider);
        w.start().unwrap();
        provider.push(Err(DeviceError::PositionUnavailable));
        assert_eq!(
            w.next_event().await.unwrap(),
            Err(DeviceError::PositionUnavailable)
        );
    }

    #[test]
    fn test_start_error_leaves_watcher_inactive() {
        let provider = ScriptedProvider::new();
        provider.set_start_error(DeviceError::PermissionDenied);
        let mut w = watcher(&provider);
        assert_eq!(w.start(), Err(DeviceError::PermissionDenied));
        assert!(!w.is_active());
    }
}
