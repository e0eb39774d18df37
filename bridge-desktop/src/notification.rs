//! Notification presenter that writes to the log.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    notification::{Notification, NotificationPresenter},
};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::info;

/// Desktop presenter for headless runs: every notification becomes an
/// `info!` record, and the visible set is kept for inspection.
#[derive(Debug, Default)]
pub struct LogNotificationPresenter {
    visible: RwLock<BTreeMap<u32, Notification>>,
}

impl LogNotificationPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently visible notification with `id`.
    pub fn current(&self, id: u32) -> Option<Notification> {
        self.visible.read().ok()?.get(&id).cloned()
    }
}

#[async_trait]
impl NotificationPresenter for LogNotificationPresenter {
    async fn show(&self, notification: &Notification) -> Result<()> {
        info!(
            id = notification.id,
            title = %notification.title,
            ongoing = notification.ongoing,
            "{}",
            notification.body
        );
        if let Ok(mut visible) = self.visible.write() {
            visible.insert(notification.id, notification.clone());
        }
        Ok(())
    }

    async fn dismiss(&self, id: u32) -> Result<()> {
        if let Ok(mut visible) = self.visible.write() {
            visible.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_show_replaces_and_dismiss_removes() {
        let presenter = LogNotificationPresenter::new();
        presenter
            .show(&Notification::ongoing(1, "Photo sync", "Uploading: a.jpg (1/2)"))
            .await
            .unwrap();
        presenter
            .show(&Notification::ongoing(1, "Photo sync", "Uploading: b.jpg (2/2)"))
            .await
            .unwrap();

        assert_eq!(
            presenter.current(1).unwrap().body,
            "Uploading: b.jpg (2/2)"
        );

        presenter.dismiss(1).await.unwrap();
        presenter.dismiss(42).await.unwrap();
        assert!(presenter.current(1).is_none());
    }
}
