//! System notifications for long-running work.
//!
//! The foreground sync host keeps the user informed through an ongoing
//! notification. Hosts map this onto a notification channel, a tray icon or
//! plain logs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Stable id; showing a notification with an existing id replaces it
    pub id: u32,
    pub title: String,
    pub body: String,
    /// Ongoing notifications cannot be swiped away by the user
    pub ongoing: bool,
}

impl Notification {
    pub fn ongoing(id: u32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            ongoing: true,
        }
    }

    pub fn finished(id: u32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            ongoing: false,
        }
    }
}

#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    /// Show or replace the notification with `notification.id`.
    async fn show(&self, notification: &Notification) -> Result<()>;

    /// Remove the notification. Unknown ids are ignored.
    async fn dismiss(&self, id: u32) -> Result<()>;
}
