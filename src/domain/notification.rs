use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ContributionSuccess,
    NewContribution,
    ContributionFailed,
    TransactionCancelled,
}

/// An event pushed to a user through the platform's notification channel.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Notification {
    pub user_id: u64,
    pub kind: NotificationKind,
    pub content: String,
    /// Project the event refers to, when there is one.
    pub related_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: u64,
        kind: NotificationKind,
        content: impl Into<String>,
        related_id: Option<u64>,
    ) -> Self {
        Self {
            user_id,
            kind,
            content: content.into(),
            related_id,
            created_at: Utc::now(),
        }
    }
}
