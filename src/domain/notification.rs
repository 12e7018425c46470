use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MemoSubmitted,
    MemoApproved,
    MemoRejected,
    NewInvestor,
    Activity,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::MemoSubmitted => "memo_submitted",
            NotificationKind::MemoApproved => "memo_approved",
            NotificationKind::MemoRejected => "memo_rejected",
            NotificationKind::NewInvestor => "new_investor",
            NotificationKind::Activity => "activity",
        }
    }
}

/// Common shape every feed source is mapped into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}
