use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Investment memo review state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl MemoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoStatus::Draft => "draft",
            MemoStatus::PendingReview => "pending_review",
            MemoStatus::Approved => "approved",
            MemoStatus::Rejected => "rejected",
            MemoStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MemoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub startup_name: String,
    pub status: MemoStatus,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Memo {
    /// Most recent known timestamp for feed ordering.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.submitted_at).or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Investor,
    Founder,
    Admin,
    #[serde(other)]
    Unknown,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Investor => "investor",
            UserRole::Founder => "founder",
            UserRole::Admin => "admin",
            UserRole::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestorProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: UserRole,
    #[serde(default)]
    pub firm: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Severity carried by activity log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: ActivityLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetric {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LiveRecord;
    use serde_json::json;

    #[test]
    fn test_memo_decodes_from_live_record() {
        let record = LiveRecord::new(
            "memo-1",
            json!({
                "title": "Seed round",
                "startupName": "Acme",
                "status": "pending_review",
                "submittedAt": "2024-05-01T10:00:00Z"
            }),
        );
        let memo: Memo = record.decode().unwrap();
        assert_eq!(memo.id, "memo-1");
        assert_eq!(memo.status, MemoStatus::PendingReview);
        assert_eq!(memo.startup_name, "Acme");
        assert!(memo.last_activity().is_some());
    }

    #[test]
    fn test_unknown_enum_values_do_not_fail() {
        let memo: Memo = LiveRecord::new("m", json!({"status": "archived"}))
            .decode()
            .unwrap();
        assert_eq!(memo.status, MemoStatus::Unknown);

        let profile: InvestorProfile = LiveRecord::new("p", json!({"role": "partner"}))
            .decode()
            .unwrap();
        assert_eq!(profile.role, UserRole::Unknown);
    }

    #[test]
    fn test_activity_level_defaults_to_info() {
        let entry: ActivityEntry = LiveRecord::new(
            "a1",
            json!({"action": "deal_created", "timestamp": "2024-05-01T10:00:00Z"}),
        )
        .decode()
        .unwrap();
        assert_eq!(entry.level, ActivityLevel::Info);
    }
}
