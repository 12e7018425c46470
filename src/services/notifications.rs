//! Notification feed: memos, investor sign-ups and activity entries flattened
//! into one list, newest first.

use std::sync::Arc;
use tokio::sync::watch;

use super::combine::Combiner;
use super::subscription::QueryState;
use crate::domain::{
    ActivityEntry, ActivityLevel, InvestorProfile, Memo, MemoStatus, Notification,
    NotificationKind, Severity, UserRole,
};
use crate::error::SyncError;

pub const DEFAULT_NOTIFICATION_CAP: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFeed {
    pub items: Arc<Vec<Notification>>,
    pub loading: bool,
    pub error: Option<SyncError>,
}

fn memo_subject(memo: &Memo) -> String {
    match (memo.title.is_empty(), memo.startup_name.is_empty()) {
        (false, false) => format!("{} ({})", memo.title, memo.startup_name),
        (false, true) => memo.title.clone(),
        (true, false) => memo.startup_name.clone(),
        (true, true) => memo.id.clone(),
    }
}

pub fn memo_notification(memo: &Memo) -> Option<Notification> {
    let (kind, severity, title, verb) = match memo.status {
        MemoStatus::PendingReview => (
            NotificationKind::MemoSubmitted,
            Severity::Warning,
            "Memo submitted for review",
            "awaits review",
        ),
        MemoStatus::Approved => (
            NotificationKind::MemoApproved,
            Severity::Success,
            "Memo approved",
            "was approved",
        ),
        MemoStatus::Rejected => (
            NotificationKind::MemoRejected,
            Severity::Error,
            "Memo rejected",
            "was rejected",
        ),
        MemoStatus::Draft | MemoStatus::Unknown => return None,
    };

    // Submissions are dated by submission, decisions by the last update.
    let timestamp = match memo.status {
        MemoStatus::PendingReview => memo.submitted_at.or_else(|| memo.last_activity()),
        _ => memo.last_activity(),
    };

    Some(Notification {
        id: format!("{}-{}", kind.as_str(), memo.id),
        kind,
        title: title.to_string(),
        message: format!("{} {}", memo_subject(memo), verb),
        timestamp: timestamp.unwrap_or_default(),
        severity,
    })
}

pub fn profile_notification(profile: &InvestorProfile) -> Option<Notification> {
    if profile.role != UserRole::Investor {
        return None;
    }

    let name = if profile.display_name.is_empty() {
        profile.id.as_str()
    } else {
        profile.display_name.as_str()
    };
    let message = match &profile.firm {
        Some(firm) if !firm.is_empty() => format!("{} ({}) joined the platform", name, firm),
        _ => format!("{} joined the platform", name),
    };

    Some(Notification {
        id: format!("{}-{}", NotificationKind::NewInvestor.as_str(), profile.id),
        kind: NotificationKind::NewInvestor,
        title: "New investor".to_string(),
        message,
        timestamp: profile.created_at.unwrap_or_default(),
        severity: Severity::Info,
    })
}

pub fn activity_notification(entry: &ActivityEntry) -> Notification {
    let severity = match entry.level {
        ActivityLevel::Info => Severity::Info,
        ActivityLevel::Success => Severity::Success,
        ActivityLevel::Warning => Severity::Warning,
        ActivityLevel::Error => Severity::Error,
    };
    let message = if entry.message.is_empty() {
        match &entry.actor {
            Some(actor) => format!("{} by {}", entry.action, actor),
            None => entry.action.clone(),
        }
    } else {
        entry.message.clone()
    };

    Notification {
        id: format!("{}-{}", NotificationKind::Activity.as_str(), entry.id),
        kind: NotificationKind::Activity,
        title: entry.action.replace('_', " "),
        message,
        timestamp: entry.timestamp,
        severity,
    }
}

/// Map every source, concatenate (memos, profiles, activity), sort newest
/// first and keep `cap` entries. Equal timestamps keep concatenation order.
pub fn merge_notifications(
    memos: &[Memo],
    profiles: &[InvestorProfile],
    activity: &[ActivityEntry],
    cap: usize,
) -> Vec<Notification> {
    let mut feed: Vec<Notification> = memos
        .iter()
        .filter_map(memo_notification)
        .chain(profiles.iter().filter_map(profile_notification))
        .chain(activity.iter().map(activity_notification))
        .collect();

    feed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    feed.truncate(cap);
    feed
}

pub fn combine_feed(
    memos: &QueryState<Memo>,
    profiles: &QueryState<InvestorProfile>,
    activity: &QueryState<ActivityEntry>,
    cap: usize,
) -> NotificationFeed {
    NotificationFeed {
        items: Arc::new(merge_notifications(
            &memos.data,
            &profiles.data,
            &activity.data,
            cap,
        )),
        loading: memos.loading || profiles.loading || activity.loading,
        error: memos
            .error
            .clone()
            .or_else(|| profiles.error.clone())
            .or_else(|| activity.error.clone()),
    }
}

pub struct NotificationMerger;

impl NotificationMerger {
    pub fn spawn(
        memos: watch::Receiver<QueryState<Memo>>,
        profiles: watch::Receiver<QueryState<InvestorProfile>>,
        activity: watch::Receiver<QueryState<ActivityEntry>>,
        cap: usize,
    ) -> Combiner<NotificationFeed> {
        Combiner::spawn(
            "notification-merger",
            memos,
            profiles,
            activity,
            move |m, p, a| combine_feed(m, p, a, cap),
        )
    }
}
