//! # Search Criteria
//!
//! Filters accepted by each repository's `search`. Every field is optional;
//! an all-default criteria value matches every row.

use serde::{Deserialize, Serialize};

use crate::types::{ReportKind, ReportSeverity, ReportStatus, TopicCategory, UserRole};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCriteria {
    /// Case-insensitive substring of username or display name.
    pub name_contains: Option<String>,
    pub role: Option<UserRole>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicCriteria {
    pub title_contains: Option<String>,
    pub category: Option<TopicCategory>,
    /// Only topics this user moderates.
    pub moderated_by: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportCriteria {
    pub topic_id: Option<String>,
    pub author_id: Option<String>,
    /// Any of these statuses; empty means all.
    pub statuses: Vec<ReportStatus>,
    pub kind: Option<ReportKind>,
    pub severity: Option<ReportSeverity>,
    pub title_contains: Option<String>,
}

impl ReportCriteria {
    /// Reports of one topic.
    pub fn in_topic(topic_id: impl Into<String>) -> Self {
        ReportCriteria {
            topic_id: Some(topic_id.into()),
            ..Default::default()
        }
    }

    /// Reports still needing work.
    pub fn unresolved(mut self) -> Self {
        self.statuses = ReportStatus::ALL
            .iter()
            .copied()
            .filter(|status| !status.is_closed())
            .collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCriteria {
    pub report_id: Option<String>,
    pub author_id: Option<String>,
}

impl PostCriteria {
    pub fn in_report(report_id: impl Into<String>) -> Self {
        PostCriteria {
            report_id: Some(report_id.into()),
            author_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationCriteria {
    pub recipient_id: Option<String>,
    pub unread_only: bool,
}

impl NotificationCriteria {
    pub fn inbox(recipient_id: impl Into<String>) -> Self {
        NotificationCriteria {
            recipient_id: Some(recipient_id.into()),
            unread_only: false,
        }
    }
}
