use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{NormalizationError, StoreError};
use crate::normalize::{normalize, RecordShape};
use crate::ports::RecordStore;
use crate::types::SubscriptionRecord;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    MissingEndpoint,
    MissingKeys,
    InsecureEndpoint,
    UnknownOwner,
}

impl Issue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Issue::MissingEndpoint => "missing endpoint",
            Issue::MissingKeys => "missing p256dh or auth key",
            Issue::InsecureEndpoint => "endpoint is not https",
            Issue::UnknownOwner => "owner is not an active user",
        }
    }
}

impl From<NormalizationError> for Issue {
    fn from(err: NormalizationError) -> Self {
        match err {
            NormalizationError::MissingEndpoint => Issue::MissingEndpoint,
            NormalizationError::MissingKeys => Issue::MissingKeys,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FlaggedRecord {
    pub record_id: String,
    pub user_id: Option<String>,
    pub shape: &'static str,
    pub issue: Issue,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AuditReport {
    pub total: usize,
    pub valid: usize,
    pub flagged: Vec<FlaggedRecord>,
}

pub fn classify(
    record: &SubscriptionRecord,
    active_users: Option<&HashSet<String>>,
) -> Option<Issue> {
    let descriptor = match normalize(record) {
        Ok(descriptor) => descriptor,
        Err(err) => return Some(err.into()),
    };
    if !descriptor.is_secure() {
        return Some(Issue::InsecureEndpoint);
    }
    if let (Some(active_users), Some(user_id)) = (active_users, record.user_id.as_deref()) {
        if !active_users.contains(user_id) {
            return Some(Issue::UnknownOwner);
        }
    }
    None
}

/// Walks every stored subscription and flags the ones that can never be
/// delivered.
pub async fn audit(store: &dyn RecordStore, check_owners: bool) -> Result<AuditReport, StoreError> {
    let records = store.query_all().await?;
    let active_users = if check_owners {
        Some(store.query_active_user_ids().await?)
    } else {
        None
    };

    let mut report = AuditReport {
        total: records.len(),
        ..AuditReport::default()
    };
    for record in &records {
        match classify(record, active_users.as_ref()) {
            None => report.valid += 1,
            Some(issue) => report.flagged.push(FlaggedRecord {
                record_id: record.id.clone(),
                user_id: record.user_id.clone(),
                shape: RecordShape::of(&record.document).label(),
                issue,
            }),
        }
    }

    info!(
        total = report.total,
        valid = report.valid,
        flagged = report.flagged.len(),
        "subscription audit finished"
    );
    Ok(report)
}

/// Deletes every flagged record. Returns how many deletes succeeded.
pub async fn clean(store: &dyn RecordStore, report: &AuditReport) -> usize {
    let mut removed = 0;
    for flagged in &report.flagged {
        match store.delete(&flagged.record_id).await {
            Ok(()) => {
                info!(record_id = %flagged.record_id, issue = flagged.issue.as_str(), "removed subscription");
                removed += 1;
            }
            Err(err) => {
                warn!(record_id = %flagged.record_id, error = %err, "failed to remove subscription");
            }
        }
    }
    removed
}
