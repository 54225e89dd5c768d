//! History - append-only field-level audit trail for assets
//!
//! History rows are never mutated and deliberately carry no foreign key to
//! the asset table: the audit trail survives an asset being shadow-deleted
//! during a rehome.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a history row records
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    TagAdded,
    TagRemoved,
    Deleted,
}

/// A single audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub id: String,
    pub asset_id: String,
    pub action: HistoryAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl HistoryEvent {
    pub fn new(asset_id: impl Into<String>, action: HistoryAction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            asset_id: asset_id.into(),
            action,
            field: None,
            old_value: None,
            new_value: None,
            timestamp: crate::domain::now_millis(),
            user_id: None,
        }
    }

    /// Record a single field transition
    pub fn field_change(
        asset_id: impl Into<String>,
        field: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            old_value,
            new_value,
            ..Self::new(asset_id, HistoryAction::Updated)
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
