//! Fallback bodies for degraded endpoints
//!
//! Downstream code reads specific fields out of these bodies, so each shape
//! is fixed per endpoint family rather than a generic empty value.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::rule::normalize;

/// Title carried by the single-task stand-in record
pub const TASK_STAND_IN_TITLE: &str = "Access denied";

const TASK_STAND_IN_DESCRIPTION: &str = "You do not have permission to view this task.";

/// Shape of the body synthesized for a degraded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackSpec {
    /// Empty paginated envelope: `{"items": [], "total": 0}`
    EmptyList,
    /// `{}`
    EmptyObject,
    /// Singleton settings object: `{"settings": {}}`
    EmptySettings,
    /// Fully populated placeholder for a single task
    TaskStandIn,
}

impl FallbackSpec {
    pub fn label(&self) -> &'static str {
        match self {
            FallbackSpec::EmptyList => "empty_list",
            FallbackSpec::EmptyObject => "empty_object",
            FallbackSpec::EmptySettings => "empty_settings",
            FallbackSpec::TaskStandIn => "task_stand_in",
        }
    }

    /// Build the body for a request to `path`.
    pub fn render(&self, path: &str) -> Value {
        match self {
            FallbackSpec::EmptyList => json!({ "items": [], "total": 0 }),
            FallbackSpec::EmptyObject => json!({}),
            FallbackSpec::EmptySettings => json!({ "settings": {} }),
            FallbackSpec::TaskStandIn => task_stand_in(path),
        }
    }
}

/// Placeholder task for `/tasks/{id}`.
///
/// Every field a task view formats is present: dates are "now" so date
/// formatting never sees null, status and priority are neutral values.
fn task_stand_in(path: &str) -> Value {
    let now = chrono::Utc::now().to_rfc3339();
    json!({
        "id": resource_id(path),
        "title": TASK_STAND_IN_TITLE,
        "description": TASK_STAND_IN_DESCRIPTION,
        "status": "pending",
        "priority": "medium",
        "assignee_id": null,
        "lead_id": null,
        "due_date": now,
        "created_at": now,
        "updated_at": now,
        "access_denied": true,
    })
}

/// Trailing path segment, as a number when it parses as one.
fn resource_id(path: &str) -> Value {
    let id = normalize(path).rsplit('/').next().unwrap_or_default();
    match id.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(id),
    }
}
