//! Variable access for external callers.
//!
//! Transport-neutral: a front end (HTTP or otherwise) maps paths and bodies
//! onto [`VarApi::read`] and [`VarApi::write`] and [`ApiError`] onto its own
//! status codes.  Bodies use the persisted record layout, `{"value": …}`.

use std::sync::Arc;

use tracing::info;

use crate::clock::is_clock_variable;
use crate::error::ApiError;
use crate::store::Record;
use crate::var::VarStore;

#[derive(Clone)]
pub struct VarApi {
    store: Arc<VarStore>,
}

impl VarApi {
    pub fn new(store: Arc<VarStore>) -> Self {
        Self { store }
    }

    /// Current value of `name`.
    pub fn read(&self, name: &str) -> Result<serde_json::Value, ApiError> {
        self.store
            .lookup(name)?
            .ok_or_else(|| ApiError::NotFound(name.to_owned()))
    }

    /// Set `name` from a `{"value": …}` body.  Returns whether the value
    /// changed.
    pub async fn write(&self, name: &str, body: &str) -> Result<bool, ApiError> {
        if is_clock_variable(name) {
            return Err(ApiError::Forbidden(name.to_owned()));
        }
        let record: Record =
            serde_json::from_str(body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if contains_object(&record.value) {
            return Err(ApiError::BadRequest("value must be a scalar or an array".into()));
        }
        let changed = self.store.set(name, record.value).await?;
        info!(var = name, changed, "variable written");
        Ok(changed)
    }
}

fn contains_object(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Object(_) => true,
        serde_json::Value::Array(items) => items.iter().any(contains_object),
        _ => false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
