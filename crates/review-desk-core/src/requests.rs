//! Support requests: status changes, notes, flags, deletion.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeskError;
use crate::store::{DocumentStore, FieldUpdate};

pub const REQUESTS: &str = "requests";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestUpdate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Appended to the request's `notes` unless already present.
    #[serde(default)]
    pub note: Option<Value>,
    #[serde(default)]
    pub flagged: Option<bool>,
}

impl RequestUpdate {
    fn updates(&self) -> Vec<(String, FieldUpdate)> {
        let mut updates = Vec::new();
        if let Some(status) = self.status.as_deref().filter(|s| !s.is_empty()) {
            updates.push(("status".into(), FieldUpdate::Set(Value::String(status.into()))));
        }
        if let Some(note) = self.note.as_ref().filter(|n| is_truthy(n)) {
            updates.push(("notes".into(), FieldUpdate::ArrayUnion(vec![note.clone()])));
        }
        if let Some(flagged) = self.flagged {
            updates.push(("flagged".into(), FieldUpdate::Set(Value::Bool(flagged))));
        }
        updates
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn require_id(id: &str) -> Result<(), DeskError> {
    if id.trim().is_empty() {
        return Err(DeskError::InvalidPayload("Missing request ID".into()));
    }
    Ok(())
}

/// Applies the provided changes to an existing request.
///
/// The request must exist, even when no field changes.
pub async fn update_request(store: &dyn DocumentStore, update: &RequestUpdate) -> Result<()> {
    require_id(&update.id)?;
    let updates = update.updates();
    let changed = updates.len();
    store.update(REQUESTS, &update.id, updates).await?;
    tracing::info!(id = %update.id, changed, "request updated");
    Ok(())
}

pub async fn delete_request(store: &dyn DocumentStore, id: &str) -> Result<()> {
    require_id(id)?;
    store.delete(REQUESTS, id).await?;
    tracing::info!(id, "request deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_provided_fields_change() {
        let u = RequestUpdate {
            id: "r1".into(),
            status: Some(String::new()),
            note: Some(json!("")),
            flagged: Some(false),
        };
        let updates = u.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "flagged");
    }

    #[test]
    fn test_note_becomes_array_union() {
        let u = RequestUpdate {
            id: "r1".into(),
            note: Some(json!({"by": "ana", "text": "called back"})),
            ..RequestUpdate::default()
        };
        assert_eq!(
            u.updates(),
            vec![(
                "notes".to_string(),
                FieldUpdate::ArrayUnion(vec![json!({"by": "ana", "text": "called back"})])
            )]
        );
    }
}
