//! Builder for one audit entry prior to actor/timing stamping.

use crate::AuditError;
use office_types::{AuditAction, AuditEntityType};
use serde::Serialize;
use serde_json::Value;

/// What happened, to which entity, with optional before/after payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub action: AuditAction,
    pub entity_type: AuditEntityType,
    pub entity_id: u64,
    pub description: String,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub metadata: Option<Value>,
}

impl Activity {
    pub fn new(action: AuditAction, entity_type: AuditEntityType) -> Self {
        Self {
            action,
            entity_type,
            entity_id: 0,
            description: String::new(),
            old_values: None,
            new_values: None,
            metadata: None,
        }
    }

    pub fn entity(mut self, entity_id: u64) -> Self {
        self.entity_id = entity_id;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Snapshot before the change.
    pub fn old_values<T: Serialize>(mut self, values: &T) -> Result<Self, AuditError> {
        self.old_values = Some(serde_json::to_value(values)?);
        Ok(self)
    }

    /// Snapshot after the change.
    pub fn new_values<T: Serialize>(mut self, values: &T) -> Result<Self, AuditError> {
        self.new_values = Some(serde_json::to_value(values)?);
        Ok(self)
    }

    pub fn metadata<T: Serialize>(mut self, metadata: &T) -> Result<Self, AuditError> {
        self.metadata = Some(serde_json::to_value(metadata)?);
        Ok(self)
    }

    pub fn with_new_json(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn with_metadata_json(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn payload_serialization_failure_is_reported() {
        // Non-string map keys cannot become a JSON object.
        let mut bad = BTreeMap::new();
        bad.insert((1, 2), "x");
        let err = Activity::new(AuditAction::TaskUpdate, AuditEntityType::Task)
            .new_values(&bad)
            .unwrap_err();
        assert!(matches!(err, AuditError::Serialization(_)));
    }

    #[test]
    fn builder_sets_fields() {
        let a = Activity::new(AuditAction::TaskAssign, AuditEntityType::Task)
            .entity(9)
            .description("Assigned task")
            .old_values(&serde_json::json!({"assigned_to": null}))
            .unwrap();
        assert_eq!(a.entity_id, 9);
        assert_eq!(a.old_values, Some(serde_json::json!({"assigned_to": null})));
        assert!(a.new_values.is_none());
    }
}
