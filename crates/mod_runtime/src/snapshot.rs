//! Persistent-state snapshots carried across hot reloads.
//!
//! A reloadable mod exports a snapshot of its marked fields before the old
//! code generation is dropped; matching fields are merged into the new
//! generation's defaults and imported after the reload. The wire form is
//! JSON so generations built from different sources stay interoperable.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Declared type of a persistent field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FieldKind {
    Int,
    Float,
    Bool,
    Text,
    /// Enumerations carry their type name; values are stored as ordinals
    /// and transfer even between differently-named enum types.
    Enum { ty: String },
}

/// One field marked for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentField {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub value: Value,
}

/// A mod's exported persistent state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub fields: Vec<PersistentField>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn field(&self, name: &str) -> Option<&PersistentField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind, value: Value) -> Self {
        self.fields.push(PersistentField {
            name: name.into(),
            kind,
            value,
        });
        self
    }

    /// Merge values from an old generation's snapshot into this one.
    ///
    /// `self` holds the new generation's fields with default values; each
    /// field present in `old` under the same name and a compatible kind
    /// has its value copied over. Two enum fields are compatible even when
    /// their type names differ (the ordinal transfers). Anything else is
    /// skipped with a warning. Returns the number of fields carried over.
    pub fn merge_from(&mut self, old: &StateSnapshot, mod_id: &str) -> usize {
        let mut carried = 0;
        for field in &mut self.fields {
            let Some(prev) = old.field(&field.name) else {
                continue;
            };
            let compatible = prev.kind == field.kind
                || matches!(
                    (&prev.kind, &field.kind),
                    (FieldKind::Enum { .. }, FieldKind::Enum { .. })
                );
            if compatible {
                field.value = prev.value.clone();
                carried += 1;
            } else {
                warn!(
                    "[{}] field '{}' changed kind across reload ({:?} -> {:?}), value dropped",
                    mod_id, field.name, prev.kind, field.kind
                );
            }
        }
        carried
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn old_snapshot() -> StateSnapshot {
        StateSnapshot::new()
            .with_field("score", FieldKind::Int, json!(420))
            .with_field("label", FieldKind::Text, json!("kept"))
            .with_field(
                "mode",
                FieldKind::Enum {
                    ty: "OldMode".into(),
                },
                json!(2),
            )
    }

    #[test]
    fn matching_fields_carry_over() {
        let mut new = StateSnapshot::new()
            .with_field("score", FieldKind::Int, json!(0))
            .with_field("label", FieldKind::Text, json!(""));
        let carried = new.merge_from(&old_snapshot(), "m");
        assert_eq!(carried, 2);
        assert_eq!(new.field("score").unwrap().value, json!(420));
        assert_eq!(new.field("label").unwrap().value, json!("kept"));
    }

    #[test]
    fn kind_change_drops_the_value() {
        let mut new = StateSnapshot::new().with_field("score", FieldKind::Text, json!("fresh"));
        let carried = new.merge_from(&old_snapshot(), "m");
        assert_eq!(carried, 0);
        assert_eq!(new.field("score").unwrap().value, json!("fresh"));
    }

    #[test]
    fn enum_ordinal_transfers_across_renamed_types() {
        let mut new = StateSnapshot::new().with_field(
            "mode",
            FieldKind::Enum {
                ty: "NewMode".into(),
            },
            json!(0),
        );
        let carried = new.merge_from(&old_snapshot(), "m");
        assert_eq!(carried, 1);
        assert_eq!(new.field("mode").unwrap().value, json!(2));
    }

    #[test]
    fn fields_absent_in_the_old_generation_keep_defaults() {
        let mut new = StateSnapshot::new().with_field("brand_new", FieldKind::Bool, json!(true));
        assert_eq!(new.merge_from(&old_snapshot(), "m"), 0);
        assert_eq!(new.field("brand_new").unwrap().value, json!(true));
    }

    #[test]
    fn bytes_round_trip() {
        let snap = old_snapshot();
        let restored = StateSnapshot::from_bytes(&snap.to_bytes()).unwrap();
        assert_eq!(restored.fields.len(), 3);
        assert_eq!(restored.field("score").unwrap().value, json!(420));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        assert!(StateSnapshot::from_bytes(b"not json").is_err());
    }
}
