//! The entity/relationship document the JSON step must produce.
//!
//! [`SCHEMA_JSON`] is embedded verbatim in every JSON-generation prompt.
//! [`validate_document`] checks a merged document against the same shape.
//! The schema is closed: unknown fields at any level are rejected.
//!
//! Validation runs in two passes. A structural walk over the
//! [`serde_json::Value`] collects *every* violation with its path
//! (`entities[2].id: ...`) so the user sees all problems at once; only
//! then is the value deserialised into the typed model.

use crate::error::Pdf2CsvError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Draft-07 JSON schema text, embedded in JSON prompts.
pub const SCHEMA_JSON: &str = include_str!("schema.json");

/// Root of a validated extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionDocument {
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Relationship>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<Relations>,
}

/// Hierarchical links of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
    /// Set by the model when an optional relation could not be found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

impl ExtractionDocument {
    /// Pretty JSON with absent optional fields omitted.
    pub fn to_pretty_json(&self) -> Result<String, Pdf2CsvError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Pdf2CsvError::Internal(format!("serialise document: {e}")))
    }
}

/// Entity ids: ASCII letters, digits, `-` and `_`, at least one character.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validate `json` against the entity/relationship schema.
///
/// Returns every violation found in [`Pdf2CsvError::SchemaValidation`].
pub fn validate_document(json: &str) -> Result<ExtractionDocument, Pdf2CsvError> {
    let value: Value = serde_json::from_str(json).map_err(|e| Pdf2CsvError::SchemaValidation {
        errors: vec![format!("(root): invalid JSON: {e}")],
    })?;

    let errors = collect_violations(&value);
    if !errors.is_empty() {
        return Err(Pdf2CsvError::SchemaValidation { errors });
    }

    serde_json::from_value(value).map_err(|e| Pdf2CsvError::SchemaValidation {
        errors: vec![format!("(root): {e}")],
    })
}

// ── Structural walk ──────────────────────────────────────────────────────────

const ROOT_FIELDS: &[&str] = &["entities", "relationships"];
const ENTITY_FIELDS: &[&str] = &["id", "type", "name", "attributes", "relations"];
const RELATIONS_FIELDS: &[&str] = &["parent", "children", "missing"];
const RELATIONSHIP_FIELDS: &[&str] = &["source", "target", "type", "properties"];

fn collect_violations(root: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(obj) = root.as_object() else {
        errors.push("(root): expected an object".to_string());
        return errors;
    };
    reject_unknown(obj, ROOT_FIELDS, "", &mut errors);

    match obj.get("entities") {
        None => errors.push("entities: field required".to_string()),
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_entity(item, &format!("entities[{i}]"), &mut errors);
            }
        }
        Some(_) => errors.push("entities: expected an array".to_string()),
    }

    match obj.get("relationships") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_relationship(item, &format!("relationships[{i}]"), &mut errors);
            }
        }
        Some(_) => errors.push("relationships: expected an array".to_string()),
    }

    errors
}

fn check_entity(value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(obj) = value.as_object() else {
        errors.push(format!("{path}: expected an object"));
        return;
    };
    reject_unknown(obj, ENTITY_FIELDS, path, errors);

    if let Some(id) = required_string(obj, "id", path, errors) {
        if !is_valid_id(id) {
            errors.push(format!(
                "{path}.id: '{id}' does not match pattern ^[a-zA-Z0-9-_]+$"
            ));
        }
    }
    required_string(obj, "type", path, errors);
    required_string(obj, "name", path, errors);
    optional_object(obj, "attributes", path, errors);

    match obj.get("relations") {
        None | Some(Value::Null) => {}
        Some(Value::Object(rel)) => {
            let rel_path = format!("{path}.relations");
            reject_unknown(rel, RELATIONS_FIELDS, &rel_path, errors);
            match rel.get("parent") {
                None | Some(Value::Null) | Some(Value::String(_)) => {}
                Some(_) => errors.push(format!("{rel_path}.parent: expected a string")),
            }
            match rel.get("children") {
                None | Some(Value::Null) => {}
                Some(Value::Array(children)) => {
                    for (j, child) in children.iter().enumerate() {
                        if !child.is_string() {
                            errors.push(format!("{rel_path}.children[{j}]: expected a string"));
                        }
                    }
                }
                Some(_) => errors.push(format!("{rel_path}.children: expected an array")),
            }
            match rel.get("missing") {
                None | Some(Value::Null) | Some(Value::Bool(_)) => {}
                Some(_) => errors.push(format!("{rel_path}.missing: expected a boolean")),
            }
        }
        Some(_) => errors.push(format!("{path}.relations: expected an object")),
    }
}

fn check_relationship(value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(obj) = value.as_object() else {
        errors.push(format!("{path}: expected an object"));
        return;
    };
    reject_unknown(obj, RELATIONSHIP_FIELDS, path, errors);
    required_string(obj, "source", path, errors);
    required_string(obj, "target", path, errors);
    required_string(obj, "type", path, errors);
    optional_object(obj, "properties", path, errors);
}

fn reject_unknown(obj: &Map<String, Value>, allowed: &[&str], path: &str, errors: &mut Vec<String>) {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.push(format!("{}: extra field not permitted", join(path, key)));
        }
    }
}

fn required_string<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    path: &str,
    errors: &mut Vec<String>,
) -> Option<&'a str> {
    match obj.get(field) {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            errors.push(format!("{}: expected a string", join(path, field)));
            None
        }
        None => {
            errors.push(format!("{}: field required", join(path, field)));
            None
        }
    }
}

fn optional_object(obj: &Map<String, Value>, field: &str, path: &str, errors: &mut Vec<String>) {
    match obj.get(field) {
        None | Some(Value::Null) | Some(Value::Object(_)) => {}
        Some(_) => errors.push(format!("{}: expected an object", join(path, field))),
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violations(json: &str) -> Vec<String> {
        match validate_document(json) {
            Err(Pdf2CsvError::SchemaValidation { errors }) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn schema_text_is_valid_json() {
        let v: Value = serde_json::from_str(SCHEMA_JSON).unwrap();
        assert_eq!(v["required"], serde_json::json!(["entities"]));
    }

    #[test]
    fn minimal_document_validates() {
        let doc = validate_document(r#"{"entities":[{"id":"inv-1","type":"Invoice","name":"INV 1"}]}"#)
            .unwrap();
        assert_eq!(doc.entities[0].kind, "Invoice");
        assert!(doc.relationships.is_none());
    }

    #[test]
    fn full_document_roundtrips_without_nulls() {
        let json = r#"{
            "entities": [
                {"id": "c_1", "type": "Customer", "name": "ACME",
                 "attributes": {"country": "FR", "vip": true},
                 "relations": {"children": ["inv-1"], "parent": null}},
                {"id": "inv-1", "type": "Invoice", "name": "INV 1",
                 "relations": {"parent": "c_1", "missing": false}}
            ],
            "relationships": [
                {"source": "inv-1", "target": "c_1", "type": "billed_to",
                 "properties": {"currency": "EUR"}}
            ]
        }"#;
        let doc = validate_document(json).unwrap();
        let pretty = doc.to_pretty_json().unwrap();
        assert!(!pretty.contains("null"));
        assert!(pretty.contains("\"billed_to\""));
        assert_eq!(validate_document(&pretty).unwrap(), doc);
    }

    #[test]
    fn unknown_fields_are_rejected_at_every_level() {
        let errors = violations(
            r#"{"entities":[{"id":"a","type":"t","name":"n","colour":"red",
                "relations":{"sibling":"b"}}],
               "extra":1}"#,
        );
        assert!(errors.contains(&"extra: extra field not permitted".to_string()));
        assert!(errors.contains(&"entities[0].colour: extra field not permitted".to_string()));
        assert!(errors
            .contains(&"entities[0].relations.sibling: extra field not permitted".to_string()));
    }

    #[test]
    fn bad_ids_and_missing_fields_are_all_reported() {
        let errors = violations(
            r#"{"entities":[{"id":"has space","type":"t","name":"n"},{"type":"t"}]}"#,
        );
        assert!(errors.iter().any(|e| e.starts_with("entities[0].id: 'has space'")));
        assert!(errors.contains(&"entities[1].id: field required".to_string()));
        assert!(errors.contains(&"entities[1].name: field required".to_string()));
    }

    #[test]
    fn entities_are_required() {
        assert_eq!(violations(r#"{"relationships":[]}"#), vec!["entities: field required"]);
    }

    #[test]
    fn empty_entity_list_is_accepted() {
        assert!(validate_document(r#"{"entities":[]}"#).is_ok());
    }

    #[test]
    fn relationship_fields_are_checked() {
        let errors = violations(
            r#"{"entities":[],"relationships":[{"source":"a","type":3,"weight":1}]}"#,
        );
        assert!(errors.contains(&"relationships[0].target: field required".to_string()));
        assert!(errors.contains(&"relationships[0].type: expected a string".to_string()));
        assert!(errors.contains(&"relationships[0].weight: extra field not permitted".to_string()));
    }

    #[test]
    fn non_json_and_non_object_fail() {
        assert!(violations("not json")[0].contains("invalid JSON"));
        assert_eq!(violations("[1]"), vec!["(root): expected an object"]);
    }

    #[test]
    fn id_pattern() {
        assert!(is_valid_id("abc-DEF_123"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a.b"));
        assert!(!is_valid_id("é"));
    }
}
