//! Shared primitive types.

use serde_json::Value;

/// A JSON object: request payloads, data views and stored records.
pub type Document = serde_json::Map<String, Value>;

/// Name of the identity field on stored documents.
pub const ID_FIELD: &str = "id";

/// Return the identity value of `doc`, if it carries a usable one.
///
/// `null` and the empty string count as "no identity", so a client that
/// posts `{"id": null, ...}` still gets an insert.
pub fn identity(doc: &Document) -> Option<&Value> {
    match doc.get(ID_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(v),
    }
}

/// Build the `{ "id": <value> }` filter used for identity lookups.
pub fn identity_filter(id: Value) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_string(), id);
    filter
}
