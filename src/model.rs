use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON field name under which the key travels alongside the resource fields.
pub const IDEMPOTENCY_KEY_FIELD: &str = "idempotencyKey";

/// A stored record describing the outcome of a previously handled request.
///
/// The shape of `fields` belongs to the middleware (request fingerprint,
/// response status, headers, body, ...). The store never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyResource {
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IdempotencyResource {
    pub fn new(idempotency_key: impl Into<String>) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            fields: Map::new(),
        }
    }

    pub fn with_fields(idempotency_key: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            fields,
        }
    }

    /// Adds or replaces a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn into_parts(self) -> (String, Map<String, Value>) {
        (self.idempotency_key, self.fields)
    }

    /// Encodes everything except the key as a JSON object string.
    pub fn encode_payload(&self) -> serde_json::Result<String> {
        if self.fields.contains_key(IDEMPOTENCY_KEY_FIELD) {
            let mut stripped = self.fields.clone();
            stripped.remove(IDEMPOTENCY_KEY_FIELD);
            serde_json::to_string(&stripped)
        } else {
            serde_json::to_string(&self.fields)
        }
    }

    /// Rebuilds a resource from a stored payload and the key it was read under.
    /// Anything other than a JSON object is rejected.
    pub fn decode_payload(idempotency_key: &str, payload: &str) -> serde_json::Result<Self> {
        let mut fields: Map<String, Value> = serde_json::from_str(payload)?;
        fields.remove(IDEMPOTENCY_KEY_FIELD);
        Ok(Self::with_fields(idempotency_key, fields))
    }
}
