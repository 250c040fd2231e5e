//! Saneamiento de valores antes de persistirlos.
//!
//! - `truncate_large_values`: elide strings de más de 64 KiB.
//! - `redact_secrets`: reescribe cualquier ocurrencia literal de un valor de
//!   secreto resuelto por su placeholder `<secret::KEY>`. El atributo en
//!   memoria no cambia: la redacción opera sobre la copia serializada.
//! - `bytes_to_value`: serializa bytes arbitrarios como UTF-8 o, si no son
//!   válidos, como el sentinela documentado (no hace round-trip; es
//!   intencional).

use std::collections::HashMap;

use serde_json::Value;

use crate::constants::MAX_PREVIEW_SIZE;

pub fn truncate_large_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), truncate_large_values(v))).collect()),
        Value::Array(items) => Value::Array(items.iter().map(truncate_large_values).collect()),
        Value::String(s) if s.len() > MAX_PREVIEW_SIZE => Value::String(format!("<truncated {} bytes>", s.len())),
        other => other.clone(),
    }
}

/// `secrets_by_value` mapea valor resuelto → clave del secreto.
pub fn redact_secrets(value: &Value, secrets_by_value: &HashMap<String, String>) -> Value {
    match value {
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), redact_secrets(v, secrets_by_value))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_secrets(v, secrets_by_value)).collect()),
        Value::String(s) => {
            let mut out = s.clone();
            for (secret_value, key) in secrets_by_value {
                if out.contains(secret_value.as_str()) {
                    out = out.replace(secret_value.as_str(), &format!("<secret::{key}>"));
                }
            }
            Value::String(out)
        }
        other => other.clone(),
    }
}

/// Serializa bytes como string JSON. Bytes que no son UTF-8 válido se
/// representan con el sentinela y no vuelven a los bytes originales.
pub fn bytes_to_value(bytes: &[u8]) -> Value {
    match std::str::from_utf8(bytes) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => Value::String(format!("<non-serializable bytes:{}>", bytes.len())),
    }
}
