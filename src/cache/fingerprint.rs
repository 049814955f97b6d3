use crate::views::{Binding, Bindings};
use log::debug;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Cache key derived from a template name and its bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Lowercase hex SHA-256 digest
    pub key: String,
    /// False when some binding could only be represented by its type name,
    /// so distinct states may share this key
    pub exact: bool,
}

/// Fingerprint a render request
///
/// Bindings are serialized canonically (object keys sorted at every level),
/// so insertion order never changes the key.
pub fn fingerprint(name: &str, bindings: &Bindings) -> Fingerprint {
    let mut exact = true;
    let mut entries: Vec<(&String, &Binding)> = bindings.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut canonical = String::from("{");
    for (index, (key, binding)) in entries.into_iter().enumerate() {
        if index > 0 {
            canonical.push(',');
        }
        write_string(key, &mut canonical);
        canonical.push(':');
        match binding {
            Binding::Value(value) => write_canonical(value, &mut canonical),
            Binding::Resource(resource) => {
                exact = false;
                write_string(&format!("resource:{}", resource.type_name()), &mut canonical);
            }
        }
    }
    canonical.push('}');

    if !exact {
        debug!(
            "Bindings for '{}' contain resources; fingerprint is approximate",
            name
        );
    }

    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());

    Fingerprint {
        key: format!("{:x}", hasher.finalize()),
        exact,
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}

/// Compact JSON with object keys sorted
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
