use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque value that cannot be serialized deterministically
///
/// Templates only see `{ "type": <type name> }` for a resource, and cache
/// fingerprints fall back to the type name, so two resources of the same
/// type fingerprint identically.
#[derive(Clone)]
pub struct Resource {
    type_name: &'static str,
    handle: Option<Arc<dyn Any + Send + Sync>>,
}

impl Resource {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            handle: Some(Arc::new(value)),
        }
    }

    /// A resource that only remembers its type (serialization failed)
    pub fn unserializable(type_name: &'static str) -> Self {
        Self {
            type_name,
            handle: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle.as_ref().and_then(|h| h.downcast_ref::<T>())
    }

    fn to_template_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::String(self.type_name.to_string()));
        Value::Object(map)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// A single named value available to templates
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Resource(Resource),
}

impl Binding {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Value(v) => Some(v),
            Binding::Resource(_) => None,
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Binding::Resource(_))
    }

    /// The value templates see when they reference this binding
    pub fn to_template_value(&self) -> Value {
        match self {
            Binding::Value(v) => v.clone(),
            Binding::Resource(r) => r.to_template_value(),
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Value(value)
    }
}

impl From<Resource> for Binding {
    fn from(resource: Resource) -> Self {
        Binding::Resource(resource)
    }
}

/// Named values available to a template during evaluation
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: IndexMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a serializable value
    ///
    /// Values whose `Serialize` impl fails are kept as type-only resources
    /// rather than dropped.
    pub fn set<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        let binding = match serde_json::to_value(&value) {
            Ok(v) => Binding::Value(v),
            Err(e) => {
                log::warn!(
                    "Binding '{}' could not be serialized ({}); storing it as an opaque {}",
                    key,
                    e,
                    std::any::type_name::<V>()
                );
                Binding::Resource(Resource::unserializable(std::any::type_name::<V>()))
            }
        };
        self.entries.insert(key, binding);
    }

    pub fn set_resource<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries
            .insert(key.into(), Binding::Resource(Resource::new(value)));
    }

    pub fn insert(&mut self, key: impl Into<String>, binding: impl Into<Binding>) {
        self.entries.insert(key.into(), binding.into());
    }

    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.entries.get(key)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(Binding::as_value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Binding> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.entries.iter()
    }

    /// Overlay `other` on top of these bindings; `other` wins on collisions
    pub fn merge(&mut self, other: Bindings) {
        for (key, binding) in other.entries {
            self.entries.insert(key, binding);
        }
    }

    pub fn has_resources(&self) -> bool {
        self.entries.values().any(Binding::is_resource)
    }

    /// Flatten into the JSON object the renderer resolves names against
    pub fn to_template_data(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, b)| (k.clone(), b.to_template_value()))
            .collect()
    }

    /// Build bindings from a JSON object, e.g. a `--vars` file
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k, Binding::Value(v)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::{Serialize, Serializer};
    use serde_json::json;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    struct Connection {
        id: u32,
    }

    #[test]
    fn test_set_and_get() {
        let mut bindings = Bindings::new();
        bindings.set("name", "World");
        bindings.set("count", 3);
        bindings.set("tags", vec!["a", "b"]);

        assert_eq!(bindings.get_value("name"), Some(&json!("World")));
        assert_eq!(bindings.get_value("count"), Some(&json!(3)));
        assert_eq!(bindings.get_value("tags"), Some(&json!(["a", "b"])));
        assert_eq!(bindings.len(), 3);
        assert!(!bindings.has_resources());
    }

    #[test]
    fn test_merge_overrides_existing_keys() {
        let mut base = Bindings::new();
        base.set("title", "Home");
        base.set("user", "ann");

        let mut extra = Bindings::new();
        extra.set("title", "Card");

        base.merge(extra);
        assert_eq!(base.get_value("title"), Some(&json!("Card")));
        assert_eq!(base.get_value("user"), Some(&json!("ann")));
    }

    #[test]
    fn test_unserializable_value_becomes_resource() {
        let mut bindings = Bindings::new();
        bindings.set("broken", Unserializable);

        let binding = bindings.get("broken").unwrap();
        assert!(binding.is_resource());
        assert!(bindings.has_resources());
        match binding {
            Binding::Resource(r) => assert!(r.type_name().ends_with("Unserializable")),
            _ => panic!("Expected resource"),
        }
    }

    #[test]
    fn test_resource_handle_and_template_view() {
        let mut bindings = Bindings::new();
        bindings.set_resource("db", Connection { id: 7 });

        match bindings.get("db").unwrap() {
            Binding::Resource(r) => {
                assert_eq!(r.downcast_ref::<Connection>().map(|c| c.id), Some(7));
            }
            _ => panic!("Expected resource"),
        }

        let data = bindings.to_template_data();
        let type_name = data["db"]["type"].as_str().unwrap();
        assert!(type_name.ends_with("Connection"));
    }

    #[test]
    fn test_from_json_requires_object() {
        let bindings = Bindings::from_json(json!({"a": 1, "b": [true]})).unwrap();
        assert_eq!(bindings.get_value("b"), Some(&json!([true])));

        assert!(Bindings::from_json(json!([1, 2])).is_none());
    }
}
