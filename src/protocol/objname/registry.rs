//! Local management registries for the in-process transport

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde_json::Value;

use super::name::ObjectName;

/// Handler invoked when an operation is executed on a registered object.
pub type OperationHandler = Box<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A local management interface: the in-process counterpart of a remote
/// endpoint, selected when an endpoint has no connection data.
pub trait ManagedRegistry: Send + Sync {
    /// Concrete names of registered objects matching the pattern.
    fn query_names(&self, pattern: &ObjectName) -> Vec<ObjectName>;

    /// Reads one attribute of one registered object.
    fn get_attribute(&self, name: &ObjectName, attribute: &str) -> Option<Value>;

    /// Whether the object carries the attribute at all.
    fn has_attribute(&self, name: &ObjectName, attribute: &str) -> bool;

    /// Invokes a registered operation handler.
    fn invoke(&self, name: &ObjectName, operation: &str, args: &[Value]) -> Result<Value, String>;
}

/// In-memory [`ManagedRegistry`] holding objects, their attribute values,
/// and operation handlers.
///
/// Writers (e.g. the platform cache publishing a fresh snapshot) replace
/// whole attribute maps under the lock; readers only hold it for the copy.
#[derive(Default)]
pub struct LocalRegistry {
    objects: RwLock<BTreeMap<ObjectName, BTreeMap<String, Value>>>,
    operations: RwLock<HashMap<(String, String), OperationHandler>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an object (or replaces its attributes wholesale).
    pub fn register(&self, name: ObjectName, attributes: BTreeMap<String, Value>) {
        self.objects.write().expect("registry lock poisoned").insert(name, attributes);
    }

    pub fn unregister(&self, name: &ObjectName) {
        self.objects.write().expect("registry lock poisoned").remove(name);
    }

    pub fn set_attribute(&self, name: &ObjectName, attribute: impl Into<String>, value: Value) {
        let mut objects = self.objects.write().expect("registry lock poisoned");
        if let Some(attributes) = objects.get_mut(name) {
            attributes.insert(attribute.into(), value);
        }
    }

    /// Registers an operation handler for `name`/`operation`.
    pub fn register_operation(&self, name: &ObjectName, operation: impl Into<String>, handler: OperationHandler) {
        self.operations
            .write()
            .expect("registry lock poisoned")
            .insert((name.to_string(), operation.into()), handler);
    }
}

impl ManagedRegistry for LocalRegistry {
    fn query_names(&self, pattern: &ObjectName) -> Vec<ObjectName> {
        self.objects
            .read()
            .expect("registry lock poisoned")
            .keys()
            .filter(|name| pattern.matches(name))
            .cloned()
            .collect()
    }

    fn get_attribute(&self, name: &ObjectName, attribute: &str) -> Option<Value> {
        self.objects
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .and_then(|attributes| attributes.get(attribute))
            .cloned()
    }

    fn has_attribute(&self, name: &ObjectName, attribute: &str) -> bool {
        self.objects
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .is_some_and(|attributes| attributes.contains_key(attribute))
    }

    fn invoke(&self, name: &ObjectName, operation: &str, args: &[Value]) -> Result<Value, String> {
        let operations = self.operations.read().expect("registry lock poisoned");
        match operations.get(&(name.to_string(), operation.to_string())) {
            Some(handler) => handler(args),
            None => Err(format!("no operation [{operation}] registered on [{name}]")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with_pools() -> LocalRegistry {
        let registry = LocalRegistry::new();
        registry.register(
            ObjectName::parse("app:type=Pool,name=a").unwrap(),
            BTreeMap::from([(String::from("size"), json!(4))]),
        );
        registry.register(
            ObjectName::parse("app:type=Pool,name=b").unwrap(),
            BTreeMap::from([(String::from("size"), json!(8))]),
        );
        registry.register(
            ObjectName::parse("app:type=Queue,name=q").unwrap(),
            BTreeMap::from([(String::from("depth"), json!(0))]),
        );
        registry
    }

    #[test]
    fn test_query_names_by_pattern() {
        let registry = registry_with_pools();
        let names = registry.query_names(&ObjectName::parse("app:type=Pool,name=*").unwrap());
        assert_eq!(names.len(), 2);

        let all = registry.query_names(&ObjectName::parse("app:*").unwrap());
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_get_attribute() {
        let registry = registry_with_pools();
        let name = ObjectName::parse("app:type=Pool,name=a").unwrap();
        assert_eq!(registry.get_attribute(&name, "size"), Some(json!(4)));
        assert_eq!(registry.get_attribute(&name, "missing"), None);
        assert!(registry.has_attribute(&name, "size"));
    }

    #[test]
    fn test_invoke_registered_operation() {
        let registry = registry_with_pools();
        let name = ObjectName::parse("app:type=Pool,name=a").unwrap();
        registry.register_operation(&name, "drain", Box::new(|_args| Ok(json!("drained"))));

        assert_eq!(registry.invoke(&name, "drain", &[]).unwrap(), json!("drained"));
        assert!(registry.invoke(&name, "unknown", &[]).is_err());
    }
}
