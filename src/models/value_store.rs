use std::collections::HashMap;

use serde_json::Value;

/// Named values extracted during one execution. Never shared between runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStore {
    values: HashMap<String, Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        ValueStore::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}
