use indexmap::IndexMap;

use super::types::Value;

/// Named, insertion-ordered bag of values backing one template namespace
/// (`inputs`, `system`, `client`, ...).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueStore {
    pub name: String,
    values: IndexMap<String, Value>,
}

impl ValueStore {
    pub fn new(name: &str) -> ValueStore {
        ValueStore { name: name.to_string(), values: IndexMap::new() }
    }

    pub fn with_values_from_map(mut self, values: &IndexMap<String, Value>) -> Self {
        for (key, value) in values.iter() {
            self.values.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
