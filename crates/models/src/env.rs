//! Application runtime environment

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single environment variable assigned to an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVariable {
    pub name: String,
    pub value: String,
}

impl EnvVariable {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered list of environment variables
pub type EnvVariableList = Vec<EnvVariable>;

/// Converts a name -> value map into a list sorted by name.
#[must_use]
pub fn from_map(map: BTreeMap<String, String>) -> EnvVariableList {
    map.into_iter()
        .map(|(name, value)| EnvVariable { name, value })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_map_is_sorted_by_name() {
        let mut map = BTreeMap::new();
        map.insert("ZED".to_string(), "1".to_string());
        map.insert("ALPHA".to_string(), "2".to_string());

        let list = from_map(map);
        let names: Vec<_> = list.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["ALPHA", "ZED"]);
    }
}
