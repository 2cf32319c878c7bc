//! Parameter sets and the global/variant resolver.
//!
//! Parameters are stored in a sorted map, so a [`Params`] value has exactly
//! one canonical encoding regardless of the order keys were supplied in. That
//! encoding is what task identities are fingerprinted from.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Params> for Value {
    fn from(value: Params) -> Self {
        Value::Map(value.0)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

/// A resolved, immutable mapping from parameter name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used while a parameter set is still being put
    /// together.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&Value, ConfigurationError> {
        self.0
            .get(key)
            .ok_or_else(|| ConfigurationError::Missing(key.to_string()))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigurationError> {
        match self.require(key)? {
            Value::Bool(value) => Ok(*value),
            _ => Err(mismatch(key, "bool")),
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, ConfigurationError> {
        match self.require(key)? {
            Value::Int(value) => Ok(*value),
            _ => Err(mismatch(key, "integer")),
        }
    }

    /// Integers are widened, everything else is rejected.
    pub fn get_f64(&self, key: &str) -> Result<f64, ConfigurationError> {
        match self.require(key)? {
            Value::Int(value) => Ok(*value as f64),
            Value::Float(value) => Ok(*value),
            _ => Err(mismatch(key, "number")),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ConfigurationError> {
        match self.require(key)? {
            Value::String(value) => Ok(value),
            _ => Err(mismatch(key, "string")),
        }
    }

    /// Rejects any key not listed in `allowed`, naming the first offender in
    /// key order.
    pub fn deny_unknown(&self, allowed: &[&str]) -> Result<(), ConfigurationError> {
        match self.keys().find(|key| !allowed.contains(key)) {
            Some(key) => Err(ConfigurationError::Unknown(key.to_string())),
            None => Ok(()),
        }
    }

    /// The canonical encoding, keys sorted at every level.
    pub fn to_canonical_json(&self) -> String {
        // A sorted map of plain values can't fail to serialize.
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    pub(crate) fn describe(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let parts: Vec<_> = self.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Some(parts.join(", "))
    }
}

fn mismatch(key: &str, expected: &'static str) -> ConfigurationError {
    ConfigurationError::Type {
        key: key.to_string(),
        expected,
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Layers a variant parameter set over the shared global one.
///
/// The merge is shallow: a key present in `variant` replaces the global value
/// wholesale, nested mappings included. Keys are not validated here.
pub fn resolve(global: &Params, variant: &Params) -> Params {
    let mut merged = global.0.clone();

    for (key, value) in &variant.0 {
        merged.insert(key.clone(), value.clone());
    }

    Params(merged)
}

/// Builds a [`Params`] from `key => value` pairs.
///
/// ```
/// let params = kumo::params! { "bins" => 10, "alpha" => 0.5 };
/// assert_eq!(params.get_i64("bins").unwrap(), 10);
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::Params::new()$(.with($key, $value))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_overrides_global() {
        let global = params! { "a" => 1, "b" => 2 };
        let variant = params! { "b" => 3 };

        assert_eq!(resolve(&global, &variant), params! { "a" => 1, "b" => 3 });
    }

    #[test]
    fn test_empty_global() {
        let variant = params! { "x" => 5 };
        assert_eq!(resolve(&Params::new(), &variant), params! { "x" => 5 });
    }

    #[test]
    fn test_resolution_ignores_input_order() {
        let forward: Params = vec![("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        let backward: Params = vec![("c", 3), ("b", 2), ("a", 1)].into_iter().collect();
        let variant: Params = vec![("c", 30), ("a", 10)].into_iter().collect();
        let variant_rev: Params = vec![("a", 10), ("c", 30)].into_iter().collect();

        let one = resolve(&forward, &variant);
        let two = resolve(&backward, &variant_rev);

        assert_eq!(one, two);
        assert_eq!(one.to_canonical_json(), two.to_canonical_json());
        assert_eq!(one.to_canonical_json(), r#"{"a":10,"b":2,"c":30}"#);
    }

    #[test]
    fn test_merge_is_shallow() {
        let global = params! { "nested" => params! { "x" => 1, "y" => 2 } };
        let variant = params! { "nested" => params! { "x" => 9 } };

        let merged = resolve(&global, &variant);
        assert_eq!(merged.get("nested"), Some(&Value::from(params! { "x" => 9 })));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let merged = resolve(&params! { "a" => 1 }, &params! { "zzz_custom" => "keep" });
        assert_eq!(merged.get_str("zzz_custom").unwrap(), "keep");
    }

    #[test]
    fn test_typed_accessors() {
        let params = params! { "n" => 3, "x" => 0.5, "s" => "hi", "flag" => true };

        assert_eq!(params.get_f64("n").unwrap(), 3.0);
        assert_eq!(params.get_f64("x").unwrap(), 0.5);
        assert_eq!(params.get_str("s").unwrap(), "hi");
        assert!(params.get_bool("flag").unwrap());

        match params.get_i64("s") {
            Err(ConfigurationError::Type { key, expected }) => {
                assert_eq!(key, "s");
                assert_eq!(expected, "integer");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            params.get_f64("missing"),
            Err(ConfigurationError::Missing(key)) if key == "missing"
        ));
    }

    #[test]
    fn test_deny_unknown_names_key() {
        let params = params! { "bins" => 10, "colour" => "red" };
        let err = params.deny_unknown(&["bins"]).unwrap_err();
        assert!(matches!(err, ConfigurationError::Unknown(key) if key == "colour"));
    }

    #[test]
    fn test_from_json_numbers() {
        let params = Params::from_json(r#"{"bins": 10, "alpha": 0.25, "tag": "a"}"#).unwrap();

        assert_eq!(params.get("bins"), Some(&Value::Int(10)));
        assert_eq!(params.get("alpha"), Some(&Value::Float(0.25)));
        assert_eq!(params.get("tag"), Some(&Value::from("a")));
    }

    #[test]
    fn test_display() {
        let value = Value::from(params! { "a" => 1, "b" => vec![1.5, 2.0] });
        assert_eq!(value.to_string(), "{a: 1, b: [1.5, 2]}");
    }
}
