use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shared::error::{FaceError, Result};

/// A single configuration value. Deserializes from plain JSON scalars/arrays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

impl ConfigValue {
    fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::Str(_) => "string",
            ConfigValue::IntList(_) => "int list",
            ConfigValue::FloatList(_) => "float list",
            ConfigValue::StrList(_) => "string list",
        }
    }

    /// `[]` carries no element type, so it is any kind of list.
    fn is_empty_list(&self) -> bool {
        match self {
            ConfigValue::IntList(v) => v.is_empty(),
            ConfigValue::FloatList(v) => v.is_empty(),
            ConfigValue::StrList(v) => v.is_empty(),
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ConfigValue {
            fn from(v: $ty) -> Self {
                ConfigValue::$variant(v.into())
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    f64 => Float,
    f32 => Float,
    String => Str,
    &str => Str,
    Vec<i64> => IntList,
    Vec<f64> => FloatList,
    Vec<String> => StrList,
}

/// Typed key → value store carried alongside each model.
///
/// Getters fail with a configuration error on a missing key or a type
/// mismatch. Integers are accepted wherever floats are expected, since
/// JSON does not distinguish `1` from `1.0`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigBag {
    values: BTreeMap<String, ConfigValue>,
}

impl ConfigBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `self` with every key of `overrides` replacing its own.
    pub fn merged_with(&self, overrides: &ConfigBag) -> ConfigBag {
        let mut merged = self.clone();
        for (k, v) in &overrides.values {
            merged.values.insert(k.clone(), v.clone());
        }
        merged
    }

    fn require(&self, key: &str) -> Result<&ConfigValue> {
        self.values
            .get(key)
            .ok_or_else(|| FaceError::Configuration(format!("missing config key `{key}`")))
    }

    fn mismatch(key: &str, expected: &str, found: &ConfigValue) -> FaceError {
        FaceError::Configuration(format!(
            "config key `{key}` expected {expected}, found {}",
            found.kind()
        ))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.require(key)? {
            ConfigValue::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(key, "bool", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.require(key)? {
            ConfigValue::Int(v) => Ok(*v),
            other => Err(Self::mismatch(key, "int", other)),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        match self.require(key)? {
            ConfigValue::Float(v) => Ok(*v),
            ConfigValue::Int(v) => Ok(*v as f64),
            other => Err(Self::mismatch(key, "float", other)),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            ConfigValue::Str(v) => Ok(v),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }

    pub fn get_int_list(&self, key: &str) -> Result<Vec<i64>> {
        match self.require(key)? {
            ConfigValue::IntList(v) => Ok(v.clone()),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(Self::mismatch(key, "int list", other)),
        }
    }

    pub fn get_float_list(&self, key: &str) -> Result<Vec<f64>> {
        match self.require(key)? {
            ConfigValue::FloatList(v) => Ok(v.clone()),
            ConfigValue::IntList(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(Self::mismatch(key, "float list", other)),
        }
    }

    /// A single string is accepted as a one-element list.
    pub fn get_str_list(&self, key: &str) -> Result<Vec<String>> {
        match self.require(key)? {
            ConfigValue::StrList(v) => Ok(v.clone()),
            ConfigValue::Str(v) => Ok(vec![v.clone()]),
            other if other.is_empty_list() => Ok(Vec::new()),
            other => Err(Self::mismatch(key, "string list", other)),
        }
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        if self.contains(key) {
            self.get_bool(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_float_or(&self, key: &str, default: f64) -> Result<f64> {
        if self.contains(key) {
            self.get_float(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64> {
        if self.contains(key) {
            self.get_int(key)
        } else {
            Ok(default)
        }
    }
}
