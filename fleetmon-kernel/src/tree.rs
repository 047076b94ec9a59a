/**
 * TREE - Dynamic structure exchanged with the host agents
 *
 * ROLE : Request envelopes and agent responses are string-keyed trees of
 * scalars, arrays and nested maps. This module is the single in-memory
 * representation of both directions.
 *
 * SHAPE : Scalar | Array | Map, convertible to and from serde_json::Value.
 * Readers are lenient on scalars (agents send booleans as "YES", ports as
 * strings...) and return Option so a missing key never panics.
 */

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Scalar(Scalar),
    Array(Vec<Tree>),
    Map(BTreeMap<String, Tree>),
}

impl Tree {
    pub fn null() -> Self {
        Tree::Scalar(Scalar::Null)
    }

    pub fn str<S: Into<String>>(value: S) -> Self {
        Tree::Scalar(Scalar::Str(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Tree::Scalar(Scalar::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Tree::Scalar(Scalar::Bool(value))
    }

    pub fn array<I: IntoIterator<Item = Tree>>(items: I) -> Self {
        Tree::Array(items.into_iter().collect())
    }

    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Tree)>,
    {
        Tree::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn empty_map() -> Self {
        Tree::Map(BTreeMap::new())
    }

    /// Converts any serializable value (configuration structs mostly).
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Tree::from)
    }

    /// Looks up a key; `None` when the key is absent or `self` is not a map.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        self.as_map().and_then(|m| m.get(key))
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Tree>> {
        match self {
            Tree::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Tree]> {
        match self {
            Tree::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer reader accepting numbers and numeric strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Tree::Scalar(Scalar::Int(i)) => Some(*i),
            Tree::Scalar(Scalar::Float(f)) if f.fract() == 0.0 => Some(*f as i64),
            Tree::Scalar(Scalar::Str(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean reader accepting `true`, `"YES"`, `"true"` and `1` style values.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Tree::Scalar(Scalar::Bool(b)) => Some(*b),
            Tree::Scalar(Scalar::Int(i)) => Some(*i != 0),
            Tree::Scalar(Scalar::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "y" | "1" => Some(true),
                "no" | "false" | "n" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Tree::Scalar(Scalar::Null))
    }

    /// Renders a scalar as a human-readable message. Containers and null yield `None`.
    pub fn to_message(&self) -> Option<String> {
        match self {
            Tree::Scalar(Scalar::Str(s)) => Some(s.clone()),
            Tree::Scalar(Scalar::Int(i)) => Some(i.to_string()),
            Tree::Scalar(Scalar::Float(f)) => Some(f.to_string()),
            Tree::Scalar(Scalar::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Tree::null(),
            Value::Bool(b) => Tree::bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Tree::int(i),
                None => Tree::Scalar(Scalar::Float(n.as_f64().unwrap_or_default())),
            },
            Value::String(s) => Tree::str(s),
            Value::Array(items) => Tree::Array(items.into_iter().map(Tree::from).collect()),
            Value::Object(map) => Tree::Map(map.into_iter().map(|(k, v)| (k, Tree::from(v))).collect()),
        }
    }
}

impl From<&Tree> for Value {
    fn from(tree: &Tree) -> Self {
        match tree {
            Tree::Scalar(Scalar::Null) => Value::Null,
            Tree::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Tree::Scalar(Scalar::Int(i)) => Value::Number(Number::from(*i)),
            Tree::Scalar(Scalar::Float(f)) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Tree::Scalar(Scalar::Str(s)) => Value::String(s.clone()),
            Tree::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            Tree::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect()),
        }
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tree::Scalar(Scalar::Null) => serializer.serialize_unit(),
            Tree::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            Tree::Scalar(Scalar::Int(i)) => serializer.serialize_i64(*i),
            Tree::Scalar(Scalar::Float(f)) => serializer.serialize_f64(*f),
            Tree::Scalar(Scalar::Str(s)) => serializer.serialize_str(s),
            Tree::Array(items) => items.serialize(serializer),
            Tree::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Tree::from)
    }
}
