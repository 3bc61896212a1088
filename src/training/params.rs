//! Hyperparameter values, grids and candidate expansion

use crate::error::{GridfitError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    None,
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }

    fn from_json(name: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(ParamValue::None),
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(ParamValue::Int(i)),
                None => n.as_f64().map(ParamValue::Float).ok_or_else(|| {
                    GridfitError::invalid_param(name, n, "unrepresentable number")
                }),
            },
            Value::String(s) => Ok(ParamValue::Str(s.clone())),
            other => Err(GridfitError::invalid_param(
                name,
                other,
                "grid values must be scalars",
            )),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::None => f.write_str("None"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// One assignment of values to parameter names
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Read a strictly positive integer parameter
pub fn positive_usize(name: &str, value: &ParamValue) -> Result<usize> {
    match value.as_i64() {
        Some(v) if v > 0 => Ok(v as usize),
        _ => Err(GridfitError::invalid_param(name, value, "expected a positive integer")),
    }
}

/// Read a finite float parameter, optionally bounded below (exclusive)
pub fn float_above(name: &str, value: &ParamValue, floor: f64) -> Result<f64> {
    match value.as_f64() {
        Some(v) if v.is_finite() && v > floor => Ok(v),
        _ => Err(GridfitError::invalid_param(
            name,
            value,
            format!("expected a number greater than {}", floor),
        )),
    }
}

/// Read a boolean parameter
pub fn boolean(name: &str, value: &ParamValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| GridfitError::invalid_param(name, value, "expected a boolean"))
}

/// Hyperparameter search space: ordered name → candidate values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    entries: Vec<(String, Vec<ParamValue>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a parameter with its candidate values
    pub fn with<V: Into<ParamValue>>(mut self, name: &str, values: Vec<V>) -> Self {
        let values: Vec<ParamValue> = values.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = values,
            None => self.entries.push((name.to_string(), values)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Number of parameter combinations
    pub fn n_candidates(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).product()
    }

    /// Cartesian product of all values, last parameter varying fastest.
    ///
    /// An empty grid yields a single empty set (the estimator's defaults).
    pub fn candidates(&self) -> Vec<ParamSet> {
        let mut out = vec![ParamSet::new()];
        for (name, values) in &self.entries {
            let mut next = Vec::with_capacity(out.len() * values.len());
            for partial in &out {
                for value in values {
                    let mut set = partial.clone();
                    set.insert(name.clone(), value.clone());
                    next.push(set);
                }
            }
            out = next;
        }
        out
    }

    /// JSON object form, used to announce the search space
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, values) in &self.entries {
            let values = values
                .iter()
                .map(|v| serde_json::to_value(v).unwrap_or(Value::Null))
                .collect();
            map.insert(name.clone(), Value::Array(values));
        }
        Value::Object(map)
    }

    /// Parse a JSON object of `name: [values...]` (a scalar counts as one value)
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            GridfitError::ConfigError("parameter grid must be a JSON object".to_string())
        })?;

        let mut grid = ParamGrid::new();
        for (name, raw) in object {
            let values = match raw {
                Value::Array(items) => items
                    .iter()
                    .map(|item| ParamValue::from_json(name, item))
                    .collect::<Result<Vec<_>>>()?,
                scalar => vec![ParamValue::from_json(name, scalar)?],
            };
            if values.is_empty() {
                return Err(GridfitError::ConfigError(format!(
                    "parameter {} has no candidate values",
                    name
                )));
            }
            grid = grid.with(name, values);
        }
        Ok(grid)
    }

    /// Load `<dir>/<kind>.json` if present
    pub fn load_override(dir: impl AsRef<Path>, kind: &str) -> Result<Option<Self>> {
        let path = dir.as_ref().join(format!("{}.json", kind));
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            GridfitError::ConfigError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&value).map(Some)
    }
}

/// Render a parameter set as a JSON object
pub fn params_to_json(params: &ParamSet) -> Value {
    serde_json::to_value(params).unwrap_or(Value::Null)
}
