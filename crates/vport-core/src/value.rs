// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute bag for one row or one metadata set.
pub type Record = BTreeMap<String, Value>;

/// Record key holding a row's class/flag list.
pub const FLAGS_KEY: &str = "bg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Map(Record),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_f64()
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| value as usize)
    }

    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    const fn is_scalar(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Number(_))
    }

    /// Flattened human-visible text, used for client-side text matching.
    pub fn visible_text(&self, out: &mut String) {
        match self {
            Self::Null => {}
            Self::Bool(value) => push_word(out, if *value { "true" } else { "false" }),
            Self::Number(value) => push_word(out, &format_number(*value)),
            Self::Text(value) => push_word(out, value),
            Self::List(items) => {
                for item in items {
                    item.visible_text(out);
                }
            }
            Self::Map(map) => {
                for item in map.values() {
                    item.visible_text(out);
                }
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Merges `patch` into `target`: text and numbers overwrite in place, maps
/// merge key by key into an existing map, anything else replaces.
pub fn merge_record(target: &mut Record, patch: Record) {
    for (key, value) in patch {
        if value.is_scalar() {
            target.insert(key, value);
            continue;
        }
        match (target.get_mut(&key), value) {
            (Some(Value::Map(existing)), Value::Map(incoming)) => merge_record(existing, incoming),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

pub fn record_flags(record: &Record) -> Vec<String> {
    match record.get(FLAGS_KEY) {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_owned))
            .collect(),
        Some(Value::Text(single)) => single.split_whitespace().map(str::to_owned).collect(),
        _ => Vec::new(),
    }
}

/// Adds or removes one flag from the record's class list. Returns whether the
/// list changed.
pub fn set_record_flag(record: &mut Record, flag: &str, add: bool) -> bool {
    let mut flags = record_flags(record);
    let present = flags.iter().any(|existing| existing == flag);
    if add == present {
        return false;
    }
    if add {
        flags.push(flag.to_owned());
    } else {
        flags.retain(|existing| existing != flag);
    }
    record.insert(
        FLAGS_KEY.to_owned(),
        Value::List(flags.into_iter().map(Value::Text).collect()),
    );
    true
}

pub fn record_text(record: &Record) -> String {
    let mut out = String::new();
    for (key, value) in record {
        if key == FLAGS_KEY {
            continue;
        }
        value.visible_text(&mut out);
    }
    out
}

fn push_word(out: &mut String, word: &str) {
    if word.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(word);
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
