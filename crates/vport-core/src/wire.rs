// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Request/response shapes exchanged with the data source.

use crate::{Record, RequestId, Uid, ViewName};
use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Inclusive position range, written `start:end` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceRange {
    pub start: usize,
    pub end: usize,
}

impl SliceRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn positions(self) -> impl Iterator<Item = usize> {
        self.start..=self.end
    }
}

impl fmt::Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for SliceRange {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (start, end) = raw
            .split_once(':')
            .ok_or_else(|| anyhow!("slice {raw:?} must look like start:end"))?;
        let start = start
            .trim()
            .parse()
            .with_context(|| format!("invalid slice start in {raw:?}"))?;
        let end = end
            .trim()
            .parse()
            .with_context(|| format!("invalid slice end in {raw:?}"))?;
        Ok(Self { start, end })
    }
}

impl Serialize for SliceRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SliceRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FetchRequest {
    pub action: String,
    pub view: ViewName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<SliceRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rownum: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_before: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_after: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cacheid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cached: Vec<Uid>,
    #[serde(default)]
    pub purge: bool,
    #[serde(default)]
    pub checkcache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub request_id: Option<RequestId>,
    /// View the response belongs to when it is not tied to a request id.
    #[serde(default)]
    pub id: Option<ViewName>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub data: BTreeMap<Uid, Record>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub rowlist: BTreeMap<Uid, usize>,
    #[serde(default)]
    pub metadata: Option<Record>,
    #[serde(default)]
    pub cacheid: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub totalrows: Option<usize>,
    #[serde(default)]
    pub rownum: Option<usize>,
    #[serde(default)]
    pub search: bool,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub resetmd: bool,
    #[serde(default)]
    pub update: bool,
}

impl FetchResponse {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("decode fetch response")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("encode fetch response")
    }
}

/// Servers that serialize empty associative arrays emit `[]`; treat that as
/// an empty map.
fn map_or_empty_list<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    D: Deserializer<'de>,
    K: DeserializeOwned + Ord,
    V: DeserializeOwned,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList<K: Ord, V> {
        Map(BTreeMap<K, V>),
        List(Vec<serde_json::Value>),
    }

    match MapOrList::<K, V>::deserialize(deserializer)? {
        MapOrList::Map(map) => Ok(map),
        MapOrList::List(items) if items.is_empty() => Ok(BTreeMap::new()),
        MapOrList::List(_) => Err(serde::de::Error::custom(
            "expected an object or an empty list",
        )),
    }
}

/// Where the controller sends fetches. Responses come back later through
/// `ViewPort::ajax_response`.
pub trait DataSource {
    fn fetch(&mut self, request: FetchRequest);
}

/// Collects requests for a host loop to deliver.
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: VecDeque<FetchRequest>,
    issued: usize,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_all(&mut self) -> Vec<FetchRequest> {
        self.pending.drain(..).collect()
    }

    pub fn pop(&mut self) -> Option<FetchRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total requests ever received.
    pub fn issued(&self) -> usize {
        self.issued
    }
}

impl DataSource for RequestQueue {
    fn fetch(&mut self, request: FetchRequest) {
        self.issued += 1;
        self.pending.push_back(request);
    }
}
