// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Windowed row cache for one view.
//!
//! Rows are addressed two ways: by position (1-based rank in the remote
//! ordering) and by unique id. `rowlist` and `uidlist` are kept as exact
//! inverses of each other; positions shift when rows are removed ahead of
//! them, ids never do.

use crate::content::RowData;
use crate::ids::dom_id_for;
use crate::selection::Selection;
use crate::value::{Record, Value, merge_record, set_record_flag};
use crate::{Uid, ViewName};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

pub const META_TOTAL_ROWS: &str = "total_rows";
pub const META_CACHE_ID: &str = "cacheid";
pub const META_LABEL: &str = "label";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferConfig {
    /// Cache window size as a multiple of the page size.
    pub buffer_pages: f64,
    /// Prefetch tolerance as a percentage of the buffer size.
    pub limit_factor: f64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_pages: 5.0,
            limit_factor: 35.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    pub current: usize,
    pub max: usize,
}

impl PageSize {
    pub const fn new(current: usize, max: usize) -> Self {
        Self { current, max }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateFlags {
    pub partial: bool,
    pub reset: bool,
    pub resetmd: bool,
    pub update: bool,
}

/// Which edge of the cache the scroll position is approaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nearing {
    Top,
    Bottom,
}

#[derive(Debug, Clone)]
pub struct Buffer {
    view: ViewName,
    config: BufferConfig,
    pages: PageSize,
    data: BTreeMap<Uid, Record>,
    uidlist: BTreeMap<Uid, usize>,
    rowlist: BTreeMap<usize, Uid>,
    partial: BTreeSet<Uid>,
    server_meta: Record,
    user_meta: Record,
    selected: Selection,
}

impl Buffer {
    pub fn new(view: ViewName, config: BufferConfig, pages: PageSize) -> Self {
        let mut buffer = Self {
            selected: Selection::new(view.clone()),
            view,
            config,
            pages,
            data: BTreeMap::new(),
            uidlist: BTreeMap::new(),
            rowlist: BTreeMap::new(),
            partial: BTreeSet::new(),
            server_meta: Record::new(),
            user_meta: Record::new(),
        };
        buffer.clear();
        buffer
    }

    pub fn view(&self) -> &ViewName {
        &self.view
    }

    pub fn page_size(&self) -> PageSize {
        self.pages
    }

    pub fn set_page_size(&mut self, pages: PageSize) {
        self.pages = pages;
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.partial.clear();
        self.uidlist.clear();
        self.rowlist.clear();
        self.server_meta = Record::from([(META_TOTAL_ROWS.to_owned(), Value::Number(0.0))]);
        self.user_meta.clear();
        self.selected = Selection::new(self.view.clone());
    }

    pub fn buffer_size(&self) -> usize {
        let by_max = (self.pages.max + 1) as f64;
        let by_pages = self.config.buffer_pages * self.pages.current as f64;
        by_max.max(by_pages).round() as usize
    }

    fn limit_tolerance(&self) -> usize {
        (self.buffer_size() as f64 * (self.config.limit_factor / 100.0)).round() as usize
    }

    pub fn update(
        &mut self,
        data: BTreeMap<Uid, Record>,
        rowlist: BTreeMap<Uid, usize>,
        metadata: Record,
        flags: UpdateFlags,
    ) {
        if !flags.reset && !self.data.is_empty() {
            if flags.partial || !self.partial.is_empty() {
                for uid in data.keys() {
                    if flags.partial {
                        self.partial.insert(uid.clone());
                    } else {
                        self.partial.remove(uid);
                    }
                }
            }
            self.data.extend(data);
        } else {
            self.partial = if flags.partial {
                data.keys().cloned().collect()
            } else {
                BTreeSet::new()
            };
            self.data = data;
        }

        if flags.update || flags.reset {
            self.uidlist.clear();
            self.rowlist.clear();
        }
        for (uid, position) in rowlist {
            self.link(uid, position);
        }

        if flags.resetmd {
            self.user_meta = metadata;
        } else {
            merge_record(&mut self.user_meta, metadata);
        }
    }

    fn link(&mut self, uid: Uid, position: usize) {
        if let Some(old_position) = self.uidlist.insert(uid.clone(), position)
            && old_position != position
            && self.rowlist.get(&old_position) == Some(&uid)
        {
            self.rowlist.remove(&old_position);
        }
        if let Some(displaced) = self.rowlist.insert(position, uid.clone())
            && displaced != uid
        {
            self.uidlist.remove(&displaced);
        }
    }

    /// True when the page starting after `offset` is fully cached.
    pub fn slice_loaded(&self, offset: usize) -> bool {
        let end = (offset + self.pages.current).min(self.total_rows());
        !self.range_incomplete(offset + 1..=end)
    }

    pub fn is_nearing_limit(&self, offset: usize) -> Option<Nearing> {
        let total = self.total_rows();
        if self.uidlist.len() == total {
            return None;
        }
        let tolerance = self.limit_tolerance();
        let top_start = (offset + 1).saturating_sub(tolerance).max(1);
        if offset != 0 && self.range_incomplete(top_start..=offset) {
            return Some(Nearing::Top);
        }
        let bottom_end = (offset + tolerance + self.pages.current)
            .saturating_sub(1)
            .min(total);
        if self.range_incomplete(offset + 1..=bottom_end) {
            return Some(Nearing::Bottom);
        }
        None
    }

    fn range_incomplete(&self, range: RangeInclusive<usize>) -> bool {
        range.into_iter().any(|position| match self.rowlist.get(&position) {
            Some(uid) => self.partial.contains(uid),
            None => true,
        })
    }

    pub fn row_data(&self, uids: &[Uid]) -> Vec<RowData> {
        uids.iter()
            .filter_map(|uid| {
                self.data.get(uid).map(|record| RowData {
                    uid: uid.clone(),
                    rownum: self.uidlist.get(uid).copied(),
                    dom_id: dom_id_for(uid),
                    record: record.clone(),
                })
            })
            .collect()
    }

    pub fn record(&self, uid: &Uid) -> Option<&Record> {
        self.data.get(uid)
    }

    pub fn uid_at(&self, position: usize) -> Option<&Uid> {
        self.rowlist.get(&position)
    }

    pub fn position_of(&self, uid: &Uid) -> Option<usize> {
        self.uidlist.get(uid).copied()
    }

    pub fn is_partial(&self, uid: &Uid) -> bool {
        self.partial.contains(uid)
    }

    pub fn all_uids(&self, exclude_partial: bool) -> Vec<Uid> {
        self.uidlist
            .keys()
            .filter(|uid| !(exclude_partial && self.partial.contains(*uid)))
            .cloned()
            .collect()
    }

    /// Known positions, in order.
    pub fn all_rows(&self, exclude_partial: bool) -> Vec<usize> {
        self.rowlist
            .iter()
            .filter(|(_, uid)| !(exclude_partial && self.partial.contains(*uid)))
            .map(|(position, _)| *position)
            .collect()
    }

    pub fn rows_to_uids(&self, positions: &[usize], exclude_partial: bool) -> Vec<Uid> {
        positions
            .iter()
            .filter_map(|position| self.rowlist.get(position))
            .filter(|uid| !(exclude_partial && self.partial.contains(*uid)))
            .cloned()
            .collect()
    }

    pub fn select(&mut self, selection: &Selection) {
        self.selected.add_uids(selection.uids().iter().cloned());
    }

    /// Returns whether the stored selection changed.
    pub fn deselect(&mut self, selection: &Selection, clear_all: bool) -> bool {
        let before = self.selected.len();
        if clear_all {
            self.selected.clear();
        } else {
            self.selected.remove_uids(selection.uids());
        }
        before != self.selected.len()
    }

    pub fn selected(&self) -> &Selection {
        &self.selected
    }

    /// Drops the given positions and renumbers every survivor down by the
    /// count of removed positions ahead of it.
    pub fn remove(&mut self, positions: &[usize]) {
        let removed: BTreeSet<usize> = positions.iter().copied().collect();
        if removed.is_empty() {
            return;
        }

        let old_rows = std::mem::take(&mut self.rowlist);
        self.uidlist.clear();
        let mut dropped = Vec::new();
        for (position, uid) in old_rows {
            if removed.contains(&position) {
                self.data.remove(&uid);
                self.partial.remove(&uid);
                dropped.push(uid);
                continue;
            }
            let shift = removed.range(..position).count();
            let renumbered = position - shift;
            self.rowlist.insert(renumbered, uid.clone());
            self.uidlist.insert(uid, renumbered);
        }
        self.selected.remove_uids(&dropped);
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.server_meta
            .get(key)
            .filter(|value| !value.is_null())
            .or_else(|| self.user_meta.get(key))
    }

    pub fn set_metadata(&mut self, patch: Record, server_asserted: bool) {
        let target = if server_asserted {
            &mut self.server_meta
        } else {
            &mut self.user_meta
        };
        target.extend(patch);
    }

    pub fn total_rows(&self) -> usize {
        self.metadata(META_TOTAL_ROWS)
            .and_then(Value::as_usize)
            .unwrap_or(0)
    }

    pub fn cache_id(&self) -> Option<&str> {
        self.metadata(META_CACHE_ID).and_then(Value::as_str)
    }

    pub fn set_row_values(&mut self, uids: &[Uid], patch: &Record) {
        for uid in uids {
            if let Some(record) = self.data.get_mut(uid) {
                record.extend(patch.iter().map(|(key, value)| (key.clone(), value.clone())));
            }
        }
    }

    /// Adds or removes a flag on each cached row; returns the rows touched.
    pub fn update_flag(&mut self, uids: &[Uid], flag: &str, add: bool) -> Vec<Uid> {
        uids.iter()
            .filter(|uid| {
                self.data
                    .get_mut(*uid)
                    .is_some_and(|record| set_record_flag(record, flag, add))
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.uidlist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uidlist.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn assert_bijection(&self) {
        assert_eq!(self.rowlist.len(), self.uidlist.len());
        for (position, uid) in &self.rowlist {
            assert_eq!(self.uidlist.get(uid), Some(position));
        }
    }
}
