// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Bookkeeping for fetches that have been issued but not yet answered.

use crate::{RequestId, ViewName};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// What a fetch is for; two fetches with the same discriminator for the same
/// view are the same logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Discriminator {
    RowNum(usize),
    Search(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InFlight {
    /// Times another fetch attached to this one instead of going out.
    pub collisions: u32,
    pub background: bool,
    /// Offset the request was issued for; rendering resumes here.
    pub offset: Option<usize>,
    /// Positions the request covers.
    pub rows: BTreeSet<usize>,
}

/// Optional field updates applied by `RequestTracker::add`.
#[derive(Debug, Clone, Default)]
pub struct InFlightUpdate {
    pub background: Option<bool>,
    pub offset: Option<usize>,
    pub rows: Option<BTreeSet<usize>>,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    by_view: BTreeMap<ViewName, BTreeMap<RequestId, InFlight>>,
    lookup: HashMap<RequestId, ViewName>,
    fetch_hash: HashMap<(ViewName, Discriminator), RequestId>,
    next_id: u64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    pub fn known_id(&self, view: &ViewName, discriminator: &Discriminator) -> Option<RequestId> {
        self.fetch_hash
            .get(&(view.clone(), discriminator.clone()))
            .copied()
    }

    /// The id for this logical request, minting a new one on first use.
    pub fn assign_id(&mut self, view: &ViewName, discriminator: &Discriminator) -> RequestId {
        if let Some(id) = self.known_id(view, discriminator) {
            return id;
        }
        let id = RequestId::new(self.next_id.max(1));
        self.next_id = id.get() + 1;
        self.fetch_hash
            .insert((view.clone(), discriminator.clone()), id);
        id
    }

    pub fn add(&mut self, view: &ViewName, id: RequestId, update: InFlightUpdate) {
        let entry = self
            .by_view
            .entry(view.clone())
            .or_default()
            .entry(id)
            .or_default();
        if let Some(background) = update.background {
            entry.background = background;
        }
        if let Some(offset) = update.offset {
            entry.offset = Some(offset);
        }
        if let Some(rows) = update.rows {
            entry.rows = rows;
        }
        self.lookup.insert(id, view.clone());
    }

    pub fn remove(&mut self, view: &ViewName, id: RequestId) -> Option<InFlight> {
        let removed = self
            .by_view
            .get_mut(view)
            .and_then(|requests| requests.remove(&id));
        if self.by_view.get(view).is_some_and(BTreeMap::is_empty) {
            self.by_view.remove(view);
        }
        self.lookup.remove(&id);
        removed
    }

    /// Drops the view's unanswered requests along with their ids, so a late
    /// answer resolves to nothing and the next fetch for the same key gets a
    /// fresh id. Ids of answered requests are kept.
    pub fn discard_in_flight(&mut self, view: &ViewName) -> usize {
        let Some(requests) = self.by_view.remove(view) else {
            return 0;
        };
        for id in requests.keys() {
            self.lookup.remove(id);
        }
        self.fetch_hash
            .retain(|(owner, _), id| owner != view || !requests.contains_key(&*id));
        requests.len()
    }

    /// Forgets every request and saved id belonging to `view`.
    pub fn forget_view(&mut self, view: &ViewName) {
        if let Some(requests) = self.by_view.remove(view) {
            for id in requests.keys() {
                self.lookup.remove(id);
            }
        }
        self.fetch_hash.retain(|(owner, _), _| owner != view);
    }

    pub fn get(&self, view: &ViewName, id: RequestId) -> Option<&InFlight> {
        self.by_view.get(view).and_then(|requests| requests.get(&id))
    }

    pub fn get_mut(&mut self, view: &ViewName, id: RequestId) -> Option<&mut InFlight> {
        self.by_view
            .get_mut(view)
            .and_then(|requests| requests.get_mut(&id))
    }

    /// In-flight requests for a view, in ascending id order.
    pub fn for_view(&self, view: &ViewName) -> Option<&BTreeMap<RequestId, InFlight>> {
        self.by_view.get(view)
    }

    pub fn resolve(&self, id: RequestId) -> Option<&ViewName> {
        self.lookup.get(&id)
    }

    pub fn mark_background(&mut self, view: &ViewName) {
        if let Some(requests) = self.by_view.get_mut(view) {
            for request in requests.values_mut() {
                request.background = true;
            }
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.lookup.len()
    }
}
