// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::buffer::Buffer;
use crate::content::{RenderedRow, RowData};
use crate::ids::uid_from_dom_id;
use crate::{Uid, Value, ViewName};

/// Identifier space a selection is built from.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionSpec {
    Uid(Vec<Uid>),
    RowNum(Vec<usize>),
    Div(Vec<RenderedRow>),
    DomId(Vec<String>),
    DataOb(Vec<RowData>),
}

impl SelectionSpec {
    fn into_uids(self, buffer: &Buffer) -> Vec<Uid> {
        match self {
            Self::Uid(uids) => uids,
            Self::RowNum(rows) => buffer.rows_to_uids(&rows, false),
            Self::Div(elements) => elements
                .iter()
                .map(|element| uid_from_dom_id(element.dom_id()))
                .collect(),
            Self::DomId(ids) => ids.iter().map(|id| uid_from_dom_id(id)).collect(),
            Self::DataOb(rows) => rows.into_iter().map(|row| row.uid).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Equal(Vec<Value>),
    Not(Vec<Value>),
    /// Case-sensitive substring match on a text field.
    Contains(String),
}

impl Criterion {
    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Self::Equal(values) => field.is_some_and(|field| values.contains(field)),
            Self::Not(values) => !field.is_some_and(|field| values.contains(field)),
            Self::Contains(needle) => field
                .and_then(Value::as_str)
                .is_some_and(|text| text.contains(needle.as_str())),
        }
    }
}

/// Field → criteria; every criterion of every field must hold.
pub type SearchCriteria = Vec<(String, Vec<Criterion>)>;

/// Ordered, duplicate-free set of row ids scoped to one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    view: ViewName,
    uids: Vec<Uid>,
}

impl Selection {
    pub fn new(view: ViewName) -> Self {
        Self {
            view,
            uids: Vec::new(),
        }
    }

    pub fn from_spec(buffer: &Buffer, spec: SelectionSpec) -> Self {
        let mut selection = Self::new(buffer.view().clone());
        selection.add(buffer, spec);
        selection
    }

    pub fn view(&self) -> &ViewName {
        &self.view
    }

    pub fn uids(&self) -> &[Uid] {
        &self.uids
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn clear(&mut self) {
        self.uids.clear();
    }

    pub fn add(&mut self, buffer: &Buffer, spec: SelectionSpec) {
        self.add_uids(spec.into_uids(buffer));
    }

    pub(crate) fn add_uids(&mut self, uids: impl IntoIterator<Item = Uid>) {
        for uid in uids {
            if !self.uids.contains(&uid) {
                self.uids.push(uid);
            }
        }
    }

    pub fn remove(&mut self, buffer: &Buffer, spec: SelectionSpec) {
        let drop = spec.into_uids(buffer);
        self.remove_uids(&drop);
    }

    pub(crate) fn remove_uids(&mut self, drop: &[Uid]) {
        self.uids.retain(|uid| !drop.contains(uid));
    }

    /// True when the first id the spec resolves to is selected.
    pub fn contains(&self, buffer: &Buffer, spec: SelectionSpec) -> bool {
        spec.into_uids(buffer)
            .first()
            .is_some_and(|uid| self.uids.contains(uid))
    }

    pub fn contains_uid(&self, uid: &Uid) -> bool {
        self.uids.contains(uid)
    }

    pub fn rows(&self, buffer: &Buffer) -> Vec<RowData> {
        buffer.row_data(&self.uids)
    }

    pub fn rownums(&self, buffer: &Buffer) -> Vec<usize> {
        self.rows(buffer).iter().filter_map(|row| row.rownum).collect()
    }

    pub fn dom_ids(&self, buffer: &Buffer) -> Vec<String> {
        self.rows(buffer).into_iter().map(|row| row.dom_id).collect()
    }

    /// The rendered elements for this selection that are currently on screen.
    pub fn elements<'a>(&self, buffer: &Buffer, rendered: &'a [RenderedRow]) -> Vec<&'a RenderedRow> {
        self.dom_ids(buffer)
            .iter()
            .filter_map(|id| rendered.iter().find(|row| row.dom_id() == id))
            .collect()
    }

    pub fn search(&self, buffer: &Buffer, criteria: &SearchCriteria) -> Self {
        let matched = self
            .rows(buffer)
            .into_iter()
            .filter(|row| {
                criteria.iter().all(|(field, tests)| {
                    let value = row.record.get(field);
                    tests.iter().all(|test| test.matches(value))
                })
            })
            .map(|row| row.uid);
        let mut out = Self::new(self.view.clone());
        out.add_uids(matched);
        out
    }
}
