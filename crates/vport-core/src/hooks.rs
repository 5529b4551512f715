// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Callbacks a host registers with the controller. Every method has a no-op
//! default; hosts override only what they render.

use crate::content::{RenderedRow, RowData};
use crate::selection::Selection;
use crate::{Uid, ViewName};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectOptions {
    /// Keep the existing selection instead of replacing it.
    pub add: bool,
    pub range: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeselectOptions {
    pub clear_all: bool,
}

pub trait ViewPortHooks {
    /// A foreground load finished rendering.
    fn on_complete(&mut self, _view: &ViewName) {}

    /// A fetch was abandoned after too many collisions.
    fn on_fail(&mut self, _view: &ViewName) {}

    /// Fires every `viewport_wait` while a fetch is unanswered.
    fn on_wait(&mut self) {}

    fn on_fetch(&mut self, _view: &ViewName) {}

    fn on_end_fetch(&mut self, _view: &ViewName) {}

    fn on_clear_rows(&mut self, _rows: &[RenderedRow]) {}

    fn on_content(&mut self, _rows: &[RenderedRow]) {}

    fn on_cache_update(&mut self, _view: &ViewName) {}

    fn on_update_class(&mut self, _row: &RenderedRow) {}

    fn on_first_content(&mut self) {}

    fn on_before_resize(&mut self) {}

    fn on_after_resize(&mut self) {}

    fn on_scroll(&mut self) {}

    fn on_scroll_idle(&mut self) {}

    fn on_select(&mut self, _selection: &Selection, _options: SelectOptions) {}

    fn on_deselect(&mut self, _selection: &Selection, _options: DeselectOptions) {}

    fn on_remove_rows(&mut self, _view: &ViewName, _rows: &[RowData]) {}

    /// Overrides the ids reported as already cached on outgoing requests.
    fn cached_list(&self, _view: &ViewName) -> Option<Vec<Uid>> {
        None
    }

    /// Extra request parameters for an unfiltered view.
    fn additional_params(&self, _view: &ViewName) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Extra request parameters while a filter is active.
    fn filter_params(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Host with no callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ViewPortHooks for NoHooks {}
