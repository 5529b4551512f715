// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! The list controller: owns one buffer per named view, turns scroll and
//! view changes into deduplicated fetches, and folds responses back into the
//! cache and the rendered window.

use crate::buffer::{
    Buffer, BufferConfig, META_CACHE_ID, META_LABEL, META_TOTAL_ROWS, Nearing, PageSize,
    UpdateFlags,
};
use crate::content::{Content, RenderedRow, RowData};
use crate::filter::{Filter, FilterStep};
use crate::hooks::{DeselectOptions, SelectOptions, ViewPortHooks};
use crate::options::ViewPortOptions;
use crate::queue::TaskQueue;
use crate::request::{Discriminator, InFlightUpdate, RequestTracker};
use crate::scroller::{ScrollHandle, Scroller};
use crate::selection::{Selection, SelectionSpec};
use crate::template::Template;
use crate::value::{Record, Value, record_flags};
use crate::wire::{DataSource, FetchRequest, FetchResponse, SliceRange};
use crate::{Uid, ViewName};
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);
const DEFAULT_PAGE_RATIO: f64 = 0.45;
const MIN_DEFAULT_PAGE: usize = 5;
pub const RANGE_SLICE_PARAM: &str = "rangeslice";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Rendered from an existing buffer.
    Cached,
    /// A fresh buffer was created and its first fetch queued.
    Fetching,
    /// Layout is not measured yet; the load replays on `set_layout`.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutMetrics {
    pub line_height: usize,
    pub max_height: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSizeMode {
    /// Active page size clipped to the view's total rows.
    Current,
    Default,
    Max,
    Active,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollOptions {
    pub noupdate: bool,
    /// Move even when the row is already visible so it lands on top.
    pub top: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub cacheid: Option<String>,
    pub view: Option<ViewName>,
    pub noupdate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneGeometry {
    pub list_lines: usize,
    pub list_height: usize,
    pub preview_height: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct FetchArgs {
    view: ViewName,
    offset: usize,
    search: Option<String>,
    background: bool,
    nearing: Option<Nearing>,
    purge: bool,
    params: BTreeMap<String, String>,
    rowlist: Option<SliceRange>,
}

#[derive(Debug)]
enum Task {
    Fetch(FetchArgs),
    Response(FetchResponse),
    Remove(Selection, RemoveOptions),
}

#[derive(Debug)]
struct ViewSlot {
    buffer: Buffer,
    /// Scroll offset saved when the view was last switched away from.
    offset: usize,
}

#[derive(Debug, Clone)]
struct PendingLoad {
    view: ViewName,
    search: Option<String>,
    background: bool,
}

#[derive(Debug, Clone)]
struct PendingRange {
    view: ViewName,
    positions: Vec<usize>,
    options: SelectOptions,
}

pub struct ViewPort<S, H> {
    options: ViewPortOptions,
    template: Template,
    source: S,
    hooks: H,
    views: BTreeMap<ViewName, ViewSlot>,
    active: Option<ViewName>,
    requests: RequestTracker,
    tasks: TaskQueue<Task>,
    scroller: Scroller,
    filter: Option<Filter>,
    layout: Option<LayoutMetrics>,
    pending_load: Option<PendingLoad>,
    pending_range: Option<PendingRange>,
    content: Content,
    rendered_once: bool,
    answered: bool,
    split_shown: bool,
    split_lines: Option<usize>,
    resize_due: Option<(Instant, bool)>,
    wait_due: Option<Instant>,
}

impl<S: DataSource, H: ViewPortHooks> ViewPort<S, H> {
    pub fn new(options: ViewPortOptions, source: S, hooks: H) -> Result<Self> {
        options.validate()?;
        let template = Template::parse(&options.row_template)?;
        Ok(Self {
            split_shown: options.split_pane,
            options,
            template,
            source,
            hooks,
            views: BTreeMap::new(),
            active: None,
            requests: RequestTracker::new(),
            tasks: TaskQueue::new(),
            scroller: Scroller::new(),
            filter: None,
            layout: None,
            pending_load: None,
            pending_range: None,
            content: Content::Blank,
            rendered_once: false,
            answered: false,
            split_lines: None,
            resize_due: None,
            wait_due: None,
        })
    }

    pub fn options(&self) -> &ViewPortOptions {
        &self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn current_view(&self) -> Option<&ViewName> {
        self.active.as_ref()
    }

    pub fn current_offset(&self) -> usize {
        self.scroller.current_offset()
    }

    pub fn buffer(&self, view: &ViewName) -> Option<&Buffer> {
        self.views.get(view).map(|slot| &slot.buffer)
    }

    fn active_buffer(&self) -> Option<&Buffer> {
        self.active.as_ref().and_then(|view| self.buffer(view))
    }

    pub fn in_flight_count(&self) -> usize {
        self.requests.in_flight_count()
    }

    pub fn scroll_handle(&self, track: usize) -> Option<ScrollHandle> {
        self.scroller.handle(track)
    }

    // ---- layout ----

    pub fn page_size(&self, mode: PageSizeMode) -> usize {
        let Some(layout) = self.layout else {
            return 0;
        };
        match mode {
            PageSizeMode::Max => layout.max_height / layout.line_height,
            PageSizeMode::Default => {
                let max = self.page_size(PageSizeMode::Max) as f64;
                ((max * DEFAULT_PAGE_RATIO) as usize).max(MIN_DEFAULT_PAGE)
            }
            PageSizeMode::Active => {
                if self.split_active() {
                    self.split_lines
                        .unwrap_or_else(|| self.page_size(PageSizeMode::Default))
                } else {
                    self.page_size(PageSizeMode::Max)
                }
            }
            PageSizeMode::Current => self
                .page_size(PageSizeMode::Active)
                .min(self.active_buffer().map_or(0, Buffer::total_rows)),
        }
    }

    fn split_active(&self) -> bool {
        self.options.split_pane && self.split_shown
    }

    fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            buffer_pages: self.options.buffer_pages,
            limit_factor: self.options.limit_factor,
        }
    }

    fn buffer_pages(&self) -> PageSize {
        PageSize::new(
            self.page_size(PageSizeMode::Active),
            self.page_size(PageSizeMode::Max),
        )
    }

    fn sync_page_sizes(&mut self) {
        let pages = self.buffer_pages();
        for slot in self.views.values_mut() {
            slot.buffer.set_page_size(pages);
        }
    }

    /// Delivers a layout measurement; replays a load deferred for lack of one.
    pub fn set_layout(&mut self, metrics: LayoutMetrics) -> Option<LoadOutcome> {
        if metrics.line_height == 0 {
            debug!("ignoring layout without a line height");
            return None;
        }
        self.layout = Some(metrics);
        self.sync_page_sizes();
        if let Some(pending) = self.pending_load.take() {
            debug!(view = %pending.view, "replaying deferred load");
            return Some(self.load_view(pending.view, pending.search, pending.background));
        }
        if self.rendered_once {
            self.resize(false);
        }
        None
    }

    pub fn on_resize(&mut self, noscroll: bool, immediate: bool) {
        if !self.rendered_once {
            return;
        }
        if immediate {
            self.resize_due = None;
            self.resize(noscroll);
        } else {
            self.resize_due = Some((Instant::now() + RESIZE_DEBOUNCE, noscroll));
        }
    }

    fn resize(&mut self, noscroll: bool) {
        self.hooks.on_before_resize();
        self.sync_page_sizes();
        if !noscroll && self.scroller.is_materialized() {
            let page = self.page_size(PageSizeMode::Active);
            let total = self.active_buffer().map_or(0, Buffer::total_rows);
            self.scroller.update_size(page, total);
            self.request_content_refresh(self.current_offset());
        }
        self.hooks.on_after_resize();
    }

    pub fn show_split_pane(&mut self, show: bool) {
        self.split_shown = show;
        self.sync_page_sizes();
        self.on_resize(false, true);
    }

    /// Pins the list height to `lines`, clamped so the preview keeps its
    /// reserve. Returns the applied line count.
    pub fn drag_split_bar(&mut self, lines: usize) -> Option<usize> {
        let layout = self.layout?;
        if !self.split_active() {
            return None;
        }
        let max = (layout.max_height.saturating_sub(self.options.split_pane_reserve)
            / layout.line_height)
            .max(1);
        let lines = lines.clamp(1, max);
        self.split_lines = Some(lines);
        self.sync_page_sizes();
        self.on_resize(false, true);
        Some(lines)
    }

    pub fn reset_split_bar(&mut self) {
        self.split_lines = None;
        self.sync_page_sizes();
        self.on_resize(false, true);
    }

    pub fn pane_geometry(&self) -> Option<PaneGeometry> {
        let layout = self.layout?;
        let list_lines = self.page_size(PageSizeMode::Active);
        let list_height = list_lines * layout.line_height;
        let preview_height = self
            .split_active()
            .then(|| layout.max_height.saturating_sub(list_height + layout.line_height));
        Some(PaneGeometry {
            list_lines,
            list_height,
            preview_height,
        })
    }

    /// Fires due timers: the debounced resize and the repeating stale-wait
    /// callback.
    pub fn tick(&mut self, now: Instant) {
        if let Some((due, noscroll)) = self.resize_due
            && now >= due
        {
            self.resize_due = None;
            self.resize(noscroll);
        }
        if let Some(due) = self.wait_due
            && now >= due
        {
            self.hooks.on_wait();
            self.wait_due = self.options.viewport_wait.map(|wait| now + wait);
        }
    }

    fn start_wait(&mut self) {
        self.wait_due = self.options.viewport_wait.map(|wait| Instant::now() + wait);
    }

    fn clear_wait(&mut self) {
        self.wait_due = None;
    }

    // ---- views ----

    pub fn load_view(
        &mut self,
        view: impl Into<ViewName>,
        search: Option<String>,
        background: bool,
    ) -> LoadOutcome {
        let view = view.into();
        self.clear_wait();
        if self.page_size(PageSizeMode::Active) == 0 {
            debug!(%view, "layout not measured; deferring load");
            self.pending_load = Some(PendingLoad {
                view,
                search,
                background,
            });
            return LoadOutcome::Deferred;
        }

        let filter_view = Filter::view();
        if !background {
            if let Some(current) = self.active.clone()
                && let Some(slot) = self.views.get_mut(&current)
            {
                slot.offset = self.scroller.current_offset();
            }
            if view != filter_view && self.is_filtering().is_some() {
                self.stop_filter(true);
            }
            self.active = Some(view.clone());
        }

        if let Some(offset) = self.views.get(&view).map(|slot| slot.offset) {
            debug!(%view, offset, background, "loading cached view");
            self.update_content(offset, &view, background);
            if !background {
                self.hooks.on_complete(&view);
                let mut request = self.request_for(&view, false);
                request.checkcache = true;
                request.rownum = Some(self.current_offset() + 1);
                self.source.fetch(request);
            }
            return LoadOutcome::Cached;
        }

        if !background && view != filter_view {
            let cleared = std::mem::take(&mut self.content);
            self.hooks.on_clear_rows(cleared.rows());
            self.scroller.clear();
        }
        let buffer = Buffer::new(view.clone(), self.buffer_config(), self.buffer_pages());
        self.views
            .insert(view.clone(), ViewSlot { buffer, offset: 0 });
        debug!(%view, background, "loading new view");
        self.schedule(Task::Fetch(FetchArgs {
            view,
            search,
            background,
            ..FetchArgs::default()
        }));
        LoadOutcome::Fetching
    }

    pub fn delete_view(&mut self, view: &ViewName) {
        let existed = self.views.remove(view).is_some();
        self.requests.forget_view(view);
        if !existed {
            return;
        }
        debug!(%view, "view deleted");
        if self.active.as_ref() == Some(view) {
            self.active = None;
        }
        if self
            .pending_range
            .as_ref()
            .is_some_and(|pending| &pending.view == view)
        {
            self.pending_range = None;
        }
    }

    pub fn reload(&mut self, params: BTreeMap<String, String>) {
        if self.is_filtering().is_some() {
            self.run_filter(None, params);
            return;
        }
        let Some(view) = self.active.clone() else {
            return;
        };
        let offset = self.current_offset();
        self.schedule(Task::Fetch(FetchArgs {
            view,
            offset,
            purge: true,
            params,
            ..FetchArgs::default()
        }));
    }

    pub fn metadata(&self, key: &str, view: Option<&ViewName>) -> Option<&Value> {
        let view = view.or(self.active.as_ref())?;
        self.buffer(view)?.metadata(key)
    }

    /// Sets user metadata; server values still take precedence on read.
    pub fn set_metadata(&mut self, patch: Record, view: Option<&ViewName>) {
        let Some(view) = view.or(self.active.as_ref()).cloned() else {
            return;
        };
        if let Some(slot) = self.views.get_mut(&view) {
            slot.buffer.set_metadata(patch, false);
        }
    }

    // ---- scrolling and rendering ----

    /// Where `rownum` sits relative to the visible window: `Less` above it,
    /// `Greater` below it.
    pub fn is_visible(&self, rownum: usize) -> Ordering {
        let offset = self.current_offset();
        if rownum < offset + 1 {
            Ordering::Less
        } else if rownum > offset + self.page_size(PageSizeMode::Current) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    pub fn scroll_to(&mut self, rownum: usize, options: ScrollOptions) {
        self.scroller.set_noupdate(options.noupdate);
        let moved = match (self.is_visible(rownum), options.top) {
            (Ordering::Equal, false) => false,
            (Ordering::Greater, false) => {
                let page = self.page_size(PageSizeMode::Active);
                self.scroller.move_scroll(rownum.saturating_sub(page))
            }
            _ => self.scroller.move_scroll(rownum.saturating_sub(1)),
        };
        self.scroller.set_noupdate(false);
        if moved {
            self.scrolled();
        }
    }

    pub fn move_scroll(&mut self, position: usize) {
        if self.scroller.move_scroll(position) {
            self.scrolled();
        }
    }

    pub fn scroll_wheel(&mut self, up: bool) {
        let target = self
            .scroller
            .wheel_target(self.page_size(PageSizeMode::Active), up);
        self.move_scroll(target);
    }

    fn scrolled(&mut self) {
        self.hooks.on_scroll();
        self.request_content_refresh(self.current_offset());
        self.hooks.on_scroll_idle();
    }

    /// Renders the window at `offset` if it is cached, prefetching when the
    /// cache edge is near. Returns false when rendering waits on a fetch.
    pub fn request_content_refresh(&mut self, offset: usize) -> bool {
        let Some(view) = self.active.clone() else {
            return false;
        };
        if !self.update_content(offset, &view, false) {
            return false;
        }
        let nearing = self
            .buffer(&view)
            .and_then(|buffer| buffer.is_nearing_limit(offset));
        if let Some(nearing) = nearing {
            trace!(%view, offset, ?nearing, "prefetching near cache edge");
            self.schedule(Task::Fetch(FetchArgs {
                view,
                offset,
                background: true,
                nearing: Some(nearing),
                ..FetchArgs::default()
            }));
        }
        true
    }

    fn update_content(&mut self, offset: usize, view: &ViewName, background: bool) -> bool {
        let loaded = self
            .buffer(view)
            .is_some_and(|buffer| buffer.slice_loaded(offset));
        if !loaded {
            self.schedule(Task::Fetch(FetchArgs {
                view: view.clone(),
                offset,
                background,
                ..FetchArgs::default()
            }));
            return false;
        }
        if background || self.active.as_ref() != Some(view) {
            return true;
        }
        self.render(offset);
        true
    }

    fn render(&mut self, offset: usize) {
        let Some(view) = self.active.clone() else {
            return;
        };
        if !self.rendered_once {
            self.rendered_once = true;
            self.hooks.on_first_content();
        }
        let previous = std::mem::take(&mut self.content);
        self.hooks.on_clear_rows(previous.rows());

        let page = self.page_size(PageSizeMode::Active);
        let total = self.buffer(&view).map_or(0, Buffer::total_rows);
        self.scroller.update_size(page, total);
        self.scroll_to(
            offset + 1,
            ScrollOptions {
                noupdate: true,
                top: true,
            },
        );
        let offset = self.current_offset();

        let rows = self
            .buffer(&view)
            .map(|buffer| self.render_rows(buffer, offset + 1..=offset + page))
            .unwrap_or_default();
        self.content = if rows.is_empty() {
            match &self.options.empty_text {
                Some(text) if self.answered => Content::Empty(text.clone()),
                _ => Content::Blank,
            }
        } else {
            Content::Rows(rows)
        };
        for row in self.content.rows() {
            self.hooks.on_update_class(row);
        }
        self.hooks.on_content(self.content.rows());
        trace!(%view, offset, rows = self.content.rows().len(), "rendered");
    }

    fn render_rows(&self, buffer: &Buffer, positions: RangeInclusive<usize>) -> Vec<RenderedRow> {
        let positions: Vec<usize> = positions.collect();
        let uids = buffer.rows_to_uids(&positions, false);
        let selected = buffer.selected();
        buffer
            .row_data(&uids)
            .into_iter()
            .map(|data| {
                let is_selected = selected.contains_uid(&data.uid);
                self.render_row(data, is_selected)
            })
            .collect()
    }

    fn render_row(&self, data: RowData, selected: bool) -> RenderedRow {
        let mut classes = record_flags(&data.record);
        if selected {
            classes.push(self.options.selected_class.clone());
        }
        let text = self.template.render(&data.record);
        RenderedRow {
            data,
            classes,
            text,
        }
    }

    fn display_fetch_error(&mut self, view: &ViewName) {
        self.hooks.on_fail(view);
        if self.active.as_ref() == Some(view)
            && let Some(text) = self.options.error_text.clone()
        {
            let previous = std::mem::replace(&mut self.content, Content::Error(text));
            self.hooks.on_clear_rows(previous.rows());
        }
    }

    // ---- fetching ----

    fn schedule(&mut self, task: Task) {
        self.tasks.push(task);
        if !self.tasks.try_acquire() {
            trace!(pending = self.tasks.len(), "controller busy; task deferred");
            return;
        }
        while let Some(task) = self.tasks.next() {
            match task {
                Task::Fetch(args) => self.run_fetch(args),
                Task::Response(response) => self.run_response(response),
                Task::Remove(selection, options) => self.run_remove(selection, options),
            }
        }
        self.tasks.release();
    }

    /// Fetch window for `offset`. `Bottom` starts a page past the offset,
    /// `Top` ends at it, and the default reaches back by the lookbehind.
    pub fn slice_bounds(
        &self,
        offset: usize,
        direction: Option<Nearing>,
        view: &ViewName,
    ) -> SliceRange {
        let buffer_size = self.buffer(view).map_or(0, Buffer::buffer_size);
        match direction {
            Some(Nearing::Bottom) => {
                let start = offset + self.page_size(PageSizeMode::Active);
                SliceRange::new(start, start + buffer_size)
            }
            Some(Nearing::Top) => {
                SliceRange::new(offset.saturating_sub(buffer_size).max(1), offset.max(1))
            }
            None => {
                let start = offset.saturating_sub(self.lookbehind(buffer_size)).max(1);
                SliceRange::new(start, start + buffer_size)
            }
        }
    }

    fn lookbehind(&self, buffer_size: usize) -> usize {
        (buffer_size as f64 * self.options.lookbehind_ratio) as usize
    }

    /// Base request for `view`: cache id, filter or extra params, a slice
    /// around the current offset unless `noslice`, and the cached id list.
    fn request_for(&self, view: &ViewName, noslice: bool) -> FetchRequest {
        let buffer = self.buffer(view);
        let mut request = FetchRequest {
            action: self.options.fetch_action.clone(),
            view: view.clone(),
            cacheid: buffer.and_then(Buffer::cache_id).map(str::to_owned),
            ..FetchRequest::default()
        };
        match (self.is_filtering(), &self.filter) {
            (Some(overlaid), Some(filter)) if *view == Filter::view() => {
                request.action = filter.action().to_owned();
                request.view = overlaid.clone();
                request.filter = filter.needle().map(str::to_owned);
                request.params.extend(self.hooks.filter_params());
            }
            _ => request.params.extend(self.hooks.additional_params(view)),
        }
        if !noslice && buffer.is_some() {
            request.slice = Some(self.slice_bounds(self.current_offset(), None, view));
        }
        request.cached = self.hooks.cached_list(view).unwrap_or_else(|| {
            buffer
                .map(|buffer| buffer.all_uids(true))
                .unwrap_or_default()
        });
        request
    }

    fn run_fetch(&mut self, args: FetchArgs) {
        let view = args.view.clone();
        let Some(buffer) = self.buffer(&view) else {
            debug!(%view, "fetch for unknown view skipped");
            return;
        };
        let loaded: BTreeSet<usize> = buffer.all_rows(true).into_iter().collect();
        let total = buffer.total_rows();
        let known_total = buffer.cache_id().is_some();
        let buffer_size = buffer.buffer_size();
        let within_total = |position: &usize| !known_total || *position <= total;

        let mut request = self.request_for(&view, true);
        request.purge = args.purge;
        request.params.extend(args.params.clone());

        let value = args.offset + 1;
        let (discriminator, mut missing, bounds) = match &args.search {
            Some(search) => {
                let lookbehind = self.lookbehind(buffer_size);
                request.search = Some(search.clone());
                request.search_before = Some(lookbehind);
                request.search_after = Some(buffer_size.saturating_sub(lookbehind));
                (Discriminator::Search(search.clone()), BTreeSet::new(), None)
            }
            None => {
                let bounds = args
                    .rowlist
                    .unwrap_or_else(|| self.slice_bounds(args.offset, args.nearing, &view));
                let missing: BTreeSet<usize> = bounds
                    .positions()
                    .filter(|position| !loaded.contains(position))
                    .filter(within_total)
                    .collect();
                if missing.is_empty() && !args.purge {
                    trace!(%view, offset = args.offset, "slice already cached");
                    return;
                }
                request.rownum = Some(value);
                (Discriminator::RowNum(value), missing, Some(bounds))
            }
        };

        if args.purge {
            let discarded = self.requests.discard_in_flight(&view);
            if discarded > 0 {
                debug!(%view, discarded, "purge drops unanswered requests");
            }
        }

        if let Some(id) = self.requests.known_id(&view, &discriminator)
            && let Some(in_flight) = self.requests.get_mut(&view, id)
        {
            in_flight.collisions += 1;
            if !args.background {
                in_flight.background = false;
                if args.search.is_none() {
                    in_flight.offset = Some(args.offset);
                }
            }
            let collisions = in_flight.collisions;
            if collisions >= self.options.fetch_collision_limit {
                warn!(%view, request_id = %id, collisions, "fetch abandoned after repeated collisions");
                self.requests.remove(&view, id);
                self.display_fetch_error(&view);
            } else {
                debug!(%view, request_id = %id, collisions, "fetch attached to in-flight request");
            }
            return;
        }

        if args.search.is_none()
            && let Some(in_flight) = self.requests.for_view(&view)
        {
            let page_end = args.offset + self.page_size(PageSizeMode::Active);
            let mut visible: BTreeSet<usize> = (value..=page_end)
                .filter(|position| !loaded.contains(position))
                .filter(within_total)
                .collect();
            if visible.is_empty() {
                return;
            }
            let mut covering = None;
            for (id, other) in in_flight {
                visible.retain(|position| !other.rows.contains(position));
                if visible.is_empty() {
                    covering = Some(*id);
                    break;
                }
                missing.retain(|position| !other.rows.contains(position));
            }
            if let Some(id) = covering {
                if !args.background {
                    self.requests.add(
                        &view,
                        id,
                        InFlightUpdate {
                            background: Some(false),
                            offset: Some(args.offset),
                            rows: None,
                        },
                    );
                }
                trace!(%view, request_id = %id, "visible rows already requested");
                return;
            }
            if !args.background {
                self.requests.mark_background(&view);
            }
            if missing.is_empty() && !args.purge {
                return;
            }
        }

        request.slice = match (missing.first(), missing.last()) {
            (Some(first), Some(last)) => Some(SliceRange::new(*first, *last)),
            _ => bounds,
        };
        let id = self.requests.assign_id(&view, &discriminator);
        request.request_id = Some(id);
        self.requests.add(
            &view,
            id,
            InFlightUpdate {
                background: Some(args.background),
                offset: args.search.is_none().then_some(args.offset),
                rows: Some(missing),
            },
        );
        if !args.background {
            self.hooks.on_fetch(&view);
        }
        debug!(
            %view,
            request_id = %id,
            slice = ?request.slice,
            background = args.background,
            "issuing fetch"
        );
        self.source.fetch(request);
        if !args.background {
            self.start_wait();
        }
    }

    /// Entry point for every data source response.
    pub fn ajax_response(&mut self, response: FetchResponse) {
        self.schedule(Task::Response(response));
    }

    fn run_response(&mut self, response: FetchResponse) {
        self.clear_wait();
        let (view, in_flight) = match response.request_id {
            Some(id) => {
                let Some(view) = self.requests.resolve(id).cloned() else {
                    debug!(request_id = %id, "dropping response for unknown request");
                    return;
                };
                let in_flight = self.requests.get(&view, id).cloned();
                (view, in_flight)
            }
            None => match response.id.clone() {
                Some(view) => (view, None),
                None => {
                    debug!("dropping response without a request id or view");
                    return;
                }
            },
        };

        let Some(slot) = self.views.get_mut(&view) else {
            debug!(%view, "dropping response for deleted view");
            if let Some(id) = response.request_id {
                self.requests.remove(&view, id);
            }
            return;
        };
        self.answered = true;
        slot.buffer.update(
            response.data,
            response.rowlist,
            response.metadata.unwrap_or_default(),
            UpdateFlags {
                partial: response.partial,
                reset: response.reset,
                resetmd: response.resetmd,
                update: response.update,
            },
        );
        if !response.partial {
            let mut server = Record::new();
            if let Some(cacheid) = response.cacheid {
                server.insert(META_CACHE_ID.to_owned(), Value::Text(cacheid));
            }
            if let Some(label) = response.label {
                server.insert(META_LABEL.to_owned(), Value::Text(label));
            }
            if let Some(total) = response.totalrows {
                server.insert(META_TOTAL_ROWS.to_owned(), Value::from(total));
            }
            slot.buffer.set_metadata(server, true);
        }
        trace!(%view, rows = slot.buffer.len(), partial = response.partial, "cache updated");
        self.hooks.on_cache_update(&view);
        if let Some(id) = response.request_id {
            self.requests.remove(&view, id);
        }

        if response.partial {
            self.reselect_after_partial(&view);
        } else {
            if self.active.as_ref() != Some(&view) {
                // A search hit still decides where its view reopens.
                if response.search
                    && let Some(rownum) = response.rownum
                    && let Some(saved) = self.views.get_mut(&view)
                {
                    saved.offset = rownum.saturating_sub(1);
                    debug!(%view, offset = saved.offset, "search result positions inactive view");
                } else {
                    trace!(%view, "response for inactive view cached without render");
                }
                return;
            }
            if in_flight.as_ref().is_some_and(|request| request.background) {
                trace!(%view, "background response cached without render");
                return;
            }
            let from_rownum = response.rownum.map(|rownum| rownum.saturating_sub(1));
            let offset = if response.search {
                from_rownum
            } else {
                in_flight.and_then(|request| request.offset).or(from_rownum)
            };
            let offset = offset.unwrap_or_else(|| self.current_offset());
            if !self.update_content(offset, &view, false) {
                return;
            }
            self.hooks.on_complete(&view);
        }
        self.hooks.on_end_fetch(&view);
    }

    fn reselect_after_partial(&mut self, view: &ViewName) {
        if self.active.as_ref() != Some(view) {
            return;
        }
        if self
            .pending_range
            .as_ref()
            .is_some_and(|pending| &pending.view == view)
            && let Some(pending) = self.pending_range.take()
        {
            let selection =
                self.create_selection(SelectionSpec::RowNum(pending.positions), Some(view));
            self.select(
                selection,
                SelectOptions {
                    range: true,
                    ..pending.options
                },
            );
            return;
        }
        let Some(buffer) = self.buffer(view) else {
            return;
        };
        let still_present: Vec<Uid> = buffer
            .selected()
            .uids()
            .iter()
            .filter(|uid| buffer.position_of(uid).is_some())
            .cloned()
            .collect();
        if still_present.is_empty() {
            return;
        }
        let selection = self.create_selection(SelectionSpec::Uid(still_present), Some(view));
        self.select(selection, SelectOptions::default());
    }

    // ---- selection ----

    pub fn create_selection(&self, spec: SelectionSpec, view: Option<&ViewName>) -> Selection {
        let target = view.or(self.active.as_ref());
        match target.and_then(|view| self.buffer(view)) {
            Some(buffer) => Selection::from_spec(buffer, spec),
            None => Selection::new(target.cloned().unwrap_or_default()),
        }
    }

    /// Every id cached for `view`.
    pub fn viewport_selection(&self, view: Option<&ViewName>, exclude_partial: bool) -> Selection {
        let uids = view
            .or(self.active.as_ref())
            .and_then(|view| self.buffer(view))
            .map(|buffer| buffer.all_uids(exclude_partial))
            .unwrap_or_default();
        self.create_selection(SelectionSpec::Uid(uids), view)
    }

    pub fn selected(&self) -> Option<&Selection> {
        self.active_buffer().map(Buffer::selected)
    }

    pub fn select(&mut self, selection: Selection, options: SelectOptions) {
        let Some(view) = self.active.clone() else {
            return;
        };
        let class = self.options.selected_class.clone();
        if !options.add {
            let Some(slot) = self.views.get_mut(&view) else {
                return;
            };
            let previous = slot.buffer.selected().clone();
            slot.buffer.deselect(&previous, true);
            self.update_class(previous.uids(), &class, false);
        }
        if let Some(slot) = self.views.get_mut(&view) {
            slot.buffer.select(&selection);
        }
        self.update_class(selection.uids(), &class, true);
        self.hooks.on_select(&selection, options);
    }

    /// Selects a position range, fetching the missing rows first. Returns
    /// false while the range is still being fetched.
    pub fn select_range(&mut self, positions: &[usize], options: SelectOptions) -> bool {
        let Some(view) = self.active.clone() else {
            return false;
        };
        let wanted: BTreeSet<usize> = positions.iter().copied().collect();
        let (Some(&first), Some(&last)) = (wanted.first(), wanted.last()) else {
            return false;
        };
        let positions: Vec<usize> = wanted.into_iter().collect();
        let selection =
            self.create_selection(SelectionSpec::RowNum(positions.clone()), Some(&view));
        if selection.len() != positions.len() {
            debug!(%view, first, last, "range not cached; fetching before selecting");
            self.pending_range = Some(PendingRange {
                view: view.clone(),
                positions,
                options,
            });
            let offset = self.current_offset();
            self.schedule(Task::Fetch(FetchArgs {
                view,
                offset,
                params: BTreeMap::from([(RANGE_SLICE_PARAM.to_owned(), "1".to_owned())]),
                rowlist: Some(SliceRange::new(first, last)),
                ..FetchArgs::default()
            }));
            return false;
        }
        self.select(
            selection,
            SelectOptions {
                range: true,
                ..options
            },
        );
        true
    }

    /// Returns whether the stored selection changed.
    pub fn deselect(&mut self, selection: &Selection, options: DeselectOptions) -> bool {
        if selection.is_empty() {
            return false;
        }
        let Some(view) = self.active.clone() else {
            return false;
        };
        let changed = self
            .views
            .get_mut(&view)
            .is_some_and(|slot| slot.buffer.deselect(selection, options.clear_all));
        if !changed {
            return false;
        }
        let class = self.options.selected_class.clone();
        self.update_class(selection.uids(), &class, false);
        self.hooks.on_deselect(selection, options);
        true
    }

    fn update_class(&mut self, uids: &[Uid], class: &str, add: bool) {
        for row in self.content.rows_mut() {
            if uids.contains(&row.data.uid) {
                row.set_class(class, add);
                self.hooks.on_update_class(row);
            }
        }
    }

    /// Sets or clears `flag` on the selected rows. While filtering, the same
    /// rows in their originating view are updated too.
    pub fn update_flag(&mut self, selection: &Selection, flag: &str, add: bool) {
        let view = selection.view().clone();
        let Some(slot) = self.views.get_mut(&view) else {
            return;
        };
        let rows = slot.buffer.row_data(selection.uids());
        let touched = slot.buffer.update_flag(selection.uids(), flag, add);
        trace!(%view, flag, add, touched = touched.len(), "flag updated");

        if let Some(overlaid) = self.is_filtering().cloned() {
            let mut cascade: BTreeMap<ViewName, Vec<Uid>> = BTreeMap::new();
            for row in &rows {
                let target = row
                    .origin_view()
                    .map(ViewName::from)
                    .unwrap_or_else(|| overlaid.clone());
                if target != view {
                    cascade.entry(target).or_default().push(row.uid.clone());
                }
            }
            for (target, uids) in cascade {
                if let Some(slot) = self.views.get_mut(&target) {
                    slot.buffer.update_flag(&uids, flag, add);
                }
            }
        }
        self.update_class(selection.uids(), flag, add);
    }

    pub fn remove(&mut self, selection: Selection, options: RemoveOptions) {
        self.schedule(Task::Remove(selection, options));
    }

    fn run_remove(&mut self, selection: Selection, options: RemoveOptions) {
        if selection.is_empty() {
            return;
        }
        let view = options
            .view
            .clone()
            .unwrap_or_else(|| selection.view().clone());
        self.deselect(&selection, DeselectOptions::default());

        let Some(slot) = self.views.get_mut(&view) else {
            debug!(%view, "remove for unknown view skipped");
            return;
        };
        if let Some(cacheid) = options.cacheid {
            slot.buffer.set_metadata(
                Record::from([(META_CACHE_ID.to_owned(), Value::Text(cacheid))]),
                true,
            );
        }
        let total = slot.buffer.total_rows().saturating_sub(selection.len());
        slot.buffer.set_metadata(
            Record::from([(META_TOTAL_ROWS.to_owned(), Value::from(total))]),
            true,
        );
        let rows = selection.rows(&slot.buffer);
        let positions: Vec<usize> = rows.iter().filter_map(|row| row.rownum).collect();
        self.hooks.on_remove_rows(&view, &rows);
        slot.buffer.remove(&positions);
        self.hooks.on_cache_update(&view);
        debug!(%view, removed = positions.len(), total, "rows removed");

        if !options.noupdate {
            self.request_content_refresh(self.current_offset());
        }
    }

    // ---- filtering ----

    pub fn add_filter(&mut self, action: impl Into<String>) {
        self.filter = Some(Filter::new(action));
    }

    /// The view a live filter overlays, if one is active.
    pub fn is_filtering(&self) -> Option<&ViewName> {
        self.filter.as_ref().and_then(Filter::is_filtering)
    }

    /// `text = None` re-runs the current filter text.
    pub fn run_filter(&mut self, text: Option<&str>, params: BTreeMap<String, String>) {
        let current = self.active.clone();
        let Some(filter) = self.filter.as_mut() else {
            return;
        };
        match filter.apply(text, current.as_ref()) {
            FilterStep::Noop => trace!("filter unchanged"),
            FilterStep::Clear => self.stop_filter(false),
            FilterStep::Refetch => {
                debug!(needle = ?filter.needle(), "re-running filter");
                self.schedule(Task::Fetch(FetchArgs {
                    view: Filter::view(),
                    purge: true,
                    params,
                    ..FetchArgs::default()
                }));
            }
            FilterStep::Activate { needle, overlaid } => {
                debug!(%overlaid, %needle, "filter activated");
                let (keep, drop): (Vec<RenderedRow>, Vec<RenderedRow>) =
                    std::mem::take(&mut self.content)
                        .into_rows()
                        .into_iter()
                        .partition(|row| row.text.to_lowercase().contains(&needle));
                self.hooks.on_clear_rows(&drop);
                self.content = if keep.is_empty() {
                    self.options
                        .empty_text
                        .clone()
                        .map_or(Content::Blank, Content::Empty)
                } else {
                    Content::Rows(keep)
                };
                self.load_view(Filter::view(), None, false);
                self.scroller.clear();
            }
        }
    }

    /// Tears down the filter view; restores the overlaid view unless
    /// `suppress` is set.
    pub fn stop_filter(&mut self, suppress: bool) {
        let Some(overlaid) = self.filter.as_mut().and_then(Filter::clear) else {
            return;
        };
        debug!(%overlaid, suppress, "filter cleared");
        if !suppress {
            self.load_view(overlaid, None, false);
        }
        self.delete_view(&Filter::view());
    }
}
