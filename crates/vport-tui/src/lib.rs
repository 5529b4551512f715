// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use std::collections::BTreeMap;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::debug;
use vport_core::{
    Content, DeselectOptions, FetchRequest, FetchResponse, LayoutMetrics, LoadOutcome,
    PageSizeMode, RemoveOptions, RenderedRow, RequestQueue, RowData, SelectOptions, Selection,
    SelectionSpec, Uid, Value, ViewName, ViewPort, ViewPortHooks, ViewPortOptions,
};

const SIDEBAR_WIDTH: u16 = 24;
const STATUS_HEIGHT: u16 = 3;
/// Top and bottom border of the list block.
const LIST_CHROME: u16 = 2;
const PUMP_ROUNDS: usize = 8;
const UNSEEN_FLAG: &str = "unseen";
const FLAGGED_FLAG: &str = "flagged";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    pub name: String,
    pub total: usize,
    pub unseen: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiOptions {
    pub viewport: ViewPortOptions,
    pub initial_mailbox: String,
    /// Fetch action used while a filter is active.
    pub filter_action: String,
    /// Extra parameters sent with every unfiltered listing request.
    pub list_params: BTreeMap<String, String>,
}

pub trait MailRuntime {
    fn list_mailboxes(&mut self) -> Result<Vec<MailboxEntry>>;
    fn answer(&mut self, request: &FetchRequest) -> Result<FetchResponse>;
    fn set_flag(&mut self, uid: &Uid, flag: &str, on: bool) -> Result<()>;
    /// Removes messages and returns the mailbox's new cache id.
    fn delete_messages(&mut self, mailbox: &ViewName, uids: &[Uid]) -> Result<String>;
    fn spawn_fetch(&mut self, request: FetchRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let event = match self.answer(&request) {
            Ok(response) => InternalEvent::Fetched(response),
            Err(error) => InternalEvent::FetchFailed {
                view: request.view,
                error: format!("{error:#}"),
            },
        };
        tx.send(event)
            .map_err(|_| anyhow::anyhow!("fetch event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
    Fetched(FetchResponse),
    FetchFailed { view: ViewName, error: String },
}

/// Callback side of the list: tracks what the status bar reports.
#[derive(Debug, Clone, Default)]
pub struct ListHost {
    list_params: BTreeMap<String, String>,
    loading: bool,
    waiting: bool,
    failed: Option<ViewName>,
    removed: usize,
}

impl ListHost {
    pub fn new(list_params: BTreeMap<String, String>) -> Self {
        Self {
            list_params,
            ..Self::default()
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn removed_count(&self) -> usize {
        self.removed
    }

    pub fn failed_view(&self) -> Option<&ViewName> {
        self.failed.as_ref()
    }
}

impl ViewPortHooks for ListHost {
    fn on_complete(&mut self, _view: &ViewName) {
        self.failed = None;
    }

    fn on_fail(&mut self, view: &ViewName) {
        self.loading = false;
        self.waiting = false;
        self.failed = Some(view.clone());
    }

    fn on_wait(&mut self) {
        self.waiting = true;
    }

    fn on_fetch(&mut self, _view: &ViewName) {
        self.loading = true;
    }

    fn on_end_fetch(&mut self, _view: &ViewName) {
        self.loading = false;
        self.waiting = false;
    }

    fn on_remove_rows(&mut self, _view: &ViewName, rows: &[RowData]) {
        self.removed += rows.len();
    }

    fn additional_params(&self, _view: &ViewName) -> BTreeMap<String, String> {
        self.list_params.clone()
    }
}

pub type MailPort = ViewPort<RequestQueue, ListHost>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListCommand {
    MoveRow(isize),
    PageDown,
    PageUp,
    JumpFirst,
    JumpLast,
    NextMailbox,
    PrevMailbox,
    ToggleSelect,
    ExtendRange,
    ClearSelection,
    ToggleUnseen,
    ToggleFlagged,
    Delete,
    StartFilter,
    TogglePreview,
    GrowList,
    ShrinkList,
    ResetSplit,
    Reload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ViewData {
    mailboxes: Vec<MailboxEntry>,
    cursor: usize,
    /// Row number where a pending range selection starts.
    anchor: Option<usize>,
    filter_input: Option<String>,
    status_line: Option<String>,
    status_token: u64,
    help_visible: bool,
}

pub fn new_port(options: &UiOptions) -> Result<MailPort> {
    let mut port = ViewPort::new(
        options.viewport.clone(),
        RequestQueue::new(),
        ListHost::new(options.list_params.clone()),
    )
    .context("configure message list")?;
    port.add_filter(options.filter_action.clone());
    Ok(port)
}

pub fn run_app<R: MailRuntime>(options: &UiOptions, runtime: &mut R) -> Result<()> {
    let mut port = new_port(options)?;

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    refresh_mailboxes(runtime, &mut view_data, &internal_tx);
    let size = terminal.size().context("measure terminal")?;
    port.set_layout(list_metrics(size.width, size.height));
    port.load_view(options.initial_mailbox.as_str(), None, false);

    let mut result = Ok(());
    loop {
        pump(
            &mut port,
            runtime,
            &mut view_data,
            &internal_tx,
            &internal_rx,
        );
        port.tick(Instant::now());
        sync_cursor(&port, &mut view_data);

        if let Err(error) = terminal.draw(|frame| render(frame, &port, &view_data)) {
            result = Err(anyhow::Error::from(error).context("draw frame"));
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(&mut port, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => port.scroll_wheel(true),
                    MouseEventKind::ScrollDown => port.scroll_wheel(false),
                    _ => {}
                },
                Event::Resize(width, height) => {
                    port.set_layout(list_metrics(width, height));
                }
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        DisableMouseCapture,
        terminal::LeaveAlternateScreen
    )
    .context("leave alternate screen")?;
    result
}

/// List geometry for a terminal of `width` x `height` cells.
fn list_metrics(_width: u16, height: u16) -> LayoutMetrics {
    LayoutMetrics {
        line_height: 1,
        max_height: usize::from(
            height
                .saturating_sub(STATUS_HEIGHT)
                .saturating_sub(LIST_CHROME),
        ),
    }
}

/// Delivers queued fetches and feeds answers back until both sides are quiet.
fn pump<R: MailRuntime>(
    port: &mut MailPort,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    for _ in 0..PUMP_ROUNDS {
        let dispatched = dispatch_requests(port, runtime, view_data, tx);
        let processed = process_internal_events(port, view_data, tx, rx);
        if dispatched == 0 && processed == 0 {
            break;
        }
    }
}

fn dispatch_requests<R: MailRuntime>(
    port: &mut MailPort,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) -> usize {
    let requests = port.source_mut().take_all();
    let count = requests.len();
    for request in requests {
        debug!(view = %request.view, slice = ?request.slice, "dispatching fetch");
        if let Err(error) = runtime.spawn_fetch(request, tx.clone()) {
            emit_status(view_data, tx, format!("fetch not sent: {error:#}"));
        }
    }
    count
}

fn process_internal_events(
    port: &mut MailPort,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) -> usize {
    let mut processed = 0;
    while let Ok(event) = rx.try_recv() {
        processed += 1;
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                view_data.status_line = None;
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Fetched(response) => port.ajax_response(response),
            InternalEvent::FetchFailed { view, error } => {
                port.hooks_mut().on_fail(&view);
                emit_status(view_data, tx, format!("loading {view} failed: {error}"));
            }
        }
    }
    processed
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    view_data.status_line = Some(message.into());
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn refresh_mailboxes<R: MailRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    match runtime.list_mailboxes() {
        Ok(mailboxes) => view_data.mailboxes = mailboxes,
        Err(error) => emit_status(view_data, tx, format!("mailbox list failed: {error:#}")),
    }
}

/// Returns true when the app should quit.
fn handle_key_event<R: MailRuntime>(
    port: &mut MailPort,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if view_data.filter_input.is_some() {
        handle_filter_input_key(port, view_data, key);
        return false;
    }

    if view_data.help_visible {
        view_data.help_visible = false;
        return false;
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return true;
        }
        (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return true;
        }
        (KeyCode::Char('q'), KeyModifiers::NONE) => return true,
        (KeyCode::Char('?'), _) => {
            view_data.help_visible = true;
            return false;
        }
        (KeyCode::Esc, _) => {
            if port.is_filtering().is_some() {
                port.stop_filter(false);
                view_data.cursor = 0;
                emit_status(view_data, internal_tx, "filter cleared");
            } else {
                view_data.anchor = None;
            }
            return false;
        }
        _ => {}
    }

    let Some(command) = list_command_for_key(key) else {
        return false;
    };
    apply_list_command(port, runtime, view_data, internal_tx, command);
    false
}

fn handle_filter_input_key(port: &mut MailPort, view_data: &mut ViewData, key: KeyEvent) {
    let Some(input) = view_data.filter_input.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => view_data.filter_input = None,
        KeyCode::Enter => {
            let needle = std::mem::take(input);
            view_data.filter_input = None;
            port.run_filter(Some(&needle), BTreeMap::new());
            view_data.cursor = 0;
        }
        KeyCode::Backspace => {
            input.pop();
        }
        KeyCode::Char(ch) => input.push(ch),
        _ => {}
    }
}

fn list_command_for_key(key: KeyEvent) -> Option<ListCommand> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(ListCommand::MoveRow(1)),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(ListCommand::MoveRow(-1)),
        (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(ListCommand::PageDown)
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(ListCommand::PageUp)
        }
        (KeyCode::PageDown, _) => Some(ListCommand::PageDown),
        (KeyCode::PageUp, _) => Some(ListCommand::PageUp),
        (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(ListCommand::JumpFirst),
        (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(ListCommand::JumpLast),
        (KeyCode::Char('f'), KeyModifiers::NONE) | (KeyCode::Tab, _) => {
            Some(ListCommand::NextMailbox)
        }
        (KeyCode::Char('b'), KeyModifiers::NONE) | (KeyCode::BackTab, _) => {
            Some(ListCommand::PrevMailbox)
        }
        (KeyCode::Char(' '), _) => Some(ListCommand::ToggleSelect),
        (KeyCode::Char('v'), _) => Some(ListCommand::ExtendRange),
        (KeyCode::Char('x'), _) => Some(ListCommand::ClearSelection),
        (KeyCode::Char('m'), _) => Some(ListCommand::ToggleUnseen),
        (KeyCode::Char('*'), _) => Some(ListCommand::ToggleFlagged),
        (KeyCode::Char('D'), _) | (KeyCode::Delete, _) => Some(ListCommand::Delete),
        (KeyCode::Char('/'), _) => Some(ListCommand::StartFilter),
        (KeyCode::Char('p'), _) => Some(ListCommand::TogglePreview),
        (KeyCode::Char('+'), _) => Some(ListCommand::GrowList),
        (KeyCode::Char('-'), _) => Some(ListCommand::ShrinkList),
        (KeyCode::Char('='), _) => Some(ListCommand::ResetSplit),
        (KeyCode::Char('r'), KeyModifiers::NONE) => Some(ListCommand::Reload),
        _ => None,
    }
}

fn apply_list_command<R: MailRuntime>(
    port: &mut MailPort,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    command: ListCommand,
) {
    match command {
        ListCommand::MoveRow(delta) => move_cursor(port, view_data, delta),
        ListCommand::PageDown => {
            let page = port.page_size(PageSizeMode::Active);
            port.move_scroll(port.current_offset() + page);
        }
        ListCommand::PageUp => {
            let page = port.page_size(PageSizeMode::Active);
            port.move_scroll(port.current_offset().saturating_sub(page));
        }
        ListCommand::JumpFirst => {
            port.move_scroll(0);
            view_data.cursor = 0;
        }
        ListCommand::JumpLast => {
            let total = active_total(port);
            port.move_scroll(total);
            view_data.cursor = port.page_size(PageSizeMode::Current).saturating_sub(1);
        }
        ListCommand::NextMailbox => switch_mailbox(port, view_data, 1),
        ListCommand::PrevMailbox => switch_mailbox(port, view_data, -1),
        ListCommand::ToggleSelect => toggle_select(port, view_data),
        ListCommand::ExtendRange => extend_range(port, view_data, tx),
        ListCommand::ClearSelection => {
            if let Some(selection) = port.selected().cloned() {
                port.deselect(&selection, DeselectOptions { clear_all: true });
            }
            view_data.anchor = None;
        }
        ListCommand::ToggleUnseen => toggle_flag(port, runtime, view_data, tx, UNSEEN_FLAG),
        ListCommand::ToggleFlagged => toggle_flag(port, runtime, view_data, tx, FLAGGED_FLAG),
        ListCommand::Delete => delete_selection(port, runtime, view_data, tx),
        ListCommand::StartFilter => view_data.filter_input = Some(String::new()),
        ListCommand::TogglePreview => {
            let shown = port
                .pane_geometry()
                .is_some_and(|geometry| geometry.preview_height.is_some());
            if !port.options().split_pane {
                emit_status(view_data, tx, "preview pane disabled in config");
            } else {
                port.show_split_pane(!shown);
            }
        }
        ListCommand::GrowList | ListCommand::ShrinkList => {
            let Some(geometry) = port.pane_geometry() else {
                return;
            };
            let lines = if command == ListCommand::GrowList {
                geometry.list_lines + 1
            } else {
                geometry.list_lines.saturating_sub(1)
            };
            if port.drag_split_bar(lines).is_none() {
                emit_status(view_data, tx, "preview pane is hidden");
            }
        }
        ListCommand::ResetSplit => port.reset_split_bar(),
        ListCommand::Reload => {
            port.reload(BTreeMap::new());
            refresh_mailboxes(runtime, view_data, tx);
        }
    }
}

fn active_total(port: &MailPort) -> usize {
    port.current_view()
        .and_then(|view| port.buffer(view))
        .map_or(0, |buffer| buffer.total_rows())
}

/// Moves the highlighted row, scrolling the list when it leaves the window.
fn move_cursor(port: &mut MailPort, view_data: &mut ViewData, delta: isize) {
    let visible = port.content().rows().len();
    if delta > 0 {
        let target = view_data.cursor + delta.unsigned_abs();
        if target < visible {
            view_data.cursor = target;
        } else {
            let overflow = target + 1 - visible.max(1);
            port.move_scroll(port.current_offset() + overflow);
            view_data.cursor = visible.saturating_sub(1);
        }
    } else {
        let step = delta.unsigned_abs();
        if step <= view_data.cursor {
            view_data.cursor -= step;
        } else {
            let overflow = step - view_data.cursor;
            port.move_scroll(port.current_offset().saturating_sub(overflow));
            view_data.cursor = 0;
        }
    }
}

fn sync_cursor(port: &MailPort, view_data: &mut ViewData) {
    let visible = port.content().rows().len();
    view_data.cursor = view_data.cursor.min(visible.saturating_sub(1));
}

fn cursor_row<'a>(port: &'a MailPort, view_data: &ViewData) -> Option<&'a RenderedRow> {
    port.content().rows().get(view_data.cursor)
}

fn switch_mailbox(port: &mut MailPort, view_data: &mut ViewData, step: isize) {
    if view_data.mailboxes.is_empty() {
        return;
    }
    let current = port
        .is_filtering()
        .or_else(|| port.current_view())
        .and_then(|view| {
            view_data
                .mailboxes
                .iter()
                .position(|mailbox| mailbox.name == view.as_str())
        })
        .unwrap_or(0);
    let count = view_data.mailboxes.len() as isize;
    let next = (current as isize + step).rem_euclid(count) as usize;
    let name = view_data.mailboxes[next].name.clone();
    view_data.cursor = 0;
    view_data.anchor = None;
    if port.load_view(name.as_str(), None, false) == LoadOutcome::Deferred {
        debug!(mailbox = %name, "mailbox load waits for layout");
    }
}

fn toggle_select(port: &mut MailPort, view_data: &ViewData) {
    let Some(row) = cursor_row(port, view_data) else {
        return;
    };
    let uid = row.data.uid.clone();
    let selection = port.create_selection(SelectionSpec::Uid(vec![uid.clone()]), None);
    let already = port
        .selected()
        .is_some_and(|selected| selected.contains_uid(&uid));
    if already {
        port.deselect(&selection, DeselectOptions::default());
    } else {
        port.select(
            selection,
            SelectOptions {
                add: true,
                range: false,
            },
        );
    }
}

fn extend_range(port: &mut MailPort, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let Some(rownum) = cursor_row(port, view_data).and_then(|row| row.data.rownum) else {
        return;
    };
    let Some(anchor) = view_data.anchor.take() else {
        view_data.anchor = Some(rownum);
        emit_status(view_data, tx, format!("range starts at row {rownum}"));
        return;
    };
    let positions: Vec<usize> = (anchor.min(rownum)..=anchor.max(rownum)).collect();
    let count = positions.len();
    if port.select_range(&positions, SelectOptions::default()) {
        emit_status(view_data, tx, format!("selected {count} messages"));
    } else {
        emit_status(view_data, tx, format!("fetching {count} rows to select"));
    }
}

/// The selection commands act on: the stored selection, or the highlighted
/// row when nothing is selected.
fn target_selection(port: &MailPort, view_data: &ViewData) -> Option<Selection> {
    if let Some(selected) = port.selected()
        && !selected.is_empty()
    {
        return Some(selected.clone());
    }
    let row = cursor_row(port, view_data)?;
    Some(port.create_selection(SelectionSpec::Uid(vec![row.data.uid.clone()]), None))
}

fn toggle_flag<R: MailRuntime>(
    port: &mut MailPort,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    flag: &str,
) {
    let Some(selection) = target_selection(port, view_data) else {
        return;
    };
    let add = !cursor_row(port, view_data).is_some_and(|row| row.has_class(flag));
    for uid in selection.uids() {
        if let Err(error) = runtime.set_flag(uid, flag, add) {
            emit_status(view_data, tx, format!("flag update failed: {error:#}"));
            return;
        }
    }
    port.update_flag(&selection, flag, add);
    refresh_mailboxes(runtime, view_data, tx);
}

fn delete_selection<R: MailRuntime>(
    port: &mut MailPort,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let Some(selection) = target_selection(port, view_data) else {
        return;
    };
    let filtering = port.is_filtering().cloned();
    let Some(mailbox) = filtering.clone().or_else(|| port.current_view().cloned()) else {
        return;
    };
    let count = selection.len();
    let cacheid = match runtime.delete_messages(&mailbox, selection.uids()) {
        Ok(cacheid) => cacheid,
        Err(error) => {
            emit_status(view_data, tx, format!("delete failed: {error:#}"));
            return;
        }
    };
    port.remove(
        selection,
        RemoveOptions {
            // The filtered listing has its own cache id; let the next fetch
            // report it.
            cacheid: filtering.is_none().then_some(cacheid),
            ..RemoveOptions::default()
        },
    );
    view_data.anchor = None;
    refresh_mailboxes(runtime, view_data, tx);
    emit_status(view_data, tx, format!("deleted {count} from {mailbox}"));
}

fn render(frame: &mut ratatui::Frame<'_>, port: &MailPort, view_data: &ViewData) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(STATUS_HEIGHT)])
        .split(frame.area());
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
        .split(outer[0]);

    let sidebar = Paragraph::new(sidebar_text(port, view_data))
        .block(Block::default().title("vport").borders(Borders::ALL));
    frame.render_widget(sidebar, body[0]);

    render_list(frame, body[1], port, view_data);

    let status = Paragraph::new(status_text(port, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, outer[1]);

    if view_data.help_visible {
        let area = centered_rect(76, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_list(frame: &mut ratatui::Frame<'_>, area: Rect, port: &MailPort, view_data: &ViewData) {
    let block = Block::default()
        .title(list_title(port))
        .borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let geometry = port.pane_geometry();
    let (list_area, preview_area) = match geometry.and_then(|geometry| {
        geometry
            .preview_height
            .map(|preview| (geometry.list_height, preview))
    }) {
        Some((list_height, _)) => {
            let split = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(u16::try_from(list_height).unwrap_or(u16::MAX)),
                    Constraint::Length(1),
                    Constraint::Min(0),
                ])
                .split(inner);
            let bar = Paragraph::new("─".repeat(usize::from(split[1].width)))
                .style(Style::default().fg(Color::DarkGray));
            frame.render_widget(bar, split[1]);
            (split[0], Some(split[2]))
        }
        None => (inner, None),
    };

    let body = match port.content() {
        Content::Rows(rows) => Paragraph::new(
            rows.iter()
                .enumerate()
                .map(|(index, row)| {
                    row_line(row, index == view_data.cursor, &port.options().selected_class)
                })
                .collect::<Vec<Line<'_>>>(),
        ),
        Content::Empty(text) => Paragraph::new(text.as_str()),
        Content::Error(text) => {
            Paragraph::new(text.as_str()).style(Style::default().fg(Color::Red))
        }
        Content::Blank => Paragraph::new(""),
    };
    frame.render_widget(body, list_area);

    if let Some(area) = preview_area {
        let preview = Paragraph::new(preview_text(cursor_row(port, view_data)));
        frame.render_widget(preview, area);
    }
}

fn list_title(port: &MailPort) -> String {
    let Some(view) = port.current_view() else {
        return String::new();
    };
    let total = active_total(port);
    let first = port.current_offset() + 1;
    let last = port.current_offset() + port.content().rows().len();
    let name = match port.is_filtering() {
        Some(overlaid) => format!("{overlaid} (filtered)"),
        None => port
            .metadata("label", Some(view))
            .and_then(Value::as_str)
            .map_or_else(|| view.to_string(), str::to_owned),
    };
    if total == 0 {
        name
    } else {
        format!("{name} {first}-{last} of {total}")
    }
}

fn row_line<'a>(row: &'a RenderedRow, is_cursor: bool, selected_class: &str) -> Line<'a> {
    let mut style = Style::default();
    if row.has_class(UNSEEN_FLAG) {
        style = style.add_modifier(Modifier::BOLD);
    }
    if row.has_class(FLAGGED_FLAG) {
        style = style.fg(Color::Yellow);
    }
    if row.has_class(selected_class) {
        style = style.add_modifier(Modifier::REVERSED);
    }
    if is_cursor {
        style = style.bg(Color::DarkGray);
    }
    let marker = if is_cursor { "› " } else { "  " };
    let flag = if row.has_class(FLAGGED_FLAG) { "* " } else { "  " };
    Line::from(vec![
        Span::raw(marker),
        Span::raw(flag),
        Span::styled(row.text.as_str(), style),
    ])
}

fn preview_text(row: Option<&RenderedRow>) -> String {
    let Some(row) = row else {
        return String::new();
    };
    let field = |key: &str| {
        row.data
            .record
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };
    let size = row
        .data
        .record
        .get("size")
        .and_then(Value::as_f64)
        .map(|bytes| format_size(bytes as u64))
        .unwrap_or_default();
    format!(
        "From:    {}\nSubject: {}\nDate:    {}\nSize:    {size}\nFlags:   {}",
        field("from"),
        field("subject"),
        format_date(&field("date")),
        row.classes.join(" "),
    )
}

fn sidebar_text(port: &MailPort, view_data: &ViewData) -> String {
    let active = port.is_filtering().or_else(|| port.current_view());
    view_data
        .mailboxes
        .iter()
        .map(|mailbox| {
            let marker = if active.is_some_and(|view| view.as_str() == mailbox.name) {
                "▸"
            } else {
                " "
            };
            if mailbox.unseen > 0 {
                format!("{marker} {} ({})", mailbox.name, mailbox.unseen)
            } else {
                format!("{marker} {}", mailbox.name)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_text(port: &MailPort, view_data: &ViewData) -> String {
    if let Some(input) = &view_data.filter_input {
        return format!("filter: {input}▏ enter apply | esc cancel");
    }
    let default = "j/k pg g/G | b/f mailbox | space/v select | m seen * flag D del | / filter p preview | ? help | q";
    let state = if let Some(view) = port.hooks().failed_view() {
        format!("load failed: {view}")
    } else if port.hooks().is_waiting() {
        "still loading...".to_owned()
    } else if port.hooks().is_loading() {
        "loading...".to_owned()
    } else {
        let selected = port.selected().map_or(0, Selection::len);
        if selected > 0 {
            format!("{selected} selected")
        } else {
            String::new()
        }
    };
    match (&view_data.status_line, state.is_empty()) {
        (Some(status), true) => format!("{status} | {default}"),
        (Some(status), false) => format!("{state} | {status} | {default}"),
        (None, true) => default.to_owned(),
        (None, false) => format!("{state} | {default}"),
    }
}

fn help_overlay_text() -> &'static str {
    "global: q or ctrl+q quit | ? help | r reload\n\
move: j/k row | ctrl+d/u pgdn/pgup page | g/G first/last | wheel scroll\n\
mailbox: b/f or shift+tab/tab switch\n\
select: space toggle | v range start/end | x clear\n\
messages: m toggle seen | * toggle flag | D or del delete\n\
filter: / type text, enter apply | esc clear\n\
preview: p toggle | +/- resize | = reset"
}

fn format_date(raw: &str) -> String {
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .and_then(|value| {
            value
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .ok()
        })
        .unwrap_or_else(|| raw.to_owned())
}

fn format_size(bytes: u64) -> String {
    match bytes {
        0..1_024 => format!("{bytes} B"),
        1_024..1_048_576 => format!("{} KB", bytes / 1_024),
        _ => format!("{:.1} MB", bytes as f64 / 1_048_576.0),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
