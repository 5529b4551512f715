// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, Month, OffsetDateTime, Time};
use vport_core::{
    DeselectOptions, FLAGS_KEY, FetchRequest, FetchResponse, Record, RenderedRow, RowData,
    SelectOptions, Selection, Uid, Value, ViewName, ViewPortHooks,
};

const MAILBOXES: [&str; 5] = ["INBOX", "Archive", "Drafts", "Sent", "Trash"];

const FIRST_NAMES: [&str; 16] = [
    "Avery", "Jordan", "Taylor", "Riley", "Morgan", "Casey", "Alex", "Quinn", "Parker", "Drew",
    "Kai", "Elliot", "Robin", "Cameron", "Hayden", "Rowan",
];
const LAST_NAMES: [&str; 18] = [
    "Walker", "Martin", "Hill", "Evans", "Lopez", "Gray", "Ward", "Young", "Diaz", "Reed",
    "Campbell", "Turner", "Flores", "Bennett", "Price", "Morris", "Foster", "Brooks",
];
const DOMAINS: [&str; 6] = [
    "example.com",
    "example.org",
    "mail.test",
    "corp.test",
    "lists.example.net",
    "home.test",
];

const SUBJECT_PREFIXES: [&str; 4] = ["", "Re: ", "Fwd: ", "Re: Re: "];
const SUBJECT_TOPICS: [&str; 20] = [
    "Quarterly report",
    "Lunch on Friday",
    "Server maintenance window",
    "Invoice attached",
    "Meeting notes",
    "Travel itinerary",
    "Build failure on main",
    "Welcome aboard",
    "Password reset",
    "Weekly digest",
    "Conference schedule",
    "Budget review",
    "Release checklist",
    "Offsite planning",
    "Support ticket update",
    "Draft proposal",
    "Holiday hours",
    "Code review request",
    "Shipping confirmation",
    "Team photo",
];

/// Flags a generated message may carry in its class list.
const MESSAGE_FLAGS: [&str; 3] = ["unseen", "flagged", "answered"];

const REFERENCE_YEAR: i32 = 2026;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub subject: String,
    pub date: OffsetDateTime,
    pub size: i64,
    pub flags: Vec<String>,
}

impl MailMessage {
    /// Row record in the shape the list renders: `from`, `subject`, `date`,
    /// `size`, and the class list.
    pub fn to_record(&self) -> Record {
        let date = self
            .date
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.date.unix_timestamp().to_string());
        Record::from([
            ("from".to_owned(), Value::text(&self.from)),
            ("subject".to_owned(), Value::text(&self.subject)),
            ("date".to_owned(), Value::Text(date)),
            ("size".to_owned(), Value::Number(self.size as f64)),
            (
                FLAGS_KEY.to_owned(),
                Value::List(self.flags.iter().cloned().map(Value::Text).collect()),
            ),
        ])
    }
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn chance(&mut self, percent: u64) -> bool {
        self.next_u64() % 100 < percent
    }
}

#[derive(Debug, Clone)]
pub struct MailFaker {
    rng: DeterministicRng,
}

impl MailFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn sender(&mut self) -> String {
        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        let domain = self.pick(&DOMAINS);
        format!(
            "{first} {last} <{}.{}@{domain}>",
            first.to_lowercase(),
            last.to_lowercase()
        )
    }

    pub fn subject(&mut self) -> String {
        format!(
            "{}{}",
            self.pick(&SUBJECT_PREFIXES),
            self.pick(&SUBJECT_TOPICS)
        )
    }

    pub fn message(&mut self) -> MailMessage {
        let from = self.sender();
        let subject = self.subject();
        let start = midnight_utc(REFERENCE_YEAR, Month::January, 1);
        let date = start + Duration::minutes(self.rng.int_n(365 * 24 * 60) as i64);
        let size = 512 + self.rng.int_n(256 * 1024) as i64;
        let mut flags = Vec::new();
        for (flag, percent) in MESSAGE_FLAGS.iter().zip([40, 10, 20]) {
            if self.rng.chance(percent) {
                flags.push((*flag).to_owned());
            }
        }
        MailMessage {
            from,
            subject,
            date,
            size,
            flags,
        }
    }

    /// `count` messages, newest first.
    pub fn mailbox(&mut self, count: usize) -> Vec<MailMessage> {
        let mut messages: Vec<MailMessage> = (0..count).map(|_| self.message()).collect();
        messages.sort_by(|left, right| right.date.cmp(&left.date));
        messages
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

/// Simple record for position `position`: `from = sender<n>`,
/// `subject = message <n>`, no flags.
pub fn synthetic_record(position: usize) -> Record {
    Record::from([
        ("from".to_owned(), Value::text(format!("sender{position}"))),
        ("subject".to_owned(), Value::text(format!("message {position}"))),
        (FLAGS_KEY.to_owned(), Value::List(Vec::new())),
    ])
}

pub fn synthetic_uid(position: usize) -> Uid {
    Uid::new(format!("u{position}"))
}

/// Answers `request` from a synthetic mailbox of `total` rows: every position
/// of the requested slice up to `total`, ids `u<n>`, cache id `fixture`.
pub fn slice_response(request: &FetchRequest, total: usize) -> FetchResponse {
    let mut data = BTreeMap::new();
    let mut rowlist = BTreeMap::new();
    if let Some(slice) = request.slice {
        for position in slice.positions().filter(|position| *position <= total) {
            let uid = synthetic_uid(position);
            data.insert(uid.clone(), synthetic_record(position));
            rowlist.insert(uid, position);
        }
    }
    FetchResponse {
        request_id: request.request_id,
        id: Some(request.view.clone()),
        data,
        rowlist,
        cacheid: Some("fixture".to_owned()),
        totalrows: Some(total),
        rownum: request.rownum,
        ..FetchResponse::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Complete(ViewName),
    Fail(ViewName),
    Wait,
    Fetch(ViewName),
    EndFetch(ViewName),
    ClearRows(usize),
    Content(Vec<Uid>),
    CacheUpdate(ViewName),
    UpdateClass(Uid),
    FirstContent,
    BeforeResize,
    AfterResize,
    Scroll,
    ScrollIdle,
    Select(Vec<Uid>),
    Deselect(Vec<Uid>),
    RemoveRows(ViewName, Vec<Uid>),
}

/// Hooks that log every callback in order.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub events: Vec<HookEvent>,
    pub cached_override: Option<Vec<Uid>>,
    pub extra_params: BTreeMap<String, String>,
    pub filter_extra: BTreeMap<String, String>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, matches: impl Fn(&HookEvent) -> bool) -> usize {
        self.events.iter().filter(|event| matches(event)).count()
    }

    pub fn contents(&self) -> Vec<&[Uid]> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HookEvent::Content(uids) => Some(uids.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl ViewPortHooks for RecordingHooks {
    fn on_complete(&mut self, view: &ViewName) {
        self.events.push(HookEvent::Complete(view.clone()));
    }

    fn on_fail(&mut self, view: &ViewName) {
        self.events.push(HookEvent::Fail(view.clone()));
    }

    fn on_wait(&mut self) {
        self.events.push(HookEvent::Wait);
    }

    fn on_fetch(&mut self, view: &ViewName) {
        self.events.push(HookEvent::Fetch(view.clone()));
    }

    fn on_end_fetch(&mut self, view: &ViewName) {
        self.events.push(HookEvent::EndFetch(view.clone()));
    }

    fn on_clear_rows(&mut self, rows: &[RenderedRow]) {
        self.events.push(HookEvent::ClearRows(rows.len()));
    }

    fn on_content(&mut self, rows: &[RenderedRow]) {
        self.events.push(HookEvent::Content(
            rows.iter().map(|row| row.data.uid.clone()).collect(),
        ));
    }

    fn on_cache_update(&mut self, view: &ViewName) {
        self.events.push(HookEvent::CacheUpdate(view.clone()));
    }

    fn on_update_class(&mut self, row: &RenderedRow) {
        self.events.push(HookEvent::UpdateClass(row.data.uid.clone()));
    }

    fn on_first_content(&mut self) {
        self.events.push(HookEvent::FirstContent);
    }

    fn on_before_resize(&mut self) {
        self.events.push(HookEvent::BeforeResize);
    }

    fn on_after_resize(&mut self) {
        self.events.push(HookEvent::AfterResize);
    }

    fn on_scroll(&mut self) {
        self.events.push(HookEvent::Scroll);
    }

    fn on_scroll_idle(&mut self) {
        self.events.push(HookEvent::ScrollIdle);
    }

    fn on_select(&mut self, selection: &Selection, _options: SelectOptions) {
        self.events.push(HookEvent::Select(selection.uids().to_vec()));
    }

    fn on_deselect(&mut self, selection: &Selection, _options: DeselectOptions) {
        self.events.push(HookEvent::Deselect(selection.uids().to_vec()));
    }

    fn on_remove_rows(&mut self, view: &ViewName, rows: &[RowData]) {
        self.events.push(HookEvent::RemoveRows(
            view.clone(),
            rows.iter().map(|row| row.uid.clone()).collect(),
        ));
    }

    fn cached_list(&self, _view: &ViewName) -> Option<Vec<Uid>> {
        self.cached_override.clone()
    }

    fn additional_params(&self, _view: &ViewName) -> BTreeMap<String, String> {
        self.extra_params.clone()
    }

    fn filter_params(&self) -> BTreeMap<String, String> {
        self.filter_extra.clone()
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("vport.db");
    Ok((dir, db_path))
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

pub fn mailbox_names() -> &'static [&'static str] {
    &MAILBOXES
}

fn midnight_utc(year: i32, month: Month, day: u8) -> OffsetDateTime {
    Date::from_calendar_date(year, month, day)
        .map(|date| date.with_time(Time::MIDNIGHT).assume_utc())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
