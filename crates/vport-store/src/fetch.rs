// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Answers list requests from the mailbox tables.

use crate::{Store, cache_id, flag_list, message_record};
use anyhow::{Context, Result, bail};
use rusqlite::params;
use std::collections::BTreeSet;
use tracing::{debug, trace};
use vport_core::{
    DEFAULT_FETCH_ACTION, FLAGS_KEY, FetchRequest, FetchResponse, RANGE_SLICE_PARAM, Record,
    SliceRange, Uid, Value,
};

pub const LIST_ACTION: &str = DEFAULT_FETCH_ACTION;
pub const FILTER_ACTION: &str = "filterMessages";

const SORT_PARAM: &str = "sortby";
const DEFAULT_SORT: &str = "date";

/// Newest first; `?2` is the lowercased filter needle, empty for none.
const LISTING_FILTER: &str = "
    mailbox_id = ?1
    AND deleted_at IS NULL
    AND (?2 = '' OR instr(lower(subject), ?2) > 0 OR instr(lower(sender), ?2) > 0)
";

impl Store {
    pub fn answer(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mailbox_name = request.view.as_str();
        let needle = match request.action.as_str() {
            LIST_ACTION => None,
            FILTER_ACTION => request
                .filter
                .as_deref()
                .map(str::trim)
                .filter(|needle| !needle.is_empty())
                .map(str::to_lowercase),
            other => bail!("unsupported fetch action {other:?}"),
        };
        let mailbox = self.require_mailbox(mailbox_name)?;
        let cacheid = cache_id(mailbox_name, mailbox.generation, needle.as_deref());
        let stale = request
            .cacheid
            .as_deref()
            .is_some_and(|known| known != cacheid);
        let reset = request.purge || stale;
        let needle = needle.as_deref().unwrap_or_default();
        let ids = self.ordered_ids(mailbox.id, needle)?;
        let total = ids.len();

        let mut response = FetchResponse {
            request_id: request.request_id,
            id: Some(request.view.clone()),
            cacheid: Some(cacheid),
            label: Some(mailbox_name.to_owned()),
            totalrows: Some(total),
            rownum: request.rownum,
            reset,
            metadata: Some(Record::from([(
                SORT_PARAM.to_owned(),
                Value::text(request.param(SORT_PARAM).unwrap_or(DEFAULT_SORT)),
            )])),
            ..FetchResponse::default()
        };
        if request.checkcache && !reset {
            trace!(mailbox = mailbox_name, "cache id still current");
            return Ok(response);
        }

        let slice = match &request.search {
            Some(target) => {
                let Some(index) = ids.iter().position(|id| id.to_string() == *target) else {
                    debug!(mailbox = mailbox_name, search = %target, "search target not found");
                    return Ok(response);
                };
                let rownum = index + 1;
                response.search = true;
                response.rownum = Some(rownum);
                clip(
                    SliceRange::new(
                        rownum.saturating_sub(request.search_before.unwrap_or_default()),
                        rownum + request.search_after.unwrap_or_default(),
                    ),
                    total,
                )
            }
            None => request.slice.and_then(|slice| clip(slice, total)),
        };
        let Some(slice) = slice else {
            return Ok(response);
        };

        let skip: BTreeSet<&Uid> = if reset {
            BTreeSet::new()
        } else {
            request.cached.iter().collect()
        };
        if request.param(RANGE_SLICE_PARAM) == Some("1") {
            response.partial = true;
            self.fill_flags(&mut response, mailbox.id, needle, slice, &skip)?;
        } else {
            self.fill_rows(&mut response, mailbox.id, needle, slice, &skip)?;
        }
        debug!(
            mailbox = mailbox_name,
            %slice,
            rows = response.data.len(),
            total,
            reset,
            "answered fetch"
        );
        Ok(response)
    }

    fn ordered_ids(&self, mailbox_id: i64, needle: &str) -> Result<Vec<i64>> {
        let mut stmt = self
            .raw_connection()
            .prepare(&format!(
                "SELECT id FROM messages WHERE {LISTING_FILTER} ORDER BY received_at DESC, id DESC"
            ))
            .context("prepare message order query")?;
        let rows = stmt
            .query_map(params![mailbox_id, needle], |row| row.get(0))
            .context("query message order")?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .context("collect message order")
    }

    fn fill_rows(
        &self,
        response: &mut FetchResponse,
        mailbox_id: i64,
        needle: &str,
        slice: SliceRange,
        skip: &BTreeSet<&Uid>,
    ) -> Result<()> {
        let mut stmt = self
            .raw_connection()
            .prepare(&format!(
                "
                SELECT id, sender, subject, received_at, size, flags
                FROM messages
                WHERE {LISTING_FILTER}
                ORDER BY received_at DESC, id DESC
                LIMIT ?3 OFFSET ?4
                "
            ))
            .context("prepare message page query")?;
        let (limit, offset) = page_bounds(slice)?;
        let rows = stmt
            .query_map(
                params![mailbox_id, needle, limit, offset],
                |row| {
                    let id: i64 = row.get(0)?;
                    let record = message_record(row, 1)?;
                    Ok((id, record))
                },
            )
            .context("query message page")?;
        for (position, row) in slice.positions().zip(rows) {
            let (id, record) = row.context("read message row")?;
            let uid = Uid::new(id.to_string());
            response.rowlist.insert(uid.clone(), position);
            if !skip.contains(&uid) {
                response.data.insert(uid, record);
            }
        }
        Ok(())
    }

    /// Positions plus class lists only; used to resolve range selections.
    fn fill_flags(
        &self,
        response: &mut FetchResponse,
        mailbox_id: i64,
        needle: &str,
        slice: SliceRange,
        skip: &BTreeSet<&Uid>,
    ) -> Result<()> {
        let mut stmt = self
            .raw_connection()
            .prepare(&format!(
                "
                SELECT id, flags
                FROM messages
                WHERE {LISTING_FILTER}
                ORDER BY received_at DESC, id DESC
                LIMIT ?3 OFFSET ?4
                "
            ))
            .context("prepare message flag query")?;
        let (limit, offset) = page_bounds(slice)?;
        let rows = stmt
            .query_map(
                params![mailbox_id, needle, limit, offset],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .context("query message flags")?;
        for (position, row) in slice.positions().zip(rows) {
            let (id, flags) = row.context("read message flags")?;
            let uid = Uid::new(id.to_string());
            response.rowlist.insert(uid.clone(), position);
            if !skip.contains(&uid) {
                response
                    .data
                    .insert(uid, Record::from([(FLAGS_KEY.to_owned(), flag_list(&flags))]));
            }
        }
        Ok(())
    }
}

/// Clamps to `1..=total`; `None` when nothing is left.
fn clip(slice: SliceRange, total: usize) -> Option<SliceRange> {
    let start = slice.start.max(1);
    let end = slice.end.min(total);
    (start <= end).then(|| SliceRange::new(start, end))
}

fn page_bounds(slice: SliceRange) -> Result<(i64, i64)> {
    let limit = i64::try_from(slice.end - slice.start + 1).context("slice too large")?;
    let offset = i64::try_from(slice.start - 1).context("slice start too large")?;
    Ok((limit, offset))
}
