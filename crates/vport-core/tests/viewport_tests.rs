// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeMap;
use vport_core::{
    Content, FetchRequest, FetchResponse, LayoutMetrics, LoadOutcome, RemoveOptions,
    RequestQueue, SelectionSpec, SliceRange, Uid, Value, ViewName, ViewPort, ViewPortOptions,
};
use vport_testkit::{HookEvent, RecordingHooks, slice_response, synthetic_uid};

type Port = ViewPort<RequestQueue, RecordingHooks>;

fn options() -> ViewPortOptions {
    ViewPortOptions {
        buffer_pages: 3.0,
        limit_factor: 20.0,
        empty_text: Some("Nothing here".to_owned()),
        error_text: Some("Could not load messages".to_owned()),
        ..ViewPortOptions::default()
    }
}

fn port_with(hooks: RecordingHooks) -> Result<Port> {
    let mut port = ViewPort::new(options(), RequestQueue::new(), hooks)?;
    port.set_layout(LayoutMetrics {
        line_height: 1,
        max_height: 20,
    });
    Ok(port)
}

fn port() -> Result<Port> {
    port_with(RecordingHooks::new())
}

/// Answers every queued fetch from a synthetic mailbox; cache checks are
/// acknowledged without data. Returns how many fetches were answered.
fn answer(port: &mut Port, total: usize) -> usize {
    let mut answered = 0;
    while let Some(request) = port.source_mut().pop() {
        if request.checkcache {
            continue;
        }
        port.ajax_response(slice_response(&request, total));
        answered += 1;
    }
    answered
}

fn inbox() -> ViewName {
    ViewName::from("INBOX")
}

fn loaded(total: usize) -> Result<Port> {
    let mut port = port()?;
    assert_eq!(port.load_view("INBOX", None, false), LoadOutcome::Fetching);
    answer(&mut port, total);
    Ok(port)
}

fn visible_uids(port: &Port) -> Vec<Uid> {
    port.content()
        .rows()
        .iter()
        .map(|row| row.data.uid.clone())
        .collect()
}

fn expected_uids(positions: std::ops::RangeInclusive<usize>) -> Vec<Uid> {
    positions.map(synthetic_uid).collect()
}

#[test]
fn first_load_fires_hooks_in_order() -> Result<()> {
    let port = loaded(100)?;
    let events = &port.hooks().events;
    let index_of = |wanted: &HookEvent| events.iter().position(|event| event == wanted);

    let fetch = index_of(&HookEvent::Fetch(inbox())).expect("fetch fired");
    let first = index_of(&HookEvent::FirstContent).expect("first content fired");
    let complete = index_of(&HookEvent::Complete(inbox())).expect("complete fired");
    let end = index_of(&HookEvent::EndFetch(inbox())).expect("end fetch fired");
    assert!(fetch < first);
    assert!(first < complete);
    assert!(complete < end);
    assert_eq!(port.hooks().contents(), vec![expected_uids(1..=20).as_slice()]);
    Ok(())
}

#[test]
fn scrolling_through_a_large_mailbox_always_shows_the_right_rows() -> Result<()> {
    let mut port = loaded(500)?;
    for offset in [10, 45, 120, 121, 300, 480, 250, 0] {
        port.move_scroll(offset);
        answer(&mut port, 500);
        let start = port.current_offset() + 1;
        assert_eq!(
            visible_uids(&port),
            expected_uids(start..=start + 19),
            "offset {offset}"
        );
    }
    assert_eq!(port.current_offset(), 0);
    assert_eq!(port.in_flight_count(), 0);
    Ok(())
}

#[test]
fn approaching_the_cache_edge_prefetches_in_background() -> Result<()> {
    let mut port = loaded(100)?;
    let fetches = port
        .hooks()
        .count(|event| matches!(event, HookEvent::Fetch(_)));

    assert!(port.request_content_refresh(40));

    let request = port.source_mut().pop().expect("prefetch issued");
    assert_eq!(request.slice, Some(SliceRange::new(62, 100)));
    assert_eq!(
        port.hooks()
            .count(|event| matches!(event, HookEvent::Fetch(_))),
        fetches
    );

    let renders = port.hooks().contents().len();
    port.ajax_response(slice_response(&request, 100));
    assert_eq!(port.hooks().contents().len(), renders);
    assert_eq!(port.buffer(&inbox()).map(|buffer| buffer.len()), Some(100));
    Ok(())
}

#[test]
fn request_ids_are_reused_for_the_same_row() -> Result<()> {
    let mut port = loaded(100)?;
    assert!(!port.request_content_refresh(70));
    let first = port.source_mut().pop().expect("fetch issued");
    port.ajax_response(slice_response(&first, 100));
    assert_eq!(port.current_offset(), 70);

    port.reload(BTreeMap::new());
    let again = port.source_mut().pop().expect("reload issued");
    assert!(again.purge);
    assert_eq!(again.request_id, first.request_id);
    assert_eq!(again.rownum, Some(71));
    Ok(())
}

#[test]
fn search_load_renders_around_the_match() -> Result<()> {
    let mut port = port()?;
    port.load_view("INBOX", Some("u42".to_owned()), false);
    let request = port.source_mut().pop().expect("search issued");
    assert_eq!(request.search.as_deref(), Some("u42"));
    assert_eq!(request.search_before, Some(24));
    assert_eq!(request.search_after, Some(36));
    assert_eq!(request.slice, None);

    let window = FetchRequest {
        slice: Some(SliceRange::new(18, 78)),
        ..request.clone()
    };
    let mut response = slice_response(&window, 200);
    response.search = true;
    response.rownum = Some(42);
    port.ajax_response(response);

    assert_eq!(port.current_offset(), 41);
    assert_eq!(visible_uids(&port), expected_uids(42..=61));
    Ok(())
}

#[test]
fn hook_providers_shape_outgoing_requests() -> Result<()> {
    let hooks = RecordingHooks {
        cached_override: Some(vec![Uid::from("u1")]),
        extra_params: BTreeMap::from([("sortby".to_owned(), "date".to_owned())]),
        filter_extra: BTreeMap::from([("scope".to_owned(), "subject".to_owned())]),
        ..RecordingHooks::default()
    };
    let mut port = port_with(hooks)?;
    port.load_view("INBOX", None, false);
    let request = port.source_mut().pop().expect("fetch issued");
    assert_eq!(request.cached, vec![Uid::from("u1")]);
    assert_eq!(request.param("sortby"), Some("date"));
    port.ajax_response(slice_response(&request, 100));

    port.add_filter("filterMessages");
    port.run_filter(Some("Message 3"), BTreeMap::new());
    let filtered = port.source_mut().pop().expect("filter issued");
    assert_eq!(filtered.action, "filterMessages");
    assert_eq!(filtered.view, inbox());
    assert_eq!(filtered.filter.as_deref(), Some("message 3"));
    assert_eq!(filtered.param("scope"), Some("subject"));
    assert_eq!(filtered.param("sortby"), None);
    Ok(())
}

#[test]
fn refiltering_while_active_purges_and_refetches() -> Result<()> {
    let mut port = loaded(100)?;
    port.add_filter("filterMessages");
    port.run_filter(Some("message 1"), BTreeMap::new());
    let first = port.source_mut().pop().expect("filter issued");
    port.ajax_response(slice_response(&first, 5));

    port.run_filter(Some("message 2"), BTreeMap::new());
    let second = port.source_mut().pop().expect("refilter issued");
    assert!(second.purge);
    assert_eq!(second.filter.as_deref(), Some("message 2"));
    assert_eq!(port.is_filtering(), Some(&inbox()));

    port.load_view("Sent", None, false);
    assert_eq!(port.is_filtering(), None);
    assert!(port.buffer(&ViewName::from(vport_core::FILTER_VIEW)).is_none());
    Ok(())
}

#[test]
fn json_responses_drive_the_controller() -> Result<()> {
    let mut port = port()?;
    port.load_view("Drafts", None, false);
    let request = port.source_mut().pop().expect("fetch issued");
    let id = request.request_id.expect("tracked request");

    let response = FetchResponse::from_json(&format!(
        r#"{{"request_id":{id},"data":[],"rowlist":[],"totalrows":0,"cacheid":"d0"}}"#
    ))?;
    port.ajax_response(response);

    assert_eq!(port.content(), &Content::Empty("Nothing here".to_owned()));
    assert_eq!(
        port.metadata("cacheid", None),
        Some(&Value::text("d0"))
    );
    Ok(())
}

#[test]
fn remove_reports_rows_and_updates_cache_id() -> Result<()> {
    let mut port = loaded(50)?;
    let selection = port.create_selection(SelectionSpec::RowNum(vec![1, 2]), None);
    port.remove(
        selection,
        RemoveOptions {
            cacheid: Some("after-delete".to_owned()),
            ..RemoveOptions::default()
        },
    );

    assert!(port.hooks().events.contains(&HookEvent::RemoveRows(
        inbox(),
        vec![synthetic_uid(1), synthetic_uid(2)]
    )));
    let buffer = port.buffer(&inbox()).expect("inbox cached");
    assert_eq!(buffer.cache_id(), Some("after-delete"));
    assert_eq!(buffer.total_rows(), 48);
    assert_eq!(visible_uids(&port).first(), Some(&synthetic_uid(3)));
    Ok(())
}

#[test]
fn deleted_view_drops_late_responses() -> Result<()> {
    let mut port = loaded(50)?;
    port.load_view("Archive", None, false);
    let request = port.source_mut().pop().expect("fetch issued");
    port.load_view("INBOX", None, false);
    port.delete_view(&ViewName::from("Archive"));

    port.ajax_response(slice_response(&request, 10));
    assert!(port.buffer(&ViewName::from("Archive")).is_none());
    assert_eq!(port.current_view(), Some(&inbox()));
    assert_eq!(port.in_flight_count(), 0);
    Ok(())
}

#[test]
fn typing_ahead_of_the_server_sends_every_filter_text() -> Result<()> {
    let mut port = loaded(100)?;
    port.add_filter("filterMessages");
    for needle in ["m", "me", "mes", "mess", "messa"] {
        port.run_filter(Some(needle), BTreeMap::new());
    }
    let mut requests = port.source_mut().take_all();
    let needles: Vec<_> = requests
        .iter()
        .map(|request| request.filter.clone().unwrap_or_default())
        .collect();
    assert_eq!(needles, ["m", "me", "mes", "mess", "messa"]);
    assert_eq!(port.in_flight_count(), 1);
    assert_eq!(
        port.hooks()
            .count(|event| matches!(event, HookEvent::Fail(_))),
        0
    );

    let latest = requests.pop().expect("latest filter request");
    for stale in &requests {
        port.ajax_response(slice_response(stale, 40));
    }
    let filter_view = ViewName::from(vport_core::FILTER_VIEW);
    assert_eq!(port.buffer(&filter_view).map(|buffer| buffer.len()), Some(0));

    port.ajax_response(slice_response(&latest, 4));
    assert_eq!(port.buffer(&filter_view).map(|buffer| buffer.len()), Some(4));
    assert_eq!(visible_uids(&port), expected_uids(1..=4));
    Ok(())
}

#[test]
fn restarted_filter_ignores_answer_for_the_cleared_one() -> Result<()> {
    let mut port = loaded(100)?;
    port.add_filter("filterMessages");
    port.run_filter(Some("message 1"), BTreeMap::new());
    let stale = port.source_mut().pop().expect("filter issued");

    port.stop_filter(false);
    port.source_mut().take_all();
    port.run_filter(Some("message 2"), BTreeMap::new());
    let fresh = port.source_mut().pop().expect("new filter issued");
    assert_eq!(fresh.filter.as_deref(), Some("message 2"));
    assert_ne!(fresh.request_id, stale.request_id);
    assert_eq!(port.in_flight_count(), 1);

    let filter_view = ViewName::from(vport_core::FILTER_VIEW);
    port.ajax_response(slice_response(&stale, 3));
    assert_eq!(port.buffer(&filter_view).map(|buffer| buffer.len()), Some(0));

    port.ajax_response(slice_response(&fresh, 2));
    assert_eq!(port.buffer(&filter_view).map(|buffer| buffer.len()), Some(2));
    assert_eq!(port.in_flight_count(), 0);
    Ok(())
}

#[test]
fn recreated_view_does_not_attach_to_old_request() -> Result<()> {
    let mut port = loaded(50)?;
    port.load_view("Archive", None, false);
    let old = port.source_mut().pop().expect("fetch issued");
    port.load_view("INBOX", None, false);
    port.delete_view(&ViewName::from("Archive"));
    port.source_mut().take_all();

    port.load_view("Archive", None, false);
    let new = port.source_mut().pop().expect("fresh fetch issued");
    assert_ne!(new.request_id, old.request_id);

    port.ajax_response(slice_response(&old, 30));
    let archive = ViewName::from("Archive");
    assert_eq!(port.buffer(&archive).map(|buffer| buffer.len()), Some(0));
    port.ajax_response(slice_response(&new, 10));
    assert_eq!(port.buffer(&archive).map(|buffer| buffer.len()), Some(10));
    Ok(())
}

#[test]
fn search_answer_positions_a_view_left_before_it_arrived() -> Result<()> {
    let mut port = loaded(100)?;
    port.load_view("Archive", Some("u42".to_owned()), false);
    let request = port.source_mut().pop().expect("search issued");
    port.load_view("INBOX", None, false);
    port.source_mut().take_all();

    let window = FetchRequest {
        slice: Some(SliceRange::new(18, 78)),
        ..request
    };
    let mut response = slice_response(&window, 200);
    response.search = true;
    response.rownum = Some(42);
    port.ajax_response(response);
    assert_eq!(port.current_view(), Some(&inbox()));
    assert_eq!(port.current_offset(), 0);

    assert_eq!(port.load_view("Archive", None, false), LoadOutcome::Cached);
    assert_eq!(port.current_offset(), 41);
    assert_eq!(visible_uids(&port), expected_uids(42..=61));
    Ok(())
}
