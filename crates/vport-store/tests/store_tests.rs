// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeMap;
use time::Duration;
use time::macros::datetime;
use vport_core::{
    FLAGS_KEY, FetchRequest, RANGE_SLICE_PARAM, RequestId, SliceRange, Uid, Value, ViewName,
};
use vport_store::{
    DEFAULT_MAILBOXES, FILTER_ACTION, LIST_ACTION, NewMessage, Store, validate_db_path,
};
use vport_testkit::temp_db_path;

fn store() -> Result<Store> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    Ok(store)
}

/// `count` messages in `mailbox`; message `n` (1-based) is `n` minutes newer
/// than message `n - 1`, so the listing shows the last insert first.
fn fill(store: &Store, mailbox: &str, count: usize) -> Result<Vec<Uid>> {
    let base = datetime!(2026-02-19 08:00 UTC);
    let messages: Vec<NewMessage> = (1..=count)
        .map(|n| NewMessage {
            sender: format!("Sender {n} <s{n}@example.com>"),
            subject: format!("Status report {n}"),
            received_at: base + Duration::minutes(n as i64),
            size: 1_024,
            flags: if n % 2 == 0 {
                vec!["unseen".to_owned()]
            } else {
                Vec::new()
            },
        })
        .collect();
    store.insert_messages(mailbox, &messages)
}

fn list(view: &str, slice: SliceRange) -> FetchRequest {
    FetchRequest {
        action: LIST_ACTION.to_owned(),
        view: ViewName::from(view),
        request_id: Some(RequestId::new(1)),
        slice: Some(slice),
        ..FetchRequest::default()
    }
}

fn subject_of(response: &vport_core::FetchResponse, uid: &Uid) -> Option<String> {
    response
        .data
        .get(uid)
        .and_then(|record| record.get("subject"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path(":memory:").is_ok());
    assert!(validate_db_path("/tmp/vport.db").is_ok());
}

#[test]
fn bootstrap_creates_schema_and_default_mailboxes() -> Result<()> {
    let store = store()?;
    let mailboxes = store.list_mailboxes()?;
    let names: Vec<&str> = mailboxes.iter().map(|mailbox| mailbox.name.as_str()).collect();
    assert_eq!(names, DEFAULT_MAILBOXES);
    assert!(mailboxes.iter().all(|mailbox| mailbox.total == 0));

    store.bootstrap()?;
    assert_eq!(store.list_mailboxes()?.len(), DEFAULT_MAILBOXES.len());
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = store()?;
    store.raw_connection().execute_batch(
        "
        ALTER TABLE messages RENAME TO messages_old;
        CREATE TABLE messages (
          id INTEGER PRIMARY KEY,
          mailbox_id INTEGER NOT NULL,
          sender TEXT NOT NULL,
          subject TEXT NOT NULL,
          received_at TEXT NOT NULL,
          size INTEGER NOT NULL,
          deleted_at TEXT
        );
        ",
    )?;

    let error = store.bootstrap().expect_err("schema without flags column");
    assert!(error.to_string().contains("flags"));
    Ok(())
}

#[test]
fn messages_survive_reopen() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        fill(&store, "Sent", 3)?;
    }
    let store = Store::open(&path)?;
    store.bootstrap()?;
    let sent = store
        .list_mailboxes()?
        .into_iter()
        .find(|mailbox| mailbox.name == "Sent")
        .expect("sent mailbox");
    assert_eq!(sent.total, 3);
    assert_eq!(sent.unseen, 1);
    Ok(())
}

#[test]
fn slices_list_newest_first() -> Result<()> {
    let store = store()?;
    let uids = fill(&store, "INBOX", 30)?;

    let response = store.answer(&list("INBOX", SliceRange::new(1, 10)))?;
    assert_eq!(response.request_id, Some(RequestId::new(1)));
    assert_eq!(response.id, Some(ViewName::from("INBOX")));
    assert_eq!(response.totalrows, Some(30));
    assert_eq!(response.label.as_deref(), Some("INBOX"));
    assert_eq!(response.data.len(), 10);
    assert!(!response.reset);

    let newest = &uids[29];
    assert_eq!(response.rowlist.get(newest), Some(&1));
    assert_eq!(
        subject_of(&response, newest).as_deref(),
        Some("Status report 30")
    );
    assert_eq!(response.rowlist.get(&uids[20]), Some(&10));
    assert_eq!(
        response
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get("sortby")),
        Some(&Value::text("date"))
    );
    Ok(())
}

#[test]
fn slices_are_clipped_to_the_listing() -> Result<()> {
    let store = store()?;
    fill(&store, "INBOX", 12)?;

    let response = store.answer(&list("INBOX", SliceRange::new(8, 40)))?;
    assert_eq!(response.data.len(), 5);
    assert_eq!(response.rowlist.values().max(), Some(&12));

    let past_end = store.answer(&list("INBOX", SliceRange::new(20, 40)))?;
    assert!(past_end.data.is_empty());
    assert_eq!(past_end.totalrows, Some(12));
    Ok(())
}

#[test]
fn cached_rows_are_positioned_but_not_resent() -> Result<()> {
    let store = store()?;
    let uids = fill(&store, "INBOX", 10)?;
    let first = store.answer(&list("INBOX", SliceRange::new(1, 10)))?;

    let request = FetchRequest {
        cached: vec![uids[9].clone(), uids[8].clone()],
        cacheid: first.cacheid.clone(),
        ..list("INBOX", SliceRange::new(1, 5))
    };
    let response = store.answer(&request)?;
    assert_eq!(response.rowlist.len(), 5);
    assert_eq!(response.data.len(), 3);
    assert!(!response.data.contains_key(&uids[9]));

    let purged = store.answer(&FetchRequest {
        purge: true,
        ..request
    })?;
    assert!(purged.reset);
    assert_eq!(purged.data.len(), 5);
    Ok(())
}

#[test]
fn changed_mailbox_resets_the_client_cache() -> Result<()> {
    let store = store()?;
    let uids = fill(&store, "INBOX", 10)?;
    let first = store.answer(&list("INBOX", SliceRange::new(1, 10)))?;
    let known = first.cacheid.clone();

    let check = FetchRequest {
        request_id: None,
        checkcache: true,
        cacheid: known.clone(),
        rownum: Some(1),
        ..list("INBOX", SliceRange::new(1, 10))
    };
    let current = store.answer(&check)?;
    assert!(!current.reset);
    assert!(current.data.is_empty());
    assert_eq!(current.request_id, None);
    assert_eq!(current.cacheid, known);

    let new_cacheid = store.delete_messages("INBOX", &uids[..2])?;
    assert_ne!(Some(new_cacheid.clone()), known);

    let stale = store.answer(&check)?;
    assert!(stale.reset);
    assert_eq!(stale.cacheid.as_deref(), Some(new_cacheid.as_str()));
    assert_eq!(stale.totalrows, Some(8));
    assert_eq!(stale.data.len(), 8);
    Ok(())
}

#[test]
fn filter_matches_subject_or_sender_ignoring_case() -> Result<()> {
    let store = store()?;
    fill(&store, "INBOX", 12)?;
    let plain = store.answer(&list("INBOX", SliceRange::new(1, 20)))?;

    let request = FetchRequest {
        action: FILTER_ACTION.to_owned(),
        filter: Some("REPORT 1".to_owned()),
        ..list("INBOX", SliceRange::new(1, 20))
    };
    let response = store.answer(&request)?;
    // 1, 10, 11, 12
    assert_eq!(response.totalrows, Some(4));
    assert_ne!(response.cacheid, plain.cacheid);
    let subjects: Vec<String> = response
        .data
        .keys()
        .filter_map(|uid| subject_of(&response, uid))
        .collect();
    assert!(subjects.iter().all(|subject| subject.starts_with("Status report 1")));

    let by_sender = store.answer(&FetchRequest {
        filter: Some("s7@example".to_owned()),
        ..request.clone()
    })?;
    assert_eq!(by_sender.totalrows, Some(1));

    let blank = store.answer(&FetchRequest {
        filter: Some("   ".to_owned()),
        ..request
    })?;
    assert_eq!(blank.totalrows, Some(12));
    assert_eq!(blank.cacheid, plain.cacheid);
    Ok(())
}

#[test]
fn search_returns_a_window_around_the_match() -> Result<()> {
    let store = store()?;
    let uids = fill(&store, "Archive", 100)?;
    // Listed newest first, so the 60th insert sits at position 41.
    let target = &uids[59];

    let request = FetchRequest {
        slice: None,
        search: Some(target.as_str().to_owned()),
        search_before: Some(10),
        search_after: Some(15),
        ..list("Archive", SliceRange::new(1, 1))
    };
    let response = store.answer(&request)?;
    assert!(response.search);
    assert_eq!(response.rownum, Some(41));
    assert_eq!(response.rowlist.get(target), Some(&41));
    assert_eq!(response.rowlist.values().min(), Some(&31));
    assert_eq!(response.rowlist.values().max(), Some(&56));

    let missing = store.answer(&FetchRequest {
        search: Some("999999".to_owned()),
        ..request
    })?;
    assert!(!missing.search);
    assert!(missing.data.is_empty());
    Ok(())
}

#[test]
fn range_slices_return_flags_only() -> Result<()> {
    let store = store()?;
    fill(&store, "INBOX", 20)?;
    let request = FetchRequest {
        params: BTreeMap::from([(RANGE_SLICE_PARAM.to_owned(), "1".to_owned())]),
        ..list("INBOX", SliceRange::new(5, 9))
    };
    let response = store.answer(&request)?;
    assert!(response.partial);
    assert_eq!(response.rowlist.len(), 5);
    assert!(
        response
            .data
            .values()
            .all(|record| record.len() == 1 && record.contains_key(FLAGS_KEY))
    );
    Ok(())
}

#[test]
fn flags_update_without_invalidating_the_cache() -> Result<()> {
    let store = store()?;
    let uids = fill(&store, "INBOX", 3)?;
    let before = store.answer(&list("INBOX", SliceRange::new(1, 3)))?;

    store.set_flag(&uids[0], "flagged", true)?;
    store.set_flag(&uids[0], "flagged", true)?;
    store.set_flag(&uids[1], "unseen", false)?;

    let record = store.message(&uids[0])?;
    assert_eq!(
        record.get(FLAGS_KEY),
        Some(&Value::List(vec![Value::text("flagged")]))
    );
    let inbox = store
        .list_mailboxes()?
        .into_iter()
        .find(|mailbox| mailbox.name == "INBOX")
        .expect("inbox");
    assert_eq!(inbox.unseen, 0);

    let after = store.answer(&list("INBOX", SliceRange::new(1, 3)))?;
    assert_eq!(after.cacheid, before.cacheid);
    assert!(store.set_flag(&uids[0], "two words", true).is_err());
    Ok(())
}

#[test]
fn unknown_mailbox_and_action_are_rejected() -> Result<()> {
    let store = store()?;
    let error = store
        .answer(&list("Nowhere", SliceRange::new(1, 10)))
        .expect_err("unknown mailbox");
    assert!(error.to_string().contains("Nowhere"));

    let error = store
        .answer(&FetchRequest {
            action: "purgeDeleted".to_owned(),
            ..list("INBOX", SliceRange::new(1, 10))
        })
        .expect_err("unknown action");
    assert!(error.to_string().contains("purgeDeleted"));

    store.create_mailbox("Receipts")?;
    assert!(store.create_mailbox("Receipts").is_err());
    assert!(store.answer(&list("Receipts", SliceRange::new(1, 10)))?.data.is_empty());
    Ok(())
}

#[test]
fn demo_data_fills_mailboxes_once() -> Result<()> {
    let store = store()?;
    store.seed_demo_data()?;
    let first = store.list_mailboxes()?;
    let inbox = first
        .iter()
        .find(|mailbox| mailbox.name == "INBOX")
        .expect("inbox");
    assert!(inbox.total > 1_000);
    assert!(inbox.unseen > 0);

    store.seed_demo_data()?;
    assert_eq!(store.list_mailboxes()?, first);
    Ok(())
}
