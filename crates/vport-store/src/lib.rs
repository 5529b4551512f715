// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod fetch;

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use vport_core::{FLAGS_KEY, Record, Uid, Value};
use vport_testkit::MailFaker;

pub use fetch::{FILTER_ACTION, LIST_ACTION};

pub const APP_NAME: &str = "vport";

pub const DEFAULT_MAILBOXES: [&str; 5] = ["INBOX", "Archive", "Drafts", "Sent", "Trash"];

/// Message counts per mailbox for `--demo`.
const DEMO_MAILBOX_SIZES: [(&str, usize); 5] = [
    ("INBOX", 2_500),
    ("Archive", 12_000),
    ("Drafts", 7),
    ("Sent", 640),
    ("Trash", 0),
];
const DEMO_SEED: u64 = 42;

const SCHEMA: &str = "
CREATE TABLE mailboxes (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  generation INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);

CREATE TABLE messages (
  id INTEGER PRIMARY KEY,
  mailbox_id INTEGER NOT NULL REFERENCES mailboxes (id),
  sender TEXT NOT NULL,
  subject TEXT NOT NULL DEFAULT '',
  received_at TEXT NOT NULL,
  size INTEGER NOT NULL DEFAULT 0,
  flags TEXT NOT NULL DEFAULT '',
  deleted_at TEXT
);
";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("mailboxes", &["id", "name", "generation", "created_at"]),
    (
        "messages",
        &[
            "id",
            "mailbox_id",
            "sender",
            "subject",
            "received_at",
            "size",
            "flags",
            "deleted_at",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_mailboxes_name",
        create_sql: "CREATE UNIQUE INDEX IF NOT EXISTS idx_mailboxes_name ON mailboxes (name);",
    },
    RequiredIndex {
        name: "idx_messages_mailbox_received",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_messages_mailbox_received ON messages (mailbox_id, received_at DESC, id DESC);",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxSummary {
    pub name: String,
    pub total: usize,
    pub unseen: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender: String,
    pub subject: String,
    pub received_at: OffsetDateTime,
    pub size: i64,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MailboxRow {
    pub(crate) id: i64,
    pub(crate) generation: i64,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn.execute_batch(SCHEMA).context("create schema")?;
        }

        ensure_required_indexes(&self.conn)?;

        self.seed_defaults()?;
        Ok(())
    }

    pub fn seed_defaults(&self) -> Result<()> {
        let created_at = now_rfc3339()?;
        for mailbox in DEFAULT_MAILBOXES {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO mailboxes (name, created_at) VALUES (?, ?)",
                    params![mailbox, created_at],
                )
                .with_context(|| format!("insert default mailbox {mailbox}"))?;
        }
        Ok(())
    }

    /// Fills the default mailboxes with generated mail. Mailboxes that
    /// already hold messages are left alone.
    pub fn seed_demo_data(&self) -> Result<()> {
        let mut faker = MailFaker::new(DEMO_SEED);
        for (mailbox, count) in DEMO_MAILBOX_SIZES {
            let existing = self
                .list_mailboxes()?
                .into_iter()
                .find(|summary| summary.name == mailbox)
                .map_or(0, |summary| summary.total);
            if existing > 0 || count == 0 {
                continue;
            }
            let messages: Vec<NewMessage> = faker
                .mailbox(count)
                .into_iter()
                .map(|message| NewMessage {
                    sender: message.from,
                    subject: message.subject,
                    received_at: message.date,
                    size: message.size,
                    flags: message.flags,
                })
                .collect();
            self.insert_messages(mailbox, &messages)?;
            debug!(mailbox, count, "seeded demo mailbox");
        }
        Ok(())
    }

    pub fn list_mailboxes(&self) -> Result<Vec<MailboxSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  b.name,
                  COUNT(m.id),
                  COALESCE(SUM(CASE WHEN (' ' || m.flags || ' ') LIKE '% unseen %' THEN 1 ELSE 0 END), 0)
                FROM mailboxes b
                LEFT JOIN messages m
                  ON m.mailbox_id = b.id AND m.deleted_at IS NULL
                GROUP BY b.id
                ORDER BY b.id ASC
                ",
            )
            .context("prepare mailbox summary query")?;
        let rows = stmt
            .query_map([], |row| {
                let total: i64 = row.get(1)?;
                let unseen: i64 = row.get(2)?;
                Ok(MailboxSummary {
                    name: row.get(0)?,
                    total: usize::try_from(total).unwrap_or_default(),
                    unseen: usize::try_from(unseen).unwrap_or_default(),
                })
            })
            .context("query mailbox summaries")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect mailbox summaries")
    }

    pub fn create_mailbox(&self, name: &str) -> Result<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            bail!("mailbox name must not be empty");
        }
        if self.find_mailbox(trimmed)?.is_some() {
            bail!("mailbox {trimmed:?} already exists");
        }
        self.conn
            .execute(
                "INSERT INTO mailboxes (name, created_at) VALUES (?, ?)",
                params![trimmed, now_rfc3339()?],
            )
            .with_context(|| format!("create mailbox {trimmed}"))?;
        Ok(())
    }

    pub fn insert_message(&self, mailbox: &str, message: &NewMessage) -> Result<Uid> {
        let mut uids = self.insert_messages(mailbox, std::slice::from_ref(message))?;
        uids.pop()
            .ok_or_else(|| anyhow!("insert into {mailbox} returned no id"))
    }

    /// Inserts in one transaction and invalidates the mailbox cache id once.
    pub fn insert_messages(&self, mailbox: &str, messages: &[NewMessage]) -> Result<Vec<Uid>> {
        let target = self.require_mailbox(mailbox)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .with_context(|| format!("begin insert into {mailbox}"))?;
        let mut uids = Vec::with_capacity(messages.len());
        {
            let mut stmt = tx
                .prepare(
                    "
                    INSERT INTO messages (mailbox_id, sender, subject, received_at, size, flags)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ",
                )
                .context("prepare message insert")?;
            for message in messages {
                validate_flags(&message.flags)?;
                stmt.execute(params![
                    target.id,
                    message.sender,
                    message.subject,
                    format_timestamp(message.received_at)?,
                    message.size,
                    message.flags.join(" "),
                ])
                .with_context(|| format!("insert message into {mailbox}"))?;
                uids.push(Uid::new(tx.last_insert_rowid().to_string()));
            }
        }
        bump_generation(&tx, target.id)?;
        tx.commit()
            .with_context(|| format!("commit insert into {mailbox}"))?;
        Ok(uids)
    }

    /// Adds or removes one flag. Flag edits leave the cache id alone; clients
    /// mirror them locally.
    pub fn set_flag(&self, uid: &Uid, flag: &str, on: bool) -> Result<()> {
        validate_flags(&[flag.to_owned()])?;
        let id = parse_uid(uid)?;
        let current: String = self
            .conn
            .query_row(
                "SELECT flags FROM messages WHERE id = ? AND deleted_at IS NULL",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("load flags for message {uid}"))?
            .ok_or_else(|| anyhow!("message {uid} not found"))?;

        let mut flags: Vec<&str> = current.split_whitespace().collect();
        let present = flags.contains(&flag);
        if present == on {
            return Ok(());
        }
        if on {
            flags.push(flag);
        } else {
            flags.retain(|existing| *existing != flag);
        }
        self.conn
            .execute(
                "UPDATE messages SET flags = ? WHERE id = ?",
                params![flags.join(" "), id],
            )
            .with_context(|| format!("update flags for message {uid}"))?;
        Ok(())
    }

    /// Soft-deletes messages from `mailbox` and returns the mailbox's new
    /// cache id.
    pub fn delete_messages(&self, mailbox: &str, uids: &[Uid]) -> Result<String> {
        let target = self.require_mailbox(mailbox)?;
        let deleted_at = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .with_context(|| format!("begin delete from {mailbox}"))?;
        let mut removed = 0;
        for uid in uids {
            let id = parse_uid(uid)?;
            removed += tx
                .execute(
                    "
                    UPDATE messages
                    SET deleted_at = ?
                    WHERE id = ? AND mailbox_id = ? AND deleted_at IS NULL
                    ",
                    params![deleted_at, id, target.id],
                )
                .with_context(|| format!("delete message {uid}"))?;
        }
        let generation = bump_generation(&tx, target.id)?;
        tx.commit()
            .with_context(|| format!("commit delete from {mailbox}"))?;
        debug!(mailbox, removed, "messages deleted");
        Ok(cache_id(mailbox, generation, None))
    }

    pub fn message(&self, uid: &Uid) -> Result<Record> {
        let id = parse_uid(uid)?;
        self.conn
            .query_row(
                "
                SELECT sender, subject, received_at, size, flags
                FROM messages
                WHERE id = ? AND deleted_at IS NULL
                ",
                params![id],
                |row| message_record(row, 0),
            )
            .optional()
            .with_context(|| format!("load message {uid}"))?
            .ok_or_else(|| anyhow!("message {uid} not found"))
    }

    pub(crate) fn find_mailbox(&self, name: &str) -> Result<Option<MailboxRow>> {
        self.conn
            .query_row(
                "SELECT id, generation FROM mailboxes WHERE name = ?",
                params![name],
                |row| {
                    Ok(MailboxRow {
                        id: row.get(0)?,
                        generation: row.get(1)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("look up mailbox {name}"))
    }

    pub(crate) fn require_mailbox(&self, name: &str) -> Result<MailboxRow> {
        self.find_mailbox(name)?
            .ok_or_else(|| anyhow!("unknown mailbox {name:?}"))
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("VPORT_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set VPORT_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("vport.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

/// Cache id for a mailbox listing: changes whenever the mailbox generation or
/// the filter needle changes.
pub fn cache_id(mailbox: &str, generation: i64, filter: Option<&str>) -> String {
    let key = match filter {
        Some(needle) => format!("{mailbox}:{generation}:{needle}"),
        None => format!("{mailbox}:{generation}"),
    };
    let mut digest = checksum_sha256(key.as_bytes());
    digest.truncate(16);
    digest
}

/// Row record from `sender, subject, received_at, size, flags` starting at
/// column `first`.
pub(crate) fn message_record(row: &rusqlite::Row<'_>, first: usize) -> rusqlite::Result<Record> {
    let sender: String = row.get(first)?;
    let subject: String = row.get(first + 1)?;
    let received_at: String = row.get(first + 2)?;
    let size: i64 = row.get(first + 3)?;
    let flags: String = row.get(first + 4)?;
    Ok(Record::from([
        ("from".to_owned(), Value::Text(sender)),
        ("subject".to_owned(), Value::Text(subject)),
        ("date".to_owned(), Value::Text(received_at)),
        ("size".to_owned(), Value::Number(size as f64)),
        (FLAGS_KEY.to_owned(), flag_list(&flags)),
    ]))
}

pub(crate) fn flag_list(flags: &str) -> Value {
    Value::List(
        flags
            .split_whitespace()
            .map(Value::text)
            .collect(),
    )
}

pub(crate) fn parse_uid(uid: &Uid) -> Result<i64> {
    uid.as_str()
        .parse()
        .with_context(|| format!("message id {uid} is not numeric"))
}

fn validate_flags(flags: &[String]) -> Result<()> {
    for flag in flags {
        if flag.is_empty() || flag.chars().any(char::is_whitespace) {
            bail!("flag {flag:?} must be a single non-empty word");
        }
    }
    Ok(())
}

fn bump_generation(conn: &Connection, mailbox_id: i64) -> Result<i64> {
    conn.query_row(
        "UPDATE mailboxes SET generation = generation + 1 WHERE id = ? RETURNING generation",
        params![mailbox_id],
        |row| row.get(0),
    )
    .with_context(|| format!("bump generation of mailbox {mailbox_id}"))
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        let columns = table_columns(conn, table)?;
        if columns.is_empty() {
            bail!(
                "database is missing required table `{table}`; point VPORT_DB_PATH at a vport database"
            );
        }

        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();
        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}",
                missing.join(", ")
            );
        }
    }
    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    format_timestamp(OffsetDateTime::now_utc())
}

/// UTC RFC 3339, so text order matches time order.
fn format_timestamp(value: OffsetDateTime) -> Result<String> {
    value
        .to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .context("format timestamp")
}

fn checksum_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut output = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::{cache_id, format_timestamp, validate_flags};
    use time::macros::datetime;

    #[test]
    fn cache_id_depends_on_generation_and_filter() {
        let base = cache_id("INBOX", 1, None);
        assert_eq!(base.len(), 16);
        assert_eq!(base, cache_id("INBOX", 1, None));
        assert_ne!(base, cache_id("INBOX", 2, None));
        assert_ne!(base, cache_id("INBOX", 1, Some("report")));
        assert_ne!(base, cache_id("Sent", 1, None));
    }

    #[test]
    fn timestamps_are_normalized_to_utc() -> anyhow::Result<()> {
        let local = datetime!(2026-03-01 09:00 +02:00);
        assert_eq!(format_timestamp(local)?, "2026-03-01T07:00:00Z");
        Ok(())
    }

    #[test]
    fn flags_must_be_single_words() {
        assert!(validate_flags(&["unseen".to_owned()]).is_ok());
        assert!(validate_flags(&["two words".to_owned()]).is_err());
        assert!(validate_flags(&[String::new()]).is_err());
    }
}
