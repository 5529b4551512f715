// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use vport_core::{FetchRequest, FetchResponse, Uid, ViewName};
use vport_store::Store;
use vport_tui::MailboxEntry;

pub struct StoreRuntime<'a> {
    store: &'a Store,
}

impl<'a> StoreRuntime<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }
}

impl vport_tui::MailRuntime for StoreRuntime<'_> {
    fn list_mailboxes(&mut self) -> Result<Vec<MailboxEntry>> {
        Ok(self
            .store
            .list_mailboxes()?
            .into_iter()
            .map(|summary| MailboxEntry {
                name: summary.name,
                total: summary.total,
                unseen: summary.unseen,
            })
            .collect())
    }

    fn answer(&mut self, request: &FetchRequest) -> Result<FetchResponse> {
        self.store.answer(request)
    }

    fn set_flag(&mut self, uid: &Uid, flag: &str, on: bool) -> Result<()> {
        self.store.set_flag(uid, flag, on)
    }

    fn delete_messages(&mut self, mailbox: &ViewName, uids: &[Uid]) -> Result<String> {
        self.store.delete_messages(mailbox.as_str(), uids)
    }
}
