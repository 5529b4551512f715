// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{Record, Uid};

/// A cached row as handed to rendering: the record plus its current position
/// and element id.
#[derive(Debug, Clone, PartialEq)]
pub struct RowData {
    pub uid: Uid,
    pub rownum: Option<usize>,
    pub dom_id: String,
    pub record: Record,
}

impl RowData {
    /// The view a row belongs to when it is shown through an overlay such as
    /// a search or filter view.
    pub fn origin_view(&self) -> Option<&str> {
        self.record.get("view").and_then(|value| value.as_str())
    }
}

/// One row currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub data: RowData,
    pub classes: Vec<String>,
    pub text: String,
}

impl RenderedRow {
    pub fn dom_id(&self) -> &str {
        &self.data.dom_id
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|existing| existing == class)
    }

    pub(crate) fn set_class(&mut self, class: &str, add: bool) {
        if add {
            if !self.has_class(class) {
                self.classes.push(class.to_owned());
            }
        } else {
            self.classes.retain(|existing| existing != class);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Content {
    #[default]
    Blank,
    Rows(Vec<RenderedRow>),
    Empty(String),
    Error(String),
}

impl Content {
    pub fn rows(&self) -> &[RenderedRow] {
        match self {
            Self::Rows(rows) => rows,
            _ => &[],
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [RenderedRow] {
        match self {
            Self::Rows(rows) => rows,
            _ => &mut [],
        }
    }

    pub(crate) fn into_rows(self) -> Vec<RenderedRow> {
        match self {
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }
}
