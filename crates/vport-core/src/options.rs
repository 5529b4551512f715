// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::template::Template;
use anyhow::{Result, bail};
use std::time::Duration;

pub const DEFAULT_FETCH_ACTION: &str = "listMessages";
pub const DEFAULT_ROW_TEMPLATE: &str = "#{from}  #{subject}";
pub const DEFAULT_SELECTED_CLASS: &str = "selected";
pub const DEFAULT_FETCH_COLLISION_LIMIT: u32 = 4;
pub const DEFAULT_LOOKBEHIND_RATIO: f64 = 0.4;
pub const DEFAULT_SPLIT_PANE_RESERVE: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewPortOptions {
    pub fetch_action: String,
    pub row_template: String,
    pub empty_text: Option<String>,
    pub error_text: Option<String>,
    pub buffer_pages: f64,
    /// Percentage of the buffer size, 0..=100.
    pub limit_factor: f64,
    /// Interval for repeated `on_wait` calls while a foreground fetch is out.
    pub viewport_wait: Option<Duration>,
    pub split_pane: bool,
    /// Height kept for the preview pane when the split bar is dragged.
    pub split_pane_reserve: usize,
    pub selected_class: String,
    pub fetch_collision_limit: u32,
    pub lookbehind_ratio: f64,
}

impl Default for ViewPortOptions {
    fn default() -> Self {
        Self {
            fetch_action: DEFAULT_FETCH_ACTION.to_owned(),
            row_template: DEFAULT_ROW_TEMPLATE.to_owned(),
            empty_text: None,
            error_text: None,
            buffer_pages: 5.0,
            limit_factor: 35.0,
            viewport_wait: None,
            split_pane: false,
            split_pane_reserve: DEFAULT_SPLIT_PANE_RESERVE,
            selected_class: DEFAULT_SELECTED_CLASS.to_owned(),
            fetch_collision_limit: DEFAULT_FETCH_COLLISION_LIMIT,
            lookbehind_ratio: DEFAULT_LOOKBEHIND_RATIO,
        }
    }
}

impl ViewPortOptions {
    pub fn validate(&self) -> Result<()> {
        if self.fetch_action.trim().is_empty() {
            bail!("fetch_action must not be empty");
        }
        if !self.buffer_pages.is_finite() || self.buffer_pages < 1.0 {
            bail!(
                "buffer_pages must be at least 1, got {}",
                self.buffer_pages
            );
        }
        if !(0.0..=100.0).contains(&self.limit_factor) {
            bail!(
                "limit_factor must be between 0 and 100, got {}",
                self.limit_factor
            );
        }
        if !(0.0..=1.0).contains(&self.lookbehind_ratio) {
            bail!(
                "lookbehind_ratio must be between 0 and 1, got {}",
                self.lookbehind_ratio
            );
        }
        if self.fetch_collision_limit == 0 {
            bail!("fetch_collision_limit must be at least 1");
        }
        if self.selected_class.trim().is_empty() {
            bail!("selected_class must not be empty");
        }
        if self.viewport_wait.is_some_and(|wait| wait.is_zero()) {
            bail!("viewport_wait must be positive when set");
        }
        Template::parse(&self.row_template)?;
        Ok(())
    }
}
