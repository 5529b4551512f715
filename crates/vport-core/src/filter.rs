// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::ViewName;

/// Name of the synthetic view a live filter renders into.
pub const FILTER_VIEW: &str = "%%filter%%";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum FilterState {
    #[default]
    Inactive,
    Active {
        needle: String,
        overlaid: ViewName,
    },
}

/// What the controller must do after a filter request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStep {
    Noop,
    Clear,
    /// Already filtering; ask the server to re-filter from the top.
    Refetch,
    /// First activation: prune rendered rows, then switch to the filter view.
    Activate { needle: String, overlaid: ViewName },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    action: String,
    state: FilterState,
}

impl Filter {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            state: FilterState::Inactive,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn view() -> ViewName {
        ViewName::from(FILTER_VIEW)
    }

    /// The view the filter overlays, when active.
    pub fn is_filtering(&self) -> Option<&ViewName> {
        match &self.state {
            FilterState::Active { overlaid, .. } => Some(overlaid),
            FilterState::Inactive => None,
        }
    }

    pub fn needle(&self) -> Option<&str> {
        match &self.state {
            FilterState::Active { needle, .. } => Some(needle),
            FilterState::Inactive => None,
        }
    }

    /// `text = None` re-runs the current needle.
    pub fn apply(&mut self, text: Option<&str>, current_view: Option<&ViewName>) -> FilterStep {
        let needle = match text {
            None => self.needle().map(str::to_owned),
            Some(text) => {
                let lowered = text.to_lowercase();
                if self.needle() == Some(lowered.as_str()) {
                    return FilterStep::Noop;
                }
                Some(lowered)
            }
        };

        let Some(needle) = needle.filter(|needle| !needle.is_empty()) else {
            return if self.is_filtering().is_some() {
                FilterStep::Clear
            } else {
                FilterStep::Noop
            };
        };

        match &mut self.state {
            FilterState::Active { needle: current, .. } => {
                *current = needle;
                FilterStep::Refetch
            }
            FilterState::Inactive => {
                let Some(overlaid) = current_view.cloned() else {
                    return FilterStep::Noop;
                };
                self.state = FilterState::Active {
                    needle: needle.clone(),
                    overlaid: overlaid.clone(),
                };
                FilterStep::Activate { needle, overlaid }
            }
        }
    }

    /// Deactivates, returning the view to restore.
    pub fn clear(&mut self) -> Option<ViewName> {
        match std::mem::take(&mut self.state) {
            FilterState::Active { overlaid, .. } => Some(overlaid),
            FilterState::Inactive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, FilterStep};
    use crate::ViewName;

    #[test]
    fn first_activation_remembers_overlaid_view() {
        let mut filter = Filter::new("filterList");
        let inbox = ViewName::from("INBOX");

        let step = filter.apply(Some("Invoice"), Some(&inbox));
        assert_eq!(
            step,
            FilterStep::Activate {
                needle: "invoice".to_owned(),
                overlaid: inbox.clone(),
            }
        );
        assert_eq!(filter.is_filtering(), Some(&inbox));
    }

    #[test]
    fn same_text_is_noop_regardless_of_case() {
        let mut filter = Filter::new("filterList");
        let inbox = ViewName::from("INBOX");
        filter.apply(Some("invoice"), Some(&inbox));
        assert_eq!(filter.apply(Some("INVOICE"), Some(&inbox)), FilterStep::Noop);
    }

    #[test]
    fn new_text_while_active_refetches() {
        let mut filter = Filter::new("filterList");
        let inbox = ViewName::from("INBOX");
        filter.apply(Some("invoice"), Some(&inbox));
        assert_eq!(filter.apply(Some("receipt"), Some(&inbox)), FilterStep::Refetch);
        assert_eq!(filter.needle(), Some("receipt"));
        assert_eq!(filter.apply(None, Some(&inbox)), FilterStep::Refetch);
    }

    #[test]
    fn empty_text_clears_only_when_active() {
        let mut filter = Filter::new("filterList");
        let inbox = ViewName::from("INBOX");
        assert_eq!(filter.apply(Some(""), Some(&inbox)), FilterStep::Noop);

        filter.apply(Some("x"), Some(&inbox));
        assert_eq!(filter.apply(Some(""), Some(&inbox)), FilterStep::Clear);
        assert_eq!(filter.clear(), Some(inbox));
        assert_eq!(filter.is_filtering(), None);
        assert_eq!(filter.clear(), None);
    }
}
