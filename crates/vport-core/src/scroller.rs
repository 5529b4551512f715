// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

/// Rows moved per wheel notch, capped by the page size.
const WHEEL_STEP: usize = 3;

/// Scrollbar handle geometry in track units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollHandle {
    pub track: usize,
    pub length: usize,
    pub top: usize,
}

/// Maps a continuous scroll position onto a buffer offset.
///
/// Nothing materializes until the first `update_size` or `move_scroll`; until
/// then the offset is pinned at 0.
#[derive(Debug, Clone, Default)]
pub struct Scroller {
    bar: Option<ScrollBar>,
    noupdate: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct ScrollBar {
    position: usize,
    page_size: usize,
    total_rows: usize,
}

impl ScrollBar {
    fn max_position(self) -> usize {
        self.total_rows.saturating_sub(self.page_size)
    }
}

impl Scroller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_materialized(&self) -> bool {
        self.bar.is_some()
    }

    pub fn current_offset(&self) -> usize {
        self.bar.map_or(0, |bar| bar.position)
    }

    pub(crate) fn set_noupdate(&mut self, noupdate: bool) {
        self.noupdate = noupdate;
    }

    /// Clamps and applies a new position. Returns true when the move should
    /// trigger a content refresh.
    pub fn move_scroll(&mut self, position: usize) -> bool {
        let bar = self.bar.get_or_insert_with(ScrollBar::default);
        let clamped = position.min(bar.max_position());
        let changed = clamped != bar.position;
        bar.position = clamped;
        changed && !self.noupdate
    }

    /// Target position for one wheel notch.
    pub fn wheel_target(&self, page_size: usize, up: bool) -> usize {
        let step = page_size.min(WHEEL_STEP);
        let offset = self.current_offset();
        if up {
            offset.saturating_sub(step)
        } else {
            offset + step
        }
    }

    /// Recomputes handle proportions. Returns false when this call created
    /// the scrollbar.
    pub fn update_size(&mut self, page_size: usize, total_rows: usize) -> bool {
        let created = self.bar.is_none();
        let bar = self.bar.get_or_insert_with(ScrollBar::default);
        bar.page_size = page_size;
        bar.total_rows = total_rows;
        bar.position = bar.position.min(bar.max_position());
        !created
    }

    pub fn clear(&mut self) {
        if let Some(bar) = self.bar.as_mut() {
            bar.page_size = 0;
            bar.total_rows = 0;
            bar.position = 0;
        }
    }

    pub fn handle(&self, track: usize) -> Option<ScrollHandle> {
        let bar = self.bar?;
        if bar.total_rows == 0 || bar.total_rows <= bar.page_size {
            return Some(ScrollHandle {
                track,
                length: track,
                top: 0,
            });
        }
        let length = (track * bar.page_size / bar.total_rows).clamp(1, track.max(1));
        let travel = track.saturating_sub(length);
        let top = travel * bar.position / bar.max_position().max(1);
        Some(ScrollHandle { track, length, top })
    }
}

#[cfg(test)]
mod tests {
    use super::{ScrollHandle, Scroller};

    #[test]
    fn offset_is_zero_before_materializing() {
        let scroller = Scroller::new();
        assert!(!scroller.is_materialized());
        assert_eq!(scroller.current_offset(), 0);
        assert_eq!(scroller.handle(10), None);
    }

    #[test]
    fn move_scroll_clamps_to_last_page() {
        let mut scroller = Scroller::new();
        scroller.update_size(10, 95);
        assert!(scroller.move_scroll(500));
        assert_eq!(scroller.current_offset(), 85);
        assert!(!scroller.move_scroll(85));
    }

    #[test]
    fn noupdate_suppresses_refresh() {
        let mut scroller = Scroller::new();
        scroller.update_size(10, 100);
        scroller.set_noupdate(true);
        assert!(!scroller.move_scroll(20));
        assert_eq!(scroller.current_offset(), 20);
        scroller.set_noupdate(false);
        assert!(scroller.move_scroll(30));
    }

    #[test]
    fn wheel_steps_by_at_most_three_rows() {
        let mut scroller = Scroller::new();
        scroller.update_size(2, 100);
        scroller.move_scroll(10);
        assert_eq!(scroller.wheel_target(2, true), 8);
        assert_eq!(scroller.wheel_target(20, false), 13);
    }

    #[test]
    fn handle_tracks_position() {
        let mut scroller = Scroller::new();
        assert!(!scroller.update_size(10, 100));
        assert!(scroller.update_size(10, 100));
        scroller.move_scroll(90);
        assert_eq!(
            scroller.handle(20),
            Some(ScrollHandle {
                track: 20,
                length: 2,
                top: 18,
            })
        );

        scroller.clear();
        assert_eq!(scroller.current_offset(), 0);
        assert_eq!(scroller.handle(20).map(|handle| handle.length), Some(20));
    }
}
