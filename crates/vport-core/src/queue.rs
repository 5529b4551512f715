// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::VecDeque;

/// Single-worker task queue standing in for a global busy flag.
///
/// Work submitted while the queue is draining waits its turn instead of
/// running re-entrantly; nothing is ever dropped.
#[derive(Debug)]
pub struct TaskQueue<T> {
    pending: VecDeque<T>,
    busy: bool,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            busy: false,
        }
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: T) {
        self.pending.push_back(task);
    }

    /// Claims the worker. False means another drain is already running and
    /// will pick up whatever was pushed.
    pub fn try_acquire(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        true
    }

    pub fn next(&mut self) -> Option<T> {
        self.pending.pop_front()
    }

    pub fn release(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::TaskQueue;

    #[test]
    fn work_pushed_while_busy_is_deferred_in_order() {
        let mut queue = TaskQueue::new();
        queue.push(1);
        assert!(queue.try_acquire());

        let mut ran = Vec::new();
        while let Some(task) = queue.next() {
            if task == 1 {
                assert!(!queue.try_acquire());
                queue.push(2);
                queue.push(3);
            }
            ran.push(task);
        }
        queue.release();

        assert_eq!(ran, vec![1, 2, 3]);
        assert!(!queue.is_busy());
        assert!(queue.is_empty());
    }
}
