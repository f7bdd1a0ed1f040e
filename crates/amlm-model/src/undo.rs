//! Undo/redo composition.
//!
//! An undoable edit is a pair of closures: the operation and its reverse.
//! [`update_undo_redo`] folds such a pair into caller-owned undo and redo
//! slots so several edits collapse into one step:
//!
//! ```text
//! undo' = reverse, then undo
//! redo' = redo, then operation
//! ```
//!
//! Each closure returns `true` on success; a composed step stops at the first
//! failure. [`UndoStack`] keeps a history of named steps.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use amlm_core::logging::targets;

/// An undo or redo action. Returns `true` if it succeeded.
pub type UndoFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// An action that does nothing and succeeds.
pub fn noop() -> UndoFn {
    Arc::new(|| true)
}

/// Compose `operation` and its `reverse` into the undo and redo slots.
///
/// After the call, `undo` runs `reverse` and then the previous undo, and
/// `redo` runs the previous redo and then `operation`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use amlm_model::undo::{noop, update_undo_redo, UndoFn};
///
/// let value = Arc::new(AtomicI32::new(0));
/// let (mut undo, mut redo) = (noop(), noop());
///
/// for step in [1, 10] {
///     value.fetch_add(step, Ordering::SeqCst);
///     let (up, down) = (value.clone(), value.clone());
///     let op: UndoFn = Arc::new(move || { up.fetch_add(step, Ordering::SeqCst); true });
///     let rev: UndoFn = Arc::new(move || { down.fetch_sub(step, Ordering::SeqCst); true });
///     update_undo_redo(op, rev, &mut undo, &mut redo);
/// }
///
/// assert!(undo());
/// assert_eq!(value.load(Ordering::SeqCst), 0);
/// assert!(redo());
/// assert_eq!(value.load(Ordering::SeqCst), 11);
/// ```
pub fn update_undo_redo(operation: UndoFn, reverse: UndoFn, undo: &mut UndoFn, redo: &mut UndoFn) {
    let prev_undo = undo.clone();
    *undo = Arc::new(move || reverse() && prev_undo());
    let prev_redo = redo.clone();
    *redo = Arc::new(move || prev_redo() && operation());
}

struct Command {
    text: String,
    undo: UndoFn,
    redo: UndoFn,
}

/// A history of undoable steps.
///
/// Steps are pushed after they have been performed. [`undo`](Self::undo)
/// walks back through the history, [`redo`](Self::redo) forward again.
/// Pushing a new step discards everything that could have been redone.
pub struct UndoStack {
    commands: VecDeque<Command>,
    /// Number of commands currently applied.
    index: usize,
    limit: Option<usize>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStack {
    /// An unbounded history.
    pub fn new() -> Self {
        Self {
            commands: VecDeque::new(),
            index: 0,
            limit: None,
        }
    }

    /// A history that keeps at most `limit` steps, dropping the oldest.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Record a performed step.
    pub fn push(&mut self, text: impl Into<String>, undo: UndoFn, redo: UndoFn) {
        self.commands.truncate(self.index);
        self.commands.push_back(Command {
            text: text.into(),
            undo,
            redo,
        });
        if let Some(limit) = self.limit {
            while self.commands.len() > limit {
                self.commands.pop_front();
            }
        }
        self.index = self.commands.len();
    }

    /// Undo the latest applied step. Returns `false` if there is none or it
    /// failed; a failed step stays applied.
    pub fn undo(&mut self) -> bool {
        let Some(command) = self.index.checked_sub(1).and_then(|i| self.commands.get(i)) else {
            return false;
        };
        if !(command.undo)() {
            tracing::warn!(target: targets::UNDO, text = %command.text, "undo failed");
            return false;
        }
        tracing::debug!(target: targets::UNDO, text = %command.text, "undone");
        self.index -= 1;
        true
    }

    /// Redo the next undone step.
    pub fn redo(&mut self) -> bool {
        let Some(command) = self.commands.get(self.index) else {
            return false;
        };
        if !(command.redo)() {
            tracing::warn!(target: targets::UNDO, text = %command.text, "redo failed");
            return false;
        }
        tracing::debug!(target: targets::UNDO, text = %command.text, "redone");
        self.index += 1;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.commands.len()
    }

    /// Label of the step [`undo`](Self::undo) would revert.
    pub fn undo_text(&self) -> Option<&str> {
        let i = self.index.checked_sub(1)?;
        self.commands.get(i).map(|c| c.text.as_str())
    }

    /// Label of the step [`redo`](Self::redo) would reapply.
    pub fn redo_text(&self) -> Option<&str> {
        self.commands.get(self.index).map(|c| c.text.as_str())
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Forget the whole history.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.index = 0;
    }
}

impl fmt::Debug for UndoStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoStack")
            .field("len", &self.commands.len())
            .field("index", &self.index)
            .field("limit", &self.limit)
            .finish()
    }
}
