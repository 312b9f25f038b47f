use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::block::BlockId;
use crate::tree::TreeCore;

/// Mutable cursor position, shared between the handle and the owning tree's
/// live-cursor list so structural mutations can patch it in place.
pub(crate) struct CursorState {
    /// Leaf holding the current record; nil once the chain is exhausted.
    pub(crate) leaf: BlockId,
    /// Record position within the leaf.
    pub(crate) pos: usize,
    /// Set when the record under the cursor was deleted. The cursor still
    /// advances correctly on the next step.
    pub(crate) invalid: bool,
}

/// Forward cursor over one tree's records.
///
/// Cursors stay coherent across every structural mutation of the tree they
/// observe: inserts, splits, rotations and merges all patch live cursor
/// positions before the mutating call returns. Deleting the record under a
/// cursor invalidates it without losing its place; [`Cursor::advance`] then
/// resumes at whatever record took the deleted one's slot.
///
/// A cursor must not outlive its records' usefulness, but it may outlive the
/// tree: once the tree is dropped every operation on the cursor reports
/// absence instead of panicking.
pub struct Cursor {
    core: Weak<RefCell<TreeCore>>,
    state: Rc<RefCell<CursorState>>,
}

impl Cursor {
    pub(crate) fn new(core: &Rc<RefCell<TreeCore>>, leaf: BlockId, pos: usize) -> Cursor {
        let state = Rc::new(RefCell::new(CursorState {
            leaf,
            pos,
            invalid: false,
        }));
        core.borrow_mut().register_cursor(Rc::downgrade(&state));
        Cursor {
            core: Rc::downgrade(core),
            state,
        }
    }

    /// Key and value under the cursor.
    ///
    /// `None` when the cursor is invalidated, sits past the end of its leaf,
    /// has run off the leaf chain, or the tree has been dropped.
    pub fn record(&self) -> Option<(u64, u64)> {
        let core = self.core.upgrade()?;
        let core = core.borrow();
        let state = self.state.borrow();
        if state.invalid || state.leaf.is_nil() {
            return None;
        }
        let leaf = core.block(state.leaf);
        if state.pos >= leaf.num_keys() {
            return None;
        }
        Some((leaf.key(state.pos), leaf.value(state.pos)))
    }

    /// Overwrite the value under the cursor, under the same validity rule as
    /// [`Cursor::record`]. Returns whether a record was updated.
    pub fn update(&mut self, value: u64) -> bool {
        let Some(core) = self.core.upgrade() else {
            return false;
        };
        let mut core = core.borrow_mut();
        let state = self.state.borrow();
        if state.invalid || state.leaf.is_nil() {
            return false;
        }
        let leaf = core.block_mut(state.leaf);
        if state.pos >= leaf.num_keys() {
            return false;
        }
        leaf.set_value(state.pos, value);
        true
    }

    /// Step to the next record, following the leaf chain.
    ///
    /// An invalidated cursor first re-validates in place, so it lands on
    /// whatever record took the deleted record's slot (or falls off the
    /// leaf). Returns false once the chain is exhausted or the tree has been
    /// dropped.
    pub fn advance(&mut self) -> bool {
        let Some(core) = self.core.upgrade() else {
            return false;
        };
        let core = core.borrow();
        let mut state = self.state.borrow_mut();
        if state.leaf.is_nil() {
            return false;
        }
        if state.invalid {
            state.invalid = false;
        } else {
            state.pos += 1;
        }
        let leaf = core.block(state.leaf);
        if state.pos >= leaf.num_keys() {
            match leaf.next_leaf() {
                Some(next) => {
                    state.leaf = next;
                    state.pos = 0;
                    true
                }
                None => {
                    state.leaf = BlockId::NIL;
                    state.pos = 0;
                    false
                }
            }
        } else {
            true
        }
    }

    /// Whether the owning tree is still alive.
    pub fn tree_alive(&self) -> bool {
        self.core.strong_count() > 0
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        // The cursor count lives on the tree; a dropped tree already forgot us.
        if let Some(core) = self.core.upgrade() {
            core.borrow_mut().unregister_cursor(&self.state);
        }
    }
}
