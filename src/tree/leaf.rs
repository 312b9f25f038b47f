impl TreeCore {
    pub(crate) fn insert(&mut self, key: u64, value: u64) -> Result<()> {
        let leaf_id = self.find_leaf_recording(key);
        let (nk, i, exists) = {
            let leaf = self.block(leaf_id);
            let nk = leaf.num_keys();
            let i = leaf.scan_leaf_keys(key);
            (nk, i, i < nk && leaf.key(i) == key)
        };
        if exists {
            self.block_mut(leaf_id).set_value(i, value);
            return Ok(());
        }
        if nk < MAX_KEYS {
            self.insert_into_leaf(leaf_id, i, key, value);
        } else {
            let new_leaf = self.preallocate_splits()?;
            let promoted = self.split_leaf(leaf_id, new_leaf, i, key, value);
            self.insert_new_leaf(new_leaf, promoted);
        }
        self.num_records += 1;
        Ok(())
    }

    /// Write (key, value) at position `i` of a leaf with room to spare.
    fn insert_into_leaf(&mut self, leaf_id: BlockId, i: usize, key: u64, value: u64) {
        {
            let leaf = self.block_mut(leaf_id);
            let nk = leaf.num_keys();
            leaf.move_keys_within(i..nk, i + 1);
            leaf.move_fields_within(i..nk, i + 1);
            leaf.set_key(i, key);
            leaf.set_value(i, value);
            leaf.set_num_keys(nk + 1);
        }
        self.fix_cursors_leaf_insert(leaf_id, i);
    }

    /// Shift cursors sitting at or after the insertion point. A cursor
    /// invalidated exactly at the insertion point re-validates in place, so a
    /// cursor parked on a deleted key picks the record back up when the key
    /// is re-inserted before the cursor moves.
    fn fix_cursors_leaf_insert(&mut self, leaf: BlockId, i: usize) {
        for weak in &self.cursors {
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.leaf != leaf {
                    continue;
                }
                if state.invalid && state.pos == i {
                    state.invalid = false;
                } else if state.pos >= i {
                    state.pos += 1;
                }
            }
        }
    }

    /// Claim every block the pending split cascade can consume: one index
    /// block per full recorded ancestor walking bottom-up, a root block when
    /// the cascade would blow through the top, and the new leaf itself.
    ///
    /// All-or-nothing: any failure releases the partial claim and surfaces as
    /// `OutOfMemory` with the tree untouched. Returns the claimed leaf block.
    fn preallocate_splits(&mut self) -> Result<BlockId> {
        debug_assert!(self.new_root.is_nil());
        let mut full_ancestors = 0;
        for d in (0..self.depth).rev() {
            if self.path[d].num_keys < MAX_KEYS {
                break;
            }
            full_ancestors += 1;
        }
        let needs_root = self.depth == 0 || full_ancestors == self.depth;
        let total = full_ancestors + usize::from(needs_root) + 1;

        let mut claimed: SmallVec<[BlockId; PATH_INLINE]> = SmallVec::new();
        for _ in 0..total {
            match self.allocate_block("split reserve") {
                Ok(id) => claimed.push(id),
                Err(err) => {
                    for &id in &claimed {
                        self.release_block(id);
                    }
                    return Err(err);
                }
            }
        }

        let mut next = 0;
        for d in (self.depth - full_ancestors..self.depth).rev() {
            self.path[d].split = claimed[next];
            next += 1;
        }
        if needs_root {
            self.new_root = claimed[next];
            next += 1;
        }
        Ok(claimed[next])
    }

    /// Split a full leaf around insertion position `i`, writing (key, value)
    /// into whichever half it belongs to. Both halves end up holding exactly
    /// half the combined records. Returns the promoted separator: the first
    /// key of the new right leaf.
    fn split_leaf(
        &mut self,
        leaf_id: BlockId,
        new_id: BlockId,
        i: usize,
        key: u64,
        value: u64,
    ) -> u64 {
        let promoted;
        {
            let (leaf, new) = self.block_pair_mut(leaf_id, new_id);
            new.set_next_leaf(leaf.next_leaf());
            leaf.set_next_leaf(Some(new_id));
            leaf.set_num_keys(HALF);
            new.set_num_keys(HALF);
            if i < HALF {
                new.copy_keys_from(leaf, HALF - 1..MAX_KEYS, 0);
                new.copy_fields_from(leaf, HALF - 1..MAX_KEYS, 0);
                leaf.move_keys_within(i..HALF - 1, i + 1);
                leaf.move_fields_within(i..HALF - 1, i + 1);
                leaf.set_key(i, key);
                leaf.set_value(i, value);
            } else {
                new.copy_keys_from(leaf, HALF..i, 0);
                new.copy_fields_from(leaf, HALF..i, 0);
                new.set_key(i - HALF, key);
                new.set_value(i - HALF, value);
                new.copy_keys_from(leaf, i..MAX_KEYS, i + 1 - HALF);
                new.copy_fields_from(leaf, i..MAX_KEYS, i + 1 - HALF);
            }
            promoted = new.key(0);
        }
        self.fix_cursors_leaf_split(leaf_id, new_id, i);
        self.stats.leaf_splits += 1;
        tracing::trace!(
            target: "pagetree::split",
            left = leaf_id.raw(),
            right = new_id.raw(),
            promoted,
            "split leaf block"
        );
        promoted
    }

    /// Re-home cursors after a leaf split: account for the insertion, then
    /// move any cursor that now addresses the upper half onto the new leaf.
    fn fix_cursors_leaf_split(&mut self, leaf: BlockId, new: BlockId, i: usize) {
        for weak in &self.cursors {
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.leaf != leaf {
                    continue;
                }
                if state.invalid && state.pos == i {
                    state.invalid = false;
                } else if state.pos >= i {
                    state.pos += 1;
                }
                if state.pos >= HALF {
                    state.leaf = new;
                    state.pos -= HALF;
                }
            }
        }
    }
}
