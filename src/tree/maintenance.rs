impl TreeCore {
    pub(crate) fn remove(&mut self, key: u64) -> bool {
        let leaf_id = self.find_leaf_recording(key);
        let (nk, i, found) = {
            let leaf = self.block(leaf_id);
            let nk = leaf.num_keys();
            let i = leaf.scan_leaf_keys(key);
            (nk, i, i < nk && leaf.key(i) == key)
        };
        if !found {
            return false;
        }
        {
            let leaf = self.block_mut(leaf_id);
            leaf.move_keys_within(i + 1..nk, i);
            leaf.move_fields_within(i + 1..nk, i);
            leaf.set_num_keys(nk - 1);
        }
        self.num_records -= 1;
        self.fix_cursors_leaf_remove(leaf_id, i);
        if self.depth > 0 && nk <= HALF {
            self.leaf_underflow(leaf_id);
        }
        true
    }

    /// A cursor on the deleted slot is invalidated but keeps its place; later
    /// positions slide down with the records.
    fn fix_cursors_leaf_remove(&mut self, leaf: BlockId, i: usize) {
        for weak in &self.cursors {
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.leaf != leaf {
                    continue;
                }
                if state.pos == i {
                    state.invalid = true;
                } else if state.pos > i {
                    state.pos -= 1;
                }
            }
        }
    }

    /// Restore minimum occupancy of a leaf that dropped below half capacity:
    /// borrow from a sibling when one can spare a record, otherwise merge.
    fn leaf_underflow(&mut self, leaf_id: BlockId) {
        let d = self.depth - 1;
        let entry = self.path[d];
        let mut rpeer = BlockId::NIL;
        if entry.pos < entry.num_keys {
            rpeer = self.block(entry.node).child(entry.pos + 1);
            if self.block(rpeer).num_keys() > HALF {
                self.rotate_leaf_from_right(leaf_id, rpeer, entry.node, entry.pos);
                return;
            }
        }
        if entry.pos > 0 {
            let lpeer = self.block(entry.node).child(entry.pos - 1);
            if self.block(lpeer).num_keys() > HALF {
                self.rotate_leaf_from_left(lpeer, leaf_id, entry.node, entry.pos);
                return;
            }
            self.merge_leaf_nodes(lpeer, leaf_id);
            self.shrink_index_ancestors(d, entry.pos);
        } else {
            self.merge_leaf_nodes(leaf_id, rpeer);
            self.shrink_index_ancestors(d, entry.pos + 1);
        }
    }

    /// Move the right sibling's first record onto the end of `leaf_id` and
    /// refresh the separator between them.
    fn rotate_leaf_from_right(
        &mut self,
        leaf_id: BlockId,
        rpeer_id: BlockId,
        parent_id: BlockId,
        pos: usize,
    ) {
        let new_separator;
        {
            let (leaf, rpeer) = self.block_pair_mut(leaf_id, rpeer_id);
            let nk = leaf.num_keys();
            let nkr = rpeer.num_keys();
            leaf.set_key(nk, rpeer.key(0));
            leaf.set_value(nk, rpeer.value(0));
            rpeer.move_keys_within(1..nkr, 0);
            rpeer.move_fields_within(1..nkr, 0);
            leaf.set_num_keys(nk + 1);
            rpeer.set_num_keys(nkr - 1);
            new_separator = rpeer.key(0);
        }
        self.block_mut(parent_id).set_key(pos, new_separator);
        self.fix_cursors_rotate_from_right(leaf_id, rpeer_id);
        self.stats.leaf_rotations += 1;
        tracing::trace!(
            target: "pagetree::rebalance",
            leaf = leaf_id.raw(),
            donor = rpeer_id.raw(),
            "borrowed first record of right sibling"
        );
    }

    fn fix_cursors_rotate_from_right(&mut self, leaf: BlockId, rpeer: BlockId) {
        let end = self.block(leaf).num_keys() - 1;
        for weak in &self.cursors {
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.leaf != rpeer {
                    continue;
                }
                if state.pos == 0 {
                    state.leaf = leaf;
                    state.pos = end;
                } else {
                    state.pos -= 1;
                }
            }
        }
    }

    /// Move the left sibling's last record into slot 0 of `leaf_id` and
    /// refresh the separator between them.
    fn rotate_leaf_from_left(
        &mut self,
        lpeer_id: BlockId,
        leaf_id: BlockId,
        parent_id: BlockId,
        pos: usize,
    ) {
        let new_separator;
        {
            let (lpeer, leaf) = self.block_pair_mut(lpeer_id, leaf_id);
            let nk = leaf.num_keys();
            let nkl = lpeer.num_keys();
            leaf.move_keys_within(0..nk, 1);
            leaf.move_fields_within(0..nk, 1);
            leaf.set_key(0, lpeer.key(nkl - 1));
            leaf.set_value(0, lpeer.value(nkl - 1));
            leaf.set_num_keys(nk + 1);
            lpeer.set_num_keys(nkl - 1);
            new_separator = leaf.key(0);
        }
        self.block_mut(parent_id).set_key(pos - 1, new_separator);
        self.fix_cursors_rotate_from_left(lpeer_id, leaf_id);
        self.stats.leaf_rotations += 1;
        tracing::trace!(
            target: "pagetree::rebalance",
            leaf = leaf_id.raw(),
            donor = lpeer_id.raw(),
            "borrowed last record of left sibling"
        );
    }

    fn fix_cursors_rotate_from_left(&mut self, lpeer: BlockId, leaf: BlockId) {
        let donor_count = self.block(lpeer).num_keys();
        for weak in &self.cursors {
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.leaf == leaf {
                    state.pos += 1;
                } else if state.leaf == lpeer && state.pos == donor_count {
                    state.leaf = leaf;
                    state.pos = 0;
                }
            }
        }
    }

    /// Fold `right_id` into `left_id`, relink the leaf chain past it, and
    /// free the drained block.
    fn merge_leaf_nodes(&mut self, left_id: BlockId, right_id: BlockId) {
        let prior_left_count;
        {
            let (left, right) = self.block_pair_mut(left_id, right_id);
            let nkl = left.num_keys();
            let nkr = right.num_keys();
            left.copy_keys_from(right, 0..nkr, nkl);
            left.copy_fields_from(right, 0..nkr, nkl);
            left.set_num_keys(nkl + nkr);
            left.set_next_leaf(right.next_leaf());
            prior_left_count = nkl;
        }
        self.fix_cursors_leaf_merge(left_id, right_id, prior_left_count);
        self.release_block(right_id);
        self.stats.leaf_merges += 1;
    }

    fn fix_cursors_leaf_merge(&mut self, left: BlockId, right: BlockId, prior_left_count: usize) {
        for weak in &self.cursors {
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                if state.leaf != right {
                    continue;
                }
                tracing::trace!(
                    target: "pagetree::cursor",
                    from = right.raw(),
                    to = left.raw(),
                    base = prior_left_count,
                    pos = state.pos,
                    "relocating cursor across leaf merge"
                );
                state.leaf = left;
                state.pos += prior_left_count;
            }
        }
    }

    /// Remove the separator left of child slot `pos` at path layer `d`, then
    /// restore the layer above the removal: collapse a root reduced to a
    /// single child, rebalance an under-full node, or stop.
    fn shrink_index_ancestors(&mut self, d: usize, pos: usize) {
        let node_id = self.path[d].node;
        let nk = self.path[d].num_keys;
        {
            let node = self.block_mut(node_id);
            node.move_keys_within(pos..nk, pos - 1);
            node.move_fields_within(pos + 1..nk + 1, pos);
            node.set_num_keys(nk - 1);
        }
        let nk = nk - 1;
        if d == 0 {
            if nk == 0 {
                let child = self.block(node_id).child(0);
                self.root = child;
                self.depth -= 1;
                self.release_block(node_id);
                self.stats.root_collapses += 1;
                tracing::trace!(
                    target: "pagetree::rebalance",
                    root = child.raw(),
                    depth = self.depth,
                    "collapsed root into its single child"
                );
                if self.depth == 0 {
                    self.path = SmallVec::new();
                }
            }
        } else if nk < HALF {
            if let Some(shrink_pos) = self.index_underflow(d - 1, node_id) {
                self.shrink_index_ancestors(d - 1, shrink_pos);
            }
        }
    }

    /// Rebalance an under-full index node through its parent at path layer
    /// `d`. Rotations finish the job; a merge frees one block and returns the
    /// child slot the parent must now drop.
    fn index_underflow(&mut self, d: usize, inode_id: BlockId) -> Option<usize> {
        let entry = self.path[d];
        let nki = self.block(inode_id).num_keys();
        let mut rpeer = BlockId::NIL;
        if entry.pos < entry.num_keys {
            rpeer = self.block(entry.node).child(entry.pos + 1);
            let nkr = self.block(rpeer).num_keys();
            if nki + nkr > ORDER - 2 {
                self.rotate_index_from_right(inode_id, rpeer, entry.node, entry.pos);
                return None;
            }
        }
        if entry.pos > 0 {
            let lpeer = self.block(entry.node).child(entry.pos - 1);
            let nkl = self.block(lpeer).num_keys();
            if nkl + nki > ORDER - 2 {
                self.rotate_index_from_left(lpeer, inode_id, entry.node, entry.pos);
                return None;
            }
            let separator = self.block(entry.node).key(entry.pos - 1);
            self.merge_index_nodes(lpeer, inode_id, separator);
            Some(entry.pos)
        } else {
            let separator = self.block(entry.node).key(entry.pos);
            self.merge_index_nodes(inode_id, rpeer, separator);
            Some(entry.pos + 1)
        }
    }

    /// Cycle the right sibling's first child up through the parent separator.
    fn rotate_index_from_right(
        &mut self,
        inode_id: BlockId,
        rpeer_id: BlockId,
        parent_id: BlockId,
        pos: usize,
    ) {
        let separator_down = self.block(parent_id).key(pos);
        let separator_up;
        {
            let (inode, rpeer) = self.block_pair_mut(inode_id, rpeer_id);
            let nki = inode.num_keys();
            let nkr = rpeer.num_keys();
            inode.set_key(nki, separator_down);
            inode.set_child(nki + 1, rpeer.child(0));
            separator_up = rpeer.key(0);
            rpeer.move_keys_within(1..nkr, 0);
            rpeer.move_fields_within(1..nkr + 1, 0);
            inode.set_num_keys(nki + 1);
            rpeer.set_num_keys(nkr - 1);
        }
        self.block_mut(parent_id).set_key(pos, separator_up);
        self.stats.index_rotations += 1;
        tracing::trace!(
            target: "pagetree::rebalance",
            node = inode_id.raw(),
            donor = rpeer_id.raw(),
            "rotated separator from right index sibling"
        );
    }

    /// Cycle the left sibling's last child up through the parent separator.
    fn rotate_index_from_left(
        &mut self,
        lpeer_id: BlockId,
        inode_id: BlockId,
        parent_id: BlockId,
        pos: usize,
    ) {
        let separator_down = self.block(parent_id).key(pos - 1);
        let separator_up;
        {
            let (lpeer, inode) = self.block_pair_mut(lpeer_id, inode_id);
            let nki = inode.num_keys();
            let nkl = lpeer.num_keys();
            inode.move_keys_within(0..nki, 1);
            inode.move_fields_within(0..nki + 1, 1);
            inode.set_key(0, separator_down);
            inode.set_child(0, lpeer.child(nkl));
            separator_up = lpeer.key(nkl - 1);
            inode.set_num_keys(nki + 1);
            lpeer.set_num_keys(nkl - 1);
        }
        self.block_mut(parent_id).set_key(pos - 1, separator_up);
        self.stats.index_rotations += 1;
        tracing::trace!(
            target: "pagetree::rebalance",
            node = inode_id.raw(),
            donor = lpeer_id.raw(),
            "rotated separator from left index sibling"
        );
    }

    /// Combine two index siblings around their parent separator, freeing the
    /// drained right block.
    fn merge_index_nodes(&mut self, left_id: BlockId, right_id: BlockId, separator: u64) {
        {
            let (left, right) = self.block_pair_mut(left_id, right_id);
            let nkl = left.num_keys();
            let nkr = right.num_keys();
            left.set_key(nkl, separator);
            left.copy_keys_from(right, 0..nkr, nkl + 1);
            left.copy_fields_from(right, 0..nkr + 1, nkl + 1);
            left.set_num_keys(nkl + nkr + 1);
        }
        self.release_block(right_id);
        self.stats.index_merges += 1;
        tracing::trace!(
            target: "pagetree::rebalance",
            kept = left_id.raw(),
            drained = right_id.raw(),
            "merged index siblings"
        );
    }
}
