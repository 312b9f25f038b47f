impl TreeCore {
    /// Thread a freshly split-off child and its promoted key up the recorded
    /// path, splitting every full ancestor. A cascade that exits the top of
    /// the path grows a new root from the pre-allocated reserve.
    fn insert_new_leaf(&mut self, mut new: BlockId, mut key: u64) {
        for d in (0..self.depth).rev() {
            let entry = self.path[d];
            if entry.num_keys < MAX_KEYS {
                self.insert_split_into_index(entry.node, entry.pos, key, new);
                return;
            }
            key = self.split_index(entry.node, entry.split, entry.pos, key, new);
            new = entry.split;
        }
        self.add_root_block(key, new);
    }

    /// Insert promoted `key` and its right child into an index block with
    /// room: the key lands at separator slot `pos`, the child one slot right.
    fn insert_split_into_index(&mut self, node_id: BlockId, pos: usize, key: u64, child: BlockId) {
        let node = self.block_mut(node_id);
        let nk = node.num_keys();
        node.move_keys_within(pos..nk, pos + 1);
        node.move_fields_within(pos + 1..nk + 1, pos + 2);
        node.set_key(pos, key);
        node.set_child(pos + 1, child);
        node.set_num_keys(nk + 1);
    }

    /// Split a full index block while inserting promoted `key` at separator
    /// slot `pos` with right child `child`.
    ///
    /// The combined 256 keys and 257 children distribute as 128 keys and 129
    /// children staying in `parent`, the key at combined position 128
    /// promoted upward, and 127 keys with 128 children moving to `new_id`.
    /// The three insertion regimes (below, at, above the promoted slot) all
    /// land on that distribution. Returns the newly promoted key.
    fn split_index(
        &mut self,
        parent_id: BlockId,
        new_id: BlockId,
        pos: usize,
        key: u64,
        child: BlockId,
    ) -> u64 {
        let promoted;
        {
            let (parent, newp) = self.block_pair_mut(parent_id, new_id);
            parent.set_num_keys(HALF);
            newp.set_num_keys(HALF - 1);
            if pos < HALF {
                newp.copy_keys_from(parent, HALF..MAX_KEYS, 0);
                newp.copy_fields_from(parent, HALF..ORDER, 0);
                // Shifting the tail also parks the key bound for promotion in
                // the slot just past the left half.
                parent.move_keys_within(pos..HALF, pos + 1);
                parent.move_fields_within(pos + 1..HALF, pos + 2);
                parent.set_key(pos, key);
                parent.set_child(pos + 1, child);
            } else if pos == HALF {
                newp.copy_keys_from(parent, HALF..MAX_KEYS, 0);
                newp.copy_fields_from(parent, HALF + 1..ORDER, 1);
                newp.set_child(0, child);
                parent.set_key(HALF, key);
            } else {
                newp.copy_keys_from(parent, HALF + 1..pos, 0);
                newp.copy_fields_from(parent, HALF + 1..pos + 1, 0);
                newp.set_key(pos - (HALF + 1), key);
                newp.set_child(pos - HALF, child);
                newp.copy_keys_from(parent, pos..MAX_KEYS, pos - HALF);
                newp.copy_fields_from(parent, pos + 1..ORDER, pos + 1 - HALF);
            }
            promoted = parent.key(HALF);
        }
        self.stats.index_splits += 1;
        tracing::trace!(
            target: "pagetree::split",
            left = parent_id.raw(),
            right = new_id.raw(),
            promoted,
            "split index block"
        );
        promoted
    }

    /// Consume the reserve root block: one separator over the old root and
    /// the sibling the cascade produced.
    fn add_root_block(&mut self, key: u64, right: BlockId) {
        let left = self.root;
        let new_root = self.new_root;
        debug_assert!(!new_root.is_nil());
        {
            let root = self.block_mut(new_root);
            root.set_num_keys(1);
            root.set_key(0, key);
            root.set_child(0, left);
            root.set_child(1, right);
        }
        self.root = new_root;
        self.new_root = BlockId::NIL;
        self.depth += 1;
        self.stats.root_growths += 1;
        tracing::trace!(
            target: "pagetree::split",
            root = new_root.raw(),
            depth = self.depth,
            "grew new root"
        );
    }
}
