impl BPlusTree {
    /// Create an empty tree backed by the default heap allocator.
    pub fn new() -> Result<BPlusTree> {
        Self::with_allocator(Box::new(HeapAllocator))
    }

    /// Create an empty tree drawing its blocks from `allocator`.
    pub fn with_allocator(allocator: Box<dyn BlockAllocator>) -> Result<BPlusTree> {
        Ok(BPlusTree {
            core: Rc::new(RefCell::new(TreeCore::new(allocator)?)),
        })
    }

    /// Value stored under `key`, if any.
    pub fn get(&self, key: u64) -> Option<u64> {
        let core = self.core.borrow();
        let leaf = core.block(core.find_leaf(key));
        let i = leaf.scan_leaf_keys(key);
        if i < leaf.num_keys() && leaf.key(i) == key {
            Some(leaf.value(i))
        } else {
            None
        }
    }

    /// Insert `key` with `value`, overwriting the value of an existing record.
    ///
    /// Fails only when the allocator cannot supply the blocks a split cascade
    /// needs; the tree is left untouched in that case.
    pub fn insert(&mut self, key: u64, value: u64) -> Result<()> {
        self.core.borrow_mut().insert(key, value)
    }

    /// Delete the record under `key`. Returns whether a record was removed.
    pub fn remove(&mut self, key: u64) -> bool {
        self.core.borrow_mut().remove(key)
    }

    /// Visit every record in ascending key order.
    ///
    /// Walks the leaf chain without allocating. The callback must not
    /// re-enter the tree.
    pub fn for_each(&self, mut visit: impl FnMut(u64, u64)) {
        let core = self.core.borrow();
        let mut node = core.leaves;
        loop {
            let leaf = core.block(node);
            for i in 0..leaf.num_keys() {
                visit(leaf.key(i), leaf.value(i));
            }
            match leaf.next_leaf() {
                Some(next) => node = next,
                None => break,
            }
        }
    }

    /// Number of records stored in the tree.
    pub fn len(&self) -> u64 {
        self.core.borrow().num_records
    }

    /// Whether the tree holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of index layers above the leaves; 0 means the root is a leaf.
    pub fn depth(&self) -> usize {
        self.core.borrow().depth
    }

    /// Open a cursor on the first record of the tree.
    pub fn first_record(&self) -> Cursor {
        let leaves = self.core.borrow().leaves;
        Cursor::new(&self.core, leaves, 0)
    }

    /// Open a cursor on the first record whose key is >= `key`.
    ///
    /// When every key is smaller the cursor sits past the end of the final
    /// leaf until [`Cursor::advance`] moves it.
    pub fn find_record(&self, key: u64) -> Cursor {
        let (leaf, pos) = {
            let core = self.core.borrow();
            let leaf = core.find_leaf(key);
            (leaf, core.block(leaf).scan_leaf_keys(key))
        };
        Cursor::new(&self.core, leaf, pos)
    }

    /// Live record, block and cursor tallies.
    pub fn active_storage(&self) -> ActiveStorage {
        let core = self.core.borrow();
        ActiveStorage {
            records: core.num_records,
            blocks: core.num_blocks,
            cursors: core.num_cursors,
        }
    }

    /// Snapshot of the structural mutation counters.
    pub fn stats(&self) -> TreeStats {
        self.core.borrow().stats
    }

    /// Emit the current counters to the tracing sink.
    pub fn emit_stats(&self) {
        self.stats().emit_tracing();
    }
}

impl TreeCore {
    /// Leaf that holds, or would hold, `key`. Read-only descent.
    fn find_leaf(&self, key: u64) -> BlockId {
        let mut node = self.root;
        for _ in 0..self.depth {
            let block = self.block(node);
            node = block.child(block.scan_index_keys(key));
        }
        node
    }

    /// Descend to the leaf for `key`, recording every index layer visited so
    /// a following split or merge can walk back up.
    fn find_leaf_recording(&mut self, key: u64) -> BlockId {
        self.path.clear();
        let mut node = self.root;
        for _ in 0..self.depth {
            let (num_keys, pos, child) = {
                let block = self.block(node);
                let pos = block.scan_index_keys(key);
                (block.num_keys(), pos, block.child(pos))
            };
            self.path.push(PathEntry {
                node,
                num_keys,
                pos,
                split: BlockId::NIL,
            });
            node = child;
        }
        tracing::trace!(
            target: "pagetree::search",
            key,
            leaf = node.raw(),
            depth = self.depth,
            "descended to target leaf"
        );
        node
    }
}
