/// Inline capacity of the descent path; index layers rarely exceed a handful
/// even at billions of records.
const PATH_INLINE: usize = 8;

/// One index layer visited on the way from the root to a target leaf.
#[derive(Clone, Copy)]
pub(crate) struct PathEntry {
    /// Index block visited.
    node: BlockId,
    /// Key count observed while descending; the split planner consults this.
    num_keys: usize,
    /// Child slot followed out of `node`.
    pos: usize,
    /// Index block claimed for splitting `node`; nil unless pre-allocated.
    split: BlockId,
}

/// State shared between a tree handle and its live cursors.
pub(crate) struct TreeCore {
    allocator: Box<dyn BlockAllocator>,
    /// Block table; slot 0 stays vacant so raw id 0 can mean nil.
    pub(crate) blocks: Vec<Option<Box<Block>>>,
    free_slots: Vec<usize>,
    /// Current root; a leaf while depth is 0.
    pub(crate) root: BlockId,
    /// Head of the ascending leaf chain.
    pub(crate) leaves: BlockId,
    /// Number of index layers above the leaves.
    pub(crate) depth: usize,
    /// Path recorded by the most recent mutating descent.
    path: SmallVec<[PathEntry; PATH_INLINE]>,
    /// Root block claimed ahead of a root split; nil otherwise.
    new_root: BlockId,
    cursors: Vec<Weak<RefCell<CursorState>>>,
    pub(crate) num_records: u64,
    pub(crate) num_blocks: u64,
    num_cursors: u64,
    stats: TreeStats,
}

impl TreeCore {
    fn new(allocator: Box<dyn BlockAllocator>) -> Result<TreeCore> {
        let mut core = TreeCore {
            allocator,
            blocks: vec![None],
            free_slots: Vec::new(),
            root: BlockId::NIL,
            leaves: BlockId::NIL,
            depth: 0,
            path: SmallVec::new(),
            new_root: BlockId::NIL,
            cursors: Vec::new(),
            num_records: 0,
            num_blocks: 0,
            num_cursors: 0,
            stats: TreeStats::default(),
        };
        let root = core.allocate_block("initial leaf")?;
        {
            let block = core.block_mut(root);
            block.set_num_keys(0);
            block.set_next_leaf(None);
        }
        core.root = root;
        core.leaves = root;
        Ok(core)
    }

    fn allocate_block(&mut self, what: &'static str) -> Result<BlockId> {
        let block = self
            .allocator
            .allocate_page()
            .ok_or(TreeError::OutOfMemory(what))?;
        let id = match self.free_slots.pop() {
            Some(slot) => {
                self.blocks[slot] = Some(block);
                BlockId::from_index(slot)
            }
            None => {
                self.blocks.push(Some(block));
                BlockId::from_index(self.blocks.len() - 1)
            }
        };
        self.num_blocks += 1;
        Ok(id)
    }

    fn release_block(&mut self, id: BlockId) {
        let slot = id.index();
        let block = self.blocks[slot].take().expect("releasing vacant block slot");
        self.free_slots.push(slot);
        self.num_blocks -= 1;
        self.allocator.release_page(block);
    }

    pub(crate) fn block(&self, id: BlockId) -> &Block {
        self.blocks[id.index()].as_deref().expect("dangling block id")
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks[id.index()]
            .as_deref_mut()
            .expect("dangling block id")
    }

    /// Mutable access to two distinct blocks at once, for bulk moves between
    /// siblings.
    fn block_pair_mut(&mut self, a: BlockId, b: BlockId) -> (&mut Block, &mut Block) {
        let (ai, bi) = (a.index(), b.index());
        debug_assert_ne!(ai, bi);
        if ai < bi {
            let (lo, hi) = self.blocks.split_at_mut(bi);
            (
                lo[ai].as_deref_mut().expect("dangling block id"),
                hi[0].as_deref_mut().expect("dangling block id"),
            )
        } else {
            let (lo, hi) = self.blocks.split_at_mut(ai);
            let second = lo[bi].as_deref_mut().expect("dangling block id");
            let first = hi[0].as_deref_mut().expect("dangling block id");
            (first, second)
        }
    }

    pub(crate) fn register_cursor(&mut self, state: Weak<RefCell<CursorState>>) {
        self.cursors.push(state);
        self.num_cursors += 1;
    }

    pub(crate) fn unregister_cursor(&mut self, state: &Rc<RefCell<CursorState>>) {
        let target = Rc::downgrade(state);
        self.cursors.retain(|weak| !weak.ptr_eq(&target));
        self.num_cursors -= 1;
    }
}

impl Drop for TreeCore {
    fn drop(&mut self) {
        for slot in self.blocks.iter_mut() {
            if let Some(block) = slot.take() {
                self.allocator.release_page(block);
            }
        }
    }
}

/// In-memory order-256 B+ tree mapping 64-bit keys to 64-bit values.
///
/// Every node occupies one 4096-byte page-aligned block obtained from a
/// [`BlockAllocator`]. All records live in leaves, which are chained in
/// ascending key order for enumeration; index blocks above them hold
/// separators. Insertion pre-allocates every block a split cascade could
/// need before touching the tree, so a failed insert leaves the tree
/// untouched. Open [`Cursor`]s are patched on every structural mutation.
///
/// A tree serves one thread; callers serialize its operations. Independent
/// trees are fully independent.
pub struct BPlusTree {
    pub(crate) core: Rc<RefCell<TreeCore>>,
}

impl fmt::Debug for BPlusTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("BPlusTree")
            .field("records", &core.num_records)
            .field("blocks", &core.num_blocks)
            .field("depth", &core.depth)
            .finish()
    }
}
