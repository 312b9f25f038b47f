/// Structural mutation counters for one tree.
///
/// Trees are single-threaded by contract, so these are plain tallies read
/// through [`crate::BPlusTree::stats`].
#[derive(Default, Debug, Clone, Copy)]
pub struct TreeStats {
    /// Leaf blocks split by inserts.
    pub leaf_splits: u64,
    /// Index blocks split while propagating a promoted key.
    pub index_splits: u64,
    /// Leaf blocks drained into a sibling.
    pub leaf_merges: u64,
    /// Index blocks drained into a sibling.
    pub index_merges: u64,
    /// Records rotated between leaf siblings.
    pub leaf_rotations: u64,
    /// Separator/child pairs rotated between index siblings.
    pub index_rotations: u64,
    /// Times a new root was added above a split root.
    pub root_growths: u64,
    /// Times a single-child root was collapsed away.
    pub root_collapses: u64,
}

impl TreeStats {
    /// Emits the counters to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        tracing::info!(
            target: "pagetree::stats",
            leaf_splits = self.leaf_splits,
            index_splits = self.index_splits,
            leaf_merges = self.leaf_merges,
            index_merges = self.index_merges,
            leaf_rotations = self.leaf_rotations,
            index_rotations = self.index_rotations,
            root_growths = self.root_growths,
            root_collapses = self.root_collapses,
            "tree stats snapshot"
        );
    }
}

/// Storage currently held live by a tree.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveStorage {
    /// Records stored in the tree.
    pub records: u64,
    /// Blocks in the block table, including the root.
    pub blocks: u64,
    /// Cursors registered with the tree.
    pub cursors: u64,
}
