use std::ops::Range;

/// Size in bytes of one node block; every node occupies one virtual-memory page.
pub const BLOCK_BYTES: usize = 4096;

/// Maximum number of children of an index block.
pub const ORDER: usize = 256;

/// Maximum number of keys held by a leaf or index block.
pub const MAX_KEYS: usize = ORDER - 1;

/// Occupancy floor for non-root blocks; also the size of both split halves.
pub const HALF: usize = ORDER / 2;

/// Reference to a block inside a tree's block table.
///
/// The raw value 0 is the nil reference; table slot 0 is never allocated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct BlockId(u64);

impl BlockId {
    pub(crate) const NIL: BlockId = BlockId(0);

    pub(crate) fn from_index(index: usize) -> BlockId {
        BlockId(index as u64)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn is_nil(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn decode(raw: u64) -> Option<BlockId> {
        if raw == 0 {
            None
        } else {
            Some(BlockId(raw))
        }
    }

    pub(crate) fn encode(id: Option<BlockId>) -> u64 {
        id.map(|b| b.0).unwrap_or(0)
    }
}

/// One 4096-byte page-aligned node holding 512 eight-byte slots.
///
/// Slot 0 is the header (the key count), slots 1..=255 the key array, and
/// slots 256..=511 the field array. Index blocks keep child references in the
/// field array; leaves keep values there, with the final field slot reserved
/// for the next-leaf reference of the ascending leaf chain.
#[repr(C, align(4096))]
pub struct Block {
    num_keys: u16,
    _pad: [u16; 3],
    keys: [u64; MAX_KEYS],
    fields: [u64; ORDER],
}

const _: () = assert!(std::mem::size_of::<Block>() == BLOCK_BYTES);

impl Block {
    /// A fresh zeroed block on the heap. `Block`'s alignment makes every box
    /// page-aligned.
    pub fn boxed() -> Box<Block> {
        Box::new(Block {
            num_keys: 0,
            _pad: [0; 3],
            keys: [0; MAX_KEYS],
            fields: [0; ORDER],
        })
    }

    pub(crate) fn num_keys(&self) -> usize {
        self.num_keys as usize
    }

    pub(crate) fn set_num_keys(&mut self, n: usize) {
        debug_assert!(n <= MAX_KEYS);
        self.num_keys = n as u16;
    }

    pub(crate) fn key(&self, i: usize) -> u64 {
        self.keys[i]
    }

    pub(crate) fn set_key(&mut self, i: usize, key: u64) {
        self.keys[i] = key;
    }

    pub(crate) fn value(&self, i: usize) -> u64 {
        self.fields[i]
    }

    pub(crate) fn set_value(&mut self, i: usize, value: u64) {
        self.fields[i] = value;
    }

    pub(crate) fn child(&self, i: usize) -> BlockId {
        BlockId(self.fields[i])
    }

    pub(crate) fn set_child(&mut self, i: usize, child: BlockId) {
        self.fields[i] = child.0;
    }

    pub(crate) fn next_leaf(&self) -> Option<BlockId> {
        BlockId::decode(self.fields[ORDER - 1])
    }

    pub(crate) fn set_next_leaf(&mut self, next: Option<BlockId>) {
        self.fields[ORDER - 1] = BlockId::encode(next);
    }

    /// First position whose key is >= `key`, or the key count when every
    /// stored key is smaller. The position a leaf record holds or would hold.
    pub(crate) fn scan_leaf_keys(&self, key: u64) -> usize {
        let nk = self.num_keys();
        let mut i = 0;
        while i < nk && key > self.keys[i] {
            i += 1;
        }
        i
    }

    /// First position whose key is > `key`, or the key count. The child slot
    /// an index descent follows for `key`.
    pub(crate) fn scan_index_keys(&self, key: u64) -> usize {
        let nk = self.num_keys();
        let mut i = 0;
        while i < nk && key >= self.keys[i] {
            i += 1;
        }
        i
    }

    pub(crate) fn move_keys_within(&mut self, src: Range<usize>, dst: usize) {
        self.keys.copy_within(src, dst);
    }

    pub(crate) fn move_fields_within(&mut self, src: Range<usize>, dst: usize) {
        self.fields.copy_within(src, dst);
    }

    pub(crate) fn copy_keys_from(&mut self, src: &Block, range: Range<usize>, dst: usize) {
        let len = range.end - range.start;
        self.keys[dst..dst + len].copy_from_slice(&src.keys[range]);
    }

    pub(crate) fn copy_fields_from(&mut self, src: &Block, range: Range<usize>, dst: usize) {
        let len = range.end - range.start;
        self.fields[dst..dst + len].copy_from_slice(&src.fields[range]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_one_page() {
        assert_eq!(std::mem::size_of::<Block>(), BLOCK_BYTES);
        assert_eq!(std::mem::align_of::<Block>(), BLOCK_BYTES);
    }

    #[test]
    fn leaf_scan_finds_first_not_less() {
        let mut block = Block::boxed();
        for (i, key) in [10u64, 20, 30].iter().enumerate() {
            block.set_key(i, *key);
        }
        block.set_num_keys(3);
        assert_eq!(block.scan_leaf_keys(5), 0);
        assert_eq!(block.scan_leaf_keys(10), 0);
        assert_eq!(block.scan_leaf_keys(15), 1);
        assert_eq!(block.scan_leaf_keys(30), 2);
        assert_eq!(block.scan_leaf_keys(31), 3);
    }

    #[test]
    fn index_scan_finds_first_greater() {
        let mut block = Block::boxed();
        for (i, key) in [10u64, 20, 30].iter().enumerate() {
            block.set_key(i, *key);
        }
        block.set_num_keys(3);
        assert_eq!(block.scan_index_keys(5), 0);
        assert_eq!(block.scan_index_keys(10), 1);
        assert_eq!(block.scan_index_keys(20), 2);
        assert_eq!(block.scan_index_keys(30), 3);
        assert_eq!(block.scan_index_keys(99), 3);
    }

    #[test]
    fn next_leaf_round_trips_through_the_last_field_slot() {
        let mut block = Block::boxed();
        assert_eq!(block.next_leaf(), None);
        block.set_next_leaf(Some(BlockId::from_index(7)));
        assert_eq!(block.next_leaf(), Some(BlockId::from_index(7)));
        block.set_next_leaf(None);
        assert_eq!(block.next_leaf(), None);
    }

    #[test]
    fn value_slots_do_not_disturb_the_next_reference() {
        let mut block = Block::boxed();
        block.set_next_leaf(Some(BlockId::from_index(3)));
        for i in 0..MAX_KEYS {
            block.set_value(i, u64::MAX);
        }
        assert_eq!(block.next_leaf(), Some(BlockId::from_index(3)));
    }
}
