use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::alloc::BlockAllocator;
use crate::block::Block;
use crate::error::{Result, TreeError};
use crate::stats::ActiveStorage;
use crate::verify::verify_tree;
use crate::BPlusTree;

/// Allocator that runs dry after a fixed number of outstanding pages.
struct QuotaAllocator {
    remaining: usize,
}

impl BlockAllocator for QuotaAllocator {
    fn allocate_page(&mut self) -> Option<Box<Block>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Block::boxed())
    }

    fn release_page(&mut self, block: Box<Block>) {
        self.remaining += 1;
        drop(block);
    }
}

fn collect(tree: &BPlusTree) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    tree.for_each(|k, v| out.push((k, v)));
    out
}

fn collect_by_cursor(tree: &BPlusTree) -> Vec<(u64, u64)> {
    let mut cursor = tree.first_record();
    let mut out = Vec::new();
    while let Some(record) = cursor.record() {
        out.push(record);
        if !cursor.advance() {
            break;
        }
    }
    out
}

fn assert_verified(tree: &BPlusTree) {
    let report = verify_tree(tree);
    assert!(report.success, "verification failed: {:?}", report.findings);
}

#[test]
fn insert_find_enumerate_small() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    tree.insert(1, 10)?;
    tree.insert(2, 20)?;
    tree.insert(3, 30)?;
    assert_eq!(tree.get(2), Some(20));
    assert_eq!(collect(&tree), vec![(1, 10), (2, 20), (3, 30)]);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn empty_tree_behaviors() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    assert_eq!(tree.get(1), None);
    assert!(!tree.remove(1));
    assert!(tree.is_empty());
    assert_eq!(tree.depth(), 0);
    let mut cursor = tree.first_record();
    assert_eq!(cursor.record(), None);
    assert!(!cursor.advance());
    assert_eq!(collect(&tree), Vec::new());
    assert_verified(&tree);
    Ok(())
}

#[test]
fn splits_grow_an_index_layer() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 1..=256u64 {
        tree.insert(key, key)?;
    }
    assert!(tree.depth() >= 1);
    assert_eq!(tree.get(128), Some(128));
    assert_eq!(tree.get(257), None);
    assert_eq!(tree.stats().root_growths, 1);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn descending_inserts_split_correctly() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in (0..1_000u64).rev() {
        tree.insert(key, key + 1)?;
    }
    assert_eq!(tree.len(), 1_000);
    let expected: Vec<(u64, u64)> = (0..1_000).map(|k| (k, k + 1)).collect();
    assert_eq!(collect(&tree), expected);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn deleting_even_keys_leaves_odd_records() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 1..=1_000u64 {
        tree.insert(key, key)?;
    }
    for key in (2..=1_000u64).step_by(2) {
        assert!(tree.remove(key));
    }
    let seen = collect(&tree);
    assert_eq!(seen.len(), 500);
    assert!(seen.iter().all(|&(k, v)| k % 2 == 1 && v == k));
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(tree.active_storage().records, 500);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn overwriting_updates_in_place() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    tree.insert(5, 50)?;
    tree.insert(5, 500)?;
    assert_eq!(tree.get(5), Some(500));
    assert_eq!(tree.active_storage().records, 1);
    Ok(())
}

#[test]
fn random_order_full_delete_collapses_to_lone_leaf() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    let mut keys: Vec<u64> = (1..=400).collect();
    for &key in &keys {
        tree.insert(key, key * 2)?;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    keys.shuffle(&mut rng);
    for &key in &keys {
        assert!(tree.remove(key));
    }
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.depth(), 0);
    let storage = tree.active_storage();
    assert_eq!(storage.records, 0);
    assert_eq!(storage.blocks, 1);
    let report = verify_tree(&tree);
    assert!(report.success, "{:?}", report.findings);
    assert_eq!(report.counts.leaves, 1);
    Ok(())
}

#[test]
fn deep_tree_splits_and_collapses_index_layers() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 0..40_000u64 {
        tree.insert(key, key)?;
    }
    assert!(tree.depth() >= 2);
    assert!(tree.stats().index_splits >= 1);
    assert_verified(&tree);
    for key in 0..40_000u64 {
        assert!(tree.remove(key));
    }
    assert_eq!(tree.depth(), 0);
    let stats = tree.stats();
    assert!(stats.index_merges >= 1);
    assert!(stats.root_collapses >= 2);
    assert_eq!(tree.active_storage().blocks, 1);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn cursor_iteration_visits_every_record_in_order() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    let mut keys: Vec<u64> = (0..600).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    keys.shuffle(&mut rng);
    for &key in &keys {
        tree.insert(key, key + 1_000)?;
    }
    let expected: Vec<(u64, u64)> = (0..600).map(|k| (k, k + 1_000)).collect();
    assert_eq!(collect_by_cursor(&tree), expected);
    Ok(())
}

#[test]
fn cursor_survives_deletion_of_its_record() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 1..=300u64 {
        tree.insert(key, key)?;
    }
    let mut cursor = tree.first_record();
    assert_eq!(cursor.record(), Some((1, 1)));
    assert!(tree.remove(1));
    assert_eq!(cursor.record(), None);
    assert!(cursor.advance());
    assert_eq!(cursor.record(), Some((2, 2)));
    Ok(())
}

#[test]
fn cursor_recovers_a_reinserted_key() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 1..=10u64 {
        tree.insert(key, key)?;
    }
    let mut cursor = tree.find_record(5);
    assert_eq!(cursor.record(), Some((5, 5)));
    assert!(tree.remove(5));
    assert_eq!(cursor.record(), None);
    tree.insert(5, 55)?;
    assert_eq!(cursor.record(), Some((5, 55)));
    assert!(cursor.advance());
    assert_eq!(cursor.record(), Some((6, 6)));
    Ok(())
}

#[test]
fn cursor_moves_to_the_new_leaf_on_split() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 0..255u64 {
        tree.insert(key, key)?;
    }
    let low = tree.find_record(50);
    let high = tree.find_record(200);
    tree.insert(255, 255)?;
    assert_eq!(tree.depth(), 1);
    assert_eq!(low.record(), Some((50, 50)));
    assert_eq!(high.record(), Some((200, 200)));
    assert_verified(&tree);
    Ok(())
}

#[test]
fn cursor_follows_a_rotated_record() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 0..300u64 {
        tree.insert(key, key)?;
    }
    // leaves hold 0..=127 and 128..=299; the first record of the right leaf
    // rotates over when the left leaf underflows
    let cursor = tree.find_record(128);
    assert!(tree.remove(0));
    assert_eq!(cursor.record(), Some((128, 128)));
    assert_eq!(tree.stats().leaf_rotations, 1);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn cursor_follows_a_left_rotation() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 0..256u64 {
        tree.insert(key * 10, key)?;
    }
    tree.insert(5, 999)?; // left leaf now holds one spare record
    let right_cursor = tree.find_record(1280);
    let donor_cursor = tree.find_record(1270);
    assert!(tree.remove(1290));
    assert_eq!(donor_cursor.record(), Some((1270, 127)));
    assert_eq!(right_cursor.record(), Some((1280, 128)));
    assert_eq!(tree.stats().leaf_rotations, 1);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn cursor_follows_records_into_a_merged_leaf() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 0..256u64 {
        tree.insert(key, key)?;
    }
    assert_eq!(tree.depth(), 1);
    let cursor = tree.find_record(130);
    assert!(tree.remove(0));
    // both leaves sat at minimum occupancy, so the delete merges them and
    // collapses the root
    assert_eq!(tree.depth(), 0);
    assert_eq!(cursor.record(), Some((130, 130)));
    assert_eq!(tree.stats().leaf_merges, 1);
    assert_eq!(tree.stats().root_collapses, 1);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn cursor_updates_value_in_place() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    tree.insert(7, 70)?;
    let mut cursor = tree.find_record(7);
    assert!(cursor.update(71));
    assert_eq!(tree.get(7), Some(71));
    assert_eq!(tree.len(), 1);
    Ok(())
}

#[test]
fn update_fails_on_deleted_record() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    tree.insert(7, 70)?;
    tree.insert(8, 80)?;
    let mut cursor = tree.find_record(7);
    assert!(tree.remove(7));
    assert!(!cursor.update(71));
    assert!(cursor.advance());
    assert_eq!(cursor.record(), Some((8, 80)));
    Ok(())
}

#[test]
fn find_record_past_every_key_parks_at_the_end() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 1..=3u64 {
        tree.insert(key, key)?;
    }
    let mut cursor = tree.find_record(10);
    assert_eq!(cursor.record(), None);
    assert!(!cursor.advance());
    assert_eq!(cursor.record(), None);
    Ok(())
}

#[test]
fn find_record_between_leaves_advances_into_the_next_leaf() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    for key in 0..256u64 {
        tree.insert(key * 2, key)?;
    }
    assert_eq!(tree.depth(), 1);
    // 255 is greater than every key of the left leaf and absent from the right
    let mut cursor = tree.find_record(255);
    assert_eq!(cursor.record(), None);
    assert!(cursor.advance());
    assert_eq!(cursor.record(), Some((256, 128)));
    Ok(())
}

#[test]
fn cursors_outlive_a_dropped_tree_safely() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    tree.insert(1, 10)?;
    let mut cursor = tree.first_record();
    assert!(cursor.tree_alive());
    assert_eq!(cursor.record(), Some((1, 10)));
    drop(tree);
    assert!(!cursor.tree_alive());
    assert_eq!(cursor.record(), None);
    assert!(!cursor.advance());
    assert!(!cursor.update(99));
    Ok(())
}

#[test]
fn active_storage_tracks_records_blocks_and_cursors() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    assert_eq!(
        tree.active_storage(),
        ActiveStorage {
            records: 0,
            blocks: 1,
            cursors: 0
        }
    );
    for key in 0..300u64 {
        tree.insert(key, key)?;
    }
    let first = tree.first_record();
    let second = tree.find_record(100);
    let storage = tree.active_storage();
    assert_eq!(storage.records, 300);
    assert_eq!(storage.blocks, 3);
    assert_eq!(storage.cursors, 2);
    drop(second);
    assert_eq!(tree.active_storage().cursors, 1);
    drop(first);
    assert_eq!(tree.active_storage().cursors, 0);
    Ok(())
}

#[test]
fn tree_creation_fails_without_any_page() {
    let err = BPlusTree::with_allocator(Box::new(QuotaAllocator { remaining: 0 })).unwrap_err();
    assert!(matches!(err, TreeError::OutOfMemory(_)));
}

#[test]
fn insert_reports_out_of_memory_and_leaves_the_tree_intact() -> Result<()> {
    let mut tree = BPlusTree::with_allocator(Box::new(QuotaAllocator { remaining: 2 }))?;
    for key in 0..255u64 {
        tree.insert(key, key)?;
    }
    // the split needs a root block and a leaf block; only one page is left,
    // so the claim must be rolled back
    let err = tree.insert(255, 255).unwrap_err();
    assert!(matches!(err, TreeError::OutOfMemory(_)));
    assert_eq!(tree.len(), 255);
    assert_eq!(tree.depth(), 0);
    assert_eq!(tree.active_storage().blocks, 1);
    assert_eq!(tree.get(254), Some(254));
    assert_eq!(tree.get(255), None);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn insert_succeeds_once_the_allocator_can_cover_the_split() -> Result<()> {
    let mut tree = BPlusTree::with_allocator(Box::new(QuotaAllocator { remaining: 3 }))?;
    for key in 0..=255u64 {
        tree.insert(key, key)?;
    }
    assert_eq!(tree.depth(), 1);
    assert_eq!(tree.len(), 256);
    assert_verified(&tree);
    Ok(())
}

#[test]
fn random_operations_match_reference_model() -> Result<()> {
    let mut tree = BPlusTree::new()?;
    let mut reference = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for round in 0..10 {
        for _ in 0..2_000 {
            let key = rng.gen_range(0..2_048u64);
            if rng.gen_bool(0.6) {
                let value = rng.gen::<u64>();
                tree.insert(key, value)?;
                reference.insert(key, value);
            } else {
                assert_eq!(tree.remove(key), reference.remove(&key).is_some());
            }
        }
        let report = verify_tree(&tree);
        assert!(report.success, "round {round}: {:?}", report.findings);
        let expected: Vec<(u64, u64)> = reference.iter().map(|(&k, &v)| (k, v)).collect();
        assert_eq!(collect(&tree), expected);
        assert_eq!(tree.len(), reference.len() as u64);
    }
    Ok(())
}

#[derive(Clone, Debug)]
enum PropOp {
    Insert(u64, u64),
    Remove(u64),
}

fn op_strategy() -> impl Strategy<Value = PropOp> {
    let key_range = 0u64..1_024;
    let value_range = 0u64..512;
    prop_oneof![
        (key_range.clone(), value_range).prop_map(|(k, v)| PropOp::Insert(k, v)),
        key_range.prop_map(PropOp::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn tree_matches_btreemap_random_ops(ops in prop::collection::vec(op_strategy(), 1..500)) {
        let mut tree = BPlusTree::new().expect("new tree");
        let mut reference = BTreeMap::new();
        for op in ops {
            match op {
                PropOp::Insert(key, value) => {
                    tree.insert(key, value).expect("insert");
                    reference.insert(key, value);
                }
                PropOp::Remove(key) => {
                    prop_assert_eq!(tree.remove(key), reference.remove(&key).is_some());
                }
            }
        }
        let report = verify_tree(&tree);
        prop_assert!(report.success, "{:?}", report.findings);
        for (&key, &value) in &reference {
            prop_assert_eq!(tree.get(key), Some(value));
        }
        let mut seen = BTreeMap::new();
        tree.for_each(|k, v| {
            seen.insert(k, v);
        });
        prop_assert_eq!(seen, reference);
    }

    #[test]
    fn cursor_scan_matches_btreemap(ops in prop::collection::vec(op_strategy(), 1..300)) {
        let mut tree = BPlusTree::new().expect("new tree");
        let mut reference = BTreeMap::new();
        for op in ops {
            match op {
                PropOp::Insert(key, value) => {
                    tree.insert(key, value).expect("insert");
                    reference.insert(key, value);
                }
                PropOp::Remove(key) => {
                    tree.remove(key);
                    reference.remove(&key);
                }
            }
        }
        let expected: Vec<(u64, u64)> = reference.iter().map(|(&k, &v)| (k, v)).collect();
        prop_assert_eq!(collect_by_cursor(&tree), expected);
    }
}
