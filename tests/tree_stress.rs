use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use pagetree::verify::verify_tree;
use pagetree::BPlusTree;

#[test]
fn randomized_mutation_with_open_cursors() {
    let mut tree = BPlusTree::new().expect("new tree");
    let mut reference: BTreeMap<u64, u64> = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);
    let mut roaming = tree.first_record();

    for round in 0..20 {
        for _ in 0..1_500 {
            let key = rng.gen_range(0..4_096u64);
            match rng.gen_range(0..10) {
                0..=5 => {
                    let value = rng.gen::<u64>();
                    tree.insert(key, value).expect("insert");
                    reference.insert(key, value);
                }
                6..=8 => {
                    assert_eq!(tree.remove(key), reference.remove(&key).is_some());
                }
                _ => {
                    // every record a live cursor reports must be real
                    if let Some((k, v)) = roaming.record() {
                        assert_eq!(reference.get(&k), Some(&v), "cursor reported a phantom record");
                    }
                    if !roaming.advance() {
                        roaming = tree.first_record();
                    }
                }
            }
        }

        let report = verify_tree(&tree);
        assert!(report.success, "round {round}: {:?}", report.findings);
        assert_eq!(tree.len(), reference.len() as u64);

        let mut scan = tree.first_record();
        let mut seen = Vec::new();
        while let Some(record) = scan.record() {
            seen.push(record);
            if !scan.advance() {
                break;
            }
        }
        let expected: Vec<(u64, u64)> = reference.iter().map(|(&k, &v)| (k, v)).collect();
        assert_eq!(seen, expected, "round {round}: cursor scan diverged");
    }
}

#[test]
fn bulk_build_then_shuffled_teardown() {
    let mut tree = BPlusTree::new().expect("new tree");
    let mut keys: Vec<u64> = (0..30_000).collect();
    for &key in &keys {
        tree.insert(key, !key).expect("insert");
    }
    assert!(tree.depth() >= 1);
    assert!(verify_tree(&tree).success);

    let mut rng = ChaCha8Rng::seed_from_u64(99);
    keys.shuffle(&mut rng);
    for (i, &key) in keys.iter().enumerate() {
        assert!(tree.remove(key), "key {key} missing at step {i}");
        if i % 5_000 == 0 {
            let report = verify_tree(&tree);
            assert!(report.success, "step {i}: {:?}", report.findings);
        }
    }
    assert!(tree.is_empty());
    assert_eq!(tree.depth(), 0);
    assert_eq!(tree.active_storage().blocks, 1);
    assert!(verify_tree(&tree).success);
}
