#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::arbitrary::{self, Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;

use pagetree::verify::verify_tree;
use pagetree::BPlusTree;

const MAX_OPS: usize = 512;

#[derive(Debug, Clone)]
enum Operation {
    Insert { key: u64, value: u64 },
    Remove { key: u64 },
    Get { key: u64 },
    Scan { from: u64, steps: u8 },
}

impl<'a> Arbitrary<'a> for Operation {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let op_type: u8 = u.int_in_range(0..=3)?;
        Ok(match op_type {
            0 => Operation::Insert {
                key: u.int_in_range(0..=2_047)?,
                value: u.arbitrary()?,
            },
            1 => Operation::Remove {
                key: u.int_in_range(0..=2_047)?,
            },
            2 => Operation::Get {
                key: u.int_in_range(0..=2_047)?,
            },
            3 => Operation::Scan {
                from: u.int_in_range(0..=2_047)?,
                steps: u.int_in_range(0..=64)?,
            },
            _ => unreachable!(),
        })
    }
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let mut operations = Vec::new();
    while !u.is_empty() && operations.len() < MAX_OPS {
        match Operation::arbitrary(&mut u) {
            Ok(op) => operations.push(op),
            Err(_) => break,
        }
    }

    let mut tree = BPlusTree::new().expect("new tree");
    let mut reference: BTreeMap<u64, u64> = BTreeMap::new();

    for op in operations {
        match op {
            Operation::Insert { key, value } => {
                tree.insert(key, value).expect("insert");
                reference.insert(key, value);
            }
            Operation::Remove { key } => {
                assert_eq!(tree.remove(key), reference.remove(&key).is_some());
            }
            Operation::Get { key } => {
                assert_eq!(tree.get(key), reference.get(&key).copied());
            }
            Operation::Scan { from, steps } => {
                let mut cursor = tree.find_record(from);
                let mut expected = reference.range(from..);
                for _ in 0..steps {
                    match cursor.record() {
                        Some((k, v)) => {
                            assert_eq!(expected.next(), Some((&k, &v)));
                        }
                        None => break,
                    }
                    if !cursor.advance() {
                        break;
                    }
                }
            }
        }
    }

    let report = verify_tree(&tree);
    assert!(report.success, "{:?}", report.findings);
});
