//! Structural verification for whole trees.
//!
//! Walks every block checking the ordering, separator, occupancy, leaf-chain
//! and counter invariants, reporting what it finds instead of panicking. The
//! test suites run a pass after every mutation phase.

use crate::block::{BlockId, HALF};
use crate::tree::{BPlusTree, TreeCore};

const MAX_FINDINGS: usize = 32;

/// Tallies collected while walking a tree.
#[derive(Default, Debug, Clone, Copy)]
pub struct VerifyCounts {
    /// Records found in the leaves.
    pub records: u64,
    /// Blocks reachable from the root.
    pub blocks: u64,
    /// Leaves reachable from the root.
    pub leaves: u64,
    /// Index layers above the leaves.
    pub depth: usize,
}

/// Outcome of a verification pass.
#[derive(Debug)]
pub struct VerifyReport {
    /// Whether every check passed.
    pub success: bool,
    /// Issues discovered, capped at a small fixed number.
    pub findings: Vec<String>,
    /// What the walk saw.
    pub counts: VerifyCounts,
}

/// Check every structural invariant of `tree`.
pub fn verify_tree(tree: &BPlusTree) -> VerifyReport {
    let core = tree.core.borrow();
    let mut walker = Walker {
        core: &core,
        findings: Vec::new(),
        visited_blocks: 0,
        records: 0,
        leaves: Vec::new(),
    };

    walker.walk(core.root, core.depth, true);
    walker.check_leaf_chain();
    walker.check_counters();

    let counts = VerifyCounts {
        records: walker.records,
        blocks: walker.visited_blocks,
        leaves: walker.leaves.len() as u64,
        depth: core.depth,
    };
    VerifyReport {
        success: walker.findings.is_empty(),
        findings: walker.findings,
        counts,
    }
}

struct Walker<'a> {
    core: &'a TreeCore,
    findings: Vec<String>,
    visited_blocks: u64,
    records: u64,
    /// Leaves in the key order the index imposes.
    leaves: Vec<BlockId>,
}

impl Walker<'_> {
    fn note(&mut self, message: String) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(message);
        }
    }

    /// Returns the (min, max) keys of the subtree, or `None` for an empty
    /// leaf (legal only as the root of an empty tree).
    fn walk(&mut self, node_id: BlockId, depth_left: usize, is_root: bool) -> Option<(u64, u64)> {
        self.visited_blocks += 1;
        let node = self.core.block(node_id);
        let nk = node.num_keys();
        for i in 1..nk {
            if node.key(i - 1) >= node.key(i) {
                self.note(format!(
                    "block {}: keys out of order at {} ({} >= {})",
                    node_id.raw(),
                    i,
                    node.key(i - 1),
                    node.key(i)
                ));
            }
        }

        if depth_left == 0 {
            if !is_root && nk < HALF {
                self.note(format!(
                    "leaf {}: {} keys is below minimum occupancy",
                    node_id.raw(),
                    nk
                ));
            }
            self.records += nk as u64;
            self.leaves.push(node_id);
            if nk == 0 {
                if !is_root {
                    self.note(format!("leaf {}: empty below an index layer", node_id.raw()));
                }
                return None;
            }
            return Some((node.key(0), node.key(nk - 1)));
        }

        if nk < if is_root { 1 } else { HALF } {
            self.note(format!(
                "index block {}: {} keys is below minimum occupancy",
                node_id.raw(),
                nk
            ));
        }
        let mut bounds: Option<(u64, u64)> = None;
        for slot in 0..=nk {
            let child = node.child(slot);
            let Some((lo, hi)) = self.walk(child, depth_left - 1, false) else {
                continue;
            };
            if slot > 0 {
                let separator = node.key(slot - 1);
                if lo != separator {
                    self.note(format!(
                        "index block {}: separator {} does not equal leftmost key {} of its right subtree",
                        node_id.raw(),
                        separator,
                        lo
                    ));
                }
            }
            if slot < nk && hi >= node.key(slot) {
                self.note(format!(
                    "index block {}: subtree max {} reaches separator {}",
                    node_id.raw(),
                    hi,
                    node.key(slot)
                ));
            }
            bounds = match bounds {
                None => Some((lo, hi)),
                Some((min, _)) => Some((min, hi)),
            };
        }
        bounds
    }

    /// The chain must visit exactly the leaves the index reaches, in the same
    /// order, with keys ascending across the seams.
    fn check_leaf_chain(&mut self) {
        let mut chained = Vec::new();
        let mut node = self.core.leaves;
        let mut prev_key: Option<u64> = None;
        loop {
            chained.push(node);
            let leaf = self.core.block(node);
            for i in 0..leaf.num_keys() {
                let key = leaf.key(i);
                if let Some(prev) = prev_key {
                    if prev >= key {
                        self.note(format!(
                            "leaf chain: key {} does not ascend past {}",
                            key, prev
                        ));
                    }
                }
                prev_key = Some(key);
            }
            match leaf.next_leaf() {
                Some(next) => node = next,
                None => break,
            }
        }
        if chained != self.leaves {
            self.note(format!(
                "leaf chain ({} leaves) disagrees with the index ({} leaves reachable)",
                chained.len(),
                self.leaves.len()
            ));
        }
    }

    fn check_counters(&mut self) {
        if self.records != self.core.num_records {
            self.note(format!(
                "record counter {} does not match {} records found",
                self.core.num_records, self.records
            ));
        }
        if self.visited_blocks != self.core.num_blocks {
            self.note(format!(
                "block counter {} does not match {} blocks reachable",
                self.core.num_blocks, self.visited_blocks
            ));
        }
        let occupied = self.core.blocks.iter().filter(|slot| slot.is_some()).count() as u64;
        if occupied != self.core.num_blocks {
            self.note(format!(
                "block table holds {} blocks, counter says {}",
                occupied, self.core.num_blocks
            ));
        }
    }
}
