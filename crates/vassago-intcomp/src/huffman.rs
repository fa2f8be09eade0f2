//! Huffman coding of abbreviation indices.
//!
//! Built over the assignment set by standard two-smallest weight merge.
//! The tree is what the code generator serializes (as a
//! `BinaryEval(BinarySelect..., BinaryAccept)` decoder); the flat code
//! table drives the rewriter's bit emission. First-kid edges carry bit 0,
//! second-kid edges bit 1, codes are written MSB-first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A node of the encoding tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuffmanNode {
    /// Internal selector with two kids.
    Selector {
        weight: u64,
        kid1: Box<HuffmanNode>,
        kid2: Box<HuffmanNode>,
    },
    /// Leaf accepting one abbreviation index.
    Symbol { weight: u64, index: u32 },
}

impl HuffmanNode {
    /// Combined weight of the subtree.
    pub fn weight(&self) -> u64 {
        match self {
            HuffmanNode::Selector { weight, .. } => *weight,
            HuffmanNode::Symbol { weight, .. } => *weight,
        }
    }
}

struct HeapEntry {
    weight: u64,
    seq: u64,
    node: HuffmanNode,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the lightest first.
        other
            .weight
            .cmp(&self.weight)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Build the encoding tree over `(index, weight)` pairs.
///
/// Returns `None` for fewer than two symbols; a lone symbol needs no
/// bits and the format-coded path handles it better.
pub fn build_encoding(symbols: &[(u32, u64)]) -> Option<HuffmanNode> {
    if symbols.len() < 2 {
        return None;
    }
    let mut seq = 0u64;
    let mut heap: BinaryHeap<HeapEntry> = symbols
        .iter()
        .map(|&(index, weight)| {
            let entry = HeapEntry {
                weight,
                seq,
                node: HuffmanNode::Symbol { weight, index },
            };
            seq += 1;
            entry
        })
        .collect();
    while heap.len() > 1 {
        let first = heap.pop().expect("two entries remain");
        let second = heap.pop().expect("two entries remain");
        let weight = first.weight + second.weight;
        heap.push(HeapEntry {
            weight,
            seq,
            node: HuffmanNode::Selector {
                weight,
                kid1: Box::new(first.node),
                kid2: Box::new(second.node),
            },
        });
        seq += 1;
    }
    heap.pop().map(|entry| entry.node)
}

/// Flat code table derived from an encoding tree.
#[derive(Debug, Clone)]
pub struct HuffmanCodes {
    codes: Vec<Option<(u64, u32)>>,
}

impl HuffmanCodes {
    /// Walk `root` assigning codes to every leaf.
    pub fn from_tree(root: &HuffmanNode) -> Self {
        let mut codes = HuffmanCodes { codes: Vec::new() };
        codes.walk(root, 0, 0);
        codes
    }

    fn walk(&mut self, node: &HuffmanNode, code: u64, bits: u32) {
        match node {
            HuffmanNode::Selector { kid1, kid2, .. } => {
                self.walk(kid1, code << 1, bits + 1);
                self.walk(kid2, (code << 1) | 1, bits + 1);
            }
            HuffmanNode::Symbol { index, .. } => {
                let slot = *index as usize;
                if self.codes.len() <= slot {
                    self.codes.resize(slot + 1, None);
                }
                self.codes[slot] = Some((code, bits));
            }
        }
    }

    /// `(code, bit count)` for an abbreviation index.
    pub fn code(&self, index: u32) -> Option<(u64, u32)> {
        self.codes.get(index as usize).copied().flatten()
    }

    /// Longest code length in the table.
    pub fn max_bits(&self) -> u32 {
        self.codes
            .iter()
            .flatten()
            .map(|&(_, bits)| bits)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_symbol_declines() {
        assert!(build_encoding(&[(0, 10)]).is_none());
        assert!(build_encoding(&[]).is_none());
    }

    #[test]
    fn test_two_symbols_one_bit_each() {
        let tree = build_encoding(&[(0, 5), (1, 5)]).unwrap();
        let codes = HuffmanCodes::from_tree(&tree);
        assert_eq!(codes.code(0).unwrap().1, 1);
        assert_eq!(codes.code(1).unwrap().1, 1);
        assert_ne!(codes.code(0), codes.code(1));
    }

    #[test]
    fn test_frequent_symbol_gets_short_code() {
        let tree = build_encoding(&[(0, 100), (1, 10), (2, 5), (3, 1)]).unwrap();
        let codes = HuffmanCodes::from_tree(&tree);
        let frequent = codes.code(0).unwrap().1;
        let rare = codes.code(3).unwrap().1;
        assert!(
            frequent <= rare,
            "more frequent symbol must not get a longer code"
        );
    }

    #[test]
    fn test_codes_are_prefix_free() {
        let tree = build_encoding(&[(0, 7), (1, 3), (2, 3), (3, 2), (4, 1)]).unwrap();
        let codes = HuffmanCodes::from_tree(&tree);
        let all: Vec<(u64, u32)> = (0..5).map(|i| codes.code(i).unwrap()).collect();
        for (i, &(code_a, bits_a)) in all.iter().enumerate() {
            for (j, &(code_b, bits_b)) in all.iter().enumerate() {
                if i == j {
                    continue;
                }
                let min_bits = bits_a.min(bits_b);
                assert_ne!(
                    code_a >> (bits_a - min_bits),
                    code_b >> (bits_b - min_bits),
                    "codes {i} and {j} share a prefix"
                );
            }
        }
    }

    #[test]
    fn test_merge_is_deterministic() {
        let symbols = [(0u32, 4u64), (1, 4), (2, 4), (3, 4)];
        let a = build_encoding(&symbols).unwrap();
        let b = build_encoding(&symbols).unwrap();
        assert_eq!(a, b);
    }
}
