//! Property tests for the greedy rewriter over randomized streams.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vassago_core::{CompressionFlags, IntFormat};
use vassago_intcomp::{AbbrevAssignWriter, CountId, CountKind, CountTrie, CounterWriter};
use vassago_interp::{ByteStreamWriter, Writer};
use vassago_stream::{ByteReader, ByteStream};

fn flags(limit: usize) -> CompressionFlags {
    CompressionFlags::default()
        .with_length_limit(limit)
        .with_count_cutoff(3)
        .with_weight_cutoff(8)
}

fn random_stream(seed: u64, len: usize, alphabet: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..alphabet)).collect()
}

fn build_model(values: &[u64], flags: &CompressionFlags) -> (CountTrie, Vec<CountId>) {
    let mut trie = CountTrie::new();
    {
        let mut counter = CounterWriter::new(&mut trie, flags.length_limit);
        for &v in values {
            counter.write_value(v, IntFormat::Varuint64).unwrap();
        }
        counter.write_freeze_eof().unwrap();
    }
    trie.prune(flags.count_cutoff, flags.weight_cutoff);
    let assignments = trie.assign_abbreviations();
    (trie, assignments)
}

fn rewrite(values: &[u64], trie: &CountTrie, flags: &CompressionFlags) -> Vec<u8> {
    let out = ByteStream::new().into_shared();
    let mut rewriter =
        AbbrevAssignWriter::new(trie, ByteStreamWriter::new(out.clone()), flags, None);
    for &v in values {
        rewriter.write_value(v, IntFormat::Varuint64).unwrap();
    }
    rewriter.write_freeze_eof().unwrap();
    let bytes = out.borrow().as_slice().to_vec();
    bytes
}

/// Decode the rewriter's output back to values using the assignment set.
fn decode(bytes: &[u8], trie: &CountTrie, assignments: &[CountId]) -> Vec<(usize, Vec<u64>)> {
    let mut reader = ByteReader::new(ByteStream::frozen_from(bytes.to_vec()).into_shared());
    let mut groups = Vec::new();
    while !reader.at_byte_eob() {
        let index = reader.read_varuint32().unwrap() as usize;
        let nd = assignments[index];
        let values = match trie.kind(nd) {
            CountKind::Int => trie.path(nd),
            CountKind::DefaultSingle => vec![reader.read_varint64().unwrap()],
            CountKind::DefaultMultiple => {
                let count = reader.read_varuint32().unwrap();
                (0..count).map(|_| reader.read_varint64().unwrap()).collect()
            }
            other => panic!("unexpected group kind {other:?} in a pure value stream"),
        };
        groups.push((index, values));
    }
    groups
}

#[test]
fn test_rewriter_coverage_over_random_streams() {
    // Every input value appears in exactly one emitted group, in order.
    for seed in 0..8u64 {
        let flags = flags(4);
        let values = random_stream(seed, 600, 6);
        let (trie, assignments) = build_model(&values, &flags);
        let bytes = rewrite(&values, &trie, &flags);
        let groups = decode(&bytes, &trie, &assignments);

        let decoded: Vec<u64> = groups.into_iter().flat_map(|(_, vs)| vs).collect();
        assert_eq!(decoded, values, "coverage failed for seed {seed}");
    }
}

#[test]
fn test_longest_match_over_random_streams() {
    // At every abbreviation emission there is no longer assigned path
    // matching the stream at that position.
    for seed in 0..8u64 {
        let flags = flags(4);
        let values = random_stream(seed, 400, 4);
        let (trie, assignments) = build_model(&values, &flags);
        let bytes = rewrite(&values, &trie, &flags);
        let groups = decode(&bytes, &trie, &assignments);

        let mut pos = 0usize;
        for (index, group_values) in groups {
            let nd = assignments[index];
            if trie.kind(nd) == CountKind::Int {
                let len = group_values.len();
                // Probe every longer window starting at this position.
                for longer in (len + 1)..=flags.length_limit {
                    if pos + longer > values.len() {
                        break;
                    }
                    let mut cur = trie.root();
                    let mut assigned_deeper = false;
                    for &v in &values[pos..pos + longer] {
                        match trie.find(cur, v) {
                            Some(next) => {
                                cur = next;
                                assigned_deeper = trie.abbrev_index(cur).is_some();
                            }
                            None => {
                                assigned_deeper = false;
                                break;
                            }
                        }
                    }
                    assert!(
                        !(assigned_deeper && trie.path_len(cur) as usize == longer),
                        "seed {seed}: longer match of length {longer} missed at {pos}"
                    );
                }
            }
            pos += group_values.len();
        }
        assert_eq!(pos, values.len());
    }
}

#[test]
fn test_rewriter_emits_only_assigned_indices() {
    let flags = flags(3);
    let values = random_stream(77, 300, 5);
    let (trie, assignments) = build_model(&values, &flags);
    let bytes = rewrite(&values, &trie, &flags);

    let mut reader = ByteReader::new(ByteStream::frozen_from(bytes).into_shared());
    while !reader.at_byte_eob() {
        let index = reader.read_varuint32().unwrap() as usize;
        assert!(
            index < assignments.len(),
            "emitted index {index} outside the assignment set"
        );
        let nd = assignments[index];
        match trie.kind(nd) {
            CountKind::DefaultSingle => {
                reader.read_varint64().unwrap();
            }
            CountKind::DefaultMultiple => {
                let count = reader.read_varuint32().unwrap();
                for _ in 0..count {
                    reader.read_varint64().unwrap();
                }
            }
            _ => {}
        }
    }
}
