//! Seeded randomized checks for the text diff service: edit-script images,
//! hunk round-trips, and three-way merge anchors.

use patchdag_core::diff::hunk;
use patchdag_core::diff::merge::three_way_merge;
use patchdag_core::diff::str::{diff, invert, source, target};
use patchdag_util::Fuzzer;

/// A plausible edit of `text`: splice a random replacement into a random
/// span.
fn mutate(text: &str, fuzzer: &Fuzzer) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return fuzzer.string(fuzzer.int(0, 12) as usize);
    }
    let start = fuzzer.int(0, chars.len() as i64 - 1) as usize;
    let end = fuzzer.int(start as i64, chars.len() as i64) as usize;
    let replacement = fuzzer.string(fuzzer.int(0, 8) as usize);
    let mut out: String = chars[..start].iter().collect();
    out.push_str(&replacement);
    out.extend(chars[end..].iter());
    out
}

#[test]
fn diff_images_hold_for_random_pairs() {
    for seed in 0..300u64 {
        let f = Fuzzer::from_u64(seed);
        let a = f.string(f.int(0, 60) as usize);
        let b = if f.chance(0.5) {
            mutate(&a, &f)
        } else {
            f.string(f.int(0, 60) as usize)
        };
        let d = diff(&a, &b);
        assert_eq!(source(&d), a, "seed {seed}");
        assert_eq!(target(&d), b, "seed {seed}");
        let inv = invert(&d);
        assert_eq!(source(&inv), b, "seed {seed}");
        assert_eq!(target(&inv), a, "seed {seed}");
    }
}

#[test]
fn hunk_patches_round_trip_on_random_edits() {
    for seed in 0..300u64 {
        let f = Fuzzer::from_u64(seed);
        let mut text = f.string(f.int(0, 50) as usize);
        // Walk a chain of edits, patching forward each step.
        for _ in 0..4 {
            let next = mutate(&text, &f);
            let patch = hunk::make(&text, &next);
            let (out, clean) = hunk::apply(&patch, &text);
            assert!(clean, "seed {seed}: {text:?} -> {next:?}");
            assert_eq!(out, next, "seed {seed}");
            text = next;
        }
    }
}

#[test]
fn hunk_wire_encoding_round_trips() {
    for seed in 0..100u64 {
        let f = Fuzzer::from_u64(seed);
        let a = f.string(f.int(0, 40) as usize);
        let b = mutate(&a, &f);
        let patch = hunk::make(&a, &b);
        let json = serde_json::to_string(&patch).unwrap();
        let back: hunk::TextPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, patch, "seed {seed}");
    }
}

#[test]
fn three_way_merge_anchors_hold() {
    for seed in 0..200u64 {
        let f = Fuzzer::from_u64(seed);
        let base = f.string(f.int(0, 40) as usize);
        let local = mutate(&base, &f);
        let remote = mutate(&base, &f);

        // Degenerate inputs resolve without weaving.
        assert_eq!(three_way_merge(&base, &local, &local), local, "seed {seed}");
        assert_eq!(three_way_merge(&base, &local, &base), local, "seed {seed}");
        assert_eq!(three_way_merge(&base, &base, &remote), remote, "seed {seed}");

        // The weave is deterministic.
        let once = three_way_merge(&base, &local, &remote);
        let again = three_way_merge(&base, &local, &remote);
        assert_eq!(once, again, "seed {seed}");
    }
}
