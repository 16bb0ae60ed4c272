//! Context-hunk text patches.
//!
//! A hunk groups a run of edits with up to [`PATCH_MARGIN`] characters of
//! surrounding context, positioned by `start1`/`start2` (char offsets into
//! the source and target). Application matches each hunk's source text at the
//! expected location first, then at the nearest exact occurrence; a hunk that
//! matches nowhere is skipped and flips the cleanliness flag.
//!
//! Wire form of a hunk: `[[[op, text], …], start1, start2, length1, length2]`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::str::{diff, DiffList, DiffOpKind};

/// Characters of equal context kept on each side of a hunk.
pub const PATCH_MARGIN: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Hunk {
    pub diffs: DiffList,
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
}

pub type TextPatch = Vec<Hunk>;

impl Hunk {
    fn source_chars(&self) -> Vec<char> {
        self.diffs
            .iter()
            .filter(|(k, _)| *k != DiffOpKind::Insert)
            .flat_map(|(_, t)| t.chars())
            .collect()
    }

    fn target_chars(&self) -> Vec<char> {
        self.diffs
            .iter()
            .filter(|(k, _)| *k != DiffOpKind::Delete)
            .flat_map(|(_, t)| t.chars())
            .collect()
    }
}

/// Build a hunk patch transforming `src` into `dst`.
pub fn make(src: &str, dst: &str) -> TextPatch {
    from_diffs(diff(src, dst))
}

/// Group an edit script into context hunks.
pub fn from_diffs(ops: DiffList) -> TextPatch {
    let mut patch = Vec::new();
    let mut hunk: Option<Hunk> = None;
    let mut pos1 = 0usize;
    let mut pos2 = 0usize;
    let mut prev_equal: Vec<char> = Vec::new();
    let count = ops.len();

    for (i, (kind, text)) in ops.into_iter().enumerate() {
        let chars: Vec<char> = text.chars().collect();
        match kind {
            DiffOpKind::Equal => {
                if let Some(mut h) = hunk.take() {
                    if chars.len() <= 2 * PATCH_MARGIN && i + 1 < count {
                        // Small equality between edits stays inside the hunk.
                        h.diffs.push((DiffOpKind::Equal, text));
                        hunk = Some(h);
                    } else {
                        let ctx_len = chars.len().min(PATCH_MARGIN);
                        if ctx_len > 0 {
                            h.diffs
                                .push((DiffOpKind::Equal, chars[..ctx_len].iter().collect()));
                        }
                        patch.push(finish(h));
                    }
                }
                prev_equal = chars;
                pos1 += prev_equal.len();
                pos2 += prev_equal.len();
            }
            DiffOpKind::Delete | DiffOpKind::Insert => {
                let h = hunk.get_or_insert_with(|| {
                    let ctx_len = prev_equal.len().min(PATCH_MARGIN);
                    let mut diffs = Vec::new();
                    if ctx_len > 0 {
                        diffs.push((
                            DiffOpKind::Equal,
                            prev_equal[prev_equal.len() - ctx_len..].iter().collect(),
                        ));
                    }
                    Hunk {
                        diffs,
                        start1: pos1 - ctx_len,
                        start2: pos2 - ctx_len,
                        length1: 0,
                        length2: 0,
                    }
                });
                h.diffs.push((kind, text));
                if kind == DiffOpKind::Delete {
                    pos1 += chars.len();
                } else {
                    pos2 += chars.len();
                }
            }
        }
    }
    if let Some(h) = hunk {
        patch.push(finish(h));
    }
    patch
}

fn finish(mut h: Hunk) -> Hunk {
    h.length1 = h
        .diffs
        .iter()
        .filter(|(k, _)| *k != DiffOpKind::Insert)
        .map(|(_, t)| t.chars().count())
        .sum();
    h.length2 = h
        .diffs
        .iter()
        .filter(|(k, _)| *k != DiffOpKind::Delete)
        .map(|(_, t)| t.chars().count())
        .sum();
    h
}

/// Apply `patch` to `text`. Returns the patched text and `true` when every
/// hunk matched; a hunk whose source text is found nowhere is skipped and the
/// flag comes back `false`.
pub fn apply(patch: &TextPatch, text: &str) -> (String, bool) {
    let mut chars: Vec<char> = text.chars().collect();
    let mut clean = true;
    let mut delta: isize = 0;

    for h in patch {
        let needle = h.source_chars();
        let repl = h.target_chars();
        let expected = (h.start1 as isize + delta).clamp(0, chars.len() as isize) as usize;

        let pos = if needle.is_empty() {
            Some(expected)
        } else {
            find_near(&chars, &needle, expected)
        };
        match pos {
            None => clean = false,
            Some(p) => {
                chars.splice(p..p + needle.len(), repl.iter().copied());
                delta = (p + repl.len()) as isize - (h.start1 + needle.len()) as isize;
            }
        }
    }
    (chars.into_iter().collect(), clean)
}

/// Exact occurrence of `needle` nearest to `expected`, if any.
fn find_near(haystack: &[char], needle: &[char], expected: usize) -> Option<usize> {
    let last = haystack.len().checked_sub(needle.len())?;
    if expected <= last && haystack[expected..expected + needle.len()] == *needle {
        return Some(expected);
    }
    let mut best: Option<(usize, usize)> = None;
    for i in 0..=last {
        if haystack[i..i + needle.len()] == *needle {
            let dist = expected.abs_diff(i);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((i, dist));
            }
        }
    }
    best.map(|(i, _)| i)
}

impl Serialize for Hunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let diffs: Vec<(i8, &str)> = self
            .diffs
            .iter()
            .map(|(k, t)| (k.code(), t.as_str()))
            .collect();
        (diffs, self.start1, self.start2, self.length1, self.length2).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Hunk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        type Wire = (Vec<(i8, String)>, usize, usize, usize, usize);
        let (raw, start1, start2, length1, length2) = Wire::deserialize(deserializer)?;
        let diffs = raw
            .into_iter()
            .map(|(code, text)| {
                DiffOpKind::from_code(code)
                    .map(|k| (k, text))
                    .ok_or_else(|| D::Error::custom(format!("unknown diff op code {code}")))
            })
            .collect::<Result<DiffList, _>>()?;
        Ok(Hunk {
            diffs,
            start1,
            start2,
            length1,
            length2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_applies_cleanly() {
        let cases = [
            ("", "hello"),
            ("hello", ""),
            ("hello", "hello world"),
            ("hello world", "goodbye world"),
            ("the quick brown fox jumps", "the slow brown dog sleeps"),
            ("aaaa bbbb cccc", "aaaa XXXX cccc"),
        ];
        for (a, b) in cases {
            let p = make(a, b);
            let (out, clean) = apply(&p, a);
            assert_eq!(out, b, "{a:?} -> {b:?}");
            assert!(clean, "{a:?} -> {b:?}");
        }
    }

    #[test]
    fn applies_with_drift() {
        // Same edit, shifted context: the hunk should still land.
        let p = make("hello world", "hello brave world");
        let (out, clean) = apply(&p, "XX hello world");
        assert_eq!(out, "XX hello brave world");
        assert!(clean);
    }

    #[test]
    fn unmatched_hunk_is_skipped() {
        let p = make("hello world", "hello brave world");
        let (out, clean) = apply(&p, "entirely different text");
        assert_eq!(out, "entirely different text");
        assert!(!clean);
    }

    #[test]
    fn wire_form_round_trips() {
        let p = make("one two three", "one 2 three four");
        let json = serde_json::to_string(&p).unwrap();
        let back: TextPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
        // Shape check: every hunk is [[ops], start1, start2, len1, len2].
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        let hunk = &v.as_array().unwrap()[0];
        assert_eq!(hunk.as_array().unwrap().len(), 5);
        assert!(hunk[0].is_array());
    }

    #[test]
    fn rejects_unknown_op_codes() {
        let bad = r#"[[[[7, "x"]], 0, 0, 1, 1]]"#;
        assert!(serde_json::from_str::<TextPatch>(bad).is_err());
    }
}
