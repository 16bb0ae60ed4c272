//! Character-level diffs as runs of `(op, text)`.
//!
//! The algorithm is the classic Myers bisect: trim the common prefix and
//! suffix, handle containment and single-character shortcuts, then find a
//! middle snake and recurse on the halves. A cleanup pass coalesces adjacent
//! runs and factors shared affixes of changed regions back into equalities.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOpKind {
    Delete,
    Equal,
    Insert,
}

impl DiffOpKind {
    /// Wire code: -1 delete, 0 equal, 1 insert.
    pub fn code(self) -> i8 {
        match self {
            DiffOpKind::Delete => -1,
            DiffOpKind::Equal => 0,
            DiffOpKind::Insert => 1,
        }
    }

    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            -1 => Some(DiffOpKind::Delete),
            0 => Some(DiffOpKind::Equal),
            1 => Some(DiffOpKind::Insert),
            _ => None,
        }
    }
}

pub type DiffOp = (DiffOpKind, String);
pub type DiffList = Vec<DiffOp>;

/// Diff `src` against `dst` as an ordered edit script.
///
/// Invariants: `source(&diff(a, b)) == a` and `target(&diff(a, b)) == b`.
pub fn diff(src: &str, dst: &str) -> DiffList {
    let a: Vec<char> = src.chars().collect();
    let b: Vec<char> = dst.chars().collect();
    cleanup(diff_slices(&a, &b))
}

/// Concatenation of the equal and delete runs: the pre-image of the diff.
pub fn source(ops: &DiffList) -> String {
    ops.iter()
        .filter(|(k, _)| *k != DiffOpKind::Insert)
        .map(|(_, t)| t.as_str())
        .collect()
}

/// Concatenation of the equal and insert runs: the post-image of the diff.
pub fn target(ops: &DiffList) -> String {
    ops.iter()
        .filter(|(k, _)| *k != DiffOpKind::Delete)
        .map(|(_, t)| t.as_str())
        .collect()
}

/// Swap inserts and deletes, turning a `a → b` diff into `b → a`.
pub fn invert(ops: &DiffList) -> DiffList {
    ops.iter()
        .map(|(k, t)| {
            let k = match k {
                DiffOpKind::Delete => DiffOpKind::Insert,
                DiffOpKind::Insert => DiffOpKind::Delete,
                DiffOpKind::Equal => DiffOpKind::Equal,
            };
            (k, t.clone())
        })
        .collect()
}

fn diff_slices(a: &[char], b: &[char]) -> DiffList {
    if a == b {
        if a.is_empty() {
            return Vec::new();
        }
        return vec![(DiffOpKind::Equal, collect(a))];
    }
    let p = common_prefix(a, b);
    let q = common_suffix(&a[p..], &b[p..]);
    let mut ops = Vec::new();
    if p > 0 {
        ops.push((DiffOpKind::Equal, collect(&a[..p])));
    }
    ops.extend(diff_middle(&a[p..a.len() - q], &b[p..b.len() - q]));
    if q > 0 {
        ops.push((DiffOpKind::Equal, collect(&a[a.len() - q..])));
    }
    ops
}

fn diff_middle(a: &[char], b: &[char]) -> DiffList {
    if a.is_empty() {
        return vec![(DiffOpKind::Insert, collect(b))];
    }
    if b.is_empty() {
        return vec![(DiffOpKind::Delete, collect(a))];
    }

    let (long, short, src_longer) = if a.len() > b.len() {
        (a, b, true)
    } else {
        (b, a, false)
    };
    if let Some(i) = find_subslice(long, short) {
        let kind = if src_longer {
            DiffOpKind::Delete
        } else {
            DiffOpKind::Insert
        };
        let mut ops = Vec::new();
        if i > 0 {
            ops.push((kind, collect(&long[..i])));
        }
        ops.push((DiffOpKind::Equal, collect(short)));
        if i + short.len() < long.len() {
            ops.push((kind, collect(&long[i + short.len()..])));
        }
        return ops;
    }
    if short.len() == 1 {
        return vec![
            (DiffOpKind::Delete, collect(a)),
            (DiffOpKind::Insert, collect(b)),
        ];
    }

    bisect(a, b)
}

/// Myers middle-snake search over forward and backward D-paths; on overlap,
/// split at the snake and diff the halves independently.
fn bisect(a: &[char], b: &[char]) -> DiffList {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let v_offset = max_d;
    let v_len = (2 * max_d + 2) as usize;
    let mut v1 = vec![-1isize; v_len];
    let mut v2 = vec![-1isize; v_len];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;

    let delta = n - m;
    // With an odd delta the overlap can only be detected on the forward pass.
    let front = delta % 2 != 0;
    let mut k1start = 0isize;
    let mut k1end = 0isize;
    let mut k2start = 0isize;
    let mut k2end = 0isize;

    for d in 0..max_d {
        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let ko = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[ko - 1] < v1[ko + 1]) {
                v1[ko + 1]
            } else {
                v1[ko - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < n && y1 < m && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[ko] = x1;
            if x1 > n {
                k1end += 2;
            } else if y1 > m {
                k1start += 2;
            } else if front {
                let k2o = v_offset + delta - k1;
                if (0..v_len as isize).contains(&k2o) && v2[k2o as usize] != -1 {
                    let x2 = n - v2[k2o as usize];
                    if x1 >= x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize);
                    }
                }
            }
            k1 += 2;
        }

        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let ko = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[ko - 1] < v2[ko + 1]) {
                v2[ko + 1]
            } else {
                v2[ko - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < n
                && y2 < m
                && a[(n - x2 - 1) as usize] == b[(m - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            v2[ko] = x2;
            if x2 > n {
                k2end += 2;
            } else if y2 > m {
                k2start += 2;
            } else if !front {
                let k1o = v_offset + delta - k2;
                if (0..v_len as isize).contains(&k1o) && v1[k1o as usize] != -1 {
                    let x1 = v1[k1o as usize];
                    let y1 = x1 - (k1o - v_offset);
                    if x1 >= n - x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize);
                    }
                }
            }
            k2 += 2;
        }
    }

    // No snake found within budget; degrade to replace-all.
    vec![
        (DiffOpKind::Delete, collect(a)),
        (DiffOpKind::Insert, collect(b)),
    ]
}

fn bisect_split(a: &[char], b: &[char], x: usize, y: usize) -> DiffList {
    let mut ops = diff_slices(&a[..x], &b[..y]);
    ops.extend(diff_slices(&a[x..], &b[y..]));
    ops
}

/// Coalesce adjacent runs of the same kind, drop empty runs, and pull shared
/// affixes of delete/insert pairs back into equalities. Preserves the
/// `source`/`target` images.
pub(crate) fn cleanup(ops: DiffList) -> DiffList {
    let mut out: DiffList = Vec::new();
    let mut del = String::new();
    let mut ins = String::new();
    for (kind, text) in ops {
        if text.is_empty() {
            continue;
        }
        match kind {
            DiffOpKind::Delete => del.push_str(&text),
            DiffOpKind::Insert => ins.push_str(&text),
            DiffOpKind::Equal => {
                flush_changed(&mut out, &mut del, &mut ins);
                match out.last_mut() {
                    Some((DiffOpKind::Equal, s)) => s.push_str(&text),
                    _ => out.push((DiffOpKind::Equal, text)),
                }
            }
        }
    }
    flush_changed(&mut out, &mut del, &mut ins);
    out
}

fn flush_changed(out: &mut DiffList, del: &mut String, ins: &mut String) {
    if del.is_empty() && ins.is_empty() {
        return;
    }
    if !del.is_empty() && !ins.is_empty() {
        let dc: Vec<char> = del.chars().collect();
        let ic: Vec<char> = ins.chars().collect();
        let p = common_prefix(&dc, &ic);
        if p > 0 {
            let eq = collect(&dc[..p]);
            match out.last_mut() {
                Some((DiffOpKind::Equal, s)) => s.push_str(&eq),
                _ => out.push((DiffOpKind::Equal, eq)),
            }
        }
        let q = common_suffix(&dc[p..], &ic[p..]);
        if p + q < dc.len() {
            out.push((DiffOpKind::Delete, collect(&dc[p..dc.len() - q])));
        }
        if p + q < ic.len() {
            out.push((DiffOpKind::Insert, collect(&ic[p..ic.len() - q])));
        }
        if q > 0 {
            out.push((DiffOpKind::Equal, collect(&dc[dc.len() - q..])));
        }
    } else if !del.is_empty() {
        out.push((DiffOpKind::Delete, std::mem::take(del)));
    } else {
        out.push((DiffOpKind::Insert, std::mem::take(ins)));
    }
    del.clear();
    ins.clear();
}

pub(crate) fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

pub(crate) fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

fn find_subslice(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

pub(crate) fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}
