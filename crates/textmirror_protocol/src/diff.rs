//! Text diffing.
//!
//! Diffs run over Unicode scalar values, so a patch boundary never lands
//! inside a surrogate pair, and are then expressed in UTF-16 code units.

use crate::patch::Patch;

/// Edit distance above which the diff gives up on a minimal script and
/// replaces the whole changed region instead.
const MAX_EDIT_COST: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal(usize),
    Delete(usize),
    Insert(usize),
}

/// Collects single-character steps into runs.
///
/// Deletions and insertions between two equal runs are gathered into one
/// deletion followed by one insertion.
#[derive(Default)]
struct EditScript {
    edits: Vec<Edit>,
    equal: usize,
    delete: usize,
    insert: usize,
}

impl EditScript {
    fn equal(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.flush_changes();
        self.equal += n;
    }

    fn delete(&mut self, n: usize) {
        self.flush_equal();
        self.delete += n;
    }

    fn insert(&mut self, n: usize) {
        self.flush_equal();
        self.insert += n;
    }

    fn flush_equal(&mut self) {
        if self.equal > 0 {
            self.edits.push(Edit::Equal(self.equal));
            self.equal = 0;
        }
    }

    fn flush_changes(&mut self) {
        if self.delete > 0 {
            self.edits.push(Edit::Delete(self.delete));
            self.delete = 0;
        }
        if self.insert > 0 {
            self.edits.push(Edit::Insert(self.insert));
            self.insert = 0;
        }
    }

    fn finish(mut self) -> Vec<Edit> {
        self.flush_equal();
        self.flush_changes();
        self.edits
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Equal,
    Delete,
    Insert,
}

/// Myers' greedy shortest edit script.
///
/// Returns the steps in order, or `None` when the edit distance exceeds
/// `MAX_EDIT_COST`. Only the diagonals reachable at each cost are kept in
/// the trace, so memory grows with the square of the edit distance rather
/// than with the input length.
fn shortest_edit(old: &[char], new: &[char]) -> Option<Vec<Step>> {
    let n = old.len() as isize;
    let m = new.len() as isize;
    let limit = (old.len() + new.len()).min(MAX_EDIT_COST);
    let offset = limit as isize + 1;

    let mut v = vec![0isize; 2 * limit + 3];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    let mut cost = None;
    'search: for d in 0..=limit as isize {
        let lo = (offset - d - 1) as usize;
        let hi = (offset + d + 1) as usize;
        trace.push(v[lo..=hi].to_vec());

        for k in (-d..=d).step_by(2) {
            let at = |k: isize| (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[at(k - 1)] < v[at(k + 1)]) {
                v[at(k + 1)]
            } else {
                v[at(k - 1)] + 1
            };
            let mut y = x - k;
            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            v[at(k)] = x;
            if x >= n && y >= m {
                cost = Some(d);
                break 'search;
            }
        }
    }
    let cost = cost?;

    let mut steps = Vec::new();
    let (mut x, mut y) = (n, m);
    for d in (0..=cost).rev() {
        let window = &trace[d as usize];
        let at = |k: isize| window[(k + d + 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            steps.push(Step::Equal);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            steps.push(if x == prev_x { Step::Insert } else { Step::Delete });
        }
        x = prev_x;
        y = prev_y;
    }
    steps.reverse();
    Some(steps)
}

fn edit_script(old: &[char], new: &[char]) -> Vec<Edit> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let old_rest = &old[prefix..];
    let new_rest = &new[prefix..];
    let suffix = old_rest
        .iter()
        .rev()
        .zip(new_rest.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old_rest[..old_rest.len() - suffix];
    let new_mid = &new_rest[..new_rest.len() - suffix];

    let mut script = EditScript::default();
    script.equal(prefix);
    match shortest_edit(old_mid, new_mid) {
        Some(steps) => {
            for step in steps {
                match step {
                    Step::Equal => script.equal(1),
                    Step::Delete => script.delete(1),
                    Step::Insert => script.insert(1),
                }
            }
        }
        None => {
            script.delete(old_mid.len());
            script.insert(new_mid.len());
        }
    }
    script.equal(suffix);
    script.finish()
}

fn utf16_len(chars: &[char]) -> usize {
    chars.iter().map(|c| c.len_utf16()).sum()
}

/// Computes the patches turning `before` into `after`.
///
/// Ranges are UTF-16 code-unit offsets into `before`, ascending. A deletion
/// immediately followed by an insertion becomes one replacement patch.
pub fn diff(before: &str, after: &str) -> Vec<Patch> {
    let old: Vec<char> = before.chars().collect();
    let new: Vec<char> = after.chars().collect();

    let mut patches: Vec<Patch> = Vec::new();
    let mut offset = 0;
    let (mut i, mut j) = (0, 0);
    for edit in edit_script(&old, &new) {
        match edit {
            Edit::Equal(n) => {
                offset += utf16_len(&old[i..i + n]);
                i += n;
                j += n;
            }
            Edit::Delete(n) => {
                let len = utf16_len(&old[i..i + n]);
                patches.push(Patch::delete(offset..offset + len));
                offset += len;
                i += n;
            }
            Edit::Insert(n) => {
                let content: String = new[j..j + n].iter().collect();
                match patches.last_mut() {
                    Some(last) if last.range.end == offset && last.content.is_empty() => {
                        last.content = content;
                    }
                    _ => patches.push(Patch::insert(offset, content)),
                }
                j += n;
            }
        }
    }
    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::apply;
    use proptest::prelude::*;
    use textmirror_testkit::{edited_text_strategy, text_strategy, PropTestConfig};

    #[test]
    fn identical_texts_have_no_patches() {
        assert!(diff("same", "same").is_empty());
        assert!(diff("", "").is_empty());
    }

    #[test]
    fn single_character_change_is_one_replacement() {
        let patches = diff("hello world", "hallo world");
        assert_eq!(patches, vec![Patch::new(1..2, "a")]);
        assert_eq!(apply("hello world", &patches).unwrap(), "hallo world");
    }

    #[test]
    fn pure_insert_and_delete() {
        assert_eq!(diff("ac", "abc"), vec![Patch::insert(1, "b")]);
        assert_eq!(diff("abc", "ac"), vec![Patch::delete(1..2)]);
        assert_eq!(diff("", "new"), vec![Patch::insert(0, "new")]);
        assert_eq!(diff("old", ""), vec![Patch::delete(0..3)]);
    }

    #[test]
    fn ranges_refer_to_the_original_text() {
        let patches = diff("the cat sat", "a cat sat down");
        for pair in patches.windows(2) {
            assert!(pair[0].range.end <= pair[1].range.start);
        }
        assert_eq!(apply("the cat sat", &patches).unwrap(), "a cat sat down");
    }

    #[test]
    fn offsets_are_code_units() {
        let patches = diff("😀a", "😀b");
        assert_eq!(patches, vec![Patch::new(2..3, "b")]);
    }

    #[test]
    fn shared_high_surrogate_is_not_split() {
        // U+1F600 and U+1F601 share their high surrogate.
        let patches = diff("x😀y", "x😁y");
        assert_eq!(patches, vec![Patch::new(1..3, "😁")]);
    }

    #[test]
    fn large_rewrites_fall_back_to_one_replacement() {
        let before: String = (0..3000).map(|i| if i % 2 == 0 { 'a' } else { 'b' }).collect();
        let after: String = (0..3000).map(|i| if i % 3 == 0 { 'c' } else { 'd' }).collect();
        let patches = diff(&before, &after);
        assert_eq!(apply(&before, &patches).unwrap(), after);
    }

    proptest! {
        #![proptest_config(PropTestConfig::default().to_proptest_config())]

        #[test]
        fn apply_inverts_diff(before in text_strategy(0..64), after in text_strategy(0..64)) {
            let patches = diff(&before, &after);
            prop_assert_eq!(apply(&before, &patches).unwrap(), after);
        }

        #[test]
        fn apply_inverts_diff_for_small_edits((before, after) in edited_text_strategy()) {
            let patches = diff(&before, &after);
            prop_assert_eq!(apply(&before, &patches).unwrap(), after);
        }

        #[test]
        fn patches_are_sorted_and_disjoint(before in text_strategy(0..64), after in text_strategy(0..64)) {
            let patches = diff(&before, &after);
            for pair in patches.windows(2) {
                prop_assert!(pair[0].range.end < pair[1].range.start);
            }
        }
    }
}
