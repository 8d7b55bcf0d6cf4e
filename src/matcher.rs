/*!
Locates a parsed [`Path`] inside a document, as absolute byte offsets,
without building a DOM.

Grounded in `match.cc`'s `push_callback`/`pop_callback` (the single-pass
walk, §4.4) and `exec_match_negix` (the negative-index segment driver,
§4.5). The push/pop state machine here tracks exactly one thing at a
time — how many leading path components have been confirmed against the
document so far (`matched_up_to`) — rather than per-node match flags the
way the original's `state->mres` does; since a path names one fixed
chain of keys/indices, there is never more than one candidate container
open at a time that's still "on the chain", and everything off it can be
safely ignored without auxiliary bookkeeping. See DESIGN.md for why this
is equivalent to the original's per-node tracking.
*/

use crate::loc::Loc;
use crate::path::{Component, Path};
use crate::tokenizer::{
    Flow, KeyEvent, NumberFlags, PopEvent, PushEvent, Tokenizer, TokenizeError, ValueKind, Visitor,
};
use crate::uescape;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Complete,
    Possible,
    Nomatch,
    TypeMismatch,
}

/// The result of locating a path (or one segment of a negative-index
/// chain) inside a document. Fields mirror the data model in spec §3.
#[derive(Debug, Clone)]
pub struct Match {
    pub result: MatchResult,
    pub match_level: usize,
    pub kind: Option<ValueKind>,
    pub loc_match: Loc,
    pub loc_key: Loc,
    pub loc_parent: Loc,
    pub position: usize,
    pub num_siblings: usize,
    /// Direct child count of the matched value itself (meaningful only
    /// when it's an object or array) — what `GET_COUNT` reports.
    pub matched_child_count: usize,
    pub immediate_parent_found: bool,
    pub unique_item_found: bool,
    pub number_flags: Option<NumberFlags>,
    /// Byte range and kind of the deepest-matched container's last
    /// child, regardless of whether it was the target — the
    /// negative-index driver's `get_last_child_pos` trick (§4.5 step 2).
    pub last_child_start: Option<usize>,
    pub last_child_end: Option<usize>,
    pub last_child_kind: Option<ValueKind>,
}

impl Match {
    pub(crate) fn searching() -> Self {
        Match {
            result: MatchResult::Nomatch,
            match_level: 0,
            kind: None,
            loc_match: Loc::EMPTY,
            loc_key: Loc::EMPTY,
            loc_parent: Loc::EMPTY,
            position: 0,
            num_siblings: 0,
            matched_child_count: 0,
            immediate_parent_found: false,
            unique_item_found: false,
            number_flags: None,
            last_child_start: None,
            last_child_end: None,
            last_child_kind: None,
        }
    }
}

/// Run the simple (no negative index) matcher: walk `input` starting at
/// `start`, confirming each of `components` in turn.
///
/// `components` always begins with [`Component::Root`] representing
/// whatever value sits at `start` — for the whole document this is
/// `path.components()`; for a later segment of a negative-index chain
/// it's a synthetic one-element-shorter slice standing for "the root of
/// this sub-document".
///
/// When `ensure_unique` is `Some(value)`, a `Complete` match against an
/// array additionally scans the array's own children for one
/// byte-equal to `value` (§4.5's ensure-unique mode), setting
/// `unique_item_found` and possibly promoting the result to
/// `TypeMismatch` if a non-primitive child is seen first.
pub fn exec_match_simple(
    tokenizer: &mut Tokenizer,
    input: &[u8],
    path: &Path<'_>,
    components: &[Component],
    start: usize,
    max_depth: usize,
    ensure_unique: Option<&[u8]>,
) -> Result<Match, TokenizeError> {
    let mut visitor = MatcherVisitor {
        path,
        components,
        input,
        ensure_unique,
        matched_up_to: 0,
        pending_key: None,
        matched_child_index: 0,
        uniqueness_child_start: None,
        m: Match::searching(),
    };
    tokenizer.scan(input, start, max_depth, &mut visitor)?;
    Ok(visitor.m)
}

struct MatcherVisitor<'a> {
    path: &'a Path<'a>,
    components: &'a [Component],
    input: &'a [u8],
    ensure_unique: Option<&'a [u8]>,

    /// Number of leading `components` confirmed so far.
    matched_up_to: usize,
    /// The most recent `on_key` event, valid until the push it precedes.
    pending_key: Option<Loc>,
    /// `index_in_parent` of the push that advanced `matched_up_to` to its
    /// current value — becomes `position` if that push turns out to be
    /// the final (`Complete`) one.
    matched_child_index: usize,
    /// Set while scanning a matched array's children in ensure-unique
    /// mode, to the start offset of the child currently being compared.
    uniqueness_child_start: Option<usize>,

    m: Match,
}

impl<'a> MatcherVisitor<'a> {
    fn component_kind_requirement(c: &Component) -> Option<ValueKind> {
        match c {
            Component::DictKey(_) => Some(ValueKind::Object),
            Component::ArrayIndex(_) | Component::NegativeIndex => Some(ValueKind::Array),
            Component::Root => None,
        }
    }

    fn component_matches(&self, c: &Component, ev: &PushEvent) -> bool {
        match c {
            Component::Root => true,
            Component::DictKey(idx) => {
                if ev.parent_kind != Some(ValueKind::Object) {
                    return false;
                }
                match self.pending_key {
                    Some(key_loc) => {
                        let raw = key_loc.resolve(self.input);
                        // raw includes the surrounding quotes.
                        let raw_key = &raw[1..raw.len() - 1];
                        key_matches(raw_key, self.path.key(*idx))
                    }
                    None => false,
                }
            }
            Component::ArrayIndex(n) => {
                ev.parent_kind == Some(ValueKind::Array) && ev.index_in_parent == *n as usize
            }
            Component::NegativeIndex => false,
        }
    }

    fn finish_type_mismatch(&mut self) -> Flow {
        self.m.result = MatchResult::TypeMismatch;
        Flow::Stop
    }
}

impl<'a> Visitor for MatcherVisitor<'a> {
    fn on_key(&mut self, ev: KeyEvent) -> Flow {
        self.pending_key = Some(ev.loc);
        Flow::Continue
    }

    fn on_push(&mut self, ev: PushEvent) -> Flow {
        // In ensure-unique mode, once the target array has been found,
        // every further push at `match_level + 1` is a candidate child
        // to byte-compare, not a path component to satisfy.
        if self.m.result == MatchResult::Complete && self.ensure_unique.is_some() {
            if ev.level == self.m.match_level + 1 {
                if ev.kind.is_container() {
                    return self.finish_type_mismatch();
                }
                self.uniqueness_child_start = Some(ev.start);
            }
            self.pending_key = None;
            return Flow::Continue;
        }

        let expected_index = ev.level - 1;
        if self.matched_up_to != expected_index || expected_index >= self.components.len() {
            self.pending_key = None;
            return Flow::Continue;
        }

        let component = &self.components[expected_index];
        if !self.component_matches(component, &ev) {
            self.pending_key = None;
            return Flow::Continue;
        }

        let key_loc = self.pending_key.take();
        self.matched_up_to = expected_index + 1;
        self.matched_child_index = ev.index_in_parent;

        if self.matched_up_to == self.components.len() {
            // This push is the target itself.
            self.m.result = MatchResult::Complete;
            self.m.match_level = ev.level;
            self.m.kind = Some(ev.kind);
            self.m.loc_match = Loc::new(ev.start, 0); // length filled in on pop
            self.m.position = ev.index_in_parent;
            if let Component::DictKey(_) = component {
                self.m.loc_key = key_loc.unwrap_or(Loc::EMPTY);
            }
            return Flow::Continue;
        }

        // More components remain: this container must be the right kind
        // for whatever comes next, or a leaf here is a type mismatch.
        let next = &self.components[self.matched_up_to];
        let needed = Self::component_kind_requirement(next);
        if needed.is_some() && Some(ev.kind) != needed {
            return self.finish_type_mismatch();
        }

        Flow::Continue
    }

    fn on_pop(&mut self, ev: PopEvent) -> Flow {
        if self.m.result == MatchResult::Complete && self.ensure_unique.is_some() {
            if let Some(child_start) = self.uniqueness_child_start {
                if ev.start == child_start {
                    let candidate = self.ensure_unique.unwrap();
                    if ev.end - ev.start == candidate.len()
                        && &self.input[ev.start..ev.end] == candidate
                    {
                        self.m.unique_item_found = true;
                        return Flow::Stop;
                    }
                    self.uniqueness_child_start = None;
                }
            }
            if ev.level == self.m.match_level && ev.start == self.m.loc_match.start() {
                // the array itself closed with no duplicate found
                self.m.loc_match = Loc::new(ev.start, ev.end - ev.start);
                return Flow::Stop;
            }
            return Flow::Continue;
        }

        if self.m.result == MatchResult::Complete {
            if ev.level == self.m.match_level && ev.start == self.m.loc_match.start() {
                self.m.loc_match = Loc::new(ev.start, ev.end - ev.start);
                self.m.number_flags = ev.number_flags;
                self.m.matched_child_count = ev.nelem;
                // Wait for the immediate parent's pop to learn sibling
                // counts, unless this *is* the root (no parent to wait for).
                if self.m.match_level == 1 {
                    return Flow::Stop;
                }
                return Flow::Continue;
            }
            if ev.level + 1 == self.m.match_level {
                // the matched value's immediate parent just closed. Since
                // exactly one frame is ever open per level, this is
                // guaranteed to be *that* parent, not an unrelated sibling
                // container that happens to share its level.
                self.m.last_child_start = ev.last_child_start;
                self.m.last_child_end = ev.last_child_end;
                self.m.last_child_kind = ev.last_child_kind;
                self.m.loc_parent = Loc::new(ev.start, ev.end - ev.start);
                self.m.num_siblings = ev.nelem.saturating_sub(1);
                self.m.position = self.matched_child_index;
                self.m.immediate_parent_found = true;
                return Flow::Stop;
            }
            return Flow::Continue;
        }

        if ev.level == self.matched_up_to {
            // The deepest container we were scanning children of just
            // closed without yielding the next component.
            self.m.last_child_start = ev.last_child_start;
            self.m.last_child_end = ev.last_child_end;
            self.m.last_child_kind = ev.last_child_kind;
            self.m.result = MatchResult::Possible;
            self.m.match_level = ev.level;
            self.m.kind = Some(ev.kind);
            self.m.loc_parent = Loc::new(ev.start, ev.end - ev.start);
            self.m.num_siblings = ev.nelem;
            self.m.immediate_parent_found = self.matched_up_to == self.components.len() - 1;
            return Flow::Stop;
        }

        Flow::Continue
    }
}

/// Compare a document key (raw bytes between the quotes, still carrying
/// any JSON escapes) against a plain-UTF-8 path component. Mirrors
/// `HashKey::get_hk`: only pay for u-escape decoding when the key
/// actually contains one, since most keys don't.
fn key_matches(raw_key: &[u8], target: &str) -> bool {
    if !raw_key.windows(2).any(|w| w == b"\\u") {
        return raw_key == target.as_bytes();
    }
    match uescape::convert(raw_key) {
        Ok(decoded) => decoded == target,
        Err(_) => false,
    }
}

/// Run the matcher over a path containing one or more `-1` components,
/// per §4.5: resolve one "segment" at a time, rewriting the trailing
/// `-1` to `0` and deriving the real last-child span from the parent's
/// bounds and `last_child_start`.
///
/// `extra` is appended after the path's own components once the final
/// segment is reached, so callers like `find_first_element` can probe
/// one level past a path that may itself end in `-1` (e.g. `a[-1]`
/// naming the array to descend into) without a second pass. `ensure_unique`
/// is likewise only meaningful on that final segment, since it's the
/// segment that names the actual target array.
pub fn exec_match_negix(
    tokenizer: &mut Tokenizer,
    input: &[u8],
    path: &Path<'_>,
    max_depth: usize,
    extra: &[Component],
    ensure_unique: Option<&[u8]>,
) -> Result<Match, TokenizeError> {
    let all = path.components();
    debug_assert!(path.has_negative_index());

    let mut level_offset = 0usize;
    let mut seg_start = 0usize; // absolute offset into `input`
    let mut seg_components: Vec<Component> = vec![Component::Root];
    let mut i = 1; // skip the real Root at index 0

    loop {
        // Collect components up to (and including) the next NegativeIndex,
        // or to the end of the path if none remain in this segment.
        let neg_pos = all[i..].iter().position(|c| matches!(c, Component::NegativeIndex));

        match neg_pos {
            None => {
                seg_components.extend_from_slice(&all[i..]);
                seg_components.extend_from_slice(extra);
                let m = exec_match_simple(
                    tokenizer,
                    input,
                    path,
                    &seg_components,
                    seg_start,
                    max_depth,
                    ensure_unique,
                )?;
                return Ok(adjust_level(m, level_offset));
            }
            Some(rel) => {
                let neg_idx = i + rel;
                seg_components.extend_from_slice(&all[i..neg_idx]);
                seg_components.push(Component::ArrayIndex(0));

                let m = exec_match_simple(
                    tokenizer,
                    input,
                    path,
                    &seg_components,
                    seg_start,
                    max_depth,
                    None,
                )?;

                if m.result != MatchResult::Complete {
                    return Ok(adjust_level(m, level_offset));
                }

                // derive the last child's span directly from the array's
                // own pop event, reported on `m` via `get_last_child_pos`
                // bookkeeping rather than a second scan.
                let (Some(last_start), Some(last_end), Some(last_kind)) =
                    (m.last_child_start, m.last_child_end, m.last_child_kind)
                else {
                    return Ok(adjust_level(m, level_offset));
                };

                let more_after = neg_idx + 1 < all.len();
                if more_after && !last_kind.is_container() {
                    let mut mismatch = Match::searching();
                    mismatch.result = MatchResult::TypeMismatch;
                    return Ok(adjust_level(mismatch, level_offset));
                }

                level_offset += seg_components.len().saturating_sub(1);
                seg_start = last_start;
                seg_components = vec![Component::Root];
                i = neg_idx + 1;

                if !more_after {
                    // the path ended exactly on this `-1`: the last
                    // element itself is the match.
                    let mut done = Match::searching();
                    done.result = MatchResult::Complete;
                    done.loc_match = Loc::new(last_start, last_end - last_start);
                    done.kind = Some(last_kind);
                    done.match_level = m.match_level + 1;
                    done.loc_parent = m.loc_parent;
                    done.num_siblings = m.num_siblings;
                    done.position = m.num_siblings;
                    done.immediate_parent_found = true;
                    return Ok(adjust_level(done, level_offset));
                }
            }
        }
    }
}

fn adjust_level(mut m: Match, offset: usize) -> Match {
    m.match_level += offset;
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(doc: &str, path_str: &str) -> Match {
        let mut tokenizer = Tokenizer::new();
        let mut path = Path::new();
        path.parse(path_str.as_bytes()).expect("path parses");
        if path.has_negative_index() {
            exec_match_negix(&mut tokenizer, doc.as_bytes(), &path, 33, &[], None).expect("scan ok")
        } else {
            exec_match_simple(&mut tokenizer, doc.as_bytes(), &path, path.components(), 0, 33, None)
                .expect("scan ok")
        }
    }

    #[test]
    fn complete_match_on_dict_key() {
        let m = run(r#"{"a":{"b":[1,2,3]}}"#, "a.b");
        assert_eq!(m.result, MatchResult::Complete);
        assert_eq!(m.kind, Some(ValueKind::Array));
        assert_eq!(&r#"{"a":{"b":[1,2,3]}}"#.as_bytes()[m.loc_match.as_range()], b"[1,2,3]");
    }

    #[test]
    fn possible_when_key_missing() {
        let m = run(r#"{"a":{"x":1}}"#, "a.b");
        assert_eq!(m.result, MatchResult::Possible);
        assert!(m.immediate_parent_found);
        assert_eq!(m.num_siblings, 1);
    }

    #[test]
    fn possible_parent_missing_entirely() {
        let m = run(r#"{"x":1}"#, "a.b");
        assert_eq!(m.result, MatchResult::Possible);
        assert!(!m.immediate_parent_found);
    }

    #[test]
    fn array_index_match() {
        let m = run("[10,20,30]", "[1]");
        assert_eq!(m.result, MatchResult::Complete);
        assert_eq!(m.position, 1);
        assert_eq!(m.num_siblings, 2);
    }

    #[test]
    fn type_mismatch_when_descending_into_scalar() {
        let m = run(r#"{"a":1}"#, "a.b");
        assert_eq!(m.result, MatchResult::TypeMismatch);
    }

    #[test]
    fn type_mismatch_array_vs_dict() {
        let m = run(r#"{"a":{"b":1}}"#, "a[0]");
        assert_eq!(m.result, MatchResult::TypeMismatch);
    }

    #[test]
    fn negative_index_resolves_last_element() {
        let m = run("[1,2,3]", "[-1]");
        assert_eq!(m.result, MatchResult::Complete);
        assert_eq!(&"[1,2,3]".as_bytes()[m.loc_match.as_range()], b"3");
    }

    #[test]
    fn whole_document_match_on_empty_path() {
        let m = run(r#"{"a":1}"#, "");
        assert_eq!(m.result, MatchResult::Complete);
        assert_eq!(m.kind, Some(ValueKind::Object));
    }

    #[test]
    fn ensure_unique_finds_duplicate() {
        let mut tokenizer = Tokenizer::new();
        let mut path = Path::new();
        path.parse(b"xs").unwrap();
        let m = exec_match_simple(
            &mut tokenizer,
            br#"{"xs":[1,2,3]}"#,
            &path,
            path.components(),
            0,
            33,
            Some(b"2"),
        )
        .unwrap();
        assert!(m.unique_item_found);
    }

    #[test]
    fn ensure_unique_no_duplicate() {
        let mut tokenizer = Tokenizer::new();
        let mut path = Path::new();
        path.parse(b"xs").unwrap();
        let m = exec_match_simple(
            &mut tokenizer,
            br#"{"xs":[1,2,3]}"#,
            &path,
            path.components(),
            0,
            33,
            Some(b"9"),
        )
        .unwrap();
        assert!(!m.unique_item_found);
        assert_eq!(m.result, MatchResult::Complete);
    }

    #[test]
    fn dict_key_with_uescape_matches_plain_path_component() {
        // The document spells its key's first letter as `\u0066` (`f`);
        // the path spells the same key as plain `foo`.
        let doc = "{\"\\u0066oo\":1}";
        let m = run(doc, "foo");
        assert_eq!(m.result, MatchResult::Complete);
        assert_eq!(&doc.as_bytes()[m.loc_match.as_range()], b"1");
    }

    #[test]
    fn dict_key_with_surrogate_pair_uescape_matches() {
        // U+1F600 (grinning face) spelled as a high/low surrogate pair in
        // the document, plain UTF-8 in the path.
        let doc = "{\"a\\ud83d\\ude00b\":1}";
        let m = run(doc, "a\u{1F600}b");
        assert_eq!(m.result, MatchResult::Complete);
    }
}
