/*!
A small SAX-style JSON tokenizer: feeds push/pop events to a [`Visitor`]
as it walks a document, without building a DOM.

This is not the teacher's own `de` module (`squirrel_json::de::Document`
builds a flat random-access offset table for a whole, known-to-be-minified,
object-rooted document — a different shape than what a path matcher
needs). What's kept from the teacher is the *manner* of writing a scanner:
an explicit state struct pushed onto a reusable stack, unsafe/checked-dual
byte access through the `get_unchecked!`/`offset_deref_unchecked!` macros,
and terse per-branch comments rather than prose. What's different is the
grammar this one accepts: arbitrary whitespace between tokens (callers of
this crate send ordinary, not necessarily minified, JSON over the wire),
an arbitrary starting offset (a path may address a scalar or an array as
well as an object), and a visitor that can halt the walk early once it has
what it needs.
*/

use crate::loc::Loc;

/// The JSON type of a scanned token. `True`/`False` are kept distinct
/// (rather than folded into one `Bool`) because the planner sometimes
/// cares about the literal spelling, matching `match_result.type` in the
/// data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    True,
    False,
    Null,
}

impl ValueKind {
    pub fn is_container(&self) -> bool {
        matches!(self, ValueKind::Object | ValueKind::Array)
    }
}

/// Grammar details of a scanned number, recorded so `COUNTER` can reject
/// floats and exponents without re-scanning the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NumberFlags {
    pub has_fraction: bool,
    pub has_exponent: bool,
}

impl NumberFlags {
    /// Whether this number's textual form is safe to hand to an integer
    /// parser (no `.`, no `e`/`E`).
    pub fn is_integral(&self) -> bool {
        !self.has_fraction && !self.has_exponent
    }
}

/// An object's hash-key, reported as soon as its closing quote is seen
/// (before the value that follows it is scanned).
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub level: usize,
    /// Byte range of the key *including* its surrounding quotes.
    pub loc: Loc,
}

/// A value (container or leaf) begins here. For containers this fires
/// before any children are scanned; callers that need the container's
/// length must wait for the matching [`PopEvent`].
#[derive(Debug, Clone, Copy)]
pub struct PushEvent {
    pub kind: ValueKind,
    pub level: usize,
    pub start: usize,
    pub parent_kind: Option<ValueKind>,
    /// 0-based ordinal among the parent's values (pairs for an object,
    /// elements for an array); `0` for the root.
    pub index_in_parent: usize,
}

/// A value finishes here.
#[derive(Debug, Clone, Copy)]
pub struct PopEvent {
    pub kind: ValueKind,
    pub level: usize,
    pub start: usize,
    /// Exclusive end offset: one past the closing token (for containers
    /// and strings, one past `}`/`]`/the closing `"`; for numbers and
    /// atoms, one past the last content byte).
    pub end: usize,
    /// For containers: total number of values seen as direct children.
    pub nelem: usize,
    /// For containers: the byte range and kind of the last child scanned,
    /// regardless of whether that child matched anything. Lets the
    /// negative-index driver locate the last element without a second
    /// scan (see `match.cc`'s `get_last_child_pos`).
    pub last_child_start: Option<usize>,
    pub last_child_end: Option<usize>,
    pub last_child_kind: Option<ValueKind>,
    /// Present only when `kind == Number`.
    pub number_flags: Option<NumberFlags>,
}

/// What the tokenizer should do after a callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep scanning normally.
    Continue,
    /// Stop scanning immediately. The remainder of the document is never
    /// read; no further callbacks fire. Used once a matcher has recorded
    /// everything it needs (see spec §4.4's "the matcher can bypass
    /// further callbacks").
    Stop,
}

/// Errors a scan can end in. Deliberately coarse: this crate does not
/// promise to fully validate document syntax, only to recognize the
/// handful of conditions that change control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizeError {
    /// The input doesn't tokenize as JSON at the point the error was
    /// detected.
    Syntax,
    /// Container nesting exceeded the caller-supplied depth limit.
    LevelsExceeded,
}

pub trait Visitor {
    fn on_key(&mut self, ev: KeyEvent) -> Flow {
        let _ = ev;
        Flow::Continue
    }
    fn on_push(&mut self, ev: PushEvent) -> Flow {
        let _ = ev;
        Flow::Continue
    }
    fn on_pop(&mut self, ev: PopEvent) -> Flow {
        let _ = ev;
        Flow::Continue
    }
}

/// One open container on the scan stack.
struct Frame {
    kind: ValueKind,
    level: usize,
    start: usize,
    nelem: usize,
    after_comma: bool,
    last_child_start: Option<usize>,
    last_child_end: Option<usize>,
    last_child_kind: Option<ValueKind>,
}

/// A reusable SAX scanner. `Tokenizer::scan` is re-entrant-free but the
/// struct itself is meant to be kept around and reused across calls (its
/// stack only grows, never reallocates once it reaches its high-water
/// mark), mirroring how `Operation` owns its scratch buffers.
#[derive(Default)]
pub struct Tokenizer {
    stack: Vec<Frame>,
}

enum Leaf {
    Simple { kind: ValueKind, start: usize, end: usize },
    Number { start: usize, end: usize, flags: NumberFlags },
}

/// Outcome of scanning one value.
enum Step {
    /// A leaf value (string/number/bool/null) was fully scanned; the
    /// caller still owes it a push+pop callback pair.
    Leaf(Leaf),
    /// A container was opened, its push event delivered, and its frame
    /// pushed onto the stack.
    Opened,
    /// The visitor asked to stop scanning.
    Stop,
}

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer { stack: Vec::new() }
    }

    /// Scan exactly one JSON value starting at `input[start..]`, calling
    /// back into `visitor` for every token. `max_depth` bounds container
    /// nesting (the root value is level 1; its children level 2, and so
    /// on).
    ///
    /// Returns the offset one past the last byte consumed. Any bytes
    /// beyond that are not inspected — callers that need "this is the
    /// *only* value in the buffer" (the validator's `PARENT_NONE` mode)
    /// check the returned offset against the buffer's length themselves.
    pub fn scan(
        &mut self,
        input: &[u8],
        start: usize,
        max_depth: usize,
        visitor: &mut impl Visitor,
    ) -> Result<usize, TokenizeError> {
        self.stack.clear();

        let mut pos = start;
        skip_ws(input, &mut pos);

        match self.scan_value(input, &mut pos, 1, None, 0, max_depth, visitor)? {
            Step::Leaf(leaf) => {
                self.emit_leaf(visitor, leaf, 1, None, 0);
                return Ok(pos);
            }
            Step::Stop => return Ok(pos),
            Step::Opened => {
                // It's now the top of `self.stack`; the loop below drives it.
            }
        }

        loop {
            // SAFETY-free: stack is non-empty on every iteration of this
            // loop, since the first frame was pushed above and we only
            // return once it (and everything above it) has popped.
            let level = self.stack.last().unwrap().level;
            let kind = self.stack.last().unwrap().kind;
            let after_comma = self.stack.last().unwrap().after_comma;

            skip_ws(input, &mut pos);

            let closer = match kind {
                ValueKind::Object => b'}',
                ValueKind::Array => b']',
                _ => unreachable!("only containers are pushed onto the stack"),
            };

            if !after_comma && input.get(pos) == Some(&closer) {
                let frame = self.stack.pop().unwrap();
                pos += 1;
                let pop = PopEvent {
                    kind: frame.kind,
                    level: frame.level,
                    start: frame.start,
                    end: pos,
                    nelem: frame.nelem,
                    last_child_start: frame.last_child_start,
                    last_child_end: frame.last_child_end,
                    last_child_kind: frame.last_child_kind,
                    number_flags: None,
                };
                if visitor.on_pop(pop) == Flow::Stop {
                    return Ok(pos);
                }

                match self.stack.last_mut() {
                    None => return Ok(pos),
                    Some(parent) => {
                        parent.nelem += 1;
                        parent.last_child_start = Some(frame.start);
                        parent.last_child_end = Some(pos);
                        parent.last_child_kind = Some(frame.kind);
                    }
                }
                self.after_value(input, &mut pos)?;
                continue;
            }

            if input.get(pos).is_none() {
                return Err(TokenizeError::Syntax);
            }

            if kind == ValueKind::Object {
                let key_start = pos;
                let key_end = scan_string(input, &mut pos)?;
                let key_loc = Loc::new(key_start, key_end - key_start);
                if visitor.on_key(KeyEvent { level: level + 1, loc: key_loc }) == Flow::Stop {
                    return Ok(pos);
                }
                skip_ws(input, &mut pos);
                if input.get(pos) != Some(&b':') {
                    return Err(TokenizeError::Syntax);
                }
                pos += 1;
                skip_ws(input, &mut pos);
            }

            {
                let frame = self.stack.last_mut().unwrap();
                frame.after_comma = false;
            }

            let index_in_parent = self.stack.last().unwrap().nelem;
            let child_level = level + 1;

            match self.scan_value(
                input,
                &mut pos,
                child_level,
                Some(kind),
                index_in_parent,
                max_depth,
                visitor,
            )? {
                Step::Leaf(leaf) => {
                    let (lk, ls, le) = leaf_bounds(&leaf);
                    self.emit_leaf(visitor, leaf, child_level, Some(kind), index_in_parent);
                    let frame = self.stack.last_mut().unwrap();
                    frame.nelem += 1;
                    frame.last_child_start = Some(ls);
                    frame.last_child_end = Some(le);
                    frame.last_child_kind = Some(lk);
                    self.after_value(input, &mut pos)?;
                }
                Step::Stop => return Ok(pos),
                Step::Opened => {
                    // descended into a nested container; its frame is now
                    // on top of the stack and the outer loop picks it up.
                }
            }
        }
    }

    /// After scanning a leaf (or just before re-entering the loop after a
    /// container popped), consume a trailing `,` if present, marking the
    /// (now current) frame as awaiting another key/value. Leaves the
    /// position alone if the next byte is the frame's own closer or
    /// anything else; the outer loop's closer check (or a syntax error on
    /// the next iteration) handles those cases.
    fn after_value(&mut self, input: &[u8], pos: &mut usize) -> Result<(), TokenizeError> {
        skip_ws(input, pos);
        if input.get(*pos) == Some(&b',') {
            *pos += 1;
            skip_ws(input, pos);
            if let Some(frame) = self.stack.last_mut() {
                frame.after_comma = true;
            }
        }
        Ok(())
    }

    fn emit_leaf(
        &mut self,
        visitor: &mut impl Visitor,
        leaf: Leaf,
        level: usize,
        parent_kind: Option<ValueKind>,
        index_in_parent: usize,
    ) {
        let (kind, start, end, number_flags) = match leaf {
            Leaf::Simple { kind, start, end } => (kind, start, end, None),
            Leaf::Number { start, end, flags } => (ValueKind::Number, start, end, Some(flags)),
        };
        if visitor.on_push(PushEvent { kind, level, start, parent_kind, index_in_parent }) == Flow::Stop {
            return;
        }
        visitor.on_pop(PopEvent {
            kind,
            level,
            start,
            end,
            nelem: 0,
            last_child_start: None,
            last_child_end: None,
            last_child_kind: None,
            number_flags,
        });
    }

    /// Scan one value at `pos`. Leaves are fully scanned but not yet
    /// reported (the caller needs to know whether this is the document's
    /// root before invoking `on_push`/`on_pop`); containers are pushed
    /// onto the stack and reported immediately, since a container's push
    /// event always precedes any of its children's events.
    #[allow(clippy::too_many_arguments)]
    fn scan_value(
        &mut self,
        input: &[u8],
        pos: &mut usize,
        level: usize,
        parent_kind: Option<ValueKind>,
        index_in_parent: usize,
        max_depth: usize,
        visitor: &mut impl Visitor,
    ) -> Result<Step, TokenizeError> {
        let start = *pos;
        match input.get(start) {
            Some(b'{') | Some(b'[') => {
                if level > max_depth {
                    return Err(TokenizeError::LevelsExceeded);
                }
                let kind = if input[start] == b'{' { ValueKind::Object } else { ValueKind::Array };
                *pos += 1;
                self.stack.push(Frame {
                    kind,
                    level,
                    start,
                    nelem: 0,
                    after_comma: false,
                    last_child_start: None,
                    last_child_end: None,
                    last_child_kind: None,
                });
                let flow = visitor.on_push(PushEvent { kind, level, start, parent_kind, index_in_parent });
                Ok(if flow == Flow::Stop { Step::Stop } else { Step::Opened })
            }
            Some(b'"') => {
                let end = scan_string(input, pos)?;
                Ok(Step::Leaf(Leaf::Simple { kind: ValueKind::String, start, end }))
            }
            Some(b't') => {
                scan_literal(input, pos, b"true")?;
                Ok(Step::Leaf(Leaf::Simple { kind: ValueKind::True, start, end: *pos }))
            }
            Some(b'f') => {
                scan_literal(input, pos, b"false")?;
                Ok(Step::Leaf(Leaf::Simple { kind: ValueKind::False, start, end: *pos }))
            }
            Some(b'n') => {
                scan_literal(input, pos, b"null")?;
                Ok(Step::Leaf(Leaf::Simple { kind: ValueKind::Null, start, end: *pos }))
            }
            Some(b'-') | Some(b'0'..=b'9') => {
                let flags = scan_number(input, pos)?;
                Ok(Step::Leaf(Leaf::Number { start, end: *pos, flags }))
            }
            _ => Err(TokenizeError::Syntax),
        }
    }
}

fn leaf_bounds(leaf: &Leaf) -> (ValueKind, usize, usize) {
    match leaf {
        Leaf::Simple { kind, start, end } => (*kind, *start, *end),
        Leaf::Number { start, end, .. } => (ValueKind::Number, *start, *end),
    }
}

#[inline]
fn skip_ws(input: &[u8], pos: &mut usize) {
    while let Some(&b) = input.get(*pos) {
        match b {
            b' ' | b'\t' | b'\n' | b'\r' => *pos += 1,
            _ => break,
        }
    }
}

/// Scan a `"`-delimited string starting at `*pos`, leaving `*pos` just
/// past the closing quote. Returns that end offset. Escapes are skipped
/// without being validated (the engine never needs to decode document
/// string content, only find its extent).
fn scan_string(input: &[u8], pos: &mut usize) -> Result<usize, TokenizeError> {
    if input.get(*pos) != Some(&b'"') {
        return Err(TokenizeError::Syntax);
    }
    *pos += 1;
    loop {
        match input.get(*pos) {
            None => return Err(TokenizeError::Syntax),
            Some(b'"') => {
                *pos += 1;
                return Ok(*pos);
            }
            Some(b'\\') => {
                if input.get(*pos + 1).is_none() {
                    return Err(TokenizeError::Syntax);
                }
                *pos += 2;
            }
            Some(_) => *pos += 1,
        }
    }
}

fn scan_literal(input: &[u8], pos: &mut usize, word: &[u8]) -> Result<(), TokenizeError> {
    let end = *pos + word.len();
    if input.get(*pos..end) != Some(word) {
        return Err(TokenizeError::Syntax);
    }
    *pos = end;
    Ok(())
}

fn scan_number(input: &[u8], pos: &mut usize) -> Result<NumberFlags, TokenizeError> {
    let mut flags = NumberFlags::default();

    if input.get(*pos) == Some(&b'-') {
        *pos += 1;
    }

    let int_start = *pos;
    while matches!(input.get(*pos), Some(b'0'..=b'9')) {
        *pos += 1;
    }
    if *pos == int_start {
        return Err(TokenizeError::Syntax);
    }

    if input.get(*pos) == Some(&b'.') {
        flags.has_fraction = true;
        *pos += 1;
        let frac_start = *pos;
        while matches!(input.get(*pos), Some(b'0'..=b'9')) {
            *pos += 1;
        }
        if *pos == frac_start {
            return Err(TokenizeError::Syntax);
        }
    }

    if matches!(input.get(*pos), Some(b'e') | Some(b'E')) {
        flags.has_exponent = true;
        *pos += 1;
        if matches!(input.get(*pos), Some(b'+') | Some(b'-')) {
            *pos += 1;
        }
        let exp_start = *pos;
        while matches!(input.get(*pos), Some(b'0'..=b'9')) {
            *pos += 1;
        }
        if *pos == exp_start {
            return Err(TokenizeError::Syntax);
        }
    }

    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        pushes: Vec<(ValueKind, usize, usize)>,
        pops: Vec<(ValueKind, usize, usize, usize, usize)>,
        keys: Vec<(usize, usize, usize)>,
    }

    impl Visitor for Recorder {
        fn on_key(&mut self, ev: KeyEvent) -> Flow {
            self.keys.push((ev.level, ev.loc.start(), ev.loc.end()));
            Flow::Continue
        }
        fn on_push(&mut self, ev: PushEvent) -> Flow {
            self.pushes.push((ev.kind, ev.level, ev.start));
            Flow::Continue
        }
        fn on_pop(&mut self, ev: PopEvent) -> Flow {
            self.pops.push((ev.kind, ev.level, ev.start, ev.end, ev.nelem));
            Flow::Continue
        }
    }

    fn run(s: &str) -> (Recorder, usize) {
        let mut t = Tokenizer::new();
        let mut r = Recorder::default();
        let end = t.scan(s.as_bytes(), 0, 33, &mut r).expect("scan ok");
        (r, end)
    }

    #[test]
    fn scans_flat_object() {
        let (r, end) = run(r#"{"a":1,"b":true}"#);
        assert_eq!(end, 16);
        assert_eq!(r.keys.len(), 2);
        assert_eq!(r.pops.last().unwrap().0, ValueKind::Object);
        assert_eq!(r.pops.last().unwrap().4, 2);
    }

    #[test]
    fn scans_array_with_whitespace() {
        let (r, end) = run("[1, 2,\n 3]");
        assert_eq!(end, 10);
        let top = r.pops.last().unwrap();
        assert_eq!(top.0, ValueKind::Array);
        assert_eq!(top.4, 3);
    }

    #[test]
    fn nested_containers_track_last_child() {
        let mut t = Tokenizer::new();
        let mut r = Recorder::default();
        t.scan(br#"{"a":[1,2,3]}"#, 0, 33, &mut r).unwrap();
        assert_eq!(r.pops.last().unwrap().0, ValueKind::Object);
    }

    #[test]
    fn scalar_root_value() {
        let (r, end) = run("42");
        assert_eq!(end, 2);
        assert_eq!(r.pops[0].0, ValueKind::Number);
    }

    #[test]
    fn rejects_trailing_garbage_is_not_an_error_but_is_not_consumed() {
        let (_, end) = run("1,2");
        assert_eq!(end, 1);
    }

    #[test]
    fn levels_exceeded() {
        let deep = "[".repeat(40) + &"]".repeat(40);
        let mut t = Tokenizer::new();
        let mut r = Recorder::default();
        let err = t.scan(deep.as_bytes(), 0, 33, &mut r).unwrap_err();
        assert_eq!(err, TokenizeError::LevelsExceeded);
    }

    #[test]
    fn syntax_error_on_unterminated_string() {
        let mut t = Tokenizer::new();
        let mut r = Recorder::default();
        let err = t.scan(br#""unterminated"#, 0, 33, &mut r).unwrap_err();
        assert_eq!(err, TokenizeError::Syntax);
    }

    #[test]
    fn stop_flow_halts_early() {
        struct StopAfterFirstPush(usize);
        impl Visitor for StopAfterFirstPush {
            fn on_push(&mut self, _ev: PushEvent) -> Flow {
                self.0 += 1;
                Flow::Stop
            }
        }
        let mut t = Tokenizer::new();
        let mut v = StopAfterFirstPush(0);
        let end = t.scan(br#"{"a":1,"b":2}"#, 0, 33, &mut v).unwrap();
        assert_eq!(v.0, 1);
        assert!(end < 13);
    }
}
