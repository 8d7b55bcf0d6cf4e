/*!
Checks that a caller-supplied value is legal JSON in the context it would
be spliced into, without ever materializing a DOM.

Grounded in `match.cc`'s `subdoc_validate`/`validate_callback` and
`validate.h`'s `Options`/`Status` enums: the candidate is wrapped in a
synthetic opening/closing pair appropriate to where it's headed (bare, as
an array element, or as a dict value) and fed through the same
[`crate::tokenizer::Tokenizer`] the matcher uses. Whether the wrapped
buffer tokenizes as exactly one well-formed JSON document — with no
leftover bytes — is the well-formedness check; the wrapper's own child
count and kind answer `SINGLE`/`PRIMITIVE`.
*/

use crate::error::Error;
use crate::tokenizer::{Flow, KeyEvent, PopEvent, PushEvent, Tokenizer, TokenizeError, ValueKind};

/// The JSON context the value is being validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentContext {
    /// The value must be a complete JSON value on its own (e.g. a
    /// top-level `REPLACE` of the document root would use this, though
    /// the planner actually forbids root edits; used for counter deltas
    /// and other standalone checks).
    None,
    /// The value is substituted as one or more comma-separated elements
    /// inside `[...]`.
    Array,
    /// The value is substituted as a single dict value: `{"k": ...}`.
    Dict,
}

/// Extra constraints layered on top of [`ParentContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueConstraints {
    /// Exactly one top-level element (no bare `1,2,3` even in `Array`
    /// context).
    pub single: bool,
    /// The value must not be an object or array.
    pub primitive: bool,
}

impl ValueConstraints {
    pub const ANY: ValueConstraints = ValueConstraints { single: false, primitive: false };
    pub const SINGLE: ValueConstraints = ValueConstraints { single: true, primitive: false };
    pub const PRIMITIVE: ValueConstraints = ValueConstraints { single: true, primitive: true };
}

#[derive(Default)]
struct Collector {
    /// Number of direct children seen at the wrapper's own level (or, for
    /// `ParentContext::None`, always treated as exactly the one root
    /// value once scanning finishes without error).
    top_level_children: usize,
    first_child_kind: Option<ValueKind>,
}

impl crate::tokenizer::Visitor for Collector {
    fn on_key(&mut self, _ev: KeyEvent) -> Flow {
        Flow::Continue
    }

    fn on_push(&mut self, ev: PushEvent) -> Flow {
        if ev.level == 2 {
            if self.first_child_kind.is_none() {
                self.first_child_kind = Some(ev.kind);
            }
        }
        Flow::Continue
    }

    fn on_pop(&mut self, ev: PopEvent) -> Flow {
        if ev.level == 2 {
            self.top_level_children += 1;
        }
        Flow::Continue
    }
}

/// Validate `value` against `ctx`/`constraints`, at most `max_depth`
/// levels deep (see spec §4.7: the allowed depth is computed by the
/// planner from where the value is headed, not hard-coded here).
pub fn validate(
    tokenizer: &mut Tokenizer,
    value: &[u8],
    ctx: ParentContext,
    constraints: ValueConstraints,
    max_depth: usize,
) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::ValueEmpty);
    }

    match ctx {
        ParentContext::None => validate_bare(tokenizer, value, constraints, max_depth),
        ParentContext::Array => validate_wrapped(tokenizer, b"[", b"]", value, constraints, max_depth),
        ParentContext::Dict => validate_wrapped(tokenizer, b"{\"k\":", b"}", value, constraints, max_depth),
    }
}

fn validate_bare(
    tokenizer: &mut Tokenizer,
    value: &[u8],
    constraints: ValueConstraints,
    max_depth: usize,
) -> Result<(), Error> {
    let mut collector = Collector::default();
    match tokenizer.scan(value, 0, max_depth, &mut ScalarKind(&mut collector)) {
        Ok(end) if end == value.len() => (),
        Ok(_) => return Err(Error::ValueCantinsert),
        Err(TokenizeError::LevelsExceeded) => return Err(Error::ValueEtoodeep),
        Err(TokenizeError::Syntax) => return Err(Error::ValueCantinsert),
    }

    if constraints.primitive {
        if let Some(k) = collector.first_child_kind {
            if k.is_container() {
                return Err(Error::ValueCantinsert);
            }
        }
    }

    Ok(())
}

/// Wraps `tokenizer`'s root-level event at `level == 1` so
/// `validate_bare` can reuse `Collector`'s bookkeeping, which otherwise
/// only looks at `level == 2` (the children of a synthetic wrapper).
struct ScalarKind<'c>(&'c mut Collector);

impl<'c> crate::tokenizer::Visitor for ScalarKind<'c> {
    fn on_push(&mut self, ev: PushEvent) -> Flow {
        if ev.level == 1 && self.0.first_child_kind.is_none() {
            self.0.first_child_kind = Some(ev.kind);
        }
        Flow::Continue
    }
}

fn validate_wrapped(
    tokenizer: &mut Tokenizer,
    prefix: &[u8],
    suffix: &[u8],
    value: &[u8],
    constraints: ValueConstraints,
    max_depth: usize,
) -> Result<(), Error> {
    let mut buf = Vec::with_capacity(prefix.len() + value.len() + suffix.len());
    buf.extend_from_slice(prefix);
    buf.extend_from_slice(value);
    buf.extend_from_slice(suffix);

    let mut collector = Collector::default();
    match tokenizer.scan(&buf, 0, max_depth + 1, &mut collector) {
        Ok(end) if end == buf.len() => (),
        Ok(_) => return Err(Error::ValueCantinsert),
        Err(TokenizeError::LevelsExceeded) => return Err(Error::ValueEtoodeep),
        Err(TokenizeError::Syntax) => return Err(Error::ValueCantinsert),
    }

    if constraints.single && collector.top_level_children != 1 {
        return Err(Error::ValueCantinsert);
    }
    if constraints.primitive {
        if let Some(k) = collector.first_child_kind {
            if k.is_container() {
                return Err(Error::ValueCantinsert);
            }
        }
    }

    Ok(())
}
