/*!
Plans a mutation (or read) against a JSON document as an ordered list of
byte-range fragments, without building a DOM or reserializing anything.

Grounded in `subdoc/operations.cc`'s `Operation::op_exec` and its
per-command helpers (`do_store_dict`, `do_mkdir_p`, `do_list_op`,
`do_insert`, `do_arith_op`). The shape of the port differs from the
original in one respect: `Loc` here is an offset into one of several
buffers rather than a raw pointer, so a fragment has to say *which*
buffer it resolves against ([`Source`]) instead of always meaning
"the document". Everything else — the splicing arithmetic, the mkdir-p
scratch-buffer layout, the comma-stripping on remove — follows the
original function-for-function.
*/

use crate::error::{Error, Result};
use crate::loc::{Loc, Overlap};
use crate::matcher::{exec_match_negix, exec_match_simple, Match, MatchResult};
use crate::path::{self, Component, Path};
use crate::tokenizer::{TokenizeError, Tokenizer, ValueKind};
use crate::validator::{validate, ParentContext, ValueConstraints};

/// A command code, with the high bit reserved as the mkdir-p modifier
/// (spec §6): the same opcode runs with or without parent creation
/// depending on whether `0x80` is set, rather than doubling the opcode
/// space the way the original C++ `Command` enum does (`DICT_ADD` vs.
/// `DICT_ADD_P`, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Command(pub u8);

impl Command {
    pub const GET: u8 = 0x00;
    pub const EXISTS: u8 = 0x01;
    pub const REPLACE: u8 = 0x02;
    pub const REMOVE: u8 = 0x03;
    pub const DICT_UPSERT: u8 = 0x04;
    pub const DICT_ADD: u8 = 0x05;
    pub const ARRAY_PREPEND: u8 = 0x06;
    pub const ARRAY_APPEND: u8 = 0x07;
    pub const ARRAY_ADD_UNIQUE: u8 = 0x08;
    pub const ARRAY_INSERT: u8 = 0x09;
    pub const COUNTER: u8 = 0x0A;
    pub const GET_COUNT: u8 = 0x0B;

    const MKDIR_P_BIT: u8 = 0x80;

    pub fn base(self) -> u8 {
        self.0 & !Self::MKDIR_P_BIT
    }

    pub fn is_mkdir_p(self) -> bool {
        self.0 & Self::MKDIR_P_BIT != 0
    }
}

/// Which scratch buffer a [`Fragment::Span`] resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The caller's document, as passed to [`Operation::set_document`].
    Document,
    /// The caller's replacement value, as passed to [`Operation::set_value`].
    Value,
    /// The planner's own scratch buffer, used for mkdir-p's synthesized
    /// key/wrapper text and a dict-add's bare key bytes.
    Patch,
    /// The planner's own scratch buffer, used for `GET_COUNT`'s rendered
    /// count and `COUNTER`'s rendered result.
    Num,
}

/// One piece of the new document: either a byte range into one of
/// [`Operation`]'s buffers, or a small constant that needs no buffer at
/// all (the original's static `Loc loc_COMMA = {",", 1}` and friends).
#[derive(Debug, Clone, Copy)]
pub enum Fragment {
    Span(Source, Loc),
    Literal(&'static [u8]),
}

const COMMA: &[u8] = b",";
const QUOTE: &[u8] = b"\"";
const COMMA_QUOTE: &[u8] = b",\"";
const QUOTE_COLON: &[u8] = b"\":";

/// Matches `max_depth` is always called with, regardless of path length:
/// one more than the path's own component budget (spec §4.7), since the
/// path and the document it's matched against are bounded separately.
const DOC_MAX_DEPTH: usize = path::MAX_COMPONENTS + 1;

/// Whether an over-long value is being measured against "one more key
/// than the path already names" or "the path names the parent directly".
enum DepthMode {
    PathIsParent,
    PathHasNewKey,
}

enum MkdirMode {
    Array,
    Dict,
}

/// Plans one read or mutation. Reused across calls the way the teacher
/// reuses its own scanners: `exec` clears and repopulates every scratch
/// buffer rather than allocating fresh ones.
pub struct Operation<'d> {
    tokenizer: Tokenizer,
    path: Path<'d>,
    code: Command,
    document: &'d [u8],
    value: &'d [u8],
    delta: i64,
    patch: Vec<u8>,
    num: Vec<u8>,
    fragments: Vec<Fragment>,
    match_: Match,
    match_source: Source,
}

impl<'d> Default for Operation<'d> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d> Operation<'d> {
    pub fn new() -> Self {
        Operation {
            tokenizer: Tokenizer::new(),
            path: Path::new(),
            code: Command::default(),
            document: &[],
            value: &[],
            delta: 0,
            patch: Vec::new(),
            num: Vec::new(),
            fragments: Vec::new(),
            match_: Match::searching(),
            match_source: Source::Document,
        }
    }

    pub fn set_document(&mut self, document: &'d [u8]) {
        self.document = document;
    }

    pub fn set_value(&mut self, value: &'d [u8]) {
        self.value = value;
    }

    pub fn set_delta(&mut self, delta: i64) {
        self.delta = delta;
    }

    pub fn set_code(&mut self, code: u8) {
        self.code = Command(code);
    }

    /// The result of the most recently executed `exec`.
    pub fn r#match(&self) -> &Match {
        &self.match_
    }

    /// The matched value's own bytes, resolved against whichever buffer
    /// produced it (the document for ordinary matches, the `num` scratch
    /// buffer for `GET_COUNT` and `COUNTER`).
    pub fn match_value(&self) -> &[u8] {
        match self.match_source {
            Source::Document => self.match_.loc_match.resolve(self.document),
            Source::Num => self.match_.loc_match.resolve(&self.num),
            Source::Value | Source::Patch => unreachable!("match never resolves against these"),
        }
    }

    /// The fragments that, concatenated, form the new document (or, for
    /// read-only commands, the unchanged original).
    pub fn fragments(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.fragments.iter().map(move |f| self.resolve_fragment(f))
    }

    /// Convenience: concatenate [`Operation::fragments`] into one buffer.
    /// Callers that can stream fragments straight onto a socket should
    /// prefer `fragments()` and avoid this allocation.
    pub fn new_document(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for f in &self.fragments {
            out.extend_from_slice(self.resolve_fragment(f));
        }
        out
    }

    fn resolve_fragment(&self, f: &Fragment) -> &[u8] {
        match *f {
            Fragment::Span(Source::Document, loc) => loc.resolve(self.document),
            Fragment::Span(Source::Value, loc) => loc.resolve(self.value),
            Fragment::Span(Source::Patch, loc) => loc.resolve(&self.patch),
            Fragment::Span(Source::Num, loc) => loc.resolve(&self.num),
            Fragment::Literal(bytes) => bytes,
        }
    }

    fn doc_base(&self) -> Loc {
        Loc::new(0, self.document.len())
    }

    /// Parse `path_bytes` and run the command set by `set_code`,
    /// populating `fragments`/`match`/`match_value` for this run.
    pub fn exec(&mut self, path_bytes: &'d [u8]) -> Result<()> {
        self.fragments.clear();
        self.patch.clear();
        self.num.clear();
        self.match_ = Match::searching();
        self.match_source = Source::Document;

        self.path.parse(path_bytes)?;

        match self.code.base() {
            Command::GET | Command::EXISTS => {
                self.do_match_common()?;
                self.do_get()
            }
            Command::GET_COUNT => {
                self.do_match_common()?;
                self.do_get_count()
            }
            Command::DICT_ADD | Command::DICT_UPSERT | Command::REPLACE | Command::REMOVE => {
                if self.path.len() == 1 {
                    // The root element: replacing or deleting it would
                    // leave no valid document, and dict-add/upsert on it
                    // is meaningless since the root has no key of its own.
                    return Err(Error::ValueCantinsert);
                }
                let base = self.code.base();
                if base != Command::REMOVE {
                    let depth = self.get_maxdepth(DepthMode::PathHasNewKey);
                    validate(&mut self.tokenizer, self.value, ParentContext::Dict, ValueConstraints::ANY, depth)?;
                }
                self.do_match_common()?;
                self.store_dict(base, self.code.is_mkdir_p(), Source::Value, Loc::new(0, self.value.len()))
            }
            Command::ARRAY_APPEND | Command::ARRAY_PREPEND => {
                let depth = self.get_maxdepth(DepthMode::PathIsParent);
                validate(&mut self.tokenizer, self.value, ParentContext::Array, ValueConstraints::ANY, depth)?;
                self.do_list_op()
            }
            Command::ARRAY_ADD_UNIQUE => {
                let depth = self.get_maxdepth(DepthMode::PathIsParent);
                validate(&mut self.tokenizer, self.value, ParentContext::Array, ValueConstraints::PRIMITIVE, depth)?;
                self.do_list_op()
            }
            Command::ARRAY_INSERT => {
                let depth = self.get_maxdepth(DepthMode::PathHasNewKey);
                validate(&mut self.tokenizer, self.value, ParentContext::Array, ValueConstraints::ANY, depth)?;
                self.do_insert()
            }
            Command::COUNTER => self.do_arith_op(),
            _ => Err(Error::GlobalEnosupport),
        }
    }

    /// `(MAX_COMPONENTS [+ 1]) - path.len()`, depending on whether the
    /// path itself is about to contribute one more nested key than it
    /// already names (spec §4.7).
    fn get_maxdepth(&self, mode: DepthMode) -> usize {
        match mode {
            DepthMode::PathHasNewKey => (path::MAX_COMPONENTS + 1).saturating_sub(self.path.len()),
            DepthMode::PathIsParent => path::MAX_COMPONENTS.saturating_sub(self.path.len()),
        }
    }

    /// Run the matcher over the whole document with the parsed path,
    /// storing the result in `self.match_`.
    fn do_match_common(&mut self) -> Result<()> {
        let result = if self.path.has_negative_index() {
            exec_match_negix(&mut self.tokenizer, self.document, &self.path, DOC_MAX_DEPTH, &[], None)
        } else {
            exec_match_simple(
                &mut self.tokenizer,
                self.document,
                &self.path,
                self.path.components(),
                0,
                DOC_MAX_DEPTH,
                None,
            )
        };
        let m = match result {
            Ok(m) => m,
            Err(TokenizeError::LevelsExceeded) => return Err(Error::DocEtoodeep),
            Err(TokenizeError::Syntax) => return Err(Error::DocNotjson),
        };
        let mismatch = m.result == MatchResult::TypeMismatch;
        self.match_ = m;
        if mismatch {
            return Err(Error::PathMismatch);
        }
        Ok(())
    }

    fn do_get(&mut self) -> Result<()> {
        if self.match_.result != MatchResult::Complete {
            return Err(Error::PathEnoent);
        }
        self.fragments.push(Fragment::Span(Source::Document, self.doc_base()));
        Ok(())
    }

    fn do_get_count(&mut self) -> Result<()> {
        if self.match_.result != MatchResult::Complete {
            return Err(Error::PathEnoent);
        }
        match self.match_.kind {
            Some(ValueKind::Object) | Some(ValueKind::Array) => {}
            _ => return Err(Error::PathMismatch),
        }

        self.num.clear();
        self.num.extend(self.match_.matched_child_count.to_string().into_bytes());
        self.match_.loc_match = Loc::new(0, self.num.len());
        self.match_source = Source::Num;
        self.fragments.push(Fragment::Span(Source::Document, self.doc_base()));
        Ok(())
    }

    /// Locate the array named by the current path's first element (index
    /// `0`), appending a synthetic trailing component so a path that
    /// itself ends in `-1` (e.g. `a[-1]`, "the array inside the last
    /// element of `a`") still resolves in one pass.
    fn find_first_element(&mut self) -> Result<()> {
        let extra = [Component::ArrayIndex(0)];
        let m = self.match_array(&extra, None)?;
        let result = m.result;
        self.match_ = m;
        match result {
            MatchResult::Complete => Ok(()),
            MatchResult::TypeMismatch => Err(Error::PathMismatch),
            _ => Err(Error::PathEnoent),
        }
    }

    /// Match the path's own target as the array itself (no synthetic
    /// trailing index), scanning its children for one byte-equal to
    /// `needle`. Returns whether a duplicate was found; the match this
    /// leaves in `self.match_` spans the whole array, not an element, so
    /// callers that go on to insert must re-run [`Self::find_first_element`]
    /// to get an insertion point.
    fn check_array_contains(&mut self, needle: &[u8]) -> Result<bool> {
        let m = self.match_array(&[], Some(needle))?;
        let result = m.result;
        let unique_item_found = m.unique_item_found;
        self.match_ = m;
        match result {
            MatchResult::Complete => Ok(unique_item_found),
            MatchResult::TypeMismatch => Err(Error::PathMismatch),
            _ => Err(Error::PathEnoent),
        }
    }

    fn match_array(&mut self, extra: &[Component], ensure_unique: Option<&[u8]>) -> Result<Match> {
        let result = if self.path.has_negative_index() {
            exec_match_negix(&mut self.tokenizer, self.document, &self.path, DOC_MAX_DEPTH, extra, ensure_unique)
        } else {
            let mut components: Vec<Component> = self.path.components().to_vec();
            components.extend_from_slice(extra);
            exec_match_simple(
                &mut self.tokenizer,
                self.document,
                &self.path,
                &components,
                0,
                DOC_MAX_DEPTH,
                ensure_unique,
            )
        };
        match result {
            Ok(m) => Ok(m),
            Err(TokenizeError::LevelsExceeded) => Err(Error::DocEtoodeep),
            Err(TokenizeError::Syntax) => Err(Error::DocNotjson),
        }
    }

    /// Normalize `self.match_` so the array's *last* child is in
    /// `loc_match`, using the last-child bookkeeping `find_first_element`
    /// already collected off the array's own pop — no second scan, unlike
    /// the original's `get_last_child_pos` flag-and-rereads trick.
    fn find_last_element(&mut self) -> Result<()> {
        self.find_first_element()?;
        if self.match_.num_siblings == 0 {
            // The first element is also the last.
            return Ok(());
        }
        let (Some(start), Some(end), Some(kind)) =
            (self.match_.last_child_start, self.match_.last_child_end, self.match_.last_child_kind)
        else {
            return Ok(());
        };
        self.match_.loc_match = Loc::new(start, end - start);
        self.match_.kind = Some(kind);
        self.match_.position = self.match_.num_siblings;
        Ok(())
    }

    fn insert_singleton_element(&mut self, value_source: Source, value_loc: Loc) -> Result<()> {
        let base = self.doc_base();
        let parent = self.match_.loc_parent;
        self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_begin(base, parent, Overlap::Include)));
        self.fragments.push(Fragment::Span(value_source, value_loc));
        self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_end(base, parent, Overlap::Include)));
        Ok(())
    }

    fn emit_prepend_found(&mut self) -> Result<()> {
        let base = self.doc_base();
        let target = self.match_.loc_match;
        self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_begin(base, target, Overlap::Exclude)));
        self.fragments.push(Fragment::Span(Source::Value, Loc::new(0, self.value.len())));
        self.fragments.push(Fragment::Literal(COMMA));
        self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_begin(base, target)));
        Ok(())
    }

    fn emit_append_found(&mut self) -> Result<()> {
        let base = self.doc_base();
        let target = self.match_.loc_match;
        let parent = self.match_.loc_parent;
        self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_end(base, target, Overlap::Include)));
        self.fragments.push(Fragment::Literal(COMMA));
        self.fragments.push(Fragment::Span(Source::Value, Loc::new(0, self.value.len())));
        self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_end(base, parent, Overlap::Include)));
        Ok(())
    }

    /// Shared fallback once `find_first_element`/`find_last_element`
    /// report `PATH_ENOENT`: a singleton insertion if the array itself
    /// was found but is empty, otherwise mkdir-p if the command's high
    /// bit asks for it, otherwise the error stands.
    fn handle_listadd_enoent(&mut self) -> Result<()> {
        if self.match_.immediate_parent_found {
            self.insert_singleton_element(Source::Value, Loc::new(0, self.value.len()))
        } else if self.code.is_mkdir_p() {
            self.mkdir_p(MkdirMode::Array, Source::Value, Loc::new(0, self.value.len()))
        } else {
            Err(Error::PathEnoent)
        }
    }

    fn do_list_op(&mut self) -> Result<()> {
        match self.code.base() {
            Command::ARRAY_PREPEND => match self.find_first_element() {
                Ok(()) => self.emit_prepend_found(),
                Err(Error::PathEnoent) => self.handle_listadd_enoent(),
                Err(e) => Err(e),
            },
            Command::ARRAY_APPEND => match self.find_last_element() {
                Ok(()) => self.emit_append_found(),
                Err(Error::PathEnoent) => self.handle_listadd_enoent(),
                Err(e) => Err(e),
            },
            Command::ARRAY_ADD_UNIQUE => {
                let needle = self.value;
                match self.check_array_contains(needle) {
                    Ok(true) => Err(Error::DocEexists),
                    Ok(false) => match self.find_first_element() {
                        Ok(()) => self.emit_prepend_found(),
                        Err(Error::PathEnoent) => self.handle_listadd_enoent(),
                        Err(e) => Err(e),
                    },
                    Err(Error::PathEnoent) => self.handle_listadd_enoent(),
                    Err(e) => Err(e),
                }
            }
            _ => Err(Error::GlobalEnosupport),
        }
    }

    fn do_insert(&mut self) -> Result<()> {
        let idx = match self.path.components().last() {
            // `-1` names the last *existing* element, not an insertion
            // point; `ARRAY_INSERT` always creates one, so it's rejected
            // outright rather than silently treated as an append.
            Some(Component::NegativeIndex) => return Err(Error::PathEinval),
            Some(Component::ArrayIndex(n)) => *n as usize,
            _ => return Err(Error::PathMismatch),
        };

        self.do_match_common()?;

        if self.match_.result == MatchResult::Complete {
            let base = self.doc_base();
            let target = self.match_.loc_match;
            self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_begin(base, target, Overlap::Exclude)));
            self.fragments.push(Fragment::Span(Source::Value, Loc::new(0, self.value.len())));
            self.fragments.push(Fragment::Literal(COMMA));
            self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_begin(base, target)));
            return Ok(());
        }

        if !self.match_.immediate_parent_found {
            return Err(Error::PathEnoent);
        }

        if self.match_.num_siblings == 0 && idx == 0 {
            return self.insert_singleton_element(Source::Value, Loc::new(0, self.value.len()));
        }

        if idx == self.match_.num_siblings {
            let base = self.doc_base();
            let parent = self.match_.loc_parent;
            self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_end(base, parent, Overlap::Exclude)));
            self.fragments.push(Fragment::Literal(COMMA));
            self.fragments.push(Fragment::Span(Source::Value, Loc::new(0, self.value.len())));
            self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_end(base, parent, Overlap::Include)));
            return Ok(());
        }

        Err(Error::PathEnoent)
    }

    fn store_dict(&mut self, base: u8, mkdir_p: bool, value_source: Source, value_loc: Loc) -> Result<()> {
        if self.match_.result != MatchResult::Complete {
            match base {
                Command::DICT_ADD | Command::DICT_UPSERT => {
                    if !mkdir_p && !self.match_.immediate_parent_found {
                        return Err(Error::PathEnoent);
                    }
                }
                _ => return Err(Error::PathEnoent),
            }
        } else if base == Command::DICT_ADD {
            return Err(Error::DocEexists);
        }

        if base == Command::REMOVE {
            return self.store_dict_remove();
        }

        if self.match_.result == MatchResult::Complete {
            let b = self.doc_base();
            let target = self.match_.loc_match;
            self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_begin(b, target, Overlap::Exclude)));
            self.fragments.push(Fragment::Span(value_source, value_loc));
            self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_end(b, target, Overlap::Exclude)));
            return Ok(());
        }

        if self.match_.immediate_parent_found {
            let b = self.doc_base();
            let parent = self.match_.loc_parent;
            self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_end(b, parent, Overlap::Exclude)));
            self.fragments.push(Fragment::Literal(if self.match_.num_siblings > 0 { COMMA_QUOTE } else { QUOTE }));

            let key_idx = match self.path.components().last() {
                Some(Component::DictKey(k)) => *k,
                // Only a missing dict key can be filled in this way; an
                // array index here means the path named the wrong shape
                // of parent for a dict-store command.
                _ => return Err(Error::PathEnoent),
            };
            let key_bytes = self.path.key(key_idx).as_bytes();
            let patch_start = self.patch.len();
            self.patch.extend_from_slice(key_bytes);
            self.fragments.push(Fragment::Span(Source::Patch, Loc::new(patch_start, key_bytes.len())));

            self.fragments.push(Fragment::Literal(QUOTE_COLON));
            self.fragments.push(Fragment::Span(value_source, value_loc));
            self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_end(b, parent, Overlap::Include)));
            return Ok(());
        }

        self.mkdir_p(MkdirMode::Dict, value_source, value_loc)
    }

    fn store_dict_remove(&mut self) -> Result<()> {
        let b = self.doc_base();
        let start_ref = if !self.match_.loc_key.is_empty() { self.match_.loc_key } else { self.match_.loc_match };
        let mut first = Loc::end_at_begin(b, start_ref, Overlap::Exclude);
        let mut second = Loc::begin_at_end(b, self.match_.loc_match, Overlap::Exclude);

        if self.match_.num_siblings > 0 {
            if self.match_.position == self.match_.num_siblings {
                strip_last_comma(&mut first, self.document);
            } else {
                strip_first_comma(&mut second, self.document);
            }
        }

        self.fragments.push(Fragment::Span(Source::Document, first));
        self.fragments.push(Fragment::Span(Source::Document, second));
        Ok(())
    }

    /// Synthesize the missing chain of path components into `self.patch`
    /// and splice it around `value` at the matched parent's boundary
    /// (spec §4.6.1). `mode` controls whether the innermost new value is
    /// wrapped in `[...]` (an array command fell all the way through to
    /// here) or left bare (a dict command did).
    fn mkdir_p(&mut self, mode: MkdirMode, value_source: Source, value_loc: Loc) -> Result<()> {
        let base = self.doc_base();
        let parent = self.match_.loc_parent;
        let header = Loc::end_at_end(base, parent, Overlap::Exclude);

        self.patch.clear();
        if self.match_.num_siblings > 0 {
            self.patch.push(b',');
        }

        let components = self.path.components();
        let first_idx = self.match_.match_level;
        if first_idx >= components.len() {
            return Err(Error::PathEnoent);
        }
        let first_key = match components[first_idx] {
            Component::DictKey(k) => k,
            _ => return Err(Error::PathEnoent),
        };
        self.patch.push(b'"');
        self.patch.extend_from_slice(self.path.key(first_key).as_bytes());
        self.patch.extend_from_slice(b"\":");

        for c in &components[first_idx + 1..] {
            match c {
                Component::DictKey(k) => {
                    self.patch.extend_from_slice(b"{\"");
                    self.patch.extend_from_slice(self.path.key(*k).as_bytes());
                    self.patch.extend_from_slice(b"\":");
                }
                // Every remaining component must itself be a fresh dict
                // key: mkdir-p can only fabricate objects, never arrays
                // of a particular length.
                _ => return Err(Error::PathEnoent),
            }
        }

        if let MkdirMode::Array = mode {
            self.patch.push(b'[');
        }
        let prefix_len = self.patch.len();

        if let MkdirMode::Array = mode {
            self.patch.push(b']');
        }
        for _ in &components[first_idx + 1..] {
            self.patch.push(b'}');
        }
        let suffix_len = self.patch.len() - prefix_len;

        let prefix = Loc::new(0, prefix_len);
        let suffix = Loc::new(prefix_len, suffix_len);
        let trailer = Loc::begin_at_end(base, parent, Overlap::Include);

        self.fragments.push(Fragment::Span(Source::Document, header));
        self.fragments.push(Fragment::Span(Source::Patch, prefix));
        self.fragments.push(Fragment::Span(value_source, value_loc));
        self.fragments.push(Fragment::Span(Source::Patch, suffix));
        self.fragments.push(Fragment::Span(Source::Document, trailer));
        Ok(())
    }

    fn do_arith_op(&mut self) -> Result<()> {
        if self.delta == 0 {
            return Err(Error::DeltaEinval);
        }

        self.do_match_common()?;

        if self.match_.result == MatchResult::Complete {
            if self.match_.kind != Some(ValueKind::Number) {
                return Err(Error::PathMismatch);
            }
            if !self.match_.number_flags.unwrap_or_default().is_integral() {
                return Err(Error::PathMismatch);
            }

            let text = self.match_.loc_match.resolve(self.document);
            let text = std::str::from_utf8(text).map_err(|_| Error::NumE2big)?;
            let current: i64 = text.parse().map_err(|_| Error::NumE2big)?;
            let updated = current.checked_add(self.delta).ok_or(Error::DeltaOverflow)?;

            self.num.clear();
            self.num.extend(updated.to_string().into_bytes());

            let b = self.doc_base();
            let target = self.match_.loc_match;
            self.fragments.push(Fragment::Span(Source::Document, Loc::end_at_begin(b, target, Overlap::Exclude)));
            self.fragments.push(Fragment::Span(Source::Num, Loc::new(0, self.num.len())));
            self.fragments.push(Fragment::Span(Source::Document, Loc::begin_at_end(b, target, Overlap::Exclude)));

            self.match_.loc_match = Loc::new(0, self.num.len());
            self.match_source = Source::Num;
            return Ok(());
        }

        if !self.code.is_mkdir_p() && !self.match_.immediate_parent_found {
            return Err(Error::PathEnoent);
        }
        if self.match_.kind != Some(ValueKind::Object) {
            return Err(Error::PathEnoent);
        }

        self.num.clear();
        self.num.extend(self.delta.to_string().into_bytes());
        let value_loc = Loc::new(0, self.num.len());
        self.store_dict(Command::DICT_ADD, true, Source::Num, value_loc)?;

        self.match_.loc_match = value_loc;
        self.match_source = Source::Num;
        Ok(())
    }
}

/* Start at the beginning of the buffer, stripping the first comma found. */
fn strip_first_comma(loc: &mut Loc, buf: &[u8]) {
    let slice = loc.resolve(buf);
    if let Some(i) = slice.iter().position(|&b| b == b',') {
        loc.ltrim(i + 1);
    }
}

/* Start at the end of the buffer, stripping the last comma found. */
fn strip_last_comma(loc: &mut Loc, buf: &[u8]) {
    let slice = loc.resolve(buf);
    if let Some(i) = slice.iter().rposition(|&b| b == b',') {
        loc.rtrim(slice.len() - i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op<'d>(code: u8, document: &'d [u8], value: &'d [u8]) -> Operation<'d> {
        let mut o = Operation::new();
        o.set_code(code);
        o.set_document(document);
        o.set_value(value);
        o
    }

    #[test]
    fn get_returns_matched_value_and_whole_document() {
        let mut o = op(Command::GET, br#"{"a":1,"b":2}"#, b"");
        o.exec(b"b").unwrap();
        assert_eq!(o.match_value(), b"2");
        assert_eq!(o.new_document(), br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn get_missing_key_is_path_enoent() {
        let mut o = op(Command::GET, br#"{"a":1}"#, b"");
        assert_eq!(o.exec(b"z"), Err(Error::PathEnoent));
    }

    #[test]
    fn replace_existing_value() {
        let mut o = op(Command::REPLACE, br#"{"a":1,"b":2}"#, b"99");
        o.exec(b"b").unwrap();
        assert_eq!(o.new_document(), br#"{"a":1,"b":99}"#);
    }

    #[test]
    fn remove_last_key_strips_preceding_comma() {
        let mut o = op(Command::REMOVE, br#"{"a":1,"b":2,"c":3}"#, b"");
        o.exec(b"c").unwrap();
        assert_eq!(o.new_document(), br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn remove_first_key_strips_following_comma() {
        let mut o = op(Command::REMOVE, br#"{"a":1,"b":2,"c":3}"#, b"");
        o.exec(b"a").unwrap();
        assert_eq!(o.new_document(), br#"{"b":2,"c":3}"#);
    }

    #[test]
    fn remove_only_key_leaves_empty_object() {
        let mut o = op(Command::REMOVE, br#"{"a":1}"#, b"");
        o.exec(b"a").unwrap();
        assert_eq!(o.new_document(), b"{}");
    }

    #[test]
    fn remove_root_is_rejected() {
        let mut o = op(Command::REMOVE, br#"{"a":1}"#, b"");
        assert_eq!(o.exec(b""), Err(Error::ValueCantinsert));
    }

    #[test]
    fn dict_upsert_inserts_missing_key_into_existing_object() {
        let mut o = op(Command::DICT_UPSERT, br#"{"a":1}"#, b"2");
        o.exec(b"b").unwrap();
        assert_eq!(o.new_document(), br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn dict_add_on_existing_key_is_doc_eexists() {
        let mut o = op(Command::DICT_ADD, br#"{"a":1}"#, b"2");
        assert_eq!(o.exec(b"a"), Err(Error::DocEexists));
    }

    #[test]
    fn dict_upsert_p_creates_missing_parent_chain() {
        let mut o = op(Command::DICT_UPSERT | 0x80, b"{}", b"1");
        o.exec(b"a.b.c").unwrap();
        assert_eq!(o.new_document(), br#"{"a":{"b":{"c":1}}}"#);
    }

    #[test]
    fn dict_upsert_without_mkdir_p_on_deep_missing_path_is_enoent() {
        let mut o = op(Command::DICT_UPSERT, b"{}", b"1");
        assert_eq!(o.exec(b"a.b"), Err(Error::PathEnoent));
    }

    #[test]
    fn array_append_into_empty_array() {
        let mut o = op(Command::ARRAY_APPEND, br#"{"a":[]}"#, b"5");
        o.exec(b"a").unwrap();
        assert_eq!(o.new_document(), br#"{"a":[5]}"#);
    }

    #[test]
    fn array_append_into_nonempty_array() {
        let mut o = op(Command::ARRAY_APPEND, br#"{"a":[1,2]}"#, b"3");
        o.exec(b"a").unwrap();
        assert_eq!(o.new_document(), br#"{"a":[1,2,3]}"#);
    }

    #[test]
    fn array_prepend_into_nonempty_array() {
        let mut o = op(Command::ARRAY_PREPEND, br#"{"a":[1,2]}"#, b"0");
        o.exec(b"a").unwrap();
        assert_eq!(o.new_document(), br#"{"a":[0,1,2]}"#);
    }

    #[test]
    fn array_append_p_creates_missing_array() {
        let mut o = op(Command::ARRAY_APPEND | 0x80, b"{}", b"1");
        o.exec(b"a").unwrap();
        assert_eq!(o.new_document(), br#"{"a":[1]}"#);
    }

    #[test]
    fn array_insert_before_existing_element() {
        let mut o = op(Command::ARRAY_INSERT, b"[1,2,3,5]", b"4");
        o.exec(b"[3]").unwrap();
        assert_eq!(o.new_document(), b"[1,2,3,4,5]");
    }

    #[test]
    fn array_insert_negative_index_is_path_einval() {
        let mut o = op(Command::ARRAY_INSERT, b"[1,2,3]", b"4");
        assert_eq!(o.exec(b"[-1]"), Err(Error::PathEinval));
    }

    #[test]
    fn array_insert_one_past_end_appends() {
        let mut o = op(Command::ARRAY_INSERT, b"[1,2,3]", b"4");
        o.exec(b"[3]").unwrap();
        assert_eq!(o.new_document(), b"[1,2,3,4]");
    }

    #[test]
    fn array_insert_out_of_range_is_path_enoent() {
        let mut o = op(Command::ARRAY_INSERT, b"[1,2,3]", b"9");
        assert_eq!(o.exec(b"[9]"), Err(Error::PathEnoent));
    }

    #[test]
    fn array_add_unique_rejects_duplicate() {
        let mut o = op(Command::ARRAY_ADD_UNIQUE, br#"{"xs":[1,2,3]}"#, b"2");
        assert_eq!(o.exec(b"xs"), Err(Error::DocEexists));
    }

    #[test]
    fn array_add_unique_accepts_new_scalar() {
        let mut o = op(Command::ARRAY_ADD_UNIQUE, br#"{"xs":[1,2,3]}"#, b"9");
        o.exec(b"xs").unwrap();
        assert_eq!(o.new_document(), br#"{"xs":[9,1,2,3]}"#);
    }

    #[test]
    fn array_add_unique_rejects_non_primitive_value() {
        let mut o = op(Command::ARRAY_ADD_UNIQUE, br#"{"xs":[1,2,3]}"#, b"{}");
        assert_eq!(o.exec(b"xs"), Err(Error::ValueCantinsert));
    }

    #[test]
    fn counter_increments_existing_number() {
        let mut o = op(Command::COUNTER, br#"{"n":5}"#, b"");
        o.set_delta(3);
        o.exec(b"n").unwrap();
        assert_eq!(o.new_document(), br#"{"n":8}"#);
        assert_eq!(o.match_value(), b"8");
    }

    #[test]
    fn counter_decrements_with_negative_delta() {
        let mut o = op(Command::COUNTER, br#"{"n":5}"#, b"");
        o.set_delta(-2);
        o.exec(b"n").unwrap();
        assert_eq!(o.new_document(), br#"{"n":3}"#);
    }

    #[test]
    fn counter_zero_delta_is_einval() {
        let mut o = op(Command::COUNTER, br#"{"n":5}"#, b"");
        o.set_delta(0);
        assert_eq!(o.exec(b"n"), Err(Error::DeltaEinval));
    }

    #[test]
    fn counter_overflow_is_delta_overflow() {
        let doc = format!(r#"{{"n":{}}}"#, i64::MAX);
        let mut o = op(Command::COUNTER, doc.as_bytes(), b"");
        o.set_delta(1);
        assert_eq!(o.exec(b"n"), Err(Error::DeltaOverflow));
    }

    #[test]
    fn counter_on_missing_key_creates_it() {
        let mut o = op(Command::COUNTER, b"{}", b"");
        o.set_delta(3);
        o.exec(b"n").unwrap();
        assert_eq!(o.new_document(), br#"{"n":3}"#);
    }

    #[test]
    fn counter_on_non_numeric_value_is_path_mismatch() {
        let mut o = op(Command::COUNTER, br#"{"n":"x"}"#, b"");
        o.set_delta(1);
        assert_eq!(o.exec(b"n"), Err(Error::PathMismatch));
    }

    #[test]
    fn get_count_on_array() {
        let mut o = op(Command::GET_COUNT, br#"{"a":[1,2,3]}"#, b"");
        o.exec(b"a").unwrap();
        assert_eq!(o.match_value(), b"3");
        assert_eq!(o.new_document(), br#"{"a":[1,2,3]}"#);
    }

    #[test]
    fn get_count_on_scalar_is_path_mismatch() {
        let mut o = op(Command::GET_COUNT, br#"{"a":1}"#, b"");
        assert_eq!(o.exec(b"a"), Err(Error::PathMismatch));
    }

    #[test]
    fn exists_on_missing_path_is_path_enoent() {
        let mut o = op(Command::EXISTS, br#"{"a":1}"#, b"");
        assert_eq!(o.exec(b"b"), Err(Error::PathEnoent));
    }

    #[test]
    fn get_matches_key_spelled_with_uescape_in_document() {
        let mut o = op(Command::GET, b"{\"\\u0066oo\":1}", b"");
        o.exec(b"foo").unwrap();
        assert_eq!(o.match_value(), b"1");
    }
}
