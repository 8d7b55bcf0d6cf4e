/*!
A sub-document JSON mutation engine: given a document and an N1QL-flavored
path, plan a read or an edit as an ordered list of byte-range fragments
instead of parsing the document into a DOM and reserializing it.

The pieces, roughly in the order a mutation flows through them:

- [`path`] parses a path string into path components.
- [`tokenizer`] is a SAX-style, explicit-stack JSON scanner; it never
  builds a tree, only calls back with push/pop/key events and byte
  offsets.
- [`matcher`] drives the tokenizer over a document with a parsed path,
  reporting where (if anywhere) the path's target lives.
- [`validator`] checks a caller-supplied replacement value is legal JSON
  in the context it's headed for, using the same tokenizer.
- [`operation`] ties the above together into a command planner: given a
  document, a path, a value, and a command code, it produces the
  fragment list that makes up the new document.
- [`loc`] is the byte-range type threaded through all of the above.
- [`uescape`] decodes `\uXXXX` escapes in object keys for comparison
  against plain-UTF-8 path components.
- [`error`] is the shared error type returned by fallible operations.
*/

#[macro_use]
mod macros;

pub mod error;
pub mod loc;
pub mod matcher;
pub mod operation;
pub mod path;
mod std_ext;
pub mod tokenizer;
pub mod uescape;
pub mod validator;

pub use crate::error::{Error, Result};
pub use crate::operation::{Command, Fragment, Operation, Source};
pub use crate::path::Path;
