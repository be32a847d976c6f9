//! Parsed views of the two inputs dockerdeps reads from a recipe: the
//! Dockerfile directive tree and the image references inside `FROM`.

mod parser;
mod reference;

pub use parser::{parse, Dockerfile, Heredoc, Node, ParseError};
pub use reference::{Qualifier, Reference, ReferenceError};
