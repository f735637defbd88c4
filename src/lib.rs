//! An extensible grammar engine for Sieve mail filtering scripts.
//!
//! Extensions describe their commands, tests and tags in a [`Registry`].
//! [`parse`] turns script text into a [`Document`] using whatever subset of
//! the registry a [`Capabilities`] set unlocks, and [`serialize`] writes a
//! document back out as canonical text.
//!
//! ```text
//! let registry = Registry::standard()?;
//! let caps = Capabilities::none().with("fileinto");
//! let doc = parse("fileinto \"Spam\";", &registry, &caps)?;
//! assert_eq!(serialize(&doc)?, "fileinto \"Spam\";\n");
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod extensions;
pub mod field;
pub mod grammar;
pub mod json;
pub mod parser;
pub mod registry;
pub mod serializer;

pub use document::{Block, Comment, CommentStyle, Document, Element, ElementValue, Node};
pub use error::{
    DocumentError, ParseError, ParseErrorKind, Position, RegistryError, SerializeError, Span,
};
pub use field::{FieldKind, FieldValue, Number, Quantifier};
pub use grammar::Definition;
pub use parser::{parse, parse_test};
pub use registry::{Capabilities, Provider, Registry, RegistryBuilder};
pub use serializer::{serialize, serialize_with, FormatOptions};

/// Parse `input` and write it straight back out in canonical form.
pub fn reformat(
    input: &str,
    registry: &Registry,
    capabilities: &Capabilities,
    options: &FormatOptions,
) -> Result<String, FormatError> {
    let document = parse(input, registry, capabilities)?;
    Ok(serialize_with(&document, options)?)
}

/// Failure of [`reformat`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

#[cfg(test)]
mod tests;
