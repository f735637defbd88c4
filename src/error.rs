use std::fmt;

use serde::Serialize;

/// A 0-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// 0-based line number
    pub line: usize,
    /// 0-based column (character offset within the line)
    pub column: usize,
    /// 0-based absolute byte offset from the start of input
    pub offset: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Region of source text a node or error covers (`end` is exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub begin: Position,
    pub end: Position,
}

// ── Registry ────────────────────────────────────────────────────────

/// Errors raised while building a [`crate::registry::Registry`].
///
/// These indicate a broken extension provider and abort initialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("definition '{kind}' is already registered")]
    DuplicateDefinition { kind: String },

    #[error("cannot extend '{kind}': no such definition")]
    UnknownBase { kind: String },

    #[error("definition '{kind}' already declares an element named '{child}'")]
    DuplicateChild { kind: String, child: String },

    #[error("no definition registered for '{kind}'")]
    NotFound { kind: String },

    #[error("'{kind}' belongs to '{parent}', not to '{expected}'")]
    WrongCollection {
        kind: String,
        parent: String,
        expected: String,
    },

    #[error("invalid token '{token}' for '{kind}'")]
    InvalidToken { kind: String, token: String },

    #[error("default of '{child}' on '{kind}' does not fit the declared type")]
    InvalidDefault { kind: String, child: String },

    #[error("tag defaults of '{kind}' instantiate '{kind}' again")]
    CyclicDefault { kind: String },
}

// ── Parse ───────────────────────────────────────────────────────────

/// What went wrong while parsing a script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unknown token '{token}'{}", expected_hint(.expected))]
    UnknownToken { token: String, expected: Vec<String> },

    #[error("'{token}' requires the '{capability}' extension, which is not enabled")]
    CapabilityDisabled { token: String, capability: String },

    #[error("'{field}' expects {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("{0}")]
    MalformedLiteral(String),

    #[error("expected {expected}, found {found}")]
    UnexpectedInput { expected: String, found: String },

    #[error("tag '{token}' given more than once")]
    DuplicateTag { token: String },

    #[error("'{token}' must follow {}", .after.join(" or "))]
    MisplacedStatement { token: String, after: Vec<String> },

    #[error("grammar error: {0}")]
    Grammar(#[from] RegistryError),
}

fn expected_hint(expected: &[String]) -> String {
    if expected.is_empty() {
        String::new()
    } else {
        format!("; expected one of: {}", expected.join(", "))
    }
}

impl ParseErrorKind {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ParseErrorKind::UnknownToken { .. } => "unknown-token",
            ParseErrorKind::CapabilityDisabled { .. } => "capability-disabled",
            ParseErrorKind::TypeMismatch { .. } => "type-mismatch",
            ParseErrorKind::MalformedLiteral(_) => "malformed-literal",
            ParseErrorKind::UnexpectedInput { .. } => "unexpected-input",
            ParseErrorKind::DuplicateTag { .. } => "duplicate-tag",
            ParseErrorKind::MisplacedStatement { .. } => "misplaced-statement",
            ParseErrorKind::Grammar(_) => "grammar-error",
        }
    }
}

/// A parse error with span information (begin..end).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Start of the offending region
    pub begin: Position,
    /// End of the offending region (exclusive)
    pub end: Position,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, begin: Position, end: Position) -> Self {
        ParseError { kind, begin, end }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.begin == self.end {
            write!(
                f,
                "{}:{}: {} ({})",
                self.begin.line,
                self.begin.column,
                self.kind,
                self.code()
            )
        } else {
            write!(
                f,
                "{}:{}-{}:{}: {} ({})",
                self.begin.line,
                self.begin.column,
                self.end.line,
                self.end.column,
                self.kind,
                self.code()
            )
        }
    }
}

impl std::error::Error for ParseError {}

// ── Document / Serializer ───────────────────────────────────────────

/// Misuse of the document accessor contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("'{kind}' has no element named '{name}'")]
    UnknownElement { kind: String, name: String },

    #[error("element '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("element '{name}' is not a tag")]
    NotATag { name: String },

    #[error("element '{name}' is not a value field")]
    NotAField { name: String },

    #[error("element '{name}' has no value to enable")]
    NoValue { name: String },

    #[error("tag '{kind}' is not accepted by element '{name}'")]
    TagNotAccepted { name: String, kind: String },
}

/// Serialization only fails when a node no longer matches its definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    #[error("node '{kind}' does not match its definition: {detail}")]
    StructuralInvariantViolation { kind: String, detail: String },
}
