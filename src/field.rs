//! Value containers for the primitive terms of a script: strings, string
//! lists and numbers, plus the quoting rules shared by the parser and the
//! serializer.

use std::fmt;

use serde::Serialize;

/// The declared type of a parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    String,
    StringList,
    Number,
    /// A single nested test, e.g. the condition of `if` or `not`.
    Test,
    /// A parenthesized, comma separated list of tests (`allof`, `anyof`).
    TestList,
    /// A `{ ... }` block of commands.
    Block,
}

impl FieldKind {
    /// Whether values of this kind are plain [`FieldValue`]s.
    pub fn is_value(self) -> bool {
        matches!(
            self,
            FieldKind::String | FieldKind::StringList | FieldKind::Number
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::String => "a string",
            FieldKind::StringList => "a string list",
            FieldKind::Number => "a number",
            FieldKind::Test => "a test",
            FieldKind::TestList => "a test list",
            FieldKind::Block => "a block",
        };
        f.write_str(s)
    }
}

/// Multiplier suffix of a number literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quantifier {
    K,
    M,
    G,
}

impl Quantifier {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch.to_ascii_uppercase() {
            'K' => Some(Quantifier::K),
            'M' => Some(Quantifier::M),
            'G' => Some(Quantifier::G),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Quantifier::K => 'K',
            Quantifier::M => 'M',
            Quantifier::G => 'G',
        }
    }

    pub fn multiplier(self) -> u64 {
        match self {
            Quantifier::K => 1 << 10,
            Quantifier::M => 1 << 20,
            Quantifier::G => 1 << 30,
        }
    }
}

/// A number literal. The quantifier is kept as written so that `100K`
/// serializes back as `100K` rather than `102400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Number {
    pub value: u64,
    pub quantifier: Option<Quantifier>,
}

impl Number {
    pub fn new(value: u64) -> Self {
        Number {
            value,
            quantifier: None,
        }
    }

    pub fn with_quantifier(value: u64, quantifier: Quantifier) -> Self {
        Number {
            value,
            quantifier: Some(quantifier),
        }
    }

    /// The value with its quantifier applied, saturating on overflow.
    pub fn absolute(&self) -> u64 {
        match self.quantifier {
            Some(q) => self.value.saturating_mul(q.multiplier()),
            None => self.value,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)?;
        if let Some(q) = self.quantifier {
            write!(f, "{}", q.as_char())?;
        }
        Ok(())
    }
}

/// The value held by a string, string-list or number parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum FieldValue {
    String(String),
    StringList(Vec<String>),
    Number(Number),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::String(_) => FieldKind::String,
            FieldValue::StringList(_) => FieldKind::StringList,
            FieldValue::Number(_) => FieldKind::Number,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::StringList(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The value a freshly instantiated slot of `kind` holds when no
    /// default was declared.
    pub fn empty(kind: FieldKind) -> Option<Self> {
        match kind {
            FieldKind::String => Some(FieldValue::String(String::new())),
            FieldKind::StringList => Some(FieldValue::StringList(Vec::new())),
            FieldKind::Number => Some(FieldValue::Number(Number::new(0))),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::StringList(items)
    }
}

impl From<&[&str]> for FieldValue {
    fn from(items: &[&str]) -> Self {
        FieldValue::StringList(items.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Number> for FieldValue {
    fn from(n: Number) -> Self {
        FieldValue::Number(n)
    }
}

// ── Quoting ─────────────────────────────────────────────────────────

/// Append `s` as a quoted string. Only `"` and `\` need escaping; line
/// breaks are legal inside quoted strings.
pub fn write_quoted(buf: &mut String, s: &str) {
    buf.push('"');
    for ch in s.chars() {
        match ch {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            c => buf.push(c),
        }
    }
    buf.push('"');
}

pub fn quote(s: &str) -> String {
    let mut buf = String::with_capacity(s.len() + 2);
    write_quoted(&mut buf, s);
    buf
}

/// Append a string list: a single entry is written as a bare string,
/// anything else in brackets.
pub fn write_string_list(buf: &mut String, items: &[String]) {
    if let [only] = items {
        write_quoted(buf, only);
        return;
    }
    buf.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        write_quoted(buf, item);
    }
    buf.push(']');
}

pub fn write_value(buf: &mut String, value: &FieldValue) {
    match value {
        FieldValue::String(s) => write_quoted(buf, s),
        FieldValue::StringList(items) => write_string_list(buf, items),
        FieldValue::Number(n) => buf.push_str(&n.to_string()),
    }
}
