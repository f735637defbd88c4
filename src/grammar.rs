//! Grammar definitions and the declarative helpers extension providers use to
//! describe them.
//!
//! ```text
//! // fileinto [:create] <mailbox: string>
//! b.register_action(
//!     id("action/fileinto", "@action", "fileinto"),
//!     token("fileinto"),
//!     vec![],
//!     vec![string_field("mailbox").default("INBOX")],
//! )?;
//! ```

use serde::Serialize;

use crate::error::RegistryError;
use crate::field::{FieldKind, FieldValue};

/// Well-known grammar positions.
pub const ACTIONS: &str = "@action";
pub const TESTS: &str = "@test";
pub const CONTROLS: &str = "@control";

/// Identity of a definition: its kind, the group it belongs to, and the
/// capability (extension) that must be enabled for it to be recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identifier {
    pub kind: String,
    pub parent: String,
    /// `None` for vocabulary that is always available.
    pub capability: Option<String>,
}

pub fn id<'a>(kind: &str, parent: &str, capability: impl Into<Option<&'a str>>) -> Identifier {
    Identifier {
        kind: kind.to_string(),
        parent: parent.to_string(),
        capability: capability.into().map(str::to_string),
    }
}

pub fn token(literal: &str) -> String {
    literal.to_string()
}

/// An optional tag position on a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSlot {
    pub name: String,
    /// Either a concrete tag kind or an `@group` of tag definitions.
    pub accepts: String,
    /// Tag kind instantiated (disabled) when the node is created.
    pub default: Option<String>,
}

impl TagSlot {
    pub fn accepts(mut self, kind: &str) -> Self {
        self.accepts = kind.to_string();
        self
    }

    pub fn default(mut self, kind: &str) -> Self {
        self.default = Some(kind.to_string());
        self
    }

    pub fn accepts_group(&self) -> bool {
        self.accepts.starts_with('@')
    }
}

/// A tag slot named `name` accepting the `@name` group.
pub fn tag(name: &str) -> TagSlot {
    TagSlot {
        name: name.to_string(),
        accepts: format!("@{}", name),
        default: None,
    }
}

/// A positional parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSlot {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<FieldValue>,
}

impl ParamSlot {
    pub fn default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Value a new node starts with for this slot.
    pub fn initial_value(&self) -> Option<FieldValue> {
        match (&self.default, self.kind) {
            (Some(FieldValue::String(s)), FieldKind::StringList) => {
                Some(FieldValue::StringList(vec![s.clone()]))
            }
            (Some(v), _) => Some(v.clone()),
            (None, kind) => FieldValue::empty(kind),
        }
    }
}

fn param(name: &str, kind: FieldKind) -> ParamSlot {
    ParamSlot {
        name: name.to_string(),
        kind,
        default: None,
    }
}

pub fn string_field(name: &str) -> ParamSlot {
    param(name, FieldKind::String)
}

pub fn string_list_field(name: &str) -> ParamSlot {
    param(name, FieldKind::StringList)
}

pub fn number_field(name: &str) -> ParamSlot {
    param(name, FieldKind::Number)
}

pub fn test_field(name: &str) -> ParamSlot {
    param(name, FieldKind::Test)
}

pub fn test_list_field(name: &str) -> ParamSlot {
    param(name, FieldKind::TestList)
}

pub fn block_field(name: &str) -> ParamSlot {
    param(name, FieldKind::Block)
}

/// Something merged into an existing definition by `extend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addition {
    Tag(TagSlot),
    Param(ParamSlot),
}

impl Addition {
    pub fn name(&self) -> &str {
        match self {
            Addition::Tag(t) => &t.name,
            Addition::Param(p) => &p.name,
        }
    }
}

impl From<TagSlot> for Addition {
    fn from(t: TagSlot) -> Self {
        Addition::Tag(t)
    }
}

impl From<ParamSlot> for Addition {
    fn from(p: ParamSlot) -> Self {
        Addition::Param(p)
    }
}

/// The registered description of one action, test, tag or control command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub id: Identifier,
    pub token: String,
    pub tags: Vec<TagSlot>,
    pub params: Vec<ParamSlot>,
    /// Kinds this statement must directly follow (`elsif`, `else`).
    pub follows: Vec<String>,
}

impl Definition {
    pub fn new(id: Identifier, token: String, tags: Vec<TagSlot>, params: Vec<ParamSlot>) -> Self {
        Definition {
            id,
            token,
            tags,
            params,
            follows: Vec::new(),
        }
    }

    pub fn following(mut self, kinds: &[&str]) -> Self {
        self.follows = kinds.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn kind(&self) -> &str {
        &self.id.kind
    }

    pub fn parent(&self) -> &str {
        &self.id.parent
    }

    pub fn capability(&self) -> Option<&str> {
        self.id.capability.as_deref()
    }

    /// Names of every element a node of this definition carries, tags first.
    pub fn element_names(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .map(|t| t.name.as_str())
            .chain(self.params.iter().map(|p| p.name.as_str()))
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.element_names().any(|n| n == name)
    }

    pub fn tag_slot(&self, name: &str) -> Option<&TagSlot> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn param_slot(&self, name: &str) -> Option<&ParamSlot> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Statements end with `;` unless their last parameter is a block.
    pub fn is_terminated(&self) -> bool {
        !matches!(self.params.last(), Some(p) if p.kind == FieldKind::Block)
    }

    /// Merge `addition` into a copy of this definition.
    pub fn extended(&self, addition: Addition) -> Result<Definition, RegistryError> {
        if self.has_child(addition.name()) {
            return Err(RegistryError::DuplicateChild {
                kind: self.id.kind.clone(),
                child: addition.name().to_string(),
            });
        }
        let mut merged = self.clone();
        match addition {
            Addition::Tag(t) => merged.tags.push(t),
            Addition::Param(p) => merged.params.push(p),
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fileinto() -> Definition {
        Definition::new(
            id("action/fileinto", ACTIONS, "fileinto"),
            token("fileinto"),
            vec![],
            vec![string_field("mailbox").default("INBOX")],
        )
    }

    #[test]
    fn extended_appends_without_touching_base() {
        let base = fileinto();
        let merged = base
            .extended(tag("create").accepts("action/fileinto/create").into())
            .unwrap();
        assert!(base.tag_slot("create").is_none());
        assert_eq!(
            merged.element_names().collect::<Vec<_>>(),
            vec!["create", "mailbox"]
        );
    }

    #[test]
    fn extended_rejects_duplicate_child() {
        let err = fileinto()
            .extended(string_field("mailbox").into())
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateChild {
                kind: "action/fileinto".into(),
                child: "mailbox".into()
            }
        );
    }

    #[test]
    fn block_statements_are_not_terminated() {
        let def = Definition::new(
            id("control/if", CONTROLS, None),
            token("if"),
            vec![],
            vec![test_field("test"), block_field("block")],
        );
        assert!(!def.is_terminated());
        assert!(fileinto().is_terminated());
    }

    #[test]
    fn string_default_lifts_into_list_slot() {
        let slot = string_list_field("mailboxes").default("INBOX");
        assert_eq!(
            slot.initial_value(),
            Some(FieldValue::StringList(vec!["INBOX".into()]))
        );
    }
}
