use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{DocumentError, SerializeError, Span};
use crate::field::{FieldKind, FieldValue};
use crate::grammar::Definition;

/// How a comment was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `# text` up to the end of the line
    Hash,
    /// `/* text */`
    Bracket,
}

/// A comment, stored without its delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub style: CommentStyle,
    pub text: String,
}

impl Comment {
    pub fn hash(text: &str) -> Self {
        Comment {
            style: CommentStyle::Hash,
            text: text.to_string(),
        }
    }

    pub fn bracket(text: &str) -> Self {
        Comment {
            style: CommentStyle::Bracket,
            text: text.to_string(),
        }
    }
}

/// A sequence of commands: the script itself or the body of `{ ... }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub commands: Vec<Node>,
    /// Comments after the last command, before the closing brace / EOF.
    pub trailing_comments: Vec<Comment>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What an element holds.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Selected (or latent default) tag node. `None` until one is chosen.
    Tag(Option<Box<Node>>),
    Field(FieldValue),
    Test(Option<Box<Node>>),
    Tests(Vec<Node>),
    Block(Block),
}

impl ElementValue {
    fn describe(&self) -> &'static str {
        match self {
            ElementValue::Tag(_) => "a tag",
            ElementValue::Field(v) => match v.kind() {
                FieldKind::String => "a string",
                FieldKind::StringList => "a string list",
                _ => "a number",
            },
            ElementValue::Test(_) => "a test",
            ElementValue::Tests(_) => "a test list",
            ElementValue::Block(_) => "a block",
        }
    }
}

/// A named child of a [`Node`]: one tag slot or one parameter.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    enabled: bool,
    value: ElementValue,
}

/// A disabled tag is absent from the script, so whatever it still holds
/// does not take part in equality.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name || self.enabled != other.enabled {
            return false;
        }
        let latent = !self.enabled && self.is_tag() && other.is_tag();
        latent || self.value == other.value
    }
}

impl Element {
    pub fn new(name: &str, enabled: bool, value: ElementValue) -> Self {
        Element {
            name: name.to_string(),
            enabled,
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn value(&self) -> &ElementValue {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ElementValue {
        &mut self.value
    }

    /// The stored field value, if this element is a string/list/number.
    pub fn field(&self) -> Option<&FieldValue> {
        match &self.value {
            ElementValue::Field(v) => Some(v),
            _ => None,
        }
    }

    /// Replace a field value. The new value must have the same type.
    pub fn set_value(&mut self, value: impl Into<FieldValue>) -> Result<(), DocumentError> {
        let value = value.into();
        match &mut self.value {
            ElementValue::Field(current) if current.kind() == value.kind() => {
                *current = value;
                Ok(())
            }
            ElementValue::Field(current) => Err(DocumentError::TypeMismatch {
                name: self.name.clone(),
                expected: current.kind().to_string(),
                found: value.kind().to_string(),
            }),
            _ => Err(DocumentError::NotAField {
                name: self.name.clone(),
            }),
        }
    }

    /// The tag node held by this element, enabled or not.
    pub fn tag(&self) -> Option<&Node> {
        match &self.value {
            ElementValue::Tag(Some(node)) => Some(node),
            _ => None,
        }
    }

    pub fn tag_mut(&mut self) -> Option<&mut Node> {
        match &mut self.value {
            ElementValue::Tag(Some(node)) => Some(node),
            _ => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.value, ElementValue::Tag(_))
    }
}

/// One parsed command, test or tag, bound to the definition that produced it.
#[derive(Debug, Clone)]
pub struct Node {
    definition: Arc<Definition>,
    elements: Vec<Element>,
    comments: Vec<Comment>,
    span: Span,
}

/// Value equality: source positions are not compared.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.definition.id.kind == other.definition.id.kind
            && self.elements == other.elements
            && self.comments == other.comments
    }
}

impl Node {
    /// Assemble a node from raw parts. Nothing is checked here; the
    /// serializer rejects nodes whose elements drift from the definition.
    pub fn from_parts(definition: Arc<Definition>, elements: Vec<Element>) -> Self {
        Node {
            definition,
            elements,
            comments: Vec::new(),
            span: Span::default(),
        }
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    pub fn kind(&self) -> &str {
        self.definition.kind()
    }

    pub fn token(&self) -> &str {
        &self.definition.token
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub(crate) fn set_span(&mut self, span: Span) {
        self.span = span;
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn comments_mut(&mut self) -> &mut Vec<Comment> {
        &mut self.comments
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Overwrite the element at `index` (declaration order).
    pub(crate) fn fill(&mut self, index: usize, value: ElementValue, enabled: bool) {
        let element = &mut self.elements[index];
        element.value = value;
        element.enabled = enabled;
    }

    pub fn element(&self, name: &str) -> Result<&Element, DocumentError> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| self.unknown(name))
    }

    pub fn element_mut(&mut self, name: &str) -> Result<&mut Element, DocumentError> {
        let kind = self.definition.id.kind.clone();
        self.elements
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or(DocumentError::UnknownElement {
                kind,
                name: name.to_string(),
            })
    }

    fn unknown(&self, name: &str) -> DocumentError {
        DocumentError::UnknownElement {
            kind: self.definition.id.kind.clone(),
            name: name.to_string(),
        }
    }

    pub fn is_enabled(&self, name: &str) -> Result<bool, DocumentError> {
        Ok(self.element(name)?.enabled)
    }

    /// Toggle an optional tag. The stored tag is kept when disabling, so
    /// enabling again restores it.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), DocumentError> {
        let element = self.element_mut(name)?;
        match &element.value {
            ElementValue::Tag(None) if enabled => Err(DocumentError::NoValue {
                name: name.to_string(),
            }),
            ElementValue::Tag(_) => {
                element.enabled = enabled;
                Ok(())
            }
            // parameters are positional and always present
            _ if enabled => Ok(()),
            _ => Err(DocumentError::NotATag {
                name: name.to_string(),
            }),
        }
    }

    pub fn value(&self, name: &str) -> Result<&FieldValue, DocumentError> {
        self.element(name)?
            .field()
            .ok_or_else(|| DocumentError::NotAField {
                name: name.to_string(),
            })
    }

    pub fn set_value(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<(), DocumentError> {
        self.element_mut(name)?.set_value(value)
    }

    /// The tag stored under `name`, if it is enabled.
    pub fn enabled_tag(&self, name: &str) -> Option<&Node> {
        self.element(name)
            .ok()
            .filter(|e| e.enabled)
            .and_then(Element::tag)
    }

    /// Put `tag` into slot `name` and enable it. The tag must belong to
    /// the kind or group the slot accepts.
    pub fn select_tag(&mut self, name: &str, tag: Node) -> Result<(), DocumentError> {
        let slot = self
            .definition
            .tag_slot(name)
            .ok_or_else(|| match self.definition.has_child(name) {
                true => DocumentError::NotATag {
                    name: name.to_string(),
                },
                false => self.unknown(name),
            })?;
        let accepted = if slot.accepts_group() {
            tag.definition.parent() == slot.accepts
        } else {
            tag.kind() == slot.accepts
        };
        if !accepted {
            return Err(DocumentError::TagNotAccepted {
                name: name.to_string(),
                kind: tag.kind().to_string(),
            });
        }
        let element = self.element_mut(name)?;
        element.value = ElementValue::Tag(Some(Box::new(tag)));
        element.enabled = true;
        Ok(())
    }

    pub fn test(&self, name: &str) -> Option<&Node> {
        match self.element(name).ok()?.value() {
            ElementValue::Test(Some(node)) => Some(node),
            _ => None,
        }
    }

    pub fn set_test(&mut self, name: &str, test: Node) -> Result<(), DocumentError> {
        let element = self.element_mut(name)?;
        match &mut element.value {
            ElementValue::Test(slot) => {
                *slot = Some(Box::new(test));
                Ok(())
            }
            other => Err(DocumentError::TypeMismatch {
                name: name.to_string(),
                expected: FieldKind::Test.to_string(),
                found: other.describe().to_string(),
            }),
        }
    }

    pub fn tests(&self, name: &str) -> Option<&[Node]> {
        match self.element(name).ok()?.value() {
            ElementValue::Tests(nodes) => Some(nodes),
            _ => None,
        }
    }

    pub fn tests_mut(&mut self, name: &str) -> Option<&mut Vec<Node>> {
        match self.element_mut(name).ok()?.value_mut() {
            ElementValue::Tests(nodes) => Some(nodes),
            _ => None,
        }
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        match self.element(name).ok()?.value() {
            ElementValue::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn block_mut(&mut self, name: &str) -> Option<&mut Block> {
        match self.element_mut(name).ok()?.value_mut() {
            ElementValue::Block(block) => Some(block),
            _ => None,
        }
    }

    /// Verify this node still has exactly the shape its definition declares.
    pub fn check_shape(&self) -> Result<(), SerializeError> {
        let declared: Vec<&str> = self.definition.element_names().collect();
        let actual: Vec<&str> = self.elements.iter().map(|e| e.name.as_str()).collect();
        if declared != actual {
            return Err(self.violation(format!(
                "elements [{}] differ from declared [{}]",
                actual.join(", "),
                declared.join(", ")
            )));
        }

        for (slot, element) in self.definition.tags.iter().zip(&self.elements) {
            if !element.is_tag() {
                return Err(self.violation(format!("'{}' must hold a tag", slot.name)));
            }
        }

        let params = &self.elements[self.definition.tags.len()..];
        for (slot, element) in self.definition.params.iter().zip(params) {
            let ok = match (&element.value, slot.kind) {
                (ElementValue::Field(v), kind) => v.kind() == kind,
                (ElementValue::Test(Some(_)), FieldKind::Test) => true,
                (ElementValue::Tests(_), FieldKind::TestList) => true,
                (ElementValue::Block(_), FieldKind::Block) => true,
                _ => false,
            };
            if !ok {
                return Err(self.violation(format!(
                    "'{}' holds {} but {} is declared",
                    slot.name,
                    element.value.describe(),
                    slot.kind
                )));
            }
        }
        Ok(())
    }

    fn violation(&self, detail: String) -> SerializeError {
        SerializeError::StructuralInvariantViolation {
            kind: self.definition.id.kind.clone(),
            detail,
        }
    }

    /// Depth-first pre-order walk over this node, its tags and nested
    /// tests and blocks. Disabled tags are skipped.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for element in &self.elements {
            match &element.value {
                ElementValue::Tag(Some(tag)) if element.enabled => tag.visit(f),
                ElementValue::Test(Some(test)) => test.visit(f),
                ElementValue::Tests(tests) => tests.iter().for_each(|t| t.visit(f)),
                ElementValue::Block(block) => block.commands.iter().for_each(|c| c.visit(f)),
                _ => {}
            }
        }
    }
}

/// A parsed script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub root: Block,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Node] {
        &self.root.commands
    }

    pub fn commands_mut(&mut self) -> &mut Vec<Node> {
        &mut self.root.commands
    }

    pub fn push(&mut self, node: Node) {
        self.root.commands.push(node);
    }

    pub fn visit<'a>(&'a self, mut f: impl FnMut(&'a Node)) {
        for command in &self.root.commands {
            command.visit(&mut f);
        }
    }

    /// Capabilities of every node in use (disabled tags excluded).
    pub fn capabilities_used(&self) -> BTreeSet<String> {
        let mut used = BTreeSet::new();
        self.visit(|node| {
            if let Some(cap) = node.definition().capability() {
                used.insert(cap.to_string());
            }
        });
        used
    }

    /// Capabilities listed by the script's own `require` commands.
    pub fn required_capabilities(&self) -> BTreeSet<String> {
        self.root
            .commands
            .iter()
            .filter(|c| c.kind() == crate::extensions::core::REQUIRE)
            .filter_map(|c| c.value("capabilities").ok())
            .filter_map(FieldValue::as_list)
            .flatten()
            .cloned()
            .collect()
    }
}
