//! The grammar registry.
//!
//! Extension providers describe their vocabulary against a
//! [`RegistryBuilder`]; [`Registry::build`] runs them in order and freezes
//! the result. Once built, a registry is read-only and can be shared freely.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::document::{Block, Element, ElementValue, Node};
use crate::error::RegistryError;
use crate::field::{FieldKind, FieldValue};
use crate::grammar::{Addition, Definition, Identifier, ParamSlot, TagSlot, ACTIONS, CONTROLS, TESTS};

static COMMAND_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static TAG_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A function contributing definitions to a registry.
pub type Provider = fn(&mut RegistryBuilder) -> Result<(), RegistryError>;

// ── Capabilities ────────────────────────────────────────────────────

/// The set of extensions enabled for a script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    enabled: BTreeSet<String>,
}

impl Capabilities {
    /// Only the always-available core vocabulary.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, capability: &str) {
        self.enabled.insert(capability.to_string());
    }

    pub fn with(mut self, capability: &str) -> Self {
        self.insert(capability);
        self
    }

    /// Whether vocabulary gated by `capability` is available.
    pub fn allows(&self, capability: Option<&str>) -> bool {
        match capability {
            None => true,
            Some(cap) => self.enabled.contains(cap),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Capabilities {
            enabled: iter.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Mutable registry used while extension providers run.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<Definition>,
    index: HashMap<String, usize>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new definition.
    pub fn register(&mut self, definition: Definition) -> Result<(), RegistryError> {
        let kind = definition.kind().to_string();
        if self.index.contains_key(&kind) {
            return Err(RegistryError::DuplicateDefinition { kind });
        }
        let pattern = if is_command_group(definition.parent()) {
            &COMMAND_TOKEN
        } else {
            &TAG_TOKEN
        };
        if !pattern.is_match(&definition.token) {
            return Err(RegistryError::InvalidToken {
                kind,
                token: definition.token.clone(),
            });
        }
        debug!(kind = %kind, token = %definition.token, "registered definition");
        self.index.insert(kind, self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn register_tag(
        &mut self,
        id: Identifier,
        token: String,
        params: Vec<ParamSlot>,
    ) -> Result<(), RegistryError> {
        if is_command_group(&id.parent) {
            return Err(RegistryError::WrongCollection {
                kind: id.kind,
                parent: id.parent,
                expected: "a tag group".to_string(),
            });
        }
        self.register(Definition::new(id, token, Vec::new(), params))
    }

    pub fn register_test(
        &mut self,
        id: Identifier,
        token: String,
        tags: Vec<TagSlot>,
        params: Vec<ParamSlot>,
    ) -> Result<(), RegistryError> {
        expect_parent(&id, TESTS)?;
        self.register(Definition::new(id, token, tags, params))
    }

    pub fn register_action(
        &mut self,
        id: Identifier,
        token: String,
        tags: Vec<TagSlot>,
        params: Vec<ParamSlot>,
    ) -> Result<(), RegistryError> {
        expect_parent(&id, ACTIONS)?;
        self.register(Definition::new(id, token, tags, params))
    }

    pub fn register_control(
        &mut self,
        id: Identifier,
        token: String,
        tags: Vec<TagSlot>,
        params: Vec<ParamSlot>,
    ) -> Result<(), RegistryError> {
        expect_parent(&id, CONTROLS)?;
        self.register(Definition::new(id, token, tags, params))
    }

    /// Merge `addition` into the already registered `base_kind`.
    pub fn extend(
        &mut self,
        base_kind: &str,
        addition: impl Into<Addition>,
    ) -> Result<(), RegistryError> {
        let addition = addition.into();
        let idx = *self
            .index
            .get(base_kind)
            .ok_or_else(|| RegistryError::UnknownBase {
                kind: base_kind.to_string(),
            })?;
        debug!(base = %base_kind, child = %addition.name(), "extended definition");
        let merged = self.definitions[idx].extended(addition)?;
        self.definitions[idx] = merged;
        Ok(())
    }

    pub fn extend_action(
        &mut self,
        base_kind: &str,
        addition: impl Into<Addition>,
    ) -> Result<(), RegistryError> {
        self.expect_base_in(base_kind, ACTIONS)?;
        self.extend(base_kind, addition)
    }

    pub fn extend_test(
        &mut self,
        base_kind: &str,
        addition: impl Into<Addition>,
    ) -> Result<(), RegistryError> {
        self.expect_base_in(base_kind, TESTS)?;
        self.extend(base_kind, addition)
    }

    /// Widen a tag definition, e.g. give `:comparator` another parameter.
    pub fn extend_tag(
        &mut self,
        base_kind: &str,
        addition: impl Into<Addition>,
    ) -> Result<(), RegistryError> {
        let base = self.lookup(base_kind).map_err(|_| RegistryError::UnknownBase {
            kind: base_kind.to_string(),
        })?;
        if is_command_group(base.parent()) {
            return Err(RegistryError::WrongCollection {
                kind: base_kind.to_string(),
                parent: base.parent().to_string(),
                expected: "a tag group".to_string(),
            });
        }
        self.extend(base_kind, addition)
    }

    fn expect_base_in(&self, base_kind: &str, group: &str) -> Result<(), RegistryError> {
        let base = self.lookup(base_kind).map_err(|_| RegistryError::UnknownBase {
            kind: base_kind.to_string(),
        })?;
        expect_parent(&base.id, group)
    }

    pub fn lookup(&self, kind: &str) -> Result<&Definition, RegistryError> {
        self.index
            .get(kind)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| RegistryError::NotFound {
                kind: kind.to_string(),
            })
    }

    /// Check cross references and freeze.
    pub fn build(self) -> Result<Registry, RegistryError> {
        for def in &self.definitions {
            for slot in &def.params {
                let fits = match (&slot.default, slot.kind) {
                    (None, _) => true,
                    (Some(FieldValue::String(_)), FieldKind::StringList) => true,
                    (Some(v), kind) => v.kind() == kind,
                };
                if !fits {
                    return Err(RegistryError::InvalidDefault {
                        kind: def.kind().to_string(),
                        child: slot.name.clone(),
                    });
                }
            }
            for slot in &def.tags {
                if !slot.accepts_group() {
                    self.lookup(&slot.accepts)?;
                }
                if let Some(default) = &slot.default {
                    let tag = self.lookup(default)?;
                    let fits = if slot.accepts_group() {
                        tag.parent() == slot.accepts
                    } else {
                        tag.kind() == slot.accepts
                    };
                    if !fits {
                        return Err(RegistryError::WrongCollection {
                            kind: default.clone(),
                            parent: tag.parent().to_string(),
                            expected: slot.accepts.clone(),
                        });
                    }
                }
            }
        }
        self.check_acyclic()?;
        debug!(definitions = self.definitions.len(), "registry built");
        Ok(Registry {
            definitions: self.definitions.into_iter().map(Arc::new).collect(),
            index: self.index,
        })
    }

    /// Tag kinds a node of `def` instantiates eagerly: slot defaults and
    /// single accepted kinds.
    fn eager_tags(def: &Definition) -> impl Iterator<Item = &str> {
        def.tags.iter().filter_map(|slot| match (&slot.default, slot.accepts_group()) {
            (Some(default), _) => Some(default.as_str()),
            (None, false) => Some(slot.accepts.as_str()),
            (None, true) => None,
        })
    }

    /// `instantiate` must terminate, so eager tags may not lead back to a
    /// kind already being instantiated.
    fn check_acyclic(&self) -> Result<(), RegistryError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Fresh,
            Active,
            Done,
        }

        let mut marks = vec![Mark::Fresh; self.definitions.len()];
        for start in 0..self.definitions.len() {
            if marks[start] != Mark::Fresh {
                continue;
            }
            // (definition, eager tags still to visit)
            let mut stack: Vec<(usize, Vec<&str>)> = Vec::new();
            marks[start] = Mark::Active;
            stack.push((start, Self::eager_tags(&self.definitions[start]).collect()));

            while let Some((current, pending)) = stack.last_mut() {
                let current = *current;
                let next = match pending.pop() {
                    Some(kind) => kind,
                    None => {
                        marks[current] = Mark::Done;
                        stack.pop();
                        continue;
                    }
                };
                let idx = *self.index.get(next).ok_or_else(|| RegistryError::NotFound {
                    kind: next.to_string(),
                })?;
                match marks[idx] {
                    Mark::Active => {
                        return Err(RegistryError::CyclicDefault {
                            kind: next.to_string(),
                        })
                    }
                    Mark::Done => {}
                    Mark::Fresh => {
                        marks[idx] = Mark::Active;
                        stack.push((idx, Self::eager_tags(&self.definitions[idx]).collect()));
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_command_group(parent: &str) -> bool {
    parent == ACTIONS || parent == TESTS || parent == CONTROLS
}

fn expect_parent(id: &Identifier, group: &str) -> Result<(), RegistryError> {
    if id.parent == group {
        Ok(())
    } else {
        Err(RegistryError::WrongCollection {
            kind: id.kind.clone(),
            parent: id.parent.clone(),
            expected: group.to_string(),
        })
    }
}

// ── Frozen registry ─────────────────────────────────────────────────

/// An immutable catalogue of definitions.
#[derive(Debug, Clone)]
pub struct Registry {
    definitions: Vec<Arc<Definition>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Run `providers` in order against an empty builder and freeze.
    pub fn build(providers: &[Provider]) -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder::new();
        for provider in providers {
            provider(&mut builder)?;
        }
        builder.build()
    }

    /// Registry with every bundled extension loaded.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::build(crate::extensions::ALL)
    }

    pub fn lookup(&self, kind: &str) -> Result<&Arc<Definition>, RegistryError> {
        self.index
            .get(kind)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| RegistryError::NotFound {
                kind: kind.to_string(),
            })
    }

    /// Definitions in `parent` available under `capabilities`, in
    /// registration order.
    pub fn candidates_for<'a>(&'a self, parent: &'a str, capabilities: &Capabilities) -> Vec<&'a Arc<Definition>> {
        self.in_group(parent)
            .filter(|d| capabilities.allows(d.capability()))
            .collect()
    }

    /// Every definition in `parent`, regardless of capability.
    pub fn in_group<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Arc<Definition>> {
        self.definitions.iter().filter(move |d| d.parent() == parent)
    }

    /// Definitions a tag slot accepting `accepts` may hold.
    pub fn tag_candidates<'a>(&'a self, accepts: &'a str) -> Vec<&'a Arc<Definition>> {
        if accepts.starts_with('@') {
            self.in_group(accepts).collect()
        } else {
            self.lookup(accepts).into_iter().collect()
        }
    }

    pub fn definitions(&self) -> &[Arc<Definition>] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Every capability some definition is gated on.
    pub fn capabilities(&self) -> BTreeSet<String> {
        self.definitions
            .iter()
            .filter_map(|d| d.capability())
            .map(str::to_string)
            .collect()
    }

    /// Capabilities covering the whole registry.
    pub fn all_capabilities(&self) -> Capabilities {
        self.capabilities().into_iter().collect()
    }

    /// A fresh node for `kind` with every default applied. Tags start
    /// disabled; a slot with a default or a single accepted kind holds
    /// that tag latently.
    pub fn instantiate(&self, kind: &str) -> Result<Node, RegistryError> {
        let definition = Arc::clone(self.lookup(kind)?);
        let mut elements = Vec::with_capacity(definition.tags.len() + definition.params.len());

        for slot in &definition.tags {
            let latent = match (&slot.default, slot.accepts_group()) {
                (Some(default), _) => Some(Box::new(self.instantiate(default)?)),
                (None, false) => Some(Box::new(self.instantiate(&slot.accepts)?)),
                (None, true) => None,
            };
            elements.push(Element::new(&slot.name, false, ElementValue::Tag(latent)));
        }

        for slot in &definition.params {
            let value = match (slot.initial_value(), slot.kind) {
                (Some(v), _) => ElementValue::Field(v),
                (None, FieldKind::Test) => ElementValue::Test(None),
                (None, FieldKind::TestList) => ElementValue::Tests(Vec::new()),
                (None, _) => ElementValue::Block(Block::new()),
            };
            elements.push(Element::new(&slot.name, true, value));
        }

        Ok(Node::from_parts(definition, elements))
    }
}
