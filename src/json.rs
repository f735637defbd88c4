//! JSON view of a parsed document, for `dump` and for tooling.

use serde_json::{json, Map, Value};

use crate::document::{Block, Comment, CommentStyle, Document, ElementValue, Node};
use crate::error::ParseError;

fn comment_value(comment: &Comment) -> Value {
    let style = match comment.style {
        CommentStyle::Hash => "hash",
        CommentStyle::Bracket => "bracket",
    };
    json!({ "style": style, "text": comment.text })
}

fn block_value(block: &Block) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "commands".into(),
        Value::Array(block.commands.iter().map(node_value).collect()),
    );
    if !block.trailing_comments.is_empty() {
        obj.insert(
            "trailingComments".into(),
            block.trailing_comments.iter().map(comment_value).collect(),
        );
    }
    Value::Object(obj)
}

fn element_value(value: &ElementValue) -> Value {
    match value {
        ElementValue::Tag(tag) | ElementValue::Test(tag) => {
            tag.as_deref().map(node_value).unwrap_or(Value::Null)
        }
        ElementValue::Field(field) => serde_json::to_value(field).unwrap_or(Value::Null),
        ElementValue::Tests(tests) => tests.iter().map(node_value).collect(),
        ElementValue::Block(block) => block_value(block),
    }
}

fn node_value(node: &Node) -> Value {
    let mut obj = Map::new();
    obj.insert("kind".into(), node.kind().into());
    obj.insert("token".into(), node.token().into());
    let span = node.span();
    obj.insert(
        "span".into(),
        json!({ "begin": span.begin, "end": span.end }),
    );
    if !node.comments().is_empty() {
        obj.insert(
            "comments".into(),
            node.comments().iter().map(comment_value).collect(),
        );
    }

    let mut elements = Map::new();
    for element in node.elements() {
        // latent tags carry no information about the script
        if element.is_tag() && !element.is_enabled() {
            continue;
        }
        elements.insert(element.name().to_string(), element_value(element.value()));
    }
    if !elements.is_empty() {
        obj.insert("elements".into(), Value::Object(elements));
    }
    Value::Object(obj)
}

/// The document as a JSON value.
pub fn document_value(document: &Document) -> Value {
    block_value(&document.root)
}

pub fn to_json(document: &Document) -> String {
    document_value(document).to_string()
}

pub fn to_json_pretty(document: &Document) -> String {
    serde_json::to_string_pretty(&document_value(document)).unwrap_or_default()
}

/// A parse error as `{code, message, begin, end}`.
pub fn error_to_json(err: &ParseError) -> String {
    json!({
        "code": err.code(),
        "message": err.kind.to_string(),
        "begin": err.begin,
        "end": err.end,
    })
    .to_string()
}
