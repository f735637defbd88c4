use serde::Deserialize;

use crate::document::{Block, Comment, CommentStyle, Document, ElementValue, Node};
use crate::error::SerializeError;
use crate::field::write_value;

/// Layout knobs for the canonical writer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormatOptions {
    /// Indentation added per block level.
    pub indent: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            indent: "  ".to_string(),
        }
    }
}

struct ScriptWriter<'o> {
    buf: String,
    depth: usize,
    options: &'o FormatOptions,
}

impl<'o> ScriptWriter<'o> {
    fn new(options: &'o FormatOptions) -> Self {
        ScriptWriter {
            buf: String::new(),
            depth: 0,
            options,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str(&self.options.indent);
        }
    }

    fn write_block_body(&mut self, block: &Block) -> Result<(), SerializeError> {
        for command in &block.commands {
            self.write_statement(command)?;
        }
        for comment in &block.trailing_comments {
            self.indent();
            self.write_comment(comment);
            self.buf.push('\n');
        }
        Ok(())
    }

    /// A command on its own line, leading comments on the lines above.
    fn write_statement(&mut self, node: &Node) -> Result<(), SerializeError> {
        for comment in node.comments() {
            self.indent();
            self.write_comment(comment);
            self.buf.push('\n');
        }
        self.indent();
        self.write_node(node)?;
        if node.definition().is_terminated() {
            self.buf.push(';');
        }
        self.buf.push('\n');
        Ok(())
    }

    /// A test or tag inside a command. Comments stay in front of it.
    fn write_inline(&mut self, node: &Node) -> Result<(), SerializeError> {
        for comment in node.comments() {
            self.write_comment(comment);
            match comment.style {
                CommentStyle::Hash => {
                    self.buf.push('\n');
                    self.depth += 1;
                    self.indent();
                    self.depth -= 1;
                }
                CommentStyle::Bracket => self.buf.push(' '),
            }
        }
        self.write_node(node)
    }

    fn write_node(&mut self, node: &Node) -> Result<(), SerializeError> {
        node.check_shape()?;
        self.buf.push_str(node.token());

        for element in node.elements() {
            match element.value() {
                ElementValue::Tag(Some(tag)) if element.is_enabled() => {
                    self.buf.push(' ');
                    self.write_inline(tag)?;
                }
                ElementValue::Tag(_) => {}
                ElementValue::Field(value) => {
                    self.buf.push(' ');
                    write_value(&mut self.buf, value);
                }
                ElementValue::Test(Some(test)) => {
                    self.buf.push(' ');
                    self.write_inline(test)?;
                }
                // rejected by check_shape
                ElementValue::Test(None) => {}
                ElementValue::Tests(tests) => {
                    self.buf.push_str(" (");
                    for (i, test) in tests.iter().enumerate() {
                        if i > 0 {
                            self.buf.push_str(", ");
                        }
                        self.write_inline(test)?;
                    }
                    self.buf.push(')');
                }
                ElementValue::Block(block) => {
                    self.buf.push_str(" {\n");
                    self.depth += 1;
                    self.write_block_body(block)?;
                    self.depth -= 1;
                    self.indent();
                    self.buf.push('}');
                }
            }
        }
        Ok(())
    }

    fn write_comment(&mut self, comment: &Comment) {
        match comment.style {
            CommentStyle::Hash => {
                self.buf.push('#');
                self.buf.push_str(&comment.text);
            }
            CommentStyle::Bracket => {
                self.buf.push_str("/*");
                self.buf.push_str(&comment.text);
                self.buf.push_str("*/");
            }
        }
    }
}

/// Serialize a document to canonical script text.
pub fn serialize(document: &Document) -> Result<String, SerializeError> {
    serialize_with(document, &FormatOptions::default())
}

pub fn serialize_with(
    document: &Document,
    options: &FormatOptions,
) -> Result<String, SerializeError> {
    let mut w = ScriptWriter::new(options);
    w.write_block_body(&document.root)?;
    Ok(w.buf)
}

/// Serialize a single node as it would appear inside a script.
pub fn serialize_node(node: &Node) -> Result<String, SerializeError> {
    let options = FormatOptions::default();
    let mut w = ScriptWriter::new(&options);
    w.write_node(node)?;
    Ok(w.buf)
}
