use std::sync::Arc;

use tracing::{debug, trace};

use crate::document::{Block, Comment, Document, ElementValue, Node};
use crate::error::{ParseError, ParseErrorKind, Position, Span};
use crate::field::{FieldKind, FieldValue, Number, Quantifier};
use crate::grammar::{Definition, ACTIONS, CONTROLS, TESTS};
use crate::registry::{Capabilities, Registry};

/// Parser state: tracks position in the input string.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    registry: &'a Registry,
    capabilities: &'a Capabilities,
    /// Comments seen since the last node was started.
    pending_comments: Vec<Comment>,
}

/// Parse a script into a [`Document`] using the definitions in `registry`
/// that `capabilities` unlocks. Stops at the first error.
pub fn parse(
    input: &str,
    registry: &Registry,
    capabilities: &Capabilities,
) -> Result<Document, ParseError> {
    let mut parser = Parser::new(input, registry, capabilities);
    let root = parser.parse_commands(false)?;
    debug!(commands = root.commands.len(), bytes = input.len(), "parsed script");
    Ok(Document { root })
}

/// Parse a lone test expression such as `exists "From"`, e.g. a condition
/// edited on its own. A trailing `;` is tolerated; comments after the test
/// are kept on the returned node.
pub fn parse_test(
    input: &str,
    registry: &Registry,
    capabilities: &Capabilities,
) -> Result<Node, ParseError> {
    let mut parser = Parser::new(input, registry, capabilities);
    let mut node = parser.parse_test()?;
    parser.skip_ws()?;
    parser.eat_char(';');
    parser.skip_ws()?;
    if !parser.at_end() {
        return Err(parser.unexpected("end of input".to_string()));
    }
    node.comments_mut().append(&mut parser.pending_comments);
    Ok(node)
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, registry: &'a Registry, capabilities: &'a Capabilities) -> Self {
        Parser {
            input,
            pos: 0,
            registry,
            capabilities,
            pending_comments: Vec::new(),
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn starts_with(&self, s: &str) -> bool {
        self.remaining().starts_with(s)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn eat_char(&mut self, ch: char) -> bool {
        if self.peek_char() == Some(ch) {
            self.advance(ch.len_utf8());
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, ch: char) -> Result<(), ParseError> {
        if self.eat_char(ch) {
            Ok(())
        } else {
            Err(self.unexpected(format!("'{}'", ch)))
        }
    }

    /// Current position in the source.
    fn position(&self) -> Position {
        let consumed = &self.input[..self.pos];
        let line = consumed.matches('\n').count();
        let last_newline = consumed.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = consumed[last_newline..].chars().count();
        Position {
            line,
            column,
            offset: self.pos,
        }
    }

    /// Create an error at a single point (current position).
    fn error_point(&self, kind: ParseErrorKind) -> ParseError {
        let pos = self.position();
        ParseError::new(kind, pos, pos)
    }

    /// Create an error spanning from `begin` to the current position.
    fn error_span(&self, kind: ParseErrorKind, begin: Position) -> ParseError {
        ParseError::new(kind, begin, self.position())
    }

    fn malformed(&self, message: &str, begin: Position) -> ParseError {
        self.error_span(ParseErrorKind::MalformedLiteral(message.to_string()), begin)
    }

    fn unexpected(&self, expected: String) -> ParseError {
        self.error_point(ParseErrorKind::UnexpectedInput {
            expected,
            found: self.found(),
        })
    }

    /// Short description of what sits at the cursor, for error messages.
    fn found(&self) -> String {
        if self.at_end() {
            return "end of input".to_string();
        }
        let text: String = self
            .remaining()
            .chars()
            .take_while(|c| !c.is_whitespace())
            .take(16)
            .collect();
        format!("'{}'", text)
    }

    // ── Whitespace & Comments ───────────────────────────────────────

    /// Skip whitespace, collecting comments into `pending_comments`.
    fn skip_ws(&mut self) -> Result<(), ParseError> {
        loop {
            while let Some(ch) = self.peek_char() {
                if ch == ' ' || ch == '\t' || ch == '\r' || ch == '\n' {
                    self.advance(1);
                } else {
                    break;
                }
            }
            if self.peek_char() == Some('#') {
                self.advance(1);
                let rest = self.remaining();
                let end = rest.find(is_line_break).unwrap_or(rest.len());
                self.pending_comments.push(Comment::hash(&rest[..end]));
                self.advance(end);
            } else if self.starts_with("/*") {
                let begin = self.position();
                self.advance(2);
                let rest = self.remaining();
                match rest.find("*/") {
                    Some(end) => {
                        self.pending_comments.push(Comment::bracket(&rest[..end]));
                        self.advance(end + 2);
                    }
                    None => {
                        self.pos = self.input.len();
                        return Err(self.malformed("Unterminated comment", begin));
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Parse commands until EOF, or until `}` when `nested`.
    fn parse_commands(&mut self, nested: bool) -> Result<Block, ParseError> {
        let mut block = Block::new();
        loop {
            self.skip_ws()?;
            if self.at_end() {
                if nested {
                    return Err(self.unexpected("'}'".to_string()));
                }
                break;
            }
            if nested && self.peek_char() == Some('}') {
                break;
            }
            let node = self.parse_command(block.commands.last())?;
            block.commands.push(node);
        }
        block.trailing_comments = std::mem::take(&mut self.pending_comments);
        Ok(block)
    }

    fn parse_command(&mut self, previous: Option<&Node>) -> Result<Node, ParseError> {
        let begin = self.position();
        let word = self.read_identifier("a command")?;
        let definition = self.resolve(&word, &[CONTROLS, ACTIONS], begin)?;

        if !definition.follows.is_empty() {
            let placed = previous.is_some_and(|p| definition.follows.iter().any(|k| k == p.kind()));
            if !placed {
                return Err(self.error_span(
                    ParseErrorKind::MisplacedStatement {
                        token: word,
                        after: definition.follows.clone(),
                    },
                    begin,
                ));
            }
        }

        let mut node = self.parse_element(&definition)?;
        if definition.is_terminated() {
            self.skip_ws()?;
            self.expect_char(';')?;
        }
        node.set_span(Span {
            begin,
            end: self.position(),
        });
        trace!(kind = %node.kind(), line = begin.line, "parsed command");
        Ok(node)
    }

    fn parse_test(&mut self) -> Result<Node, ParseError> {
        self.skip_ws()?;
        let begin = self.position();
        let word = self.read_identifier("a test")?;
        let definition = self.resolve(&word, &[TESTS], begin)?;
        let mut node = self.parse_element(&definition)?;
        node.set_span(Span {
            begin,
            end: self.position(),
        });
        Ok(node)
    }

    /// Find the definition whose token is `word` among `groups`.
    fn resolve(
        &self,
        word: &str,
        groups: &[&str],
        begin: Position,
    ) -> Result<Arc<Definition>, ParseError> {
        let mut expected = Vec::new();
        for group in groups {
            for candidate in self.registry.candidates_for(group, self.capabilities) {
                if candidate.token.eq_ignore_ascii_case(word) {
                    return Ok(Arc::clone(candidate));
                }
                expected.push(candidate.token.clone());
            }
        }

        let disabled = groups
            .iter()
            .flat_map(|g| self.registry.in_group(g))
            .find(|d| d.token.eq_ignore_ascii_case(word));
        let kind = match disabled.and_then(|d| d.capability()) {
            Some(capability) => ParseErrorKind::CapabilityDisabled {
                token: word.to_string(),
                capability: capability.to_string(),
            },
            None => ParseErrorKind::UnknownToken {
                token: word.to_string(),
                expected,
            },
        };
        Err(self.error_span(kind, begin))
    }

    // ── Element body ────────────────────────────────────────────────

    /// Parse everything after a definition's token: tags, then parameters.
    fn parse_element(&mut self, definition: &Arc<Definition>) -> Result<Node, ParseError> {
        let comments = std::mem::take(&mut self.pending_comments);
        let mut node = self
            .registry
            .instantiate(definition.kind())
            .map_err(|e| self.error_point(e.into()))?;
        *node.comments_mut() = comments;

        // Tags without slots of their own leave following tags to the
        // enclosing command. Commands and tests always run the tag loop so a
        // stray tag is reported as unknown.
        if !definition.tags.is_empty() || !definition.token.starts_with(':') {
            self.parse_tags(definition, &mut node)?;
        }

        let offset = definition.tags.len();
        for (i, slot) in definition.params.iter().enumerate() {
            self.skip_ws()?;
            let value = match slot.kind {
                FieldKind::String => {
                    ElementValue::Field(FieldValue::String(self.parse_string_param(&slot.name)?))
                }
                FieldKind::StringList => {
                    ElementValue::Field(FieldValue::StringList(self.parse_string_list(&slot.name)?))
                }
                FieldKind::Number => {
                    ElementValue::Field(FieldValue::Number(self.parse_number(&slot.name)?))
                }
                FieldKind::Test => ElementValue::Test(Some(Box::new(self.parse_test()?))),
                FieldKind::TestList => ElementValue::Tests(self.parse_test_list()?),
                FieldKind::Block => ElementValue::Block(self.parse_block()?),
            };
            node.fill(offset + i, value, true);
        }
        Ok(node)
    }

    /// Tags may come in any order, but all before the first parameter.
    fn parse_tags(
        &mut self,
        definition: &Arc<Definition>,
        node: &mut Node,
    ) -> Result<(), ParseError> {
        let mut filled = vec![false; definition.tags.len()];
        loop {
            self.skip_ws()?;
            if self.peek_char() != Some(':') {
                return Ok(());
            }
            let begin = self.position();
            let word = self.read_tag()?;
            let (index, tag_definition) = self.resolve_tag(definition, &filled, &word, begin)?;
            let mut tag = self.parse_element(&tag_definition)?;
            tag.set_span(Span {
                begin,
                end: self.position(),
            });
            node.fill(index, ElementValue::Tag(Some(Box::new(tag))), true);
            filled[index] = true;
        }
    }

    /// Pick the first declared, still empty slot accepting `word`.
    fn resolve_tag(
        &self,
        definition: &Definition,
        filled: &[bool],
        word: &str,
        begin: Position,
    ) -> Result<(usize, Arc<Definition>), ParseError> {
        let mut expected = Vec::new();
        let mut duplicate = false;
        let mut disabled = None;

        for (index, slot) in definition.tags.iter().enumerate() {
            for candidate in self.registry.tag_candidates(&slot.accepts) {
                let allowed = self.capabilities.allows(candidate.capability());
                if allowed && !filled[index] {
                    expected.push(candidate.token.clone());
                }
                if !candidate.token.eq_ignore_ascii_case(word) {
                    continue;
                }
                if !allowed {
                    disabled = disabled.or(candidate.capability());
                } else if filled[index] {
                    duplicate = true;
                } else {
                    return Ok((index, Arc::clone(candidate)));
                }
            }
        }

        let kind = if duplicate {
            ParseErrorKind::DuplicateTag {
                token: word.to_string(),
            }
        } else if let Some(capability) = disabled {
            ParseErrorKind::CapabilityDisabled {
                token: word.to_string(),
                capability: capability.to_string(),
            }
        } else {
            ParseErrorKind::UnknownToken {
                token: word.to_string(),
                expected,
            }
        };
        Err(self.error_span(kind, begin))
    }

    fn parse_test_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let begin = self.position();
        self.expect_char('(')?;
        let mut tests = Vec::new();
        self.skip_ws()?;
        if self.eat_char(')') {
            return Ok(tests);
        }
        loop {
            tests.push(self.parse_test()?);
            self.skip_ws()?;
            if self.eat_char(')') {
                return Ok(tests);
            }
            if self.eat_char(',') {
                continue;
            }
            if self.at_end() {
                return Err(self.error_span(
                    ParseErrorKind::UnexpectedInput {
                        expected: "')'".to_string(),
                        found: self.found(),
                    },
                    begin,
                ));
            }
            return Err(self.unexpected("',' or ')'".to_string()));
        }
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect_char('{')?;
        let block = self.parse_commands(true)?;
        self.expect_char('}')?;
        Ok(block)
    }

    // ── Words ───────────────────────────────────────────────────────

    fn read_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek_char() {
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => self.advance(1),
            _ => return Err(self.unexpected(what.to_string())),
        }
        while let Some(ch) = self.peek_char() {
            if is_identifier_char(ch) {
                self.advance(1);
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn read_tag(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        self.expect_char(':')?;
        self.read_identifier("a tag name")?;
        Ok(self.input[start..self.pos].to_string())
    }

    // ── Values ──────────────────────────────────────────────────────

    /// What kind of value starts at the cursor, for type mismatch reports.
    fn value_kind_ahead(&self) -> Option<FieldKind> {
        match self.peek_char() {
            Some('"') => Some(FieldKind::String),
            Some('[') => Some(FieldKind::StringList),
            Some(ch) if ch.is_ascii_digit() => Some(FieldKind::Number),
            _ if self.at_multiline() => Some(FieldKind::String),
            _ => None,
        }
    }

    fn mismatch(&self, field: &str, expected: FieldKind) -> ParseError {
        match self.value_kind_ahead() {
            Some(found) => self.error_point(ParseErrorKind::TypeMismatch {
                field: field.to_string(),
                expected: expected.to_string(),
                found: found.to_string(),
            }),
            None => self.unexpected(expected.to_string()),
        }
    }

    fn at_multiline(&self) -> bool {
        self.remaining()
            .get(..5)
            .is_some_and(|s| s.eq_ignore_ascii_case("text:"))
    }

    fn parse_string_param(&mut self, field: &str) -> Result<String, ParseError> {
        match self.value_kind_ahead() {
            Some(FieldKind::String) => self.parse_string(),
            _ => Err(self.mismatch(field, FieldKind::String)),
        }
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        if self.at_multiline() {
            self.parse_multiline_string()
        } else {
            self.parse_quoted_string()
        }
    }

    /// A bracketed list, or a single string taken as a one-entry list.
    fn parse_string_list(&mut self, field: &str) -> Result<Vec<String>, ParseError> {
        match self.value_kind_ahead() {
            Some(FieldKind::String) => return Ok(vec![self.parse_string()?]),
            Some(FieldKind::StringList) => {}
            _ => return Err(self.mismatch(field, FieldKind::StringList)),
        }

        let begin = self.position();
        self.expect_char('[')?;
        let mut items = Vec::new();
        self.skip_ws()?;
        if self.eat_char(']') {
            return Ok(items);
        }
        loop {
            self.skip_ws()?;
            if self.value_kind_ahead() != Some(FieldKind::String) {
                return Err(self.unexpected("a string".to_string()));
            }
            items.push(self.parse_string()?);
            self.skip_ws()?;
            if self.eat_char(']') {
                return Ok(items);
            }
            if self.eat_char(',') {
                continue;
            }
            if self.at_end() {
                return Err(self.error_span(
                    ParseErrorKind::UnexpectedInput {
                        expected: "']'".to_string(),
                        found: self.found(),
                    },
                    begin,
                ));
            }
            return Err(self.unexpected("',' or ']'".to_string()));
        }
    }

    fn parse_quoted_string(&mut self) -> Result<String, ParseError> {
        let begin = self.position();
        self.expect_char('"')?;
        let mut result = String::new();
        loop {
            match self.peek_char() {
                None => return Err(self.malformed("Unterminated string", begin)),
                Some('"') => {
                    self.advance(1);
                    return Ok(result);
                }
                Some('\\') => {
                    self.advance(1);
                    // `\x` always yields `x`
                    match self.peek_char() {
                        None => return Err(self.malformed("Unterminated string", begin)),
                        Some(ch) => {
                            self.advance(ch.len_utf8());
                            result.push(ch);
                        }
                    }
                }
                Some(ch) => {
                    self.advance(ch.len_utf8());
                    result.push(ch);
                }
            }
        }
    }

    /// `text:` followed by lines up to a line holding a single `.`.
    /// Lines starting with `..` lose their first dot.
    fn parse_multiline_string(&mut self) -> Result<String, ParseError> {
        let begin = self.position();
        self.advance(5);
        while matches!(self.peek_char(), Some(' ' | '\t')) {
            self.advance(1);
        }
        if self.peek_char() == Some('#') {
            let rest = &self.remaining()[1..];
            let end = rest.find(is_line_break).unwrap_or(rest.len());
            self.pending_comments.push(Comment::hash(&rest[..end]));
            self.advance(end + 1);
        }
        if !self.eat_line_break() {
            return Err(self.malformed("Expected line break after 'text:'", begin));
        }

        let mut result = String::new();
        loop {
            if self.at_end() {
                return Err(self.malformed("Unterminated multi-line string", begin));
            }
            let rest = self.remaining();
            let end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
            let raw = &rest[..end];
            let line = raw.trim_end_matches(is_line_break);
            if line == "." {
                self.advance(end);
                return Ok(result);
            }
            match raw.strip_prefix("..") {
                Some(unstuffed) => {
                    result.push('.');
                    result.push_str(unstuffed);
                }
                None => result.push_str(raw),
            }
            self.advance(end);
        }
    }

    fn eat_line_break(&mut self) -> bool {
        if self.starts_with("\r\n") {
            self.advance(2);
            true
        } else {
            self.eat_char('\n')
        }
    }

    // ── Numbers ─────────────────────────────────────────────────────

    fn parse_number(&mut self, field: &str) -> Result<Number, ParseError> {
        if self.value_kind_ahead() != Some(FieldKind::Number) {
            return Err(self.mismatch(field, FieldKind::Number));
        }
        let begin = self.position();
        let start = self.pos;
        while matches!(self.peek_char(), Some(ch) if ch.is_ascii_digit()) {
            self.advance(1);
        }
        let value: u64 = self.input[start..self.pos]
            .parse()
            .map_err(|_| self.malformed("Number out of range", begin))?;

        let quantifier = self.peek_char().and_then(Quantifier::from_char);
        if quantifier.is_some() {
            self.advance(1);
        }
        if matches!(self.peek_char(), Some(ch) if is_identifier_char(ch)) {
            return Err(self.malformed("Invalid number", begin));
        }
        Ok(Number { value, quantifier })
    }
}

fn is_line_break(ch: char) -> bool {
    ch == '\r' || ch == '\n'
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::standard().unwrap()
    }

    #[test]
    fn escapes_are_resolved() {
        let reg = registry();
        let doc = parse(
            r#"redirect "a\"b\\c\d@example.com";"#,
            &reg,
            &Capabilities::none(),
        )
        .unwrap();
        assert_eq!(
            doc.commands()[0].value("address").unwrap().as_str(),
            Some("a\"b\\cd@example.com")
        );
    }

    #[test]
    fn multiline_strings_are_unstuffed() {
        let reg = registry();
        let input = "reject text:\r\nline one\r\n..dotted\r\n.\r\n;";
        let doc = parse(input, &reg, &Capabilities::none().with("reject")).unwrap();
        assert_eq!(
            doc.commands()[0].value("reason").unwrap().as_str(),
            Some("line one\r\n.dotted\r\n")
        );
    }

    #[test]
    fn numbers_keep_quantifier() {
        let reg = registry();
        let doc = parse("if size :under 1m { keep; }", &reg, &Capabilities::none()).unwrap();
        let size = doc.commands()[0].test("test").unwrap();
        assert_eq!(
            size.value("limit").unwrap().as_number(),
            Some(Number::with_quantifier(1, Quantifier::M))
        );
        assert_eq!(size.enabled_tag("size-type").unwrap().token(), ":under");
    }

    #[test]
    fn tokens_match_exactly() {
        let reg = registry();
        let caps = Capabilities::none().with("reject").with("ereject");
        let doc = parse("ereject \"no\"; reject \"no\";", &reg, &caps).unwrap();
        let kinds: Vec<_> = doc.commands().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["action/ereject", "action/reject"]);
    }

    #[test]
    fn comments_attach_to_following_node() {
        let reg = registry();
        let doc = parse("# first\nkeep; /* tail */", &reg, &Capabilities::none()).unwrap();
        assert_eq!(doc.commands()[0].comments(), &[Comment::hash(" first")]);
        assert_eq!(doc.root.trailing_comments, vec![Comment::bracket(" tail ")]);
    }

    #[test]
    fn unterminated_comment_is_malformed() {
        let reg = registry();
        let err = parse("keep; /* open", &reg, &Capabilities::none()).unwrap_err();
        assert_eq!(err.code(), "malformed-literal");
        assert_eq!(err.begin.offset, 6);
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let reg = registry();
        let err = parse("keep\nstop;", &reg, &Capabilities::none()).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnexpectedInput {
                expected: "';'".into(),
                found: "'stop;'".into()
            }
        );
        assert_eq!(err.begin.line, 1);
    }

    #[test]
    fn tag_on_tagless_command_is_unknown() {
        let reg = registry();
        let err = parse("keep :copy;", &reg, &Capabilities::none()).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnknownToken {
                token: ":copy".into(),
                expected: vec![]
            }
        );
        assert_eq!(err.begin.column, 5);
    }

    #[test]
    fn else_requires_if() {
        let reg = registry();
        let err = parse("keep; else { stop; }", &reg, &Capabilities::none()).unwrap_err();
        assert_eq!(err.code(), "misplaced-statement");
    }
}
