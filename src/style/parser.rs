//! Parser for CartoCSS stylesheets.
//!
//! Grammar (in rough EBNF):
//!
//! stylesheet  = rule*
//! rule        = selector ("," selector)* "{" body "}"
//! body        = (declaration | rule | ";")*
//! declaration = IDENT ":" value (";" | before "}")
//! selector    = "*" | NAME? ("#" ID)? ("." CLASS)* ("[" filter "]")* ("::" ATTACHMENT)?
//! value       = term+
//! term        = NUMBER | STRING | HASH | IDENT | IDENT "(" (value ("," value)*)? ")"
//!             | "[" IDENT ("." IDENT)* "]" | "," | OPERATOR
//!
//! A selector made of only a filter, following a comma, is ORed into the
//! previous selector: `#layer[a < 3], [b >= 10]` is one selector.
//!
//! The parser is a token-driven state machine with an explicit stack, so
//! nesting depth is bounded by `ParseOptions::max_depth` rather than the
//! call stack.

use super::rule::{Rule, Stylesheet};
use super::selector::Selector;
use crate::config::ParseOptions;
use crate::cql::{Expression, PropertyPath, parse_filter_with};
use crate::error::{ParseError, SyntaxError};
use crate::token::{Token, TokenKind, TokenStream};
use crate::value::Value;

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    TopLevel,
    SelectorChain,
    FilterText,
    DeclarationBlock,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::TopLevel => "top level",
            State::SelectorChain => "selector",
            State::FilterText => "selector filter",
            State::DeclarationBlock => "declaration block",
        }
    }
}

/// Partial results awaiting their closing token.
#[derive(Debug)]
enum Frame {
    /// Raw text of a `[...]` filter and the offset it starts at.
    FilterText { text: String, offset: usize },
    /// A comma between two selectors of one rule.
    OrMarker,
    Selector(Selector),
    Rule(Rule),
}

struct StyleParser<'s> {
    tokens: TokenStream<'s>,
    options: ParseOptions,
    state: State,
    stack: Vec<Frame>,
    rules: Vec<Rule>,
    depth: usize,
}

impl<'s> StyleParser<'s> {
    fn new(source: &'s str, options: &ParseOptions) -> Result<Self> {
        Ok(StyleParser {
            tokens: TokenStream::new(source)?,
            options: *options,
            state: State::TopLevel,
            stack: Vec::new(),
            rules: Vec::new(),
            depth: 0,
        })
    }

    fn run(mut self) -> Result<Stylesheet> {
        while let Some(token) = self.tokens.next().cloned() {
            if token.kind == TokenKind::Comment && self.state != State::FilterText {
                continue;
            }
            match self.state {
                State::TopLevel => self.top_level(token)?,
                State::SelectorChain => self.selector_chain(token)?,
                State::FilterText => self.filter_text(token)?,
                State::DeclarationBlock => self.declaration_block(token)?,
            }
        }

        let expected = match self.state {
            State::TopLevel => None,
            State::SelectorChain => Some("'{'"),
            State::FilterText => Some("']'"),
            State::DeclarationBlock => Some("'}'"),
        };
        if let Some(expected) = expected {
            return Err(self.unexpected(None, expected));
        }

        tracing::debug!("Parsed {} top-level rule(s)", self.rules.len());
        Ok(Stylesheet::new(self.rules))
    }

    fn transition(&mut self, state: State) {
        tracing::trace!("{} -> {}", self.state.name(), state.name());
        self.state = state;
    }

    fn unexpected(&self, token: Option<&Token>, expected: &str) -> ParseError {
        let source = self.tokens.source();
        let (found, offset, end) = match token {
            Some(t) => (t.text.clone(), t.offset, t.end()),
            None => ("end of input".to_string(), source.len(), source.len()),
        };
        ParseError::Syntax(SyntaxError {
            state: self.state.name(),
            found,
            expected: expected.to_string(),
            offset,
            scanned: source[..end].to_string(),
        })
    }

    fn top_level(&mut self, token: Token) -> Result<()> {
        match token.kind {
            TokenKind::Whitespace => Ok(()),
            _ if starts_selector(&token) => self.begin_selector(token),
            _ => Err(self.unexpected(Some(&token), "selector")),
        }
    }

    fn begin_selector(&mut self, token: Token) -> Result<()> {
        self.stack.push(Frame::Selector(Selector::default()));
        self.transition(State::SelectorChain);
        self.selector_chain(token)
    }

    fn selector_chain(&mut self, token: Token) -> Result<()> {
        match token.kind {
            TokenKind::Whitespace => Ok(()),
            TokenKind::Hash => {
                let id = token.text[1..].to_string();
                self.update_selector(&token, "selector without a second id", |s| {
                    if s.id.is_some() || s.wildcard {
                        return false;
                    }
                    s.id = Some(id);
                    true
                })
            }
            TokenKind::Identifier => {
                let name = token.text.clone();
                self.update_selector(&token, "layer name at selector start", |s| {
                    if !s.is_empty() {
                        return false;
                    }
                    s.name = Some(name);
                    true
                })
            }
            TokenKind::Operator if token.text == "*" => {
                self.update_selector(&token, "wildcard on its own", |s| {
                    if !s.is_empty() {
                        return false;
                    }
                    s.wildcard = true;
                    true
                })
            }
            TokenKind::Delimiter => match token.text.as_str() {
                "." => {
                    let class = self.expect_name(&token)?;
                    self.update_selector(&token, "class on a non-wildcard selector", |s| {
                        if s.wildcard {
                            return false;
                        }
                        s.add_class(&class);
                        true
                    })
                }
                "::" => {
                    let attachment = self.expect_name(&token)?;
                    self.update_selector(&token, "a single attachment", |s| {
                        if s.attachment.is_some() || s.wildcard {
                            return false;
                        }
                        s.attachment = Some(attachment);
                        true
                    })
                }
                "[" => {
                    self.stack.push(Frame::FilterText {
                        text: String::new(),
                        offset: token.end(),
                    });
                    self.transition(State::FilterText);
                    Ok(())
                }
                "," => {
                    self.finish_selector(&token)?;
                    self.stack.push(Frame::OrMarker);
                    self.stack.push(Frame::Selector(Selector::default()));
                    Ok(())
                }
                "{" => {
                    self.finish_selector(&token)?;
                    self.open_rule(&token)?;
                    self.transition(State::DeclarationBlock);
                    Ok(())
                }
                _ => Err(self.unexpected(Some(&token), "selector or '{'")),
            },
            _ => Err(self.unexpected(Some(&token), "selector or '{'")),
        }
    }

    /// Apply `update` to the selector being built; it returns false to reject the token.
    fn update_selector(
        &mut self,
        token: &Token,
        expected: &str,
        update: impl FnOnce(&mut Selector) -> bool,
    ) -> Result<()> {
        let accepted = match self.stack.last_mut() {
            Some(Frame::Selector(selector)) => update(selector),
            _ => false,
        };
        if accepted {
            Ok(())
        } else {
            Err(self.unexpected(Some(token), expected))
        }
    }

    /// The identifier immediately after `.` or `::`.
    fn expect_name(&mut self, after: &Token) -> Result<String> {
        match self.tokens.next().cloned() {
            Some(t) if t.kind == TokenKind::Identifier => Ok(t.text),
            Some(t) => Err(self.unexpected(Some(&t), &format!("name after '{}'", after.text))),
            None => Err(self.unexpected(None, &format!("name after '{}'", after.text))),
        }
    }

    fn filter_text(&mut self, token: Token) -> Result<()> {
        if token.is_delimiter("[") {
            return Err(self.unexpected(Some(&token), "']'"));
        }
        if !token.is_delimiter("]") {
            if let Some(Frame::FilterText { text, .. }) = self.stack.last_mut() {
                if token.kind == TokenKind::Comment {
                    // keep byte offsets aligned with the source
                    text.push_str(&" ".repeat(token.text.len()));
                } else {
                    text.push_str(&token.text);
                }
            }
            return Ok(());
        }

        let Some(Frame::FilterText { text, offset }) = self.stack.pop() else {
            return Err(self.unexpected(Some(&token), "selector"));
        };
        if text.trim().is_empty() {
            return Err(self.unexpected(Some(&token), "filter"));
        }
        let filter = parse_filter_with(&text, &self.options)
            .map_err(|e| e.shifted(offset, self.tokens.source()))?;
        self.update_selector(&token, "selector", |s| {
            s.add_filter(filter);
            true
        })?;
        self.transition(State::SelectorChain);
        Ok(())
    }

    fn finish_selector(&mut self, token: &Token) -> Result<()> {
        let Some(Frame::Selector(selector)) = self.stack.pop() else {
            return Err(self.unexpected(Some(token), "selector"));
        };
        if selector.is_empty() {
            return Err(self.unexpected(Some(token), "selector"));
        }

        let filter_only = !selector.has_target() && selector.attachment.is_none();
        let after_comma = matches!(self.stack.last(), Some(Frame::OrMarker))
            && matches!(
                self.stack.len().checked_sub(2).and_then(|i| self.stack.get(i)),
                Some(Frame::Selector(_))
            );
        if filter_only && after_comma {
            self.stack.pop();
            if let (Some(Frame::Selector(previous)), Some(filter)) =
                (self.stack.last_mut(), selector.filter)
            {
                // an unfiltered selector already matches everything
                previous.filter = previous.filter.take().map(|f| f.or(filter));
            }
            return Ok(());
        }

        self.stack.push(Frame::Selector(selector));
        Ok(())
    }

    fn open_rule(&mut self, token: &Token) -> Result<()> {
        let mut selectors = Vec::new();
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Selector(selector) => selectors.push(selector),
                Frame::OrMarker => {}
                other => {
                    self.stack.push(other);
                    break;
                }
            }
        }
        selectors.reverse();

        let nested = matches!(self.stack.last(), Some(Frame::Rule(_)));
        if !nested && selectors.iter().any(|s| !s.has_target()) {
            return Err(self.unexpected(Some(token), "selector with a name, id, class or wildcard"));
        }

        self.depth += 1;
        if self.depth > self.options.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.options.max_depth,
                offset: token.offset,
            });
        }
        self.stack.push(Frame::Rule(Rule::new(selectors)));
        Ok(())
    }

    fn close_rule(&mut self, token: &Token) -> Result<()> {
        let Some(Frame::Rule(rule)) = self.stack.pop() else {
            return Err(self.unexpected(Some(token), "rule"));
        };
        self.depth -= 1;

        match self.stack.last_mut() {
            Some(Frame::Rule(parent)) => parent.nest(rule),
            _ => {
                self.rules.push(rule);
                self.transition(State::TopLevel);
            }
        }
        Ok(())
    }

    fn declaration_block(&mut self, token: Token) -> Result<()> {
        match token.kind {
            TokenKind::Whitespace => Ok(()),
            TokenKind::Delimiter if token.text == ";" => Ok(()),
            TokenKind::Delimiter if token.text == "}" => self.close_rule(&token),
            TokenKind::Identifier
                if self
                    .tokens
                    .peek_significant()
                    .is_some_and(|t| t.is_delimiter(":")) =>
            {
                self.declaration(token)
            }
            _ if starts_selector(&token) => self.begin_selector(token),
            _ => Err(self.unexpected(Some(&token), "declaration, nested rule or '}'")),
        }
    }

    fn declaration(&mut self, key: Token) -> Result<()> {
        // the ':'
        self.tokens.next_significant();
        let value = self.value()?;
        tracing::trace!("{}: {}", key.text, value);
        if let Some(Frame::Rule(rule)) = self.stack.last_mut() {
            rule.declare(key.text, value);
        }
        Ok(())
    }

    /// Terms up to `;` (consumed) or `}` (left for the block).
    fn value(&mut self) -> Result<Expression> {
        let mut parts = Vec::new();
        let mut spaced = false;
        loop {
            let Some(token) = self.tokens.peek().cloned() else {
                return Err(self.unexpected(None, "';' or '}'"));
            };
            if token.is_trivia() {
                self.tokens.next();
                spaced = !parts.is_empty();
                continue;
            }
            if token.is_delimiter(";") {
                self.tokens.next();
                break;
            }
            if token.is_delimiter("}") {
                break;
            }
            if spaced {
                parts.push(Expression::literal(" "));
                spaced = false;
            }
            parts.push(self.term(1)?);
        }

        if parts.is_empty() {
            return Err(self.unexpected(self.tokens.peek(), "value"));
        }
        Ok(collapse(parts))
    }

    fn term(&mut self, depth: usize) -> Result<Expression> {
        let Some(token) = self.tokens.next().cloned() else {
            return Err(self.unexpected(None, "value"));
        };
        match token.kind {
            TokenKind::Number => Value::parse_number(&token.text)
                .map(Expression::Literal)
                .ok_or_else(|| self.unexpected(Some(&token), "number")),
            TokenKind::String => Ok(Expression::literal(token.unquoted())),
            TokenKind::Hash => Ok(Expression::literal(token.text)),
            TokenKind::Identifier
                if self.tokens.peek().is_some_and(|t| t.is_delimiter("(")) =>
            {
                self.call(token, depth)
            }
            TokenKind::Identifier | TokenKind::Operator => Ok(Expression::literal(token.text)),
            TokenKind::Delimiter if token.text == "[" => self.property(),
            TokenKind::Delimiter if token.text == "," => Ok(Expression::literal(",")),
            _ => Err(self.unexpected(Some(&token), "value")),
        }
    }

    fn call(&mut self, name: Token, depth: usize) -> Result<Expression> {
        if self.depth + depth > self.options.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.options.max_depth,
                offset: name.offset,
            });
        }
        // the '('
        self.tokens.next();

        let mut args = Vec::new();
        let mut parts = Vec::new();
        let mut spaced = false;
        loop {
            let Some(token) = self.tokens.peek().cloned() else {
                return Err(self.unexpected(None, "')'"));
            };
            if token.is_trivia() {
                self.tokens.next();
                spaced = !parts.is_empty();
                continue;
            }
            if token.is_delimiter(")") || token.is_delimiter(",") {
                self.tokens.next();
                let closing = token.is_delimiter(")");
                if parts.is_empty() {
                    if closing && args.is_empty() {
                        break;
                    }
                    return Err(self.unexpected(Some(&token), "argument"));
                }
                args.push(collapse(std::mem::take(&mut parts)));
                spaced = false;
                if closing {
                    break;
                }
                continue;
            }
            if token.is_delimiter(";") || token.is_delimiter("}") {
                return Err(self.unexpected(Some(&token), "')'"));
            }
            if spaced {
                parts.push(Expression::literal(" "));
                spaced = false;
            }
            parts.push(self.term(depth + 1)?);
        }

        Ok(Expression::Function {
            name: name.text,
            args,
        })
    }

    /// `[name]` or `[a.b]` after the opening bracket.
    fn property(&mut self) -> Result<Expression> {
        let mut segments = Vec::new();
        loop {
            match self.tokens.next_significant().cloned() {
                Some(t) if t.kind == TokenKind::Identifier => segments.push(t.text),
                Some(t) => return Err(self.unexpected(Some(&t), "attribute name")),
                None => return Err(self.unexpected(None, "attribute name")),
            }
            match self.tokens.next_significant().cloned() {
                Some(t) if t.is_delimiter(".") => continue,
                Some(t) if t.is_delimiter("]") => break,
                Some(t) => return Err(self.unexpected(Some(&t), "']'")),
                None => return Err(self.unexpected(None, "']'")),
            }
        }
        Ok(Expression::Property(PropertyPath::new(segments)))
    }
}

fn starts_selector(token: &Token) -> bool {
    match token.kind {
        TokenKind::Hash | TokenKind::Identifier => true,
        TokenKind::Operator => token.text == "*",
        TokenKind::Delimiter => matches!(token.text.as_str(), "." | "::" | "["),
        _ => false,
    }
}

fn collapse(mut parts: Vec<Expression>) -> Expression {
    if parts.len() == 1 {
        parts.swap_remove(0)
    } else {
        Expression::Mixed(parts)
    }
}

/// Parse a stylesheet with default options.
pub fn parse_stylesheet(source: &str) -> Result<Stylesheet> {
    parse_stylesheet_with(source, &ParseOptions::default())
}

pub fn parse_stylesheet_with(source: &str, options: &ParseOptions) -> Result<Stylesheet> {
    StyleParser::new(source, options)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::{CompareOp, Filter, LogicOp, parse_filter};

    fn single_rule(source: &str) -> Rule {
        let mut rules = parse_stylesheet(source).unwrap().into_rules();
        assert_eq!(rules.len(), 1, "expected one rule in {source:?}");
        rules.remove(0)
    }

    #[test]
    fn test_simple() {
        let rule = single_rule("#layer { line-color: #c00; line-width: 0.5; }");
        assert_eq!(rule.selectors(), &[Selector::with_id("layer")]);
        assert_eq!(rule.get("line-color"), Some(&Expression::literal("#c00")));
        assert_eq!(rule.get("line-width"), Some(&Expression::literal(0.5)));
    }

    #[test]
    fn test_filter() {
        let rule = single_rule("#layer[foo < 3] { line-width: 1; }");
        assert_eq!(
            rule.selectors()[0].filter,
            Some(Filter::compare(
                CompareOp::Lt,
                Expression::property("foo"),
                Expression::literal(3)
            ))
        );
    }

    #[test]
    fn test_adjacent_filters_and() {
        let rule = single_rule("#layer[foo < 3][bar >= 10] { line-width: 1; }");
        assert_eq!(
            rule.selectors()[0].filter,
            Some(parse_filter("foo < 3 AND bar >= 10").unwrap())
        );
    }

    #[test]
    fn test_comma_filter_ors_into_previous() {
        let rule = single_rule("#layer[foo < 3], [bar >= 10] { line-width: 1; }");
        assert_eq!(rule.selectors().len(), 1);
        match &rule.selectors()[0].filter {
            Some(Filter::Logic {
                op: LogicOp::Or,
                children,
            }) => assert_eq!(children.len(), 2),
            other => panic!("expected OR filter, got {:?}", other),
        }
    }

    #[test]
    fn test_comma_selectors() {
        let rule = single_rule("#a, #b.big { line-width: 1; }");
        assert_eq!(rule.selectors().len(), 2);
        assert_eq!(rule.selectors()[1].classes, vec!["big"]);
    }

    #[test]
    fn test_nested() {
        let rule = single_rule(
            "#layer { line-width: 1; [zoom > 10] { line-width: 2; } ::glow { line-width: 4; } }",
        );
        assert_eq!(rule.nested().len(), 2);
        assert!(rule.nested()[0].selectors()[0].filter.is_some());
        assert_eq!(
            rule.nested()[1].selectors()[0].attachment.as_deref(),
            Some("glow")
        );
    }

    #[test]
    fn test_name_class_attachment_wildcard() {
        let sheet = parse_stylesheet(
            "Map { background-color: rgb(0,0,0); }\n\
             .roads { line-width: 1px; }\n\
             #states::glow { line-width: 2; }\n\
             * { comp-op: dst; }",
        )
        .unwrap();
        let rules = sheet.rules();
        assert_eq!(rules[0].selectors()[0].name.as_deref(), Some("Map"));
        assert_eq!(
            rules[0].get("background-color"),
            Some(&Expression::function(
                "rgb",
                vec![
                    Expression::literal(0),
                    Expression::literal(0),
                    Expression::literal(0)
                ]
            ))
        );
        assert_eq!(rules[1].selectors()[0].classes, vec!["roads"]);
        assert_eq!(rules[1].get("line-width"), Some(&Expression::literal(1)));
        assert_eq!(rules[2].selectors()[0].attachment.as_deref(), Some("glow"));
        assert!(rules[3].selectors()[0].wildcard);
        assert_eq!(rules[3].get("comp-op"), Some(&Expression::literal("dst")));
    }

    #[test]
    fn test_property_and_functions() {
        let rule = single_rule(
            "#layer { text-name: [name]; polygon-fill: interpolate([foo], red, blue, 0, 1000); marker-fill: randcolor(); }",
        );
        assert_eq!(rule.get("text-name"), Some(&Expression::property("name")));
        assert_eq!(
            rule.get("polygon-fill"),
            Some(&Expression::function(
                "interpolate",
                vec![
                    Expression::property("foo"),
                    Expression::literal("red"),
                    Expression::literal("blue"),
                    Expression::literal(0),
                    Expression::literal(1000),
                ]
            ))
        );
        assert_eq!(
            rule.get("marker-fill"),
            Some(&Expression::function("randcolor", vec![]))
        );
    }

    #[test]
    fn test_mixed_value() {
        let rule = single_rule("#layer { line-dasharray: 1.0 2.0 3.0 }");
        assert_eq!(
            rule.get("line-dasharray"),
            Some(&Expression::Mixed(vec![
                Expression::literal(1.0),
                Expression::literal(" "),
                Expression::literal(2.0),
                Expression::literal(" "),
                Expression::literal(3.0),
            ]))
        );
    }

    #[test]
    fn test_comments_ignored() {
        let rule = single_rule(
            "/* header */ #layer /* a */ { /* b */ line-width: 1; /* c */ }\n/* trailer */",
        );
        assert_eq!(rule.declarations().len(), 1);
        let filtered = single_rule("#l[a /* note */ = 1] { x: 1; }");
        assert_eq!(
            filtered.selectors()[0].filter,
            Some(parse_filter("a = 1").unwrap())
        );
    }

    #[test]
    fn test_empty_stylesheet() {
        assert!(parse_stylesheet("").unwrap().rules().is_empty());
        assert!(parse_stylesheet("  /* nothing */ ").unwrap().rules().is_empty());
    }

    #[test]
    fn test_errors() {
        // unbalanced braces
        assert!(matches!(
            parse_stylesheet("#a { line-width: 1;"),
            Err(ParseError::Syntax(SyntaxError {
                state: "declaration block",
                ..
            }))
        ));
        assert!(parse_stylesheet("#a { x: 1; } }").is_err());
        // filter-only selector at top level
        assert!(parse_stylesheet("[a = 1] { x: 1; }").is_err());
        // wildcard must appear alone
        assert!(parse_stylesheet("*#a { x: 1; }").is_err());
        assert!(parse_stylesheet("#a* { x: 1; }").is_err());
        // empty selector after comma
        assert!(parse_stylesheet("#a, { x: 1; }").is_err());
        // missing value
        assert!(parse_stylesheet("#a { x: ; }").is_err());
        assert!(matches!(
            parse_stylesheet("#a { x: 'open; }"),
            Err(ParseError::Lexical(_))
        ));
    }

    #[test]
    fn test_filter_error_offset_is_absolute() {
        let err = parse_stylesheet("#layer[foo <] { x: 1; }").unwrap_err();
        assert_eq!(err.offset(), 12);
        let ParseError::Syntax(e) = err else {
            panic!("expected a syntax error, got {err:?}");
        };
        assert_eq!(e.scanned, "#layer[foo <");

        // comments inside the filter are reported as written
        let Err(ParseError::Syntax(e)) = parse_stylesheet("#a[/* c */ x = 1 2] { x: 1; }") else {
            panic!("expected a syntax error");
        };
        assert_eq!(e.offset, 17);
        assert_eq!(e.scanned, "#a[/* c */ x = 1 2");
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("#a {{ {} }}", "::x { ".repeat(80) + &"}".repeat(80));
        assert!(matches!(
            parse_stylesheet(&deep),
            Err(ParseError::TooDeep { limit: 64, .. })
        ));
        let options = ParseOptions { max_depth: 100 };
        assert!(parse_stylesheet_with(&deep, &options).is_ok());
    }
}
