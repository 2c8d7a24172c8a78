//! Parser for CQL filters and expressions.
//!
//! Grammar (in rough EBNF, keywords case-insensitive):
//!
//! filter     = or_expr
//! or_expr    = and_expr ("OR" and_expr)*
//! and_expr   = not_expr ("AND" not_expr)*
//! not_expr   = "NOT" not_expr | predicate
//! predicate  = "(" filter ")" | "INCLUDE" | "EXCLUDE"
//!            | "IN" "(" expr ("," expr)* ")"
//!            | spatial_op "(" geom_arg "," geom_arg ("," expr ("," IDENT)?)? ")"
//!            | "BBOX" "(" geom_arg "," num "," num "," num "," num ("," STRING)? ")"
//!            | expr compare_tail?
//! compare_tail = compare_op expr
//!            | "NOT"? "BETWEEN" expr "AND" expr
//!            | "NOT"? "LIKE" STRING
//!            | "NOT"? "IN" "(" expr ("," expr)* ")"
//!            | "IS" "NOT"? "NULL"
//! compare_op = "=" | "<>" | "!=" | "<" | "<=" | ">" | ">="
//! expr       = term (("+" | "-") term)*
//! term       = primary (("*" | "/") primary)*
//! primary    = NUMBER | STRING | "TRUE" | "FALSE" | wkt | envelope
//!            | IDENT "(" (expr ("," expr)*)? ")"
//!            | IDENT ("." IDENT)*
//!            | "(" expr ")"
//! geom_arg   = STRING | expr       (a quoted string is read as WKT)
//! envelope   = "ENVELOPE" "(" num "," num "," num "," num ")"
//!
//! A leading "(" is read as a nested filter unless an operator follows its
//! closing paren, in which case the group is an operand: `(a + b) > 3`.
//! A bare `IN (...)` matches feature ids.

use geo_types::{Coord, Geometry, Rect};
use geozero::ToGeo;
use geozero::wkt::Wkt;

use super::ast::{ArithOp, CompareOp, Expression, Filter, LogicOp, PropertyPath, SpatialOp};
use crate::config::ParseOptions;
use crate::error::{ParseError, SyntaxError};
use crate::token::{Token, TokenKind, TokenStream};
use crate::value::Value;

const STATE: &str = "filter";

const WKT_KEYWORDS: &[&str] = &[
    "POINT",
    "LINESTRING",
    "POLYGON",
    "MULTIPOINT",
    "MULTILINESTRING",
    "MULTIPOLYGON",
    "GEOMETRYCOLLECTION",
];

const RESERVED: &[&str] = &[
    "AND", "OR", "NOT", "LIKE", "IN", "IS", "NULL", "BETWEEN", "INCLUDE", "EXCLUDE",
];

type Result<T> = std::result::Result<T, ParseError>;

/// Parser state.
struct Parser<'s> {
    tokens: TokenStream<'s>,
    depth: usize,
    max_depth: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str, options: &ParseOptions) -> Result<Self> {
        let mut tokens = TokenStream::new(source)?;
        tokens.next_significant();
        Ok(Parser {
            tokens,
            depth: 0,
            max_depth: options.max_depth,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.current()
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.current().cloned();
        self.tokens.next_significant();
        tok
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    fn peek_delimiter(&self, delim: &str) -> bool {
        self.peek().is_some_and(|t| t.is_delimiter(delim))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let matched = self.peek_keyword(keyword);
        if matched {
            self.advance();
        }
        matched
    }

    fn eat_delimiter(&mut self, delim: &str) -> bool {
        let matched = self.peek_delimiter(delim);
        if matched {
            self.advance();
        }
        matched
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn expect_delimiter(&mut self, delim: &str) -> Result<()> {
        if self.eat_delimiter(delim) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", delim)))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::Syntax(SyntaxError {
            state: STATE,
            found: self
                .peek()
                .map_or_else(|| "end of input".to_string(), |t| t.text.clone()),
            expected: expected.to_string(),
            offset: self.tokens.offset(),
            scanned: self.tokens.scanned().to_string(),
        })
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.max_depth,
                offset: self.tokens.offset(),
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parse the top-level filter expression.
    fn parse_filter(&mut self) -> Result<Filter> {
        self.enter()?;
        let filter = self.parse_or_expr();
        self.leave();
        filter
    }

    /// Parse OR expression: and_expr ("OR" and_expr)*
    fn parse_or_expr(&mut self) -> Result<Filter> {
        let mut children = vec![self.parse_and_expr()?];
        while self.eat_keyword("OR") {
            children.push(self.parse_and_expr()?);
        }
        Ok(logic(LogicOp::Or, children))
    }

    /// Parse AND expression: not_expr ("AND" not_expr)*
    fn parse_and_expr(&mut self) -> Result<Filter> {
        let mut children = vec![self.parse_not_expr()?];
        while self.eat_keyword("AND") {
            children.push(self.parse_not_expr()?);
        }
        Ok(logic(LogicOp::And, children))
    }

    /// Parse NOT expression: "NOT" not_expr | predicate
    fn parse_not_expr(&mut self) -> Result<Filter> {
        if self.eat_keyword("NOT") {
            self.enter()?;
            let inner = self.parse_not_expr();
            self.leave();
            return Ok(inner?.negate());
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Filter> {
        if self.peek_delimiter("(") {
            return self.parse_group();
        }
        if self.peek_keyword("IN")
            && self
                .tokens
                .peek_significant()
                .is_some_and(|t| t.is_delimiter("("))
        {
            self.advance();
            self.advance();
            return Ok(Filter::Id(self.parse_expr_list()?));
        }
        if self.eat_keyword("INCLUDE") {
            return Ok(Filter::All);
        }
        if self.eat_keyword("EXCLUDE") {
            return Ok(Filter::None);
        }
        if let Some(op) = self.peek().and_then(|t| match t.kind {
            TokenKind::Identifier => SpatialOp::from_keyword(&t.text),
            _ => None,
        }) {
            if self
                .tokens
                .peek_significant()
                .is_some_and(|t| t.is_delimiter("("))
            {
                self.advance();
                return self.parse_spatial(op);
            }
        }

        let left = self.parse_expr()?;
        self.parse_compare_tail(left)
    }

    /// A parenthesised filter, or a parenthesised operand of a comparison.
    fn parse_group(&mut self) -> Result<Filter> {
        let start = self.tokens.clone();
        let depth = self.depth;

        self.advance();
        let grouped = self
            .parse_filter()
            .and_then(|inner| self.expect_delimiter(")").map(|()| inner));
        if grouped.is_ok() && !self.continues_operand() {
            return grouped;
        }

        self.tokens = start;
        self.depth = depth;
        let operand = self
            .parse_expr()
            .and_then(|left| self.parse_compare_tail(left));
        match (operand, grouped) {
            (Ok(filter), _) => Ok(filter),
            // report the failure of the more likely reading
            (Err(_), Err(e)) | (Err(e), Ok(_)) => Err(e),
        }
    }

    /// Whether the current token can only follow an operand, not a filter.
    fn continues_operand(&self) -> bool {
        let Some(tok) = self.peek() else {
            return false;
        };
        match tok.kind {
            TokenKind::Operator => true,
            TokenKind::Number => tok.text.starts_with('-'),
            TokenKind::Identifier => ["IS", "NOT", "BETWEEN", "LIKE", "IN"]
                .iter()
                .any(|k| tok.is_keyword(k)),
            _ => false,
        }
    }

    fn parse_compare_tail(&mut self, left: Expression) -> Result<Filter> {
        if let Some(op) = self.peek().and_then(compare_op) {
            self.advance();
            let right = self.parse_expr()?;
            // keep literals on the right: `3 > foo` becomes `foo < 3`
            return Ok(if left.is_literal() && !right.is_literal() {
                Filter::compare(op.flip(), right, left)
            } else {
                Filter::compare(op, left, right)
            });
        }

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Filter::IsNull {
                expr: left,
                negated,
            });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("BETWEEN") {
            let low = self.parse_expr()?;
            self.expect_keyword("AND")?;
            let high = self.parse_expr()?;
            let range = Filter::Logic {
                op: LogicOp::And,
                children: vec![
                    Filter::compare(CompareOp::Ge, left.clone(), low),
                    Filter::compare(CompareOp::Le, left, high),
                ],
            };
            return Ok(if negated { range.negate() } else { range });
        }
        if self.eat_keyword("LIKE") {
            let pattern = match self.peek() {
                Some(t) if t.kind == TokenKind::String => t.unquoted(),
                _ => return Err(self.unexpected("quoted LIKE pattern")),
            };
            self.advance();
            return Ok(Filter::Like {
                expr: left,
                pattern,
                negated,
            });
        }
        if self.eat_keyword("IN") {
            self.expect_delimiter("(")?;
            let values = self.parse_expr_list()?;
            return Ok(Filter::In {
                expr: left,
                values,
                negated,
            });
        }
        if negated {
            return Err(self.unexpected("BETWEEN, LIKE or IN"));
        }

        // bare TRUE / FALSE
        match left {
            Expression::Literal(Value::Bool(true)) => Ok(Filter::All),
            Expression::Literal(Value::Bool(false)) => Ok(Filter::None),
            _ => Err(self.unexpected("comparison operator")),
        }
    }

    /// Comma separated expressions up to and including the closing paren.
    fn parse_expr_list(&mut self) -> Result<Vec<Expression>> {
        let mut items = Vec::new();
        if self.eat_delimiter(")") {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.eat_delimiter(")") {
                return Ok(items);
            }
            self.expect_delimiter(",")?;
        }
    }

    fn parse_spatial(&mut self, op: SpatialOp) -> Result<Filter> {
        self.expect_delimiter("(")?;
        let left = self.parse_geom_arg()?;
        self.expect_delimiter(",")?;

        if op == SpatialOp::Bbox {
            let min_x = self.parse_number()?;
            self.expect_delimiter(",")?;
            let min_y = self.parse_number()?;
            self.expect_delimiter(",")?;
            let max_x = self.parse_number()?;
            self.expect_delimiter(",")?;
            let max_y = self.parse_number()?;
            // optional CRS, unused
            if self.eat_delimiter(",") {
                match self.peek() {
                    Some(t) if t.kind == TokenKind::String => {
                        self.advance();
                    }
                    _ => return Err(self.unexpected("quoted CRS")),
                }
            }
            self.expect_delimiter(")")?;
            return Ok(Filter::Spatial {
                op,
                left,
                right: envelope(min_x, min_y, max_x, max_y),
                distance: None,
            });
        }

        let right = self.parse_geom_arg()?;
        let distance = if op.is_distance() {
            self.expect_delimiter(",")?;
            let d = self.parse_expr()?;
            // units are accepted and ignored
            if self.eat_delimiter(",") {
                match self.peek() {
                    Some(t) if matches!(t.kind, TokenKind::Identifier | TokenKind::String) => {
                        self.advance();
                    }
                    _ => return Err(self.unexpected("distance units")),
                }
            }
            Some(d)
        } else {
            None
        };
        self.expect_delimiter(")")?;

        Ok(Filter::Spatial {
            op,
            left,
            right,
            distance,
        })
    }

    fn parse_geom_arg(&mut self) -> Result<Expression> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::String => {
                let (text, offset) = (t.unquoted(), t.offset + 1);
                self.advance();
                Ok(Expression::Literal(Value::Geometry(parse_wkt(&text, offset)?)))
            }
            _ => self.parse_expr(),
        }
    }

    fn parse_number(&mut self) -> Result<f64> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Number => {
                let n = Value::parse_number(&t.text).and_then(|v| v.as_f64());
                match n {
                    Some(n) => {
                        self.advance();
                        Ok(n)
                    }
                    None => Err(self.unexpected("number")),
                }
            }
            _ => Err(self.unexpected("number")),
        }
    }

    fn peek_arith(&self) -> Option<ArithOp> {
        self.peek()
            .filter(|t| t.kind == TokenKind::Operator)
            .and_then(|t| ArithOp::from_symbol(&t.text))
    }

    /// Additive level: term (("+" | "-") term)*
    fn parse_expr(&mut self) -> Result<Expression> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek_arith() {
                Some(op @ (ArithOp::Add | ArithOp::Sub)) => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = Expression::math(op, left, right);
                }
                // `a -1`: the sign was lexed into the number
                None if self
                    .peek()
                    .is_some_and(|t| t.kind == TokenKind::Number && t.text.starts_with('-')) =>
                {
                    let right = self.parse_term()?;
                    left = Expression::math(ArithOp::Add, left, right);
                }
                _ => return Ok(left),
            }
        }
    }

    /// Multiplicative level: primary (("*" | "/") primary)*
    fn parse_term(&mut self) -> Result<Expression> {
        let mut left = self.parse_primary()?;
        while let Some(op @ (ArithOp::Mul | ArithOp::Div)) = self.peek_arith() {
            self.advance();
            let right = self.parse_primary()?;
            left = Expression::math(op, left, right);
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.unexpected("expression"));
        };

        match tok.kind {
            TokenKind::Number => {
                let value = Value::parse_number(&tok.text).ok_or_else(|| self.unexpected("number"))?;
                self.advance();
                Ok(Expression::Literal(value))
            }
            TokenKind::String => {
                self.advance();
                Ok(Expression::Literal(Value::String(tok.unquoted())))
            }
            TokenKind::Delimiter if tok.text == "(" => {
                self.advance();
                self.enter()?;
                let inner = self.parse_expr();
                self.leave();
                let inner = inner?;
                self.expect_delimiter(")")?;
                Ok(inner)
            }
            TokenKind::Identifier => self.parse_ident_expr(tok),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_ident_expr(&mut self, tok: Token) -> Result<Expression> {
        if tok.is_keyword("TRUE") {
            self.advance();
            return Ok(Expression::Literal(Value::Bool(true)));
        }
        if tok.is_keyword("FALSE") {
            self.advance();
            return Ok(Expression::Literal(Value::Bool(false)));
        }
        if WKT_KEYWORDS.iter().any(|k| tok.is_keyword(k)) {
            return self.parse_wkt_literal(&tok);
        }
        if RESERVED.iter().any(|k| tok.is_keyword(k)) {
            return Err(self.unexpected("expression"));
        }

        let call = self
            .tokens
            .peek_significant()
            .is_some_and(|t| t.is_delimiter("("));
        if call && tok.is_keyword("ENVELOPE") {
            self.advance();
            self.advance();
            // ENVELOPE(west, east, north, south)
            let min_x = self.parse_number()?;
            self.expect_delimiter(",")?;
            let max_x = self.parse_number()?;
            self.expect_delimiter(",")?;
            let max_y = self.parse_number()?;
            self.expect_delimiter(",")?;
            let min_y = self.parse_number()?;
            self.expect_delimiter(")")?;
            return Ok(envelope(min_x, min_y, max_x, max_y));
        }
        if call {
            self.advance();
            self.advance();
            self.enter()?;
            let args = self.parse_expr_list();
            self.leave();
            return Ok(Expression::Function {
                name: tok.text,
                args: args?,
            });
        }

        // property path: ident ("." ident)*
        let mut segments = vec![tok.text];
        self.tokens.next();
        while self.tokens.current().is_some_and(|t| t.is_delimiter(".")) {
            match self.tokens.next() {
                Some(t) if t.kind == TokenKind::Identifier => segments.push(t.text.clone()),
                _ => return Err(self.unexpected("property name after '.'")),
            }
            self.tokens.next();
        }
        if self.tokens.current().is_some_and(Token::is_trivia) {
            self.tokens.next_significant();
        }
        Ok(Expression::Property(PropertyPath::new(segments)))
    }

    /// Unquoted WKT: the keyword plus its balanced parenthesised body.
    fn parse_wkt_literal(&mut self, keyword: &Token) -> Result<Expression> {
        let start = keyword.offset;
        self.advance();

        let end = if self.peek_keyword("EMPTY") {
            let end = self.peek().map_or(start, Token::end);
            self.advance();
            end
        } else {
            if !self.peek_delimiter("(") {
                return Err(self.unexpected("'(' or EMPTY"));
            }
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    Some(t) if t.is_delimiter("(") => depth += 1,
                    Some(t) if t.is_delimiter(")") => depth -= 1,
                    Some(_) => {}
                    None => return Err(self.unexpected("')'")),
                }
                let end = self.peek().map_or(start, Token::end);
                self.advance();
                if depth == 0 {
                    break end;
                }
            }
        };

        let text = &self.tokens.source()[start..end];
        Ok(Expression::Literal(Value::Geometry(parse_wkt(text, start)?)))
    }
}

fn compare_op(tok: &Token) -> Option<CompareOp> {
    if tok.kind != TokenKind::Operator {
        return None;
    }
    match tok.text.as_str() {
        "=" => Some(CompareOp::Eq),
        "<>" | "!=" => Some(CompareOp::Ne),
        "<" => Some(CompareOp::Lt),
        "<=" => Some(CompareOp::Le),
        ">" => Some(CompareOp::Gt),
        ">=" => Some(CompareOp::Ge),
        _ => None,
    }
}

fn logic(op: LogicOp, mut children: Vec<Filter>) -> Filter {
    if children.len() == 1 {
        return children.swap_remove(0);
    }
    Filter::Logic { op, children }.simplify()
}

fn envelope(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Expression {
    let rect = Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y });
    Expression::Literal(Value::Geometry(Geometry::Polygon(rect.to_polygon())))
}

fn parse_wkt(text: &str, offset: usize) -> Result<Geometry<f64>> {
    Wkt(text).to_geo().map_err(|e| ParseError::Geometry {
        text: text.to_string(),
        message: e.to_string(),
        offset,
    })
}

/// Parse a CQL filter with default options. Empty input is `Filter::All`.
pub fn parse_filter(input: &str) -> Result<Filter> {
    parse_filter_with(input, &ParseOptions::default())
}

pub fn parse_filter_with(input: &str, options: &ParseOptions) -> Result<Filter> {
    let mut parser = Parser::new(input, options)?;
    if parser.peek().is_none() {
        return Ok(Filter::All);
    }
    let filter = parser.parse_filter()?;
    if parser.peek().is_some() {
        return Err(parser.unexpected("end of filter"));
    }
    Ok(filter)
}

/// Parse a single CQL value expression, arithmetic included.
pub fn parse_expression(input: &str) -> Result<Expression> {
    let mut parser = Parser::new(input, &ParseOptions::default())?;
    let expr = parser.parse_expr()?;
    if parser.peek().is_some() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}
