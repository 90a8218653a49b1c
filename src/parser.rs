use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Expression, Function, Prototype, ANON_FN_NAME};
use crate::lexer::{Lexer, SourceLexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token {0} when expecting an expression")]
    UnknownToken(Token),
    #[error("expected {expected} but found {found}")]
    Expected { expected: &'static str, found: Token },
    #[error("'{0}' is reserved for top-level expressions")]
    ReservedName(String),
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Deepest expression tree the parser will build. Every later pass over a
/// tree (checking, evaluating, lowering, printing, dropping) recurses once
/// per level.
pub const MAX_EXPRESSION_DEPTH: usize = 256;

pub type PartialParseResult = Result<Expression, ParserError>;

/// an expression together with its depth
type Measured = Result<(Expression, usize), ParserError>;

/// Recursive-descent parser with precedence climbing for binary operators.
///
/// Holds exactly one token of lookahead, `current`. Productions consume what
/// they match and never rewind, so a failure leaves the cursor wherever the
/// failing production stopped.
pub struct Parser<I> {
    lexer: Lexer<I>,
    current: Token,
    current_line: usize,
    nesting: usize,
    operator_precedence: HashMap<char, i32>,
}

impl Parser<std::vec::IntoIter<char>> {
    /// parser over an in-memory source, already primed with its first token
    pub fn from_source(source: &str) -> Self {
        let mut parser = Parser::new(SourceLexer::from_source(source));
        parser.advance();
        parser
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    /// The lookahead starts out empty (reported as end of input); call
    /// [`Parser::advance`] once before parsing.
    pub fn new(lexer: Lexer<I>) -> Self {
        let mut operator_precedence = HashMap::new();
        operator_precedence.insert('<', 10);
        operator_precedence.insert('>', 10);
        operator_precedence.insert('+', 20);
        operator_precedence.insert('-', 20);
        operator_precedence.insert('*', 40);
        operator_precedence.insert('/', 40);
        Self {
            lexer,
            current: Token::Eof,
            current_line: 1,
            nesting: 0,
            operator_precedence,
        }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    /// line the lookahead token started on
    pub fn current_line(&self) -> usize {
        self.current_line
    }

    pub fn advance(&mut self) -> &Token {
        self.current = self.lexer.next_token();
        self.current_line = self.lexer.token_line();
        &self.current
    }

    /// precedence of the lookahead if it is a binary operator, -1 otherwise
    fn token_precedence(&self) -> i32 {
        match self.current {
            Token::Char(c) => self.operator_precedence.get(&c).copied().unwrap_or(-1),
            _ => -1,
        }
    }

    fn expected(&self, expected: &'static str) -> ParserError {
        let err = ParserError::Expected {
            expected,
            found: self.current.clone(),
        };
        debug!(line = self.current_line, "{}", err);
        err
    }

    fn expect_char(&mut self, c: char, expected: &'static str) -> Result<(), ParserError> {
        if self.current != Token::Char(c) {
            return Err(self.expected(expected));
        }
        self.advance();
        Ok(())
    }

    fn too_deep(&self) -> ParserError {
        let err = ParserError::TooDeep(MAX_EXPRESSION_DEPTH);
        debug!(line = self.current_line, "{}", err);
        err
    }

    fn measured(&self, expr: Expression, depth: usize) -> Measured {
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(self.too_deep());
        }
        Ok((expr, depth))
    }

    fn parse_number(&mut self, value: f64) -> Measured {
        self.advance();
        Ok((Expression::Number(value), 1))
    }

    /// an expression inside parentheses or an argument list
    fn subexpression(&mut self) -> Measured {
        if self.nesting >= MAX_EXPRESSION_DEPTH {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        let result = self.expression();
        self.nesting -= 1;
        result
    }

    fn parse_nested(&mut self) -> Measured {
        self.advance();
        let expr = self.subexpression()?;
        self.expect_char(')', "')'")?;
        Ok(expr)
    }

    fn parse_identifier(&mut self, ident: String) -> Measured {
        self.advance();
        if self.current != Token::Char('(') {
            return Ok((Expression::Variable(ident), 1));
        }

        self.advance();
        let mut args = Vec::new();
        let mut depth = 0;
        if self.current != Token::Char(')') {
            loop {
                let (arg, arg_depth) = self.subexpression()?;
                args.push(arg);
                depth = depth.max(arg_depth);

                if self.current == Token::Char(')') {
                    break;
                }
                if self.current != Token::Char(',') {
                    return Err(self.expected("')' or ',' in argument list"));
                }
                self.advance();
            }
        }
        self.advance();

        self.measured(Expression::Call(ident, args), depth + 1)
    }

    fn primary(&mut self) -> Measured {
        match self.current.clone() {
            Token::Number(value) => self.parse_number(value),
            Token::Ident(ident) => self.parse_identifier(ident),
            Token::Char('(') => self.parse_nested(),
            other => {
                debug!(line = self.current_line, "unknown token {}", other);
                Err(ParserError::UnknownToken(other))
            }
        }
    }

    fn binop_rhs(&mut self, min_precedence: i32, lhs: Expression, lhs_depth: usize) -> Measured {
        let mut result = lhs;
        let mut depth = lhs_depth;

        loop {
            let precedence = self.token_precedence();
            if precedence < min_precedence {
                return Ok((result, depth));
            }

            let operator = match self.current {
                Token::Char(op) => op,
                _ => return Ok((result, depth)),
            };
            self.advance();

            let (mut rhs, mut rhs_depth) = self.primary()?;

            // let a tighter operator after rhs take it as its own lhs first;
            // equal precedence falls through, which keeps chains left-associative
            if precedence < self.token_precedence() {
                let (tighter, tighter_depth) = self.binop_rhs(precedence + 1, rhs, rhs_depth)?;
                rhs = tighter;
                rhs_depth = tighter_depth;
            }

            depth = depth.max(rhs_depth) + 1;
            if depth > MAX_EXPRESSION_DEPTH {
                return Err(self.too_deep());
            }
            result = Expression::Binary(operator, Box::new(result), Box::new(rhs));
        }
    }

    fn expression(&mut self) -> Measured {
        let (lhs, depth) = self.primary()?;
        self.binop_rhs(0, lhs, depth)
    }

    pub fn parse_primary(&mut self) -> PartialParseResult {
        self.primary().map(|(expr, _)| expr)
    }

    /// Extend `lhs` with every `op primary` pair whose operator binds at
    /// least as tightly as `min_precedence`.
    pub fn parse_binop_rhs(&mut self, min_precedence: i32, lhs: Expression) -> PartialParseResult {
        let depth = lhs.depth();
        self.binop_rhs(min_precedence, lhs, depth).map(|(expr, _)| expr)
    }

    pub fn parse_expression(&mut self) -> PartialParseResult {
        self.expression().map(|(expr, _)| expr)
    }

    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(self.expected("function name in prototype")),
        };
        if name == ANON_FN_NAME {
            let err = ParserError::ReservedName(name);
            debug!(line = self.current_line, "{}", err);
            return Err(err);
        }
        self.advance();

        self.expect_char('(', "'(' in prototype")?;

        let mut args = Vec::new();
        while let Token::Ident(arg) = &self.current {
            args.push(arg.clone());
            self.advance();
        }

        self.expect_char(')', "')' in prototype")?;

        Ok(Prototype { name, args })
    }

    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        if self.current != Token::Extern {
            return Err(self.expected("'extern'"));
        }
        self.advance();
        self.parse_prototype()
    }

    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        if self.current != Token::Def {
            return Err(self.expected("'def'"));
        }
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    pub fn parse_top_level_expression(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expression()?;
        Ok(Function::anonymous(body))
    }
}
