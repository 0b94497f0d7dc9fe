use std::fmt;

use crate::ast::{BinaryOp, Block, Expr, ExprKind, Program, Stmt, StmtKind, UnaryOp};
use crate::lexer::{Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at {}..{}: {}",
            self.span.start, self.span.end, self.message
        )
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !tokens
            .last()
            .is_some_and(|token| matches!(token.kind, TokenKind::Eof))
        {
            tokens.push(Token::new(TokenKind::Eof, Span::default()));
        }

        Self { tokens, cursor: 0 }
    }

    pub fn parse_program(mut self) -> Result<Program, Vec<ParseError>> {
        let mut statements = Vec::new();
        let mut errors = Vec::new();

        while !self.at_end() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    errors.push(err);
                    self.synchronize();
                }
            }
        }

        if errors.is_empty() {
            Ok(Program::new(statements))
        } else {
            Err(errors)
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.current().kind {
            TokenKind::Var => self.parse_var_statement(),
            TokenKind::Fun => self.parse_function_definition(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::LBrace => {
                if self.looks_like_map_literal() {
                    self.parse_assignment_or_expression_statement()
                } else {
                    self.parse_block_statement()
                }
            }
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Break => self.parse_signal_statement(StmtKind::Break),
            TokenKind::Continue => self.parse_signal_statement(StmtKind::Continue),
            TokenKind::Defer => self.parse_defer_statement(),
            TokenKind::Assert => self.parse_assert_statement(),
            TokenKind::Import => self.parse_import_statement(),
            TokenKind::Comment => {
                let token = self.advance();
                Ok(Stmt::new(StmtKind::Comment, token.span))
            }
            _ => self.parse_assignment_or_expression_statement(),
        }
    }

    fn parse_var_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        let name = self.expect_ident("expected identifier after 'var'")?;
        self.expect(
            |kind| matches!(kind, TokenKind::Assign),
            "expected '=' after identifier",
        )?;

        let value = self.parse_expression(Precedence::Lowest)?;
        self.consume_semicolon();

        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::Var { name, value }, span))
    }

    fn parse_function_definition(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        let name = self.expect_ident("expected function name after 'fun'")?;
        self.expect(
            |kind| matches!(kind, TokenKind::LParen),
            "expected '(' after function name",
        )?;

        let mut params = Vec::new();
        if !self.check(|kind| matches!(kind, TokenKind::RParen)) {
            loop {
                params.push(self.expect_ident("expected parameter name in function definition")?);

                if self.check(|kind| matches!(kind, TokenKind::Comma)) {
                    self.advance();
                    continue;
                }
                break;
            }
        }

        self.expect(
            |kind| matches!(kind, TokenKind::RParen),
            "expected ')' after function parameters",
        )?;

        let body = self.parse_block("expected function body block")?;
        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::FunctionDef { name, params, body }, span))
    }

    fn parse_if_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        self.expect(
            |kind| matches!(kind, TokenKind::LParen),
            "expected '(' after if",
        )?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(
            |kind| matches!(kind, TokenKind::RParen),
            "expected ')' after if condition",
        )?;

        let then_branch = self.parse_block("expected block after if condition")?;

        let else_branch = if self.check(|kind| matches!(kind, TokenKind::Else)) {
            self.advance();
            if self.check(|kind| matches!(kind, TokenKind::If)) {
                // `else if` chains as an else branch holding one if statement.
                let nested = self.parse_if_statement()?;
                Some(vec![nested])
            } else {
                Some(self.parse_block("expected block after else")?)
            }
        } else {
            None
        };

        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn parse_while_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        self.expect(
            |kind| matches!(kind, TokenKind::LParen),
            "expected '(' after while",
        )?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(
            |kind| matches!(kind, TokenKind::RParen),
            "expected ')' after while condition",
        )?;
        let body = self.parse_block("expected block after while condition")?;
        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::While { condition, body }, span))
    }

    fn parse_block_statement(&mut self) -> Result<Stmt, ParseError> {
        let open = self.current().span;
        let block = self.parse_block("expected '{' to open block")?;
        let span = open.join(self.previous_span());
        Ok(Stmt::new(StmtKind::Block(block), span))
    }

    fn parse_return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();

        if self.check(|kind| matches!(kind, TokenKind::Semicolon)) {
            self.advance();
            return Ok(Stmt::new(
                StmtKind::Return(None),
                keyword.span.join(self.previous_span()),
            ));
        }

        if self.check(|kind| matches!(kind, TokenKind::RBrace)) || self.at_end() {
            return Ok(Stmt::new(StmtKind::Return(None), keyword.span));
        }

        let value = self.parse_expression(Precedence::Lowest)?;
        self.consume_semicolon();
        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::Return(Some(value)), span))
    }

    fn parse_signal_statement(&mut self, kind: StmtKind) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        self.consume_semicolon();
        Ok(Stmt::new(kind, keyword.span))
    }

    fn parse_defer_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        let call = self.parse_expression(Precedence::Lowest)?;
        if !matches!(call.kind, ExprKind::Call { .. }) {
            return Err(ParseError::new("defer expects a call expression", call.span));
        }
        self.consume_semicolon();
        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::Defer(call), span))
    }

    fn parse_assert_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        let expression = self.parse_expression(Precedence::Lowest)?;
        self.consume_semicolon();
        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::Assert(expression), span))
    }

    fn parse_import_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.advance();
        self.expect(
            |kind| matches!(kind, TokenKind::LParen),
            "expected '(' after import",
        )?;

        let token = self.advance();
        let module = match token.kind {
            TokenKind::Str(value) => value,
            _ => {
                return Err(ParseError::new(
                    "expected module name string in import",
                    token.span,
                ));
            }
        };

        self.expect(
            |kind| matches!(kind, TokenKind::RParen),
            "expected ')' after module name",
        )?;
        self.consume_semicolon();
        let span = keyword.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::Import { module }, span))
    }

    fn parse_assignment_or_expression_statement(&mut self) -> Result<Stmt, ParseError> {
        if let TokenKind::Ident(name) = &self.current().kind {
            if matches!(self.peek_kind(1), Some(TokenKind::Assign)) {
                let name = name.clone();
                let start = self.current().span;
                self.advance(); // identifier
                self.advance(); // '='
                let value = self.parse_expression(Precedence::Lowest)?;
                self.consume_semicolon();
                let span = start.join(self.previous_span());
                return Ok(Stmt::new(StmtKind::Assign { name, value }, span));
            }
        }

        let value = self.parse_expression(Precedence::Lowest)?;
        self.consume_semicolon();
        let span = value.span.join(self.previous_span());
        Ok(Stmt::new(StmtKind::Expr(value), span))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;

        while !self.at_end()
            && !self.check(|kind| matches!(kind, TokenKind::Semicolon))
            && precedence < self.current_precedence()
        {
            let operator = self.advance();
            left = self.parse_infix(left, operator.kind)?;
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) => Ok(Expr::new(ExprKind::Identifier(name), token.span)),
            TokenKind::Number(value) => Ok(Expr::new(ExprKind::Number(value), token.span)),
            TokenKind::Str(value) => Ok(Expr::new(ExprKind::Str(value), token.span)),
            TokenKind::True => Ok(Expr::new(ExprKind::Bool(true), token.span)),
            TokenKind::False => Ok(Expr::new(ExprKind::Bool(false), token.span)),
            TokenKind::Nil => Ok(Expr::new(ExprKind::Nil, token.span)),
            TokenKind::Bang => {
                let operand = self.parse_expression(Precedence::Prefix)?;
                let span = token.span.join(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Minus => {
                let operand = self.parse_expression(Precedence::Prefix)?;
                let span = token.span.join(operand.span);
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Negate,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::LParen => {
                let expr = self.parse_expression(Precedence::Lowest)?;
                self.expect(
                    |kind| matches!(kind, TokenKind::RParen),
                    "expected ')' after grouped expression",
                )?;
                Ok(Expr::new(expr.kind, token.span.join(self.previous_span())))
            }
            TokenKind::LBracket => self.parse_list_literal(token.span),
            TokenKind::LBrace => self.parse_map_literal(token.span),
            _ => Err(ParseError::new(
                format!(
                    "expected expression, found {}",
                    describe_token_kind(&token.kind)
                ),
                token.span,
            )),
        }
    }

    fn parse_infix(&mut self, lhs: Expr, operator: TokenKind) -> Result<Expr, ParseError> {
        match operator {
            TokenKind::LBracket => return self.parse_index_expression(lhs),
            TokenKind::LParen => return self.parse_call_expression(lhs),
            TokenKind::Question => return self.parse_ternary_expression(lhs),
            TokenKind::AndAnd => {
                let rhs = self.parse_expression(Precedence::LogicalAnd)?;
                let span = lhs.span.join(rhs.span);
                return Ok(Expr::new(
                    ExprKind::And {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                ));
            }
            TokenKind::OrOr => {
                let rhs = self.parse_expression(Precedence::LogicalOr)?;
                let span = lhs.span.join(rhs.span);
                return Ok(Expr::new(
                    ExprKind::Or {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    span,
                ));
            }
            _ => {}
        }

        let (op, precedence) = match operator {
            TokenKind::Plus => (BinaryOp::Add, Precedence::Sum),
            TokenKind::Minus => (BinaryOp::Subtract, Precedence::Sum),
            TokenKind::Star => (BinaryOp::Multiply, Precedence::Product),
            TokenKind::Slash => (BinaryOp::Divide, Precedence::Product),
            TokenKind::Percent => (BinaryOp::Modulo, Precedence::Product),
            TokenKind::Eq => (BinaryOp::Eq, Precedence::Equality),
            TokenKind::NotEq => (BinaryOp::NotEq, Precedence::Equality),
            TokenKind::Lt => (BinaryOp::Lt, Precedence::Comparison),
            TokenKind::Gt => (BinaryOp::Gt, Precedence::Comparison),
            TokenKind::LtEq => (BinaryOp::LtEq, Precedence::Comparison),
            TokenKind::GtEq => (BinaryOp::GtEq, Precedence::Comparison),
            _ => {
                return Err(ParseError::new(
                    "expected infix operator",
                    self.current().span,
                ));
            }
        };

        let rhs = self.parse_expression(precedence)?;
        let span = lhs.span.join(rhs.span);
        Ok(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn parse_ternary_expression(&mut self, condition: Expr) -> Result<Expr, ParseError> {
        let then_value = self.parse_expression(Precedence::Lowest)?;
        self.expect(
            |kind| matches!(kind, TokenKind::Colon),
            "expected ':' in ternary expression",
        )?;
        // Parsing the else branch at lowest precedence makes `?:` right
        // associative.
        let else_value = self.parse_expression(Precedence::Lowest)?;
        let span = condition.span.join(else_value.span);
        Ok(Expr::new(
            ExprKind::Ternary {
                condition: Box::new(condition),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            },
            span,
        ))
    }

    fn parse_call_expression(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let mut args = Vec::new();

        if self.check(|kind| matches!(kind, TokenKind::RParen)) {
            self.advance();
            let span = callee.span.join(self.previous_span());
            return Ok(Expr::new(
                ExprKind::Call {
                    callee: Box::new(callee),
                    args,
                },
                span,
            ));
        }

        loop {
            args.push(self.parse_expression(Precedence::Lowest)?);

            if self.check(|kind| matches!(kind, TokenKind::Comma)) {
                self.advance();
                continue;
            }

            self.expect(
                |kind| matches!(kind, TokenKind::RParen),
                "expected ')' after call arguments",
            )?;
            break;
        }

        let span = callee.span.join(self.previous_span());
        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            span,
        ))
    }

    fn parse_index_expression(&mut self, target: Expr) -> Result<Expr, ParseError> {
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect(
            |kind| matches!(kind, TokenKind::RBracket),
            "expected ']' after index expression",
        )?;

        let span = target.span.join(self.previous_span());
        Ok(Expr::new(
            ExprKind::Index {
                target: Box::new(target),
                index: Box::new(index),
            },
            span,
        ))
    }

    fn parse_list_literal(&mut self, open: Span) -> Result<Expr, ParseError> {
        let mut elements = Vec::new();

        if self.check(|kind| matches!(kind, TokenKind::RBracket)) {
            self.advance();
            return Ok(Expr::new(
                ExprKind::List(elements),
                open.join(self.previous_span()),
            ));
        }

        loop {
            elements.push(self.parse_expression(Precedence::Lowest)?);

            if self.check(|kind| matches!(kind, TokenKind::Comma)) {
                self.advance();
                continue;
            }

            self.expect(
                |kind| matches!(kind, TokenKind::RBracket),
                "expected ']' after list literal",
            )?;
            break;
        }

        Ok(Expr::new(
            ExprKind::List(elements),
            open.join(self.previous_span()),
        ))
    }

    fn parse_map_literal(&mut self, open: Span) -> Result<Expr, ParseError> {
        let mut pairs = Vec::new();

        if self.check(|kind| matches!(kind, TokenKind::RBrace)) {
            self.advance();
            return Ok(Expr::new(
                ExprKind::Map(pairs),
                open.join(self.previous_span()),
            ));
        }

        loop {
            // Keys stop below `?` so the pair separator stays unambiguous;
            // a ternary key needs parentheses.
            let key = self.parse_expression(Precedence::Ternary)?;
            self.expect(
                |kind| matches!(kind, TokenKind::Colon),
                "expected ':' after map key",
            )?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if self.check(|kind| matches!(kind, TokenKind::Comma)) {
                self.advance();
                continue;
            }

            self.expect(
                |kind| matches!(kind, TokenKind::RBrace),
                "expected '}' after map literal",
            )?;
            break;
        }

        Ok(Expr::new(
            ExprKind::Map(pairs),
            open.join(self.previous_span()),
        ))
    }

    fn parse_block(&mut self, missing_open_message: &'static str) -> Result<Block, ParseError> {
        self.expect(
            |kind| matches!(kind, TokenKind::LBrace),
            missing_open_message,
        )?;

        let mut statements = Vec::new();
        while !self.at_end() && !self.check(|kind| matches!(kind, TokenKind::RBrace)) {
            statements.push(self.parse_statement()?);
        }

        self.expect(
            |kind| matches!(kind, TokenKind::RBrace),
            "expected '}' to close block",
        )?;

        Ok(statements)
    }

    // A `{` at statement level is a block unless the tokens ahead read as
    // `key: value` pairs. The scan stops at the first token that could not
    // appear before a map key's ':'.
    fn looks_like_map_literal(&self) -> bool {
        if matches!(self.peek_kind(1), Some(TokenKind::RBrace)) {
            return true;
        }

        let mut offset = 1usize;
        loop {
            match self.peek_kind(offset) {
                Some(TokenKind::Colon) => return true,
                Some(
                    TokenKind::Semicolon
                    | TokenKind::Question
                    | TokenKind::LBrace
                    | TokenKind::RBrace
                    | TokenKind::Eof,
                )
                | None => return false,
                Some(_) => offset += 1,
            }
        }
    }

    fn expect_ident(&mut self, message: &'static str) -> Result<String, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(ParseError::new(message, token.span)),
        }
    }

    fn expect(
        &mut self,
        predicate: impl Fn(&TokenKind) -> bool,
        message: &'static str,
    ) -> Result<(), ParseError> {
        if predicate(&self.current().kind) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(message, self.current().span))
        }
    }

    fn consume_semicolon(&mut self) {
        if self.check(|kind| matches!(kind, TokenKind::Semicolon)) {
            self.advance();
        }
    }

    fn synchronize(&mut self) {
        while !self.at_end() {
            if self.cursor > 0 {
                let prev = &self.tokens[self.cursor - 1];
                if matches!(prev.kind, TokenKind::Semicolon) {
                    return;
                }
            }

            if matches!(
                self.current().kind,
                TokenKind::Var
                    | TokenKind::Fun
                    | TokenKind::If
                    | TokenKind::While
                    | TokenKind::Return
                    | TokenKind::Break
                    | TokenKind::Continue
                    | TokenKind::Defer
                    | TokenKind::Assert
                    | TokenKind::Import
            ) {
                return;
            }

            self.advance();
        }
    }

    fn check(&self, predicate: impl Fn(&TokenKind) -> bool) -> bool {
        predicate(&self.current().kind)
    }

    fn current_precedence(&self) -> Precedence {
        precedence_of(&self.current().kind)
    }

    fn at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.cursor]
    }

    fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.cursor + offset)
            .map(|token| token.kind.clone())
    }

    fn previous_span(&self) -> Span {
        if self.cursor == 0 {
            Span::default()
        } else {
            self.tokens[self.cursor - 1].span
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !self.at_end() {
            self.cursor += 1;
        }
        token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest = 0,
    Ternary = 1,
    LogicalOr = 2,
    LogicalAnd = 3,
    Equality = 4,
    Comparison = 5,
    Sum = 6,
    Product = 7,
    Prefix = 8,
    Postfix = 9,
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Question => Precedence::Ternary,
        TokenKind::OrOr => Precedence::LogicalOr,
        TokenKind::AndAnd => Precedence::LogicalAnd,
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equality,
        TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => Precedence::Comparison,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Precedence::Product,
        TokenKind::LBracket | TokenKind::LParen => Precedence::Postfix,
        _ => Precedence::Lowest,
    }
}

fn describe_token_kind(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("identifier '{name}'"),
        TokenKind::Number(value) => format!("number '{value}'"),
        TokenKind::Str(value) => format!("string \"{value}\""),
        TokenKind::Assign => "'='".to_string(),
        TokenKind::Semicolon => "';'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::Eof => "end of file".to_string(),
        other => format!("token {:?}", other),
    }
}
