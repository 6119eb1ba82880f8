use crate::ast::{
    AssignTarget, Block, Expr, FunctionLiteral, InfixOp, PathSegment, PrefixOp, Program, Stmt,
};
use crate::error::{ParseErrors, ScrawlError, Span};
use crate::lexer::{Lexer, Token, TokenType};
use std::mem;
use std::sync::Arc;

/// Binding power of the token that follows an expression, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equality,
    Sum,
    Product,
    Prefix,
    Postfix,
}

fn precedence_of(token_type: TokenType) -> Precedence {
    match token_type {
        TokenType::EqualEqual
        | TokenType::BangEqual
        | TokenType::Less
        | TokenType::LessEqual
        | TokenType::Greater
        | TokenType::GreaterEqual => Precedence::Equality,
        TokenType::Plus | TokenType::Minus => Precedence::Sum,
        TokenType::Star | TokenType::Slash => Precedence::Product,
        TokenType::Dot | TokenType::LeftParen | TokenType::LeftBracket => Precedence::Postfix,
        _ => Precedence::Lowest,
    }
}

fn describe(token: &Token) -> String {
    match token.token_type {
        TokenType::Identifier | TokenType::Integer | TokenType::Decimal | TokenType::String => {
            format!("'{}'", token.lexeme)
        }
        other => other.to_string(),
    }
}

/// Recursive descent for statements, precedence climbing for expressions.
/// Pulls tokens from the lexer one at a time.
pub struct Parser {
    lexer: Lexer,
    previous: Token,
    current: Token,
    exhausted: bool,
    errors: Vec<ScrawlError>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        let eof = Token::new(TokenType::Eof, String::new(), Span::new(0, 0, 1, 1));
        let mut parser = Self {
            lexer,
            previous: eof.clone(),
            current: eof,
            exhausted: false,
            errors: Vec::new(),
        };
        parser.current = parser.pull();
        parser
    }

    /// Parses the whole input. Diagnostics are collected across the parse and
    /// returned together if there were any.
    pub fn parse(mut self) -> Result<Program, ParseErrors> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }

        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            tracing::debug!(count = self.errors.len(), "parse finished with diagnostics");
            Err(ParseErrors::new(self.errors))
        }
    }

    /// One statement; on failure the diagnostic is recorded and the parser
    /// skips ahead to a point where parsing can resume.
    fn declaration(&mut self) -> Option<Stmt> {
        let start = self.current.span.start;
        match self.statement() {
            Ok(statement) => statement,
            Err(error) => {
                self.errors.push(error);
                self.synchronize(start);
                None
            }
        }
    }

    fn statement(&mut self) -> Result<Option<Stmt>, ScrawlError> {
        match self.current.token_type {
            TokenType::ScriptStart | TokenType::ScriptEnd => {
                self.advance();
                Ok(None)
            }
            TokenType::Text => Ok(Some(self.text_statement())),
            TokenType::Let => self.let_statement().map(Some),
            TokenType::Return => self.return_statement().map(Some),
            TokenType::Foreach => self.foreach_statement().map(Some),
            _ => self.expression_statement().map(Some),
        }
    }

    fn text_statement(&mut self) -> Stmt {
        let token = self.advance().clone();
        let mut text = token.lexeme;

        // Drop a whitespace-only last line that leads into a code island, so
        // lines holding nothing but `{% ... %}` do not leave blank lines behind.
        if self.check(&TokenType::ScriptStart) {
            if let Some(newline) = text.rfind('\n') {
                if text[newline..].trim().is_empty() {
                    text.truncate(newline);
                }
            }
        }

        Stmt::Text {
            text,
            span: token.span,
        }
    }

    fn let_statement(&mut self) -> Result<Stmt, ScrawlError> {
        let start = self.advance().span;

        let name = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected variable name after 'let'",
                "Variables are declared as: let name = value;".to_string(),
            )?
            .lexeme;
        self.consume_with_help(
            TokenType::Equal,
            "Expected '=' after variable name",
            "Variables are declared as: let name = value;".to_string(),
        )?;
        let value = self.expression(Precedence::Lowest)?;
        self.end_statement()?;

        Ok(Stmt::Let {
            name,
            value,
            span: start.to(&self.previous.span),
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, ScrawlError> {
        let start = self.advance().span;
        let value = self.expression(Precedence::Lowest)?;
        self.end_statement()?;

        Ok(Stmt::Return {
            value,
            span: start.to(&self.previous.span),
        })
    }

    fn foreach_statement(&mut self) -> Result<Stmt, ScrawlError> {
        let start = self.advance().span;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'foreach'",
            "Loops are written as: foreach (items as item) { ... }".to_string(),
        )?;
        let iterable = self.expression(Precedence::Lowest)?;
        self.consume_with_help(
            TokenType::As,
            "Expected 'as' after foreach iterable",
            "Loops are written as: foreach (items as item) { ... }".to_string(),
        )?;
        let variable = self
            .consume(TokenType::Identifier, "Expected loop variable name after 'as'")?
            .lexeme;
        self.consume(TokenType::RightParen, "Expected ')' after loop variable")?;
        let body = self.block()?;
        let span = start.to(&body.span);

        if self.check(&TokenType::Semicolon) {
            self.advance();
        }

        Ok(Stmt::Expression {
            expr: Expr::Foreach {
                iterable: Box::new(iterable),
                variable,
                body,
                span,
            },
            span,
        })
    }

    fn expression_statement(&mut self) -> Result<Stmt, ScrawlError> {
        let start = self.current.span;
        let mut expr = self.expression(Precedence::Lowest)?;

        if self.check(&TokenType::Equal) {
            let equals = self.advance().clone();
            let target = match expr {
                Expr::Identifier { name, span } => AssignTarget::Identifier { name, span },
                Expr::Index {
                    object,
                    index,
                    span,
                } => AssignTarget::Index {
                    object,
                    index,
                    span,
                },
                Expr::Property { object, path, span } => {
                    AssignTarget::Property { object, path, span }
                }
                _ => {
                    return Err(ScrawlError::parse_error_with_help(
                        equals.span,
                        "Invalid assignment target".to_string(),
                        "Only variables, index expressions and property paths can be assigned to. Examples: 'x = 1', 'x[0] = 1', 'x.y = 1'".to_string(),
                    ));
                }
            };

            let value = self.expression(Precedence::Lowest)?;
            expr = Expr::Assign {
                span: start.to(value.span()),
                target,
                value: Box::new(value),
            };
        }

        if matches!(expr, Expr::If { .. } | Expr::Function(_)) {
            if self.check(&TokenType::Semicolon) {
                self.advance();
            }
        } else {
            self.end_statement()?;
        }

        Ok(Stmt::Expression {
            expr,
            span: start.to(&self.previous.span),
        })
    }

    /// A statement ends at `;`, at the end of a code island, at the end of
    /// the enclosing block, or at the end of input.
    fn end_statement(&mut self) -> Result<(), ScrawlError> {
        match self.current.token_type {
            TokenType::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenType::ScriptEnd | TokenType::RightBrace | TokenType::Eof => Ok(()),
            _ => Err(ScrawlError::parse_error_with_help(
                self.current.span,
                format!("Expected ';' or '%}}', found {}", describe(&self.current)),
                "Separate statements with ';' or close the code island with '%}'.".to_string(),
            )),
        }
    }

    fn expression(&mut self, precedence: Precedence) -> Result<Expr, ScrawlError> {
        let mut left = self.prefix()?;

        while precedence < precedence_of(self.current.token_type) {
            left = match self.current.token_type {
                TokenType::Dot => self.property(left)?,
                TokenType::LeftBracket => self.index(left)?,
                TokenType::LeftParen => self.call(left)?,
                _ => self.infix(left)?,
            };
        }

        Ok(left)
    }

    fn prefix(&mut self) -> Result<Expr, ScrawlError> {
        let token = self.current.clone();

        match token.token_type {
            TokenType::Identifier => {
                self.advance();
                Ok(Expr::Identifier {
                    name: token.lexeme,
                    span: token.span,
                })
            }
            TokenType::Integer => {
                self.advance();
                let value = token.lexeme.parse::<i64>().map_err(|_| {
                    ScrawlError::parse_error(
                        token.span,
                        format!("Invalid integer literal '{}'", token.lexeme),
                    )
                })?;
                Ok(Expr::Integer {
                    value,
                    span: token.span,
                })
            }
            TokenType::Decimal => {
                self.advance();
                let value = token.lexeme.parse::<f64>().map_err(|_| {
                    ScrawlError::parse_error_with_help(
                        token.span,
                        format!("Invalid decimal literal '{}'", token.lexeme),
                        "Decimals have exactly one '.', for example 3.14".to_string(),
                    )
                })?;
                Ok(Expr::Decimal {
                    value,
                    span: token.span,
                })
            }
            TokenType::String => {
                self.advance();
                Ok(Expr::String {
                    value: unescape(&token.lexeme),
                    span: token.span,
                })
            }
            TokenType::True | TokenType::False => {
                self.advance();
                Ok(Expr::Boolean {
                    value: token.token_type == TokenType::True,
                    span: token.span,
                })
            }
            TokenType::Bang | TokenType::Minus => {
                self.advance();
                let operator = if token.token_type == TokenType::Bang {
                    PrefixOp::Not
                } else {
                    PrefixOp::Negate
                };
                let operand = self.expression(Precedence::Prefix)?;
                Ok(Expr::Prefix {
                    span: token.span.to(operand.span()),
                    operator,
                    operand: Box::new(operand),
                })
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression(Precedence::Lowest)?;
                self.consume_with_help(
                    TokenType::RightParen,
                    "Expected ')' after expression",
                    "Every opening parenthesis '(' must have a matching closing parenthesis ')'."
                        .to_string(),
                )?;
                Ok(expr)
            }
            TokenType::If => self.if_expression(),
            TokenType::Fn => self.function_literal(),
            TokenType::LeftBracket => self.array_literal(),
            TokenType::LeftBrace => self.hash_literal(),
            TokenType::Eof => Err(ScrawlError::parse_error_with_help(
                self.eof_span(),
                "Unexpected end of input".to_string(),
                "Expected an expression here. Check for unmatched parentheses, brackets, or incomplete statements.".to_string(),
            )),
            _ => {
                let help_msg = match token.token_type {
                    TokenType::RightParen => {
                        "Found ')' without matching '('. Check for unbalanced parentheses."
                    }
                    TokenType::RightBrace => {
                        "Found '}' without matching '{'. Check for unbalanced braces."
                    }
                    TokenType::RightBracket => {
                        "Found ']' without matching '['. Check for unbalanced brackets."
                    }
                    TokenType::Foreach => "'foreach' can only start a statement.",
                    _ => "Expected a literal value, variable, or parenthesized expression here.",
                };

                Err(ScrawlError::parse_error_with_help(
                    token.span,
                    format!("Expected expression, found {}", describe(&token)),
                    help_msg.to_string(),
                ))
            }
        }
    }

    fn infix(&mut self, left: Expr) -> Result<Expr, ScrawlError> {
        let operator_token = self.advance().clone();
        let operator = match operator_token.token_type {
            TokenType::Plus => InfixOp::Add,
            TokenType::Minus => InfixOp::Subtract,
            TokenType::Star => InfixOp::Multiply,
            TokenType::Slash => InfixOp::Divide,
            TokenType::EqualEqual => InfixOp::Equal,
            TokenType::BangEqual => InfixOp::NotEqual,
            TokenType::Less => InfixOp::Less,
            TokenType::LessEqual => InfixOp::LessEqual,
            TokenType::Greater => InfixOp::Greater,
            TokenType::GreaterEqual => InfixOp::GreaterEqual,
            _ => {
                return Err(ScrawlError::parse_error(
                    operator_token.span,
                    format!("Unexpected operator {}", describe(&operator_token)),
                ));
            }
        };

        let right = self
            .expression(precedence_of(operator_token.token_type))
            .map_err(|_| {
                ScrawlError::parse_error_with_help(
                    operator_token.span,
                    format!("Expected expression after '{}'", operator_token.lexeme),
                    "Binary operators require expressions on both sides.".to_string(),
                )
            })?;

        Ok(Expr::Infix {
            span: left.span().to(right.span()),
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    fn property(&mut self, left: Expr) -> Result<Expr, ScrawlError> {
        self.advance();
        let name = self.consume(TokenType::Identifier, "Expected property name after '.'")?;

        let segment = PathSegment::Field {
            name: name.lexeme,
            span: name.span,
        };
        Ok(extend_path(left, segment, &name.span))
    }

    fn index(&mut self, left: Expr) -> Result<Expr, ScrawlError> {
        let open = self.advance().span;
        let index = self.expression(Precedence::Lowest)?;
        let close = self
            .consume_with_help(
                TokenType::RightBracket,
                "Expected ']' after index",
                "Index expressions are written as: items[0]".to_string(),
            )?
            .span;

        // Indexing into a property path continues the path.
        if matches!(left, Expr::Property { .. }) {
            let segment = PathSegment::Index {
                index,
                span: open.to(&close),
            };
            return Ok(extend_path(left, segment, &close));
        }

        Ok(Expr::Index {
            span: left.span().to(&close),
            object: Box::new(left),
            index: Box::new(index),
        })
    }

    fn call(&mut self, callee: Expr) -> Result<Expr, ScrawlError> {
        self.advance();
        let (args, close) = self.expression_list(
            TokenType::RightParen,
            "Expected ')' after arguments",
            "Function calls must be closed with ')' after the arguments. Example: func(arg1, arg2)",
        )?;

        Ok(Expr::Call {
            span: callee.span().to(&close),
            callee: Box::new(callee),
            args,
        })
    }

    fn if_expression(&mut self) -> Result<Expr, ScrawlError> {
        let start = self.advance().span;

        self.consume_with_help(
            TokenType::LeftParen,
            "Expected '(' after 'if'",
            "If expressions require parentheses around the condition: if (condition) { ... }"
                .to_string(),
        )?;
        let condition = self.expression(Precedence::Lowest)?;
        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after if condition",
            "If conditions must be enclosed in parentheses: if (condition) { ... }".to_string(),
        )?;

        let consequence = self.block()?;
        let alternative = if self.match_types(&[TokenType::Else]) {
            Some(self.block()?)
        } else {
            None
        };

        let end = alternative
            .as_ref()
            .map(|block| block.span)
            .unwrap_or(consequence.span);

        Ok(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
            span: start.to(&end),
        })
    }

    fn function_literal(&mut self) -> Result<Expr, ScrawlError> {
        let start = self.advance().span;

        let name = match self.current.token_type {
            TokenType::Identifier => Some(self.advance().lexeme.clone()),
            TokenType::LeftParen => None,
            _ => {
                return Err(ScrawlError::parse_error_with_help(
                    self.current.span,
                    format!(
                        "Expected function name or '(' after 'fn', found {}",
                        describe(&self.current)
                    ),
                    "Functions are written as: fn name(a, b) { ... } or fn(a, b) { ... }"
                        .to_string(),
                ));
            }
        };

        self.consume(TokenType::LeftParen, "Expected '(' before parameters")?;

        let mut parameters: Vec<String> = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                let parameter = self.consume(TokenType::Identifier, "Expected parameter name")?;
                if parameters.contains(&parameter.lexeme) {
                    return Err(ScrawlError::parse_error(
                        parameter.span,
                        format!("Duplicate parameter '{}'", parameter.lexeme),
                    ));
                }
                parameters.push(parameter.lexeme);

                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after parameters",
            "Parameters are identifiers separated by commas: fn add(a, b) { ... }".to_string(),
        )?;
        let body = self.block()?;

        Ok(Expr::Function(Arc::new(FunctionLiteral {
            name,
            parameters,
            span: start.to(&body.span),
            body,
        })))
    }

    fn array_literal(&mut self) -> Result<Expr, ScrawlError> {
        let start = self.advance().span;
        let (elements, close) = self.expression_list(
            TokenType::RightBracket,
            "Expected ']' after array elements",
            "Array literals must be closed with ']' after the opening '['. Example: [1, 2, 3]",
        )?;

        Ok(Expr::Array {
            elements,
            span: start.to(&close),
        })
    }

    fn hash_literal(&mut self) -> Result<Expr, ScrawlError> {
        let start = self.advance().span;
        let mut pairs = Vec::new();

        if !self.check(&TokenType::RightBrace) {
            loop {
                if !self.check(&TokenType::String) {
                    return Err(ScrawlError::parse_error_with_help(
                        self.current.span,
                        format!("Hash keys must be string literals, found {}", describe(&self.current)),
                        "Hash literals are written as: { \"key\": value }".to_string(),
                    ));
                }
                let key = unescape(&self.advance().lexeme);

                self.consume_with_help(
                    TokenType::Colon,
                    "Expected ':' after hash key",
                    "Hash entries require a colon ':' between key and value. Example: {\"key\": \"value\"}".to_string(),
                )?;
                let value = self.expression(Precedence::Lowest)?;
                pairs.push((key, value));

                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let close = self
            .consume_with_help(
                TokenType::RightBrace,
                "Expected '}' after hash pairs",
                "Hash literals must be closed with '}' after the opening '{'. Example: {\"key\": \"value\"}".to_string(),
            )?
            .span;

        Ok(Expr::Hash {
            pairs,
            span: start.to(&close),
        })
    }

    fn block(&mut self) -> Result<Block, ScrawlError> {
        let open = self
            .consume_with_help(
                TokenType::LeftBrace,
                "Expected '{' before block",
                "Bodies of if, foreach and fn are wrapped in braces: { ... }".to_string(),
            )?
            .span;

        let mut statements = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }

        let close = self
            .consume_with_help(
                TokenType::RightBrace,
                "Expected '}' after block",
                "Blocks must be closed with '}' after the opening '{'.".to_string(),
            )?
            .span;

        Ok(Block {
            statements,
            span: open.to(&close),
        })
    }

    /// Comma-separated expressions up to `end`, which is consumed. The opening
    /// delimiter has already been consumed.
    fn expression_list(
        &mut self,
        end: TokenType,
        message: &str,
        help: &str,
    ) -> Result<(Vec<Expr>, Span), ScrawlError> {
        let mut list = Vec::new();

        if !self.check(&end) {
            loop {
                list.push(self.expression(Precedence::Lowest)?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let close = self.consume_with_help(end, message, help.to_string())?;
        Ok((list, close.span))
    }

    /// Skips the rest of a failed statement: up to and including the next `;`
    /// or `%}` at the same brace depth, or up to the `}` closing the
    /// enclosing block. Always moves past a token that nothing consumed.
    fn synchronize(&mut self, start: usize) {
        let mut depth = 0usize;

        loop {
            match self.current.token_type {
                TokenType::Eof => return,
                TokenType::Semicolon | TokenType::ScriptEnd if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenType::LeftBrace => depth += 1,
                TokenType::RightBrace => {
                    if depth == 0 {
                        if self.current.span.start == start {
                            self.advance();
                        }
                        return;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
    }

    fn pull(&mut self) -> Token {
        if self.exhausted {
            return self.current.clone();
        }

        match self.lexer.read() {
            Ok(token) => {
                if token.token_type == TokenType::Eof {
                    self.exhausted = true;
                }
                token
            }
            Err(error) => {
                // The token stream ends at the first lex error.
                let span = Span::new(
                    error.span.start,
                    error.span.start,
                    error.span.line,
                    error.span.column,
                );
                self.errors.push(error);
                self.exhausted = true;
                Token::new(TokenType::Eof, String::new(), span)
            }
        }
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        &self.current.token_type == token_type
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            let next = self.pull();
            self.previous = mem::replace(&mut self.current, next);
        }
        &self.previous
    }

    fn is_at_end(&self) -> bool {
        self.current.token_type == TokenType::Eof
    }

    fn eof_span(&self) -> Span {
        if self.previous.token_type == TokenType::Eof {
            return self.current.span;
        }
        let last = &self.previous.span;
        Span::single(last.end, last.line, last.column + self.previous.lexeme.chars().count())
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, ScrawlError> {
        if self.check(&token_type) {
            Ok(self.advance().clone())
        } else {
            Err(ScrawlError::parse_error(
                self.error_span(),
                format!("{}, found {}", message, describe(&self.current)),
            ))
        }
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: String,
    ) -> Result<Token, ScrawlError> {
        if self.check(&token_type) {
            Ok(self.advance().clone())
        } else {
            Err(ScrawlError::parse_error_with_help(
                self.error_span(),
                format!("{}, found {}", message, describe(&self.current)),
                help,
            ))
        }
    }

    /// At end of input, point just past the last real token.
    fn error_span(&self) -> Span {
        if self.is_at_end() {
            self.eof_span()
        } else {
            self.current.span
        }
    }
}

fn extend_path(left: Expr, segment: PathSegment, end: &Span) -> Expr {
    match left {
        Expr::Property {
            object,
            mut path,
            span,
        } => {
            path.push(segment);
            Expr::Property {
                object,
                path,
                span: span.to(end),
            }
        }
        other => Expr::Property {
            span: other.span().to(end),
            object: Box::new(other),
            path: vec![segment],
        },
    }
}

/// Strips the quotes from a string token and decodes its escapes.
fn unescape(lexeme: &str) -> String {
    let inner = lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(lexeme);

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some('t') => value.push('\t'),
            Some('"') => value.push('"'),
            Some('\\') => value.push('\\'),
            Some(other) => {
                value.push('\\');
                value.push(other);
            }
            None => value.push('\\'),
        }
    }
    value
}
