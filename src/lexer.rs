use crate::error::{ScrawlError, Span};
use std::collections::HashMap;
use std::fmt;

const SCRIPT_START: &str = "{%";
const SCRIPT_END: &str = "%}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Integer,
    Decimal,

    // Keywords
    Let,
    Fn,
    Return,
    True,
    False,
    If,
    Else,
    Foreach,
    As,

    // Template
    Text,
    ScriptStart,
    ScriptEnd,

    // Special
    Eof,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TokenType::LeftParen => "'('",
            TokenType::RightParen => "')'",
            TokenType::LeftBrace => "'{'",
            TokenType::RightBrace => "'}'",
            TokenType::LeftBracket => "'['",
            TokenType::RightBracket => "']'",
            TokenType::Comma => "','",
            TokenType::Colon => "':'",
            TokenType::Dot => "'.'",
            TokenType::Minus => "'-'",
            TokenType::Plus => "'+'",
            TokenType::Semicolon => "';'",
            TokenType::Slash => "'/'",
            TokenType::Star => "'*'",
            TokenType::Bang => "'!'",
            TokenType::BangEqual => "'!='",
            TokenType::Equal => "'='",
            TokenType::EqualEqual => "'=='",
            TokenType::Greater => "'>'",
            TokenType::GreaterEqual => "'>='",
            TokenType::Less => "'<'",
            TokenType::LessEqual => "'<='",
            TokenType::Identifier => "identifier",
            TokenType::String => "string",
            TokenType::Integer => "integer",
            TokenType::Decimal => "decimal",
            TokenType::Let => "'let'",
            TokenType::Fn => "'fn'",
            TokenType::Return => "'return'",
            TokenType::True => "'true'",
            TokenType::False => "'false'",
            TokenType::If => "'if'",
            TokenType::Else => "'else'",
            TokenType::Foreach => "'foreach'",
            TokenType::As => "'as'",
            TokenType::Text => "template text",
            TokenType::ScriptStart => "'{%'",
            TokenType::ScriptEnd => "'%}'",
            TokenType::Eof => "end of input",
        };
        write!(f, "{}", name)
    }
}

/// A token with the exact source slice it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(token_type: TokenType, lexeme: String, span: Span) -> Self {
        Self {
            token_type,
            lexeme,
            span,
        }
    }

    pub fn offset(&self) -> usize {
        self.span.start
    }

    pub fn line(&self) -> usize {
        self.span.line
    }

    pub fn column(&self) -> usize {
        self.span.column
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The whole input is code.
    Script,
    /// Literal text with `{% ... %}` code islands.
    Template,
}

/// Pull-based lexer: every call to [`Lexer::read`] produces exactly one token.
pub struct Lexer {
    source: String,
    mode: Mode,
    in_script: bool,
    start: usize,
    start_line: usize,
    start_column: usize,
    current: usize,
    line: usize,
    column: usize,
    keywords: HashMap<&'static str, TokenType>,
}

impl Lexer {
    pub fn new(source: String, mode: Mode) -> Self {
        let mut keywords = HashMap::new();
        keywords.insert("let", TokenType::Let);
        keywords.insert("fn", TokenType::Fn);
        keywords.insert("return", TokenType::Return);
        keywords.insert("true", TokenType::True);
        keywords.insert("false", TokenType::False);
        keywords.insert("if", TokenType::If);
        keywords.insert("else", TokenType::Else);
        keywords.insert("foreach", TokenType::Foreach);
        keywords.insert("as", TokenType::As);

        Self {
            source,
            mode,
            in_script: mode == Mode::Script,
            start: 0,
            start_line: 1,
            start_column: 1,
            current: 0,
            line: 1,
            column: 1,
            keywords,
        }
    }

    pub fn script(source: impl Into<String>) -> Self {
        Self::new(source.into(), Mode::Script)
    }

    pub fn template(source: impl Into<String>) -> Self {
        Self::new(source.into(), Mode::Template)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Reads the next token. Once the input is exhausted every call returns `Eof`.
    pub fn read(&mut self) -> Result<Token, ScrawlError> {
        if !self.in_script {
            return Ok(self.text());
        }

        self.skip_whitespace();
        self.mark_start();

        if self.is_at_end() {
            return Ok(self.make_token(TokenType::Eof));
        }

        if self.mode == Mode::Template && self.rest().starts_with(SCRIPT_END) {
            self.advance();
            self.advance();
            self.in_script = false;
            return Ok(self.make_token(TokenType::ScriptEnd));
        }

        self.scan_token()
    }

    /// Drains the lexer, returning every token up to and including `Eof`.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, ScrawlError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.read()?;
            let done = token.token_type == TokenType::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn text(&mut self) -> Token {
        self.mark_start();

        if self.is_at_end() {
            return self.make_token(TokenType::Eof);
        }

        if self.rest().starts_with(SCRIPT_START) {
            self.advance();
            self.advance();
            self.in_script = true;
            return self.make_token(TokenType::ScriptStart);
        }

        while !self.is_at_end() && !self.rest().starts_with(SCRIPT_START) {
            self.advance();
        }

        self.make_token(TokenType::Text)
    }

    fn scan_token(&mut self) -> Result<Token, ScrawlError> {
        let c = self.advance();

        let token_type = match c {
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '{' => TokenType::LeftBrace,
            '}' => TokenType::RightBrace,
            '[' => TokenType::LeftBracket,
            ']' => TokenType::RightBracket,
            ',' => TokenType::Comma,
            ':' => TokenType::Colon,
            '.' => TokenType::Dot,
            '-' => TokenType::Minus,
            '+' => TokenType::Plus,
            ';' => TokenType::Semicolon,
            '*' => TokenType::Star,
            '/' => TokenType::Slash,
            '!' => {
                if self.match_char('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                }
            }
            '=' => {
                if self.match_char('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                }
            }
            '<' => {
                if self.match_char('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                }
            }
            '>' => {
                if self.match_char('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                }
            }
            '"' => return self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
            _ => {
                return Err(ScrawlError::lex_error(
                    Span::new(
                        self.start,
                        self.current,
                        self.start_line,
                        self.start_column,
                    ),
                    format!("unexpected character '{}'", c),
                ));
            }
        };

        Ok(self.make_token(token_type))
    }

    fn string(&mut self) -> Result<Token, ScrawlError> {
        loop {
            match self.peek() {
                None => {
                    return Err(ScrawlError::lex_error(
                        self.start_span(),
                        "unterminated string".to_string(),
                    ));
                }
                Some('\n') => {
                    return Err(ScrawlError::lex_error(
                        Span::single(self.current, self.line, self.column),
                        "unexpected newline in string".to_string(),
                    ));
                }
                Some('"') => {
                    self.advance();
                    return Ok(self.make_token(TokenType::String));
                }
                Some('\\') => {
                    self.advance();
                    // The escaped character is taken verbatim, except a raw newline.
                    if matches!(self.peek(), Some(c) if c != '\n') {
                        self.advance();
                    }
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    /// Digits and dots; a dot anywhere makes it a decimal. Malformed decimals
    /// such as `1.2.3` are left for the parser to reject.
    fn number(&mut self) -> TokenType {
        let mut token_type = TokenType::Integer;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' {
                token_type = TokenType::Decimal;
                self.advance();
            } else {
                break;
            }
        }

        token_type
    }

    fn identifier(&mut self) -> TokenType {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic() || c == '_') {
            self.advance();
        }

        let text = &self.source[self.start..self.current];
        self.keywords
            .get(text)
            .copied()
            .unwrap_or(TokenType::Identifier)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn rest(&self) -> &str {
        &self.source[self.current..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) -> char {
        let Some(c) = self.peek() else {
            return '\0';
        };

        self.current += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start = self.current;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn start_span(&self) -> Span {
        Span::new(self.start, self.current, self.start_line, self.start_column)
    }

    fn make_token(&self, token_type: TokenType) -> Token {
        Token::new(
            token_type,
            self.source[self.start..self.current].to_string(),
            self.start_span(),
        )
    }
}
