use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn join(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Ident(String),
    Number(f64),
    Str(String),
    // A `//` line comment, kept as a token so the parser can surface
    // comment statements instead of losing them in the lexer.
    Comment,

    Var,
    Fun,
    If,
    Else,
    While,
    Return,
    Break,
    Continue,
    Defer,
    Assert,
    Import,
    True,
    False,
    Nil,

    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,

    Comma,
    Colon,
    Question,
    Semicolon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl LexError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lex error at {}..{}: {}",
            self.span.start, self.span.end, self.message
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct LexReport {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

impl LexReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let report = tokenize_with_report(input);
    if report.has_errors() {
        Err(report.errors)
    } else {
        Ok(report.tokens)
    }
}

pub fn tokenize_with_report(input: &str) -> LexReport {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    loop {
        match lexer.next_token() {
            Ok(token) => {
                let eof = matches!(token.kind, TokenKind::Eof);
                tokens.push(token);
                if eof {
                    break;
                }
            }
            Err(err) => errors.push(err),
        }
    }

    LexReport { tokens, errors }
}

struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.bump_char();
        }

        let Some(ch) = self.peek_char() else {
            let span = Span::new(self.position, self.position);
            return Ok(Token::new(TokenKind::Eof, span));
        };

        let start = self.position;
        self.bump_char();

        if ch == '"' {
            return self.read_string(start);
        }

        if is_ident_start(ch) {
            return Ok(self.read_identifier(start));
        }

        if ch.is_ascii_digit() {
            return self.read_number(start);
        }

        let token = match ch {
            '=' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    Token::new(TokenKind::Eq, Span::new(start, self.position))
                } else {
                    Token::new(TokenKind::Assign, Span::new(start, self.position))
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.bump_char();
                    Token::new(TokenKind::NotEq, Span::new(start, self.position))
                } else {
                    Token::new(TokenKind::Bang, Span::new(start, self.position))
                }
            }
            '&' => {
                if self.peek_char() == Some('&') {
                    self.bump_char();
                    Token::new(TokenKind::AndAnd, Span::new(start, self.position))
                } else {
                    return Err(LexError::new(
                        "unexpected character '&' (did you mean '&&'?)",
                        Span::new(start, self.position),
                    ));
                }
            }
            '|' => {
                if self.peek_char() == Some('|') {
                    self.bump_char();
                    Token::new(TokenKind::OrOr, Span::new(start, self.position))
                } else {
                    return Err(LexError::new(
                        "unexpected character '|' (did you mean '||'?)",
                        Span::new(start, self.position),
                    ));
                }
            }
            '/' => {
                if self.peek_char() == Some('/') {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump_char();
                    }
                    Token::new(TokenKind::Comment, Span::new(start, self.position))
                } else {
                    Token::new(TokenKind::Slash, Span::new(start, self.position))
                }
            }
            '+' => Token::new(TokenKind::Plus, Span::new(start, self.position)),
            '-' => Token::new(TokenKind::Minus, Span::new(start, self.position)),
            '*' => Token::new(TokenKind::Star, Span::new(start, self.position)),
            '%' => Token::new(TokenKind::Percent, Span::new(start, self.position)),
            '<' if self.peek_char() == Some('=') => {
                self.bump_char();
                Token::new(TokenKind::LtEq, Span::new(start, self.position))
            }
            '>' if self.peek_char() == Some('=') => {
                self.bump_char();
                Token::new(TokenKind::GtEq, Span::new(start, self.position))
            }
            '<' => Token::new(TokenKind::Lt, Span::new(start, self.position)),
            '>' => Token::new(TokenKind::Gt, Span::new(start, self.position)),
            ',' => Token::new(TokenKind::Comma, Span::new(start, self.position)),
            ':' => Token::new(TokenKind::Colon, Span::new(start, self.position)),
            '?' => Token::new(TokenKind::Question, Span::new(start, self.position)),
            ';' => Token::new(TokenKind::Semicolon, Span::new(start, self.position)),
            '(' => Token::new(TokenKind::LParen, Span::new(start, self.position)),
            ')' => Token::new(TokenKind::RParen, Span::new(start, self.position)),
            '{' => Token::new(TokenKind::LBrace, Span::new(start, self.position)),
            '}' => Token::new(TokenKind::RBrace, Span::new(start, self.position)),
            '[' => Token::new(TokenKind::LBracket, Span::new(start, self.position)),
            ']' => Token::new(TokenKind::RBracket, Span::new(start, self.position)),
            other => {
                return Err(LexError::new(
                    format!("unexpected character '{}'", other),
                    Span::new(start, self.position),
                ));
            }
        };

        Ok(token)
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        while self.peek_char().is_some_and(is_ident_continue) {
            self.bump_char();
        }

        let span = Span::new(start, self.position);
        let ident = &self.input[start..self.position];
        let kind = match ident {
            "var" => TokenKind::Var,
            "fun" => TokenKind::Fun,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "defer" => TokenKind::Defer,
            "assert" => TokenKind::Assert,
            "import" => TokenKind::Import,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            _ => TokenKind::Ident(ident.to_owned()),
        };

        Token::new(kind, span)
    }

    fn read_number(&mut self, start: usize) -> Result<Token, LexError> {
        let mut dot_seen = false;

        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.bump_char();
                continue;
            }
            if c == '.' && !dot_seen {
                dot_seen = true;
                self.bump_char();
                continue;
            }
            break;
        }

        let span = Span::new(start, self.position);
        let raw = &self.input[start..self.position];
        let number = raw
            .parse::<f64>()
            .map_err(|_| LexError::new(format!("invalid number literal '{raw}'"), span))?;

        Ok(Token::new(TokenKind::Number(number), span))
    }

    fn read_string(&mut self, start: usize) -> Result<Token, LexError> {
        let mut value = String::new();

        while let Some(c) = self.peek_char() {
            self.bump_char();

            if c == '"' {
                return Ok(Token::new(
                    TokenKind::Str(value),
                    Span::new(start, self.position),
                ));
            }

            if c == '\\' {
                let Some(esc) = self.peek_char() else {
                    return Err(LexError::new(
                        "unterminated escape sequence in string",
                        Span::new(start, self.position),
                    ));
                };
                self.bump_char();

                let escaped = match esc {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    '\\' => '\\',
                    '"' => '"',
                    other => other,
                };
                value.push(escaped);
                continue;
            }

            value.push(c);
        }

        Err(LexError::new(
            "unterminated string literal",
            Span::new(start, self.position),
        ))
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn bump_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += ch.len_utf8();
        Some(ch)
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}
