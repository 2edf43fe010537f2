//! Hand-written scanner producing a token stream for the parser.
//!
//! A `Peekable<Chars>` cursor tracks line/column by hand, with keywords
//! resolved through a static lookup rather than a generated table.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::span::Span;

use super::token::{Channel, Keyword, Operator, Token, TokenKind, PRIMITIVE_TYPE_NAMES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedString,
    MalformedNumber,
    UnknownCharacter(char),
    InvalidEscape(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: u32,
    pub column: u32,
    pub kind: LexErrorKind,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexErrorKind::UnterminatedString => {
                write!(f, "{}:{}: unterminated string literal", self.line, self.column)
            }
            LexErrorKind::MalformedNumber => {
                write!(f, "{}:{}: malformed numeric literal", self.line, self.column)
            }
            LexErrorKind::UnknownCharacter(c) => {
                write!(f, "{}:{}: unexpected character '{c}'", self.line, self.column)
            }
            LexErrorKind::InvalidEscape(c) => {
                write!(f, "{}:{}: invalid escape sequence '\\{c}'", self.line, self.column)
            }
        }
    }
}

impl std::error::Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            iter: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Scans the whole input, including hidden-channel tokens, finishing
    /// with a single `Eof` token.
    pub fn tokenize(mut self) -> LexResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&mut self) -> Option<char> {
        self.iter.peek().copied()
    }

    fn peek2(&mut self) -> Option<char> {
        let mut clone = self.iter.clone();
        clone.next();
        clone.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.iter.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn next_token(&mut self) -> LexResult<Token> {
        let start = self.span();

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                span: start,
                channel: Channel::Default,
            });
        };

        if c == '\n' {
            self.bump();
            return Ok(Token {
                kind: TokenKind::Newline,
                lexeme: "\n".to_owned(),
                span: start,
                channel: Channel::Hidden,
            });
        }
        if c.is_whitespace() {
            while matches!(self.peek(), Some(c) if c.is_whitespace() && c != '\n') {
                self.bump();
            }
            return self.next_token();
        }
        if c == '#' {
            let mut text = String::new();
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                text.push(c);
                self.bump();
            }
            return Ok(Token {
                kind: TokenKind::Comment(text.clone()),
                lexeme: text,
                span: start,
                channel: Channel::Hidden,
            });
        }
        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c == '"' {
            return self.lex_string(start);
        }
        if is_ident_start(c) {
            return self.lex_word(start);
        }

        self.lex_operator(start)
    }

    fn lex_word(&mut self, start: Span) -> LexResult<Token> {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            text.push(self.bump().unwrap());
        }
        let kind = if let Some(kw) = Keyword::from_word(&text) {
            TokenKind::Keyword(kw)
        } else if PRIMITIVE_TYPE_NAMES.contains(&text.as_str()) {
            TokenKind::TypeName(text.clone())
        } else {
            TokenKind::Ident(text.clone())
        };
        Ok(Token {
            kind,
            lexeme: text,
            span: start,
            channel: Channel::Default,
        })
    }

    fn lex_number(&mut self, start: Span) -> LexResult<Token> {
        let mut text = String::new();
        if self.peek() == Some('0') && matches!(self.peek2(), Some('x') | Some('X')) {
            text.push(self.bump().unwrap());
            text.push(self.bump().unwrap());
            let mut digits = String::new();
            while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                digits.push(self.bump().unwrap());
            }
            if digits.is_empty() {
                return Err(LexError {
                    line: start.line,
                    column: start.column,
                    kind: LexErrorKind::MalformedNumber,
                });
            }
            let value = i64::from_str_radix(&digits, 16).map_err(|_| LexError {
                line: start.line,
                column: start.column,
                kind: LexErrorKind::MalformedNumber,
            })?;
            text.push_str(&digits);
            return Ok(Token {
                kind: TokenKind::Int(value),
                lexeme: text,
                span: start,
                channel: Channel::Default,
            });
        }

        let mut is_double = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        if self.peek() == Some('.') && matches!(self.peek2(), Some(c) if c.is_ascii_digit()) {
            is_double = true;
            text.push(self.bump().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            is_double = true;
            text.push(self.bump().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                text.push(self.bump().unwrap());
            }
            let mut any = false;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
                any = true;
            }
            if !any {
                return Err(LexError {
                    line: start.line,
                    column: start.column,
                    kind: LexErrorKind::MalformedNumber,
                });
            }
        }

        if is_double {
            let value: f64 = text.parse().map_err(|_| LexError {
                line: start.line,
                column: start.column,
                kind: LexErrorKind::MalformedNumber,
            })?;
            Ok(Token {
                kind: TokenKind::Double(value),
                lexeme: text,
                span: start,
                channel: Channel::Default,
            })
        } else {
            let value: i64 = text.parse().map_err(|_| LexError {
                line: start.line,
                column: start.column,
                kind: LexErrorKind::MalformedNumber,
            })?;
            Ok(Token {
                kind: TokenKind::Int(value),
                lexeme: text,
                span: start,
                channel: Channel::Default,
            })
        }
    }

    fn lex_string(&mut self, start: Span) -> LexResult<Token> {
        self.bump(); // opening quote
        let mut value = String::new();
        let mut lexeme = String::from("\"");
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(LexError {
                        line: start.line,
                        column: start.column,
                        kind: LexErrorKind::UnterminatedString,
                    });
                }
                Some('"') => {
                    lexeme.push('"');
                    break;
                }
                Some('\\') => {
                    lexeme.push('\\');
                    let escaped = self.bump().ok_or(LexError {
                        line: start.line,
                        column: start.column,
                        kind: LexErrorKind::UnterminatedString,
                    })?;
                    lexeme.push(escaped);
                    value.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '"' => '"',
                        '\\' => '\\',
                        other => {
                            return Err(LexError {
                                line: start.line,
                                column: start.column,
                                kind: LexErrorKind::InvalidEscape(other),
                            })
                        }
                    });
                }
                Some(c) => {
                    lexeme.push(c);
                    value.push(c);
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Str(value),
            lexeme,
            span: start,
            channel: Channel::Default,
        })
    }

    fn lex_operator(&mut self, start: Span) -> LexResult<Token> {
        // Maximal munch over the full C-family operator set plus `?? ? : @ $`.
        let three: [(&str, Operator); 2] =
            [("===", Operator::EqEqEq), ("!==", Operator::NotEqEq)];

        let rest3: String = {
            let mut clone = self.iter.clone();
            let a = clone.next();
            let b = clone.next();
            let c = clone.next();
            [a, b, c].into_iter().flatten().collect()
        };
        for (lit, op) in three {
            if rest3.starts_with(lit) {
                for _ in 0..3 {
                    self.bump();
                }
                return Ok(self.mk_op(op, lit, start));
            }
        }
        let rest2: String = {
            let mut clone = self.iter.clone();
            let a = clone.next();
            let b = clone.next();
            [a, b].into_iter().flatten().collect()
        };
        let two_char: [(&str, Operator); 20] = [
            ("==", Operator::EqEq),
            ("!=", Operator::NotEq),
            ("<=", Operator::LtEq),
            (">=", Operator::GtEq),
            ("<<", Operator::Shl),
            (">>", Operator::Shr),
            ("++", Operator::PlusPlus),
            ("--", Operator::MinusMinus),
            ("&&", Operator::AmpAmp),
            ("||", Operator::PipePipe),
            ("??", Operator::QuestionQuestion),
            ("?:", Operator::QuestionColon),
            ("+=", Operator::PlusEq),
            ("-=", Operator::MinusEq),
            ("*=", Operator::StarEq),
            ("/=", Operator::SlashEq),
            ("%=", Operator::PercentEq),
            ("&=", Operator::AmpEq),
            ("|=", Operator::PipeEq),
            ("^=", Operator::CaretEq),
        ];
        for (lit, op) in two_char {
            if rest2.starts_with(lit) {
                for _ in 0..2 {
                    self.bump();
                }
                return Ok(self.mk_op(op, lit, start));
            }
        }

        let c = self.bump().unwrap();
        let op = match c {
            '+' => Operator::Plus,
            '-' => Operator::Minus,
            '*' => Operator::Star,
            '/' => Operator::Slash,
            '%' => Operator::Percent,
            '&' => Operator::Amp,
            '|' => Operator::Pipe,
            '^' => Operator::Caret,
            '~' => Operator::Tilde,
            '!' => Operator::Bang,
            '<' => Operator::Lt,
            '>' => Operator::Gt,
            '=' => Operator::Eq,
            '?' => Operator::Question,
            ':' => Operator::Colon,
            '@' => Operator::At,
            '$' => Operator::Dollar,
            '.' => Operator::Dot,
            ',' => Operator::Comma,
            ';' => Operator::Semicolon,
            '(' => Operator::LParen,
            ')' => Operator::RParen,
            '{' => Operator::LBrace,
            '}' => Operator::RBrace,
            '[' => Operator::LBracket,
            ']' => Operator::RBracket,
            other => {
                return Err(LexError {
                    line: start.line,
                    column: start.column,
                    kind: LexErrorKind::UnknownCharacter(other),
                })
            }
        };
        Ok(self.mk_op(op, "", start))
    }

    fn mk_op(&self, op: Operator, lit: &str, start: Span) -> Token {
        Token {
            kind: TokenKind::Op(op),
            lexeme: lit.to_owned(),
            span: start,
            channel: Channel::Default,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Convenience entry point used by the parser and by tests.
pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
    Lexer::new(source).tokenize()
}
