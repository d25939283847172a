//! Hand-written scanner for Oba source text.
//!
//! The lexer is infallible: bad input is reported through `Token::Error`
//! tokens so the compiler can record the problem and keep going.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

mod token;

#[cfg(test)]
mod tests;

pub use token::{LexError, Token, TokenData};

static KEYWORDS: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    FxHashMap::from_iter([
        ("let", Token::Let),
        ("fn", Token::Fn),
        ("debug", Token::Debug),
        ("if", Token::If),
        ("else", Token::Else),
        ("match", Token::Match),
        ("true", Token::True),
        ("false", Token::False),
    ])
});

fn is_name_start(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphabetic()
}

fn is_name_continue(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphanumeric()
}

pub struct Lexer<'s> {
    source: &'s str,
    token_start: usize,
    current: usize,
    line: u32,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        // Skip the UTF-8 BOM if there is one.
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);

        Self {
            source,
            token_start: 0,
            current: 0,
            line: 1,
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn peek_char(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn next_char(&mut self) -> u8 {
        let c = self.source.as_bytes()[self.current];
        // step over the whole character, not just the leading byte
        let ch = self.source[self.current..].chars().next().expect("char boundary");
        self.current += ch.len_utf8();
        if c == b'\n' {
            self.line += 1;
        }
        c
    }

    fn match_char(&mut self, expected: u8) -> bool {
        if self.peek_char() != Some(expected) {
            return false;
        }
        self.next_char();
        true
    }

    fn make_token(&self, token: Token<'s>) -> TokenData<'s> {
        let lexeme = &self.source[self.token_start..self.current];

        // newline tokens appear on the line containing the '\n'
        let line = match token {
            Token::Newline => self.line - 1,
            _ => self.line,
        };

        TokenData { token, lexeme, line }
    }

    /// Lexes the next token. Returns `Token::Eof` forever once the source
    /// is exhausted.
    pub fn next_token(&mut self) -> TokenData<'s> {
        while !self.is_at_end() {
            self.token_start = self.current;
            let c = self.next_char();

            let token = match c {
                b' ' | b'\r' | b'\t' => continue,
                b'\n' => Token::Newline,
                b'(' => Token::LParen,
                b')' => Token::RParen,
                b'{' => Token::LBrace,
                b'}' => Token::RBrace,
                b'|' => Token::Pipe,
                b';' => Token::Semicolon,
                b'+' => Token::Plus,
                b'-' => Token::Minus,
                b'*' => Token::Star,
                b'!' => {
                    if self.match_char(b'=') { Token::NotEq } else { Token::Not }
                }
                b'>' => {
                    if self.match_char(b'=') { Token::GtEq } else { Token::Gt }
                }
                b'<' => {
                    if self.match_char(b'=') { Token::LtEq } else { Token::Lt }
                }
                b'=' => {
                    if self.match_char(b'=') {
                        Token::Eq
                    } else if self.match_char(b'>') {
                        Token::EqArrow
                    } else {
                        Token::Assign
                    }
                }
                b'/' => {
                    if self.match_char(b'/') {
                        self.skip_line_comment();
                        continue;
                    }
                    Token::Slash
                }
                b'"' => self.read_string(),
                _ if is_name_start(c) => self.read_name(),
                _ if c.is_ascii_digit() => self.read_number(),
                _ => Token::Error(LexError::InvalidChar),
            };

            return self.make_token(token);
        }

        // No more source left.
        self.token_start = self.current;
        self.make_token(Token::Eof)
    }

    fn skip_line_comment(&mut self) {
        // A comment goes until the end of the line; the newline itself is
        // left for the next token.
        while !self.is_at_end() && self.peek_char() != Some(b'\n') {
            self.next_char();
        }
    }

    fn read_string(&mut self) -> Token<'s> {
        while !self.is_at_end() && self.peek_char() != Some(b'"') {
            self.next_char();
        }

        if self.is_at_end() {
            return Token::Error(LexError::UnterminatedString);
        }

        self.next_char(); // closing quote

        // exclude the surrounding quotes
        let content = &self.source[(self.token_start + 1)..(self.current - 1)];
        Token::StringLit(content)
    }

    fn read_name(&mut self) -> Token<'s> {
        while matches!(self.peek_char(), Some(c) if is_name_continue(c)) {
            self.next_char();
        }

        let name = &self.source[self.token_start..self.current];
        match KEYWORDS.get(name) {
            Some(keyword) => *keyword,
            None => Token::Ident(name),
        }
    }

    fn read_number(&mut self) -> Token<'s> {
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.next_char();
        }

        // fractional part, only if the dot is followed by a digit
        if self.peek_char() == Some(b'.') {
            let after_dot = self.source.as_bytes().get(self.current + 1).copied();
            if matches!(after_dot, Some(c) if c.is_ascii_digit()) {
                self.next_char();
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.next_char();
                }
            }
        }

        let lexeme = &self.source[self.token_start..self.current];
        let value = lexeme.parse::<f64>().expect("numeric literal");
        Token::Number(value)
    }
}
