//! Lexer for the rule DSL.
//!
//! Converts source text into a token stream with 1-based line/column
//! tracking. `//` comments run to end of line. The relationship pattern
//! delimiters `-[` and `]->` are lexed as single tokens so the parser never
//! has to disambiguate them from subtraction or list brackets.

use super::token::{Span, Token, TokenKind};

/// Lexer over DSL source text.
pub struct Lexer<'src> {
    /// Remaining source text.
    rest: &'src str,
    /// Current byte offset in source.
    position: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    column: u32,
}

impl<'src> Lexer<'src> {
    /// Creates a new lexer for the given source.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            rest: source,
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Returns the next token from the source.
    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();

        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;

        let Some(c) = self.peek_char() else {
            return Token::new(
                TokenKind::Eof,
                Span::new(start, start, start_line, start_column),
            );
        };

        let kind = match c {
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ',' => self.single(TokenKind::Comma),
            ':' => self.single(TokenKind::Colon),
            ';' => self.single(TokenKind::Semicolon),
            '.' => self.single(TokenKind::Dot),
            '?' => self.single(TokenKind::Question),
            '+' => self.single(TokenKind::Plus),
            ']' => {
                self.advance();
                if self.rest.starts_with("->") {
                    self.advance();
                    self.advance();
                    TokenKind::RelClose
                } else {
                    TokenKind::RBracket
                }
            }
            '-' => {
                self.advance();
                if self.peek_char() == Some('[') {
                    self.advance();
                    TokenKind::RelOpen
                } else {
                    TokenKind::Minus
                }
            }
            '=' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    TokenKind::Error("unexpected character: !".to_string())
                }
            }
            '<' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(),
            c if c.is_ascii_alphabetic() || c == '_' => self.scan_word(),
            c => {
                self.advance();
                TokenKind::Error(format!("unexpected character: {c}"))
            }
        };

        Token::new(
            kind,
            Span::new(start, self.position, start_line, start_column),
        )
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn peek_char(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        let len = c.len_utf8();
        self.rest = &self.rest[len..];
        self.position += len;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Skips whitespace and `//` comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.rest.starts_with("//") => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    return TokenKind::Error("unterminated string literal".to_string());
                }
                Some('"') => return TokenKind::Str(text),
                Some('\\') => match self.advance() {
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c) => {
                        return TokenKind::Error(format!("unknown escape sequence: \\{c}"));
                    }
                    None => {
                        return TokenKind::Error("unterminated string literal".to_string());
                    }
                },
                Some(c) => text.push(c),
            }
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // A dot is part of the number only when a digit follows; otherwise it
        // is property access (`this.amount` after a number never occurs, but
        // `1.` should not swallow the dot either).
        let mut is_float = false;
        if self.peek_char() == Some('.') {
            let mut lookahead = self.rest.chars();
            lookahead.next();
            if lookahead.next().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push('.');
                self.advance();
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }

        if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => TokenKind::Error(format!("invalid number literal: {text}")),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => TokenKind::Error(format!("integer literal out of range: {text}")),
            }
        }
    }

    fn scan_word(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        TokenKind::from_word(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            out.push(token.kind);
            if is_eof {
                break;
            }
        }
        out
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("RULE Blocker PRIORITY 100"),
            vec![
                TokenKind::Rule,
                TokenKind::Ident("Blocker".into()),
                TokenKind::Priority,
                TokenKind::Int(100),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("== != <= >= < > = + -"),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Assign,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_relationship_pattern_tokens() {
        assert_eq!(
            kinds("po -[orderedFrom]-> s"),
            vec![
                TokenKind::Ident("po".into()),
                TokenKind::RelOpen,
                TokenKind::Ident("orderedFrom".into()),
                TokenKind::RelClose,
                TokenKind::Ident("s".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_list_brackets_stay_plain() {
        assert_eq!(
            kinds("[\"a\", 2]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Str("a".into()),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""o'; DROP TABLE --" "a\"b\n""#),
            vec![
                TokenKind::Str("o'; DROP TABLE --".into()),
                TokenKind::Str("a\"b\n".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.14 0"),
            vec![
                TokenKind::Int(42),
                TokenKind::Float(3.14),
                TokenKind::Int(0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("SET // everything after is ignored\n x"),
            vec![TokenKind::Set, TokenKind::Ident("x".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_line_and_column_tracking() {
        let mut lexer = Lexer::new("RULE R {\n  ON\n}");
        let mut last = lexer.next_token();
        loop {
            let token = lexer.next_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            last = token;
        }
        // The final `}` sits on line 3, column 1.
        assert_eq!(last.kind, TokenKind::RBrace);
        assert_eq!(last.span.line, 3);
        assert_eq!(last.span.column, 1);
    }

    #[test]
    fn test_unterminated_string_is_an_error_token() {
        let mut lexer = Lexer::new("\"oops");
        assert!(matches!(lexer.next_token().kind, TokenKind::Error(_)));
    }
}
