//! Tokenizer for the theme scripting language (spec §4.8). Emits tokens
//! carrying line/column positions and a `preceded_by_whitespace` flag, the
//! latter used by the parser to distinguish `a++` (one postfix operator)
//! from `a + +b` (two unary operators) the way the source's
//! `ply_scan_token_t::whitespace` field does.

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    Float(f64),
    Str(String),
    /// A single punctuation character. Multi-character operators (`==`,
    /// `&&`, `++`, ...) are recognized by the parser fusing two adjacent
    /// symbol tokens, mirroring `script-parse.c`'s operator table.
    Symbol(char),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
    pub preceded_by_whitespace: bool,
}

impl Token {
    pub fn is_symbol(&self, c: char) -> bool {
        matches!(self.kind, TokenKind::Symbol(s) if s == c)
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(s) if s == name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("lex error L:{line} C:{column}: {message}")]
pub struct LexError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole source up front, terminating with one `Eof`
    /// token. Scripts are short theme-animation files, so there is no
    /// benefit to lazy/streaming tokenization here.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
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

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) -> bool {
        let mut skipped = false;
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                    skipped = true;
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.advance();
                    }
                    skipped = true;
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    while !(self.peek().is_none() || (self.peek() == Some('*') && self.peek_at(1) == Some('/'))) {
                        self.advance();
                    }
                    self.advance();
                    self.advance();
                    skipped = true;
                }
                _ => break,
            }
        }
        skipped
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let preceded_by_whitespace = self.skip_whitespace_and_comments();
        let (line, column) = (self.line, self.column);

        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, line, column, preceded_by_whitespace });
        };

        if c.is_ascii_digit() {
            return self.lex_number(line, column, preceded_by_whitespace);
        }
        if c == '_' || c.is_alphabetic() {
            return Ok(self.lex_identifier(line, column, preceded_by_whitespace));
        }
        if c == '"' {
            return self.lex_string(line, column, preceded_by_whitespace);
        }

        self.advance();
        Ok(Token { kind: TokenKind::Symbol(c), line, column, preceded_by_whitespace })
    }

    fn lex_identifier(&mut self, line: u32, column: u32, preceded_by_whitespace: bool) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        Token { kind: TokenKind::Identifier(s), line, column, preceded_by_whitespace }
    }

    fn lex_number(&mut self, line: u32, column: u32, preceded_by_whitespace: bool) -> Result<Token, LexError> {
        let mut s = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.advance();
            } else if c == '.' && !is_float && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) {
                is_float = true;
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if is_float {
            let value: f64 = s
                .parse()
                .map_err(|_| LexError { line, column, message: format!("invalid float literal {s:?}") })?;
            Ok(Token { kind: TokenKind::Float(value), line, column, preceded_by_whitespace })
        } else {
            let value: i64 = s
                .parse()
                .map_err(|_| LexError { line, column, message: format!("invalid integer literal {s:?}") })?;
            Ok(Token { kind: TokenKind::Integer(value), line, column, preceded_by_whitespace })
        }
    }

    fn lex_string(&mut self, line: u32, column: u32, preceded_by_whitespace: bool) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(LexError { line, column, message: "unterminated string literal".into() }),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some(other) => s.push(other),
                    None => return Err(LexError { line, column, message: "unterminated escape sequence".into() }),
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token { kind: TokenKind::Str(s), line, column, preceded_by_whitespace })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_a_simple_assignment() {
        let k = kinds("x = 5;");
        assert_eq!(
            k,
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Symbol('='),
                TokenKind::Integer(5),
                TokenKind::Symbol(';'),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn distinguishes_adjacent_plusplus_from_spaced_plus_plus() {
        let tokens = Lexer::new("a++").unwrap_tokens();
        // second '+' immediately follows the first: not whitespace-separated
        assert!(!tokens[2].preceded_by_whitespace);

        let tokens = Lexer::new("a + +b").unwrap_tokens();
        // '+' before 'b' is whitespace-separated from the first '+'
        assert!(tokens[2].preceded_by_whitespace);
    }

    impl Lexer {
        fn unwrap_tokens(self) -> Vec<Token> {
            self.tokenize().unwrap()
        }
    }

    #[test]
    fn parses_floats_and_integers() {
        assert_eq!(kinds("3.14 42"), vec![TokenKind::Float(3.14), TokenKind::Integer(42), TokenKind::Eof]);
    }

    #[test]
    fn parses_escaped_string_literal() {
        assert_eq!(kinds(r#""hi\n""#), vec![TokenKind::Str("hi\n".into()), TokenKind::Eof]);
    }

    #[test]
    fn skips_line_and_block_comments() {
        assert_eq!(kinds("1 // comment\n2 /* block */ 3"), vec![
            TokenKind::Integer(1),
            TokenKind::Integer(2),
            TokenKind::Integer(3),
            TokenKind::Eof
        ]);
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
    }
}
