//! Query tokenizer.

use crate::xpath::error::XPathError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Literal(String),
    /// NCName or prefixed name such as `svg:rect`.
    Name(String),
    Star,
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    ColonColon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Pipe,
    Plus,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpannedToken {
    pub token: Token,
    pub offset: usize,
}

/// Tokenize the whole expression up front; the parser wants two tokens of
/// lookahead for names.
pub(crate) fn lex(input: &str) -> Result<Vec<SpannedToken>, XPathError> {
    let mut lexer = Lexer {
        input: input.as_bytes(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token()?;
        let done = tok.token == Token::Eof;
        tokens.push(tok);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<SpannedToken, XPathError> {
        while self
            .input
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
        let offset = self.pos;
        let spanned = |token| SpannedToken { token, offset };

        let Some(&b) = self.input.get(self.pos) else {
            return Ok(spanned(Token::Eof));
        };
        match b {
            b'/' => {
                if self.peek(1) == Some(b'/') {
                    self.pos += 2;
                    Ok(spanned(Token::DoubleSlash))
                } else {
                    self.pos += 1;
                    Ok(spanned(Token::Slash))
                }
            }
            b'.' => {
                if self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
                    self.number(offset).map(spanned)
                } else if self.peek(1) == Some(b'.') {
                    self.pos += 2;
                    Ok(spanned(Token::DotDot))
                } else {
                    self.pos += 1;
                    Ok(spanned(Token::Dot))
                }
            }
            b'@' => {
                self.pos += 1;
                Ok(spanned(Token::At))
            }
            b'(' => {
                self.pos += 1;
                Ok(spanned(Token::LParen))
            }
            b')' => {
                self.pos += 1;
                Ok(spanned(Token::RParen))
            }
            b'[' => {
                self.pos += 1;
                Ok(spanned(Token::LBracket))
            }
            b']' => {
                self.pos += 1;
                Ok(spanned(Token::RBracket))
            }
            b',' => {
                self.pos += 1;
                Ok(spanned(Token::Comma))
            }
            b'|' => {
                self.pos += 1;
                Ok(spanned(Token::Pipe))
            }
            b'+' => {
                self.pos += 1;
                Ok(spanned(Token::Plus))
            }
            b'-' => {
                self.pos += 1;
                Ok(spanned(Token::Minus))
            }
            b'*' => {
                self.pos += 1;
                Ok(spanned(Token::Star))
            }
            b':' => {
                if self.peek(1) == Some(b':') {
                    self.pos += 2;
                    Ok(spanned(Token::ColonColon))
                } else {
                    Err(XPathError::syntax(offset, "unexpected ':'"))
                }
            }
            b'=' => {
                self.pos += 1;
                Ok(spanned(Token::Eq))
            }
            b'!' => {
                if self.peek(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(spanned(Token::Ne))
                } else {
                    Err(XPathError::syntax(offset, "unexpected '!'"))
                }
            }
            b'<' => {
                if self.peek(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(spanned(Token::Le))
                } else {
                    self.pos += 1;
                    Ok(spanned(Token::Lt))
                }
            }
            b'>' => {
                if self.peek(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(spanned(Token::Ge))
                } else {
                    self.pos += 1;
                    Ok(spanned(Token::Gt))
                }
            }
            b'"' | b'\'' => self.literal(b, offset).map(spanned),
            b'0'..=b'9' => self.number(offset).map(spanned),
            _ if is_name_start(b) => Ok(spanned(self.name())),
            _ => Err(XPathError::syntax(offset, "unexpected character")),
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.pos + ahead).copied()
    }

    fn literal(&mut self, quote: u8, offset: usize) -> Result<Token, XPathError> {
        let start = self.pos + 1;
        let mut end = start;
        while end < self.input.len() && self.input[end] != quote {
            end += 1;
        }
        if end == self.input.len() {
            return Err(XPathError::syntax(offset, "unterminated literal"));
        }
        self.pos = end + 1;
        let text = String::from_utf8_lossy(&self.input[start..end]).into_owned();
        Ok(Token::Literal(text))
    }

    /// Number ::= Digits ('.' Digits?)? | '.' Digits
    fn number(&mut self, offset: usize) -> Result<Token, XPathError> {
        let start = self.pos;
        while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek(0) == Some(b'.') {
            self.pos += 1;
            while self.peek(0).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| XPathError::syntax(offset, "malformed number"))?;
        let value = text
            .parse::<f64>()
            .map_err(|_| XPathError::syntax(offset, "malformed number"))?;
        Ok(Token::Number(value))
    }

    fn name(&mut self) -> Token {
        let start = self.pos;
        self.pos += 1;
        while self.peek(0).is_some_and(is_name_char) {
            self.pos += 1;
        }
        // A single ':' joins a prefix to a local name; '::' is the axis
        // separator and stays its own token.
        if self.peek(0) == Some(b':')
            && self.peek(1) != Some(b':')
            && self.peek(1).is_some_and(is_name_start)
        {
            self.pos += 2;
            while self.peek(0).is_some_and(is_name_char) {
                self.pos += 1;
            }
        }
        Token::Name(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }
}

fn is_name_start(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'_') || b >= 0x80
}

fn is_name_char(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.') || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn lexes_paths() {
        assert_eq!(
            tokens("//a/b[@id='x']"),
            vec![
                Token::DoubleSlash,
                Token::Name("a".into()),
                Token::Slash,
                Token::Name("b".into()),
                Token::LBracket,
                Token::At,
                Token::Name("id".into()),
                Token::Eq,
                Token::Literal("x".into()),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(tokens("0"), vec![Token::Number(0.0), Token::Eof]);
        assert_eq!(tokens("123.456"), vec![Token::Number(123.456), Token::Eof]);
        assert_eq!(tokens(".123"), vec![Token::Number(0.123), Token::Eof]);
        assert_eq!(tokens("123."), vec![Token::Number(123.0), Token::Eof]);
        // Trailing garbage becomes a separate token; the parser rejects it.
        assert_eq!(
            tokens("123a"),
            vec![Token::Number(123.0), Token::Name("a".into()), Token::Eof]
        );
    }

    #[test]
    fn lexes_literals_in_both_quotes() {
        assert_eq!(
            tokens("'a\"b'"),
            vec![Token::Literal("a\"b".into()), Token::Eof]
        );
        assert_eq!(
            tokens("\"a'b\""),
            vec![Token::Literal("a'b".into()), Token::Eof]
        );
        assert_eq!(tokens("''"), vec![Token::Literal(String::new()), Token::Eof]);
    }

    #[test]
    fn unterminated_literal_is_an_error() {
        assert_eq!(
            lex("'abc"),
            Err(XPathError::syntax(0, "unterminated literal"))
        );
    }

    #[test]
    fn axis_separator_is_not_part_of_the_name() {
        assert_eq!(
            tokens("child::ns:item"),
            vec![
                Token::Name("child".into()),
                Token::ColonColon,
                Token::Name("ns:item".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn stray_symbols_fail() {
        assert!(lex("$x").is_err());
        assert!(lex("a ! b").is_err());
    }
}
