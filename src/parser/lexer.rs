//! 词法分析：源码文本 → Token 序列

use super::hex::parse_hex_body;
use super::span::Span;
use super::token::{keyword_kind, Token, TokenKind, TokenValue};
use super::ParseError;

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// 上一个有效 Token，用于区分 `{` 是规则体还是十六进制串
    last: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            last: None,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.pos >= self.bytes.len() {
                tokens.push(Token::new(TokenKind::TkEof, Span::new(self.pos, self.pos)));
                break;
            }
            let token = self.lex()?;
            self.last = Some(token.kind);
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, message: &str, start: usize) -> ParseError {
        ParseError::new(message, Span::new(start, self.pos.max(start + 1)))
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => return Err(self.error("unterminated comment", start)),
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token::new(TokenKind::TkEof, Span::new(start, start)));
        };

        match ch {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let name = self.eat_name();
                let span = Span::new(start, self.pos);
                Ok(match keyword_kind(name) {
                    Some(kind) => Token::new(kind, span),
                    None => Token::with_value(
                        TokenKind::TkName,
                        span,
                        TokenValue::Ident(name.to_string()),
                    ),
                })
            }
            b'0'..=b'9' => self.lex_number(),
            b'"' => self.lex_string(),
            b'/' => self.lex_regex(),
            b'{' if self.last == Some(TokenKind::TkAssign) => self.lex_hex_string(),
            b'$' => {
                self.pos += 1;
                let name = self.eat_name().to_string();
                // `$a*` 仅在紧邻时视为通配
                let kind = if self.peek() == Some(b'*') {
                    self.pos += 1;
                    TokenKind::TkPatternIdentWildcard
                } else {
                    TokenKind::TkPatternIdent
                };
                Ok(Token::with_value(
                    kind,
                    Span::new(start, self.pos),
                    TokenValue::Ident(name),
                ))
            }
            b'#' | b'@' => {
                self.pos += 1;
                let name = self.eat_name().to_string();
                let kind = if ch == b'#' {
                    TokenKind::TkPatternCount
                } else {
                    TokenKind::TkPatternOffset
                };
                Ok(Token::with_value(
                    kind,
                    Span::new(start, self.pos),
                    TokenValue::Ident(name),
                ))
            }
            b'!' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    return Ok(Token::new(TokenKind::TkNe, Span::new(start, self.pos)));
                }
                let name = self.eat_name().to_string();
                Ok(Token::with_value(
                    TokenKind::TkPatternLength,
                    Span::new(start, self.pos),
                    TokenValue::Ident(name),
                ))
            }
            b'.' => {
                if self.peek_at(1) == Some(b'.') {
                    self.pos += 2;
                    Ok(Token::new(TokenKind::TkDotDot, Span::new(start, self.pos)))
                } else {
                    self.pos += 1;
                    Err(self.error("unexpected `.`", start))
                }
            }
            b'=' => Ok(self.lex_pair(b'=', TokenKind::TkEq, TokenKind::TkAssign)),
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Ok(Token::new(TokenKind::TkShl, Span::new(start, self.pos)))
                } else {
                    Ok(self.lex_pair(b'=', TokenKind::TkLe, TokenKind::TkLt))
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Ok(Token::new(TokenKind::TkShr, Span::new(start, self.pos)))
                } else {
                    Ok(self.lex_pair(b'=', TokenKind::TkGe, TokenKind::TkGt))
                }
            }
            _ => {
                let kind = match ch {
                    b'{' => TokenKind::TkLeftBrace,
                    b'}' => TokenKind::TkRightBrace,
                    b'(' => TokenKind::TkLeftParen,
                    b')' => TokenKind::TkRightParen,
                    b'[' => TokenKind::TkLeftBracket,
                    b']' => TokenKind::TkRightBracket,
                    b':' => TokenKind::TkColon,
                    b',' => TokenKind::TkComma,
                    b'+' => TokenKind::TkPlus,
                    b'-' => TokenKind::TkMinus,
                    b'*' => TokenKind::TkMul,
                    b'\\' => TokenKind::TkDiv,
                    b'%' => TokenKind::TkMod,
                    b'&' => TokenKind::TkBitAnd,
                    b'|' => TokenKind::TkBitOr,
                    b'^' => TokenKind::TkBitXor,
                    b'~' => TokenKind::TkBitNot,
                    _ => {
                        self.pos += self.src[start..].chars().next().map_or(1, char::len_utf8);
                        return Err(self.error("unexpected character", start));
                    }
                };
                self.pos += 1;
                Ok(Token::new(kind, Span::new(start, self.pos)))
            }
        }
    }

    /// 单字符或双字符运算符
    fn lex_pair(&mut self, second: u8, double: TokenKind, single: TokenKind) -> Token {
        let start = self.pos;
        if self.peek_at(1) == Some(second) {
            self.pos += 2;
            Token::new(double, Span::new(start, self.pos))
        } else {
            self.pos += 1;
            Token::new(single, Span::new(start, self.pos))
        }
    }

    fn eat_name(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn lex_number(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let radix = match (self.peek(), self.peek_at(1)) {
            (Some(b'0'), Some(b'x' | b'X')) => 16,
            (Some(b'0'), Some(b'o' | b'O')) => 8,
            _ => 10,
        };

        if radix != 10 {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| (c as char).is_digit(radix)) {
                self.pos += 1;
            }
            if digits_start == self.pos {
                return Err(self.error("missing digits in integer literal", start));
            }
            let value = u64::from_str_radix(&self.src[digits_start..self.pos], radix)
                .map_err(|_| self.error("integer literal out of range", start))?;
            return self.finish_integer(start, value);
        }

        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        // 小数点后必须紧跟数字，`0..10` 中的 `..` 留给区间
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            let value: f64 = self.src[start..self.pos]
                .parse()
                .map_err(|_| self.error("invalid float literal", start))?;
            return Ok(Token::with_value(
                TokenKind::TkFloat,
                Span::new(start, self.pos),
                TokenValue::Float(value),
            ));
        }

        let value = self.src[start..self.pos]
            .parse::<u64>()
            .map_err(|_| self.error("integer literal out of range", start))?;
        self.finish_integer(start, value)
    }

    /// 处理 KB / MB 后缀
    /// 只记录绝对值，符号由语法分析处理；上限 2^63 对应 i64::MIN 的绝对值
    fn finish_integer(&mut self, start: usize, value: u64) -> Result<Token, ParseError> {
        let multiplier = match (self.peek(), self.peek_at(1)) {
            (Some(b'K'), Some(b'B')) => Some(1024),
            (Some(b'M'), Some(b'B')) => Some(1024 * 1024),
            _ => None,
        };
        let value = match multiplier {
            Some(m) => {
                self.pos += 2;
                value
                    .checked_mul(m)
                    .ok_or_else(|| self.error("integer literal out of range", start))?
            }
            None => value,
        };
        if value > i64::MIN.unsigned_abs() {
            return Err(self.error("integer literal out of range", start));
        }
        if matches!(
            self.peek(),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'_')
        ) {
            self.eat_name();
            return Err(self.error("invalid integer literal", start));
        }
        Ok(Token::with_value(
            TokenKind::TkInt,
            Span::new(start, self.pos),
            TokenValue::Int(value),
        ))
    }

    fn lex_string(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = Vec::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(self.error("unterminated string literal", start));
            };
            match ch {
                b'"' => {
                    self.pos += 1;
                    break;
                }
                b'\n' => return Err(self.error("unterminated string literal", start)),
                b'\\' => {
                    let escape_start = self.pos;
                    self.pos += 1;
                    let Some(esc) = self.peek() else {
                        return Err(self.error("unterminated string literal", start));
                    };
                    self.pos += 1;
                    match esc {
                        b'"' => value.push(b'"'),
                        b'\\' => value.push(b'\\'),
                        b't' => value.push(b'\t'),
                        b'n' => value.push(b'\n'),
                        b'r' => value.push(b'\r'),
                        b'x' => {
                            let hex = self
                                .src
                                .get(self.pos..self.pos + 2)
                                .and_then(|h| u8::from_str_radix(h, 16).ok());
                            match hex {
                                Some(byte) => {
                                    self.pos += 2;
                                    value.push(byte);
                                }
                                None => {
                                    return Err(self.error("invalid `\\x` escape", escape_start))
                                }
                            }
                        }
                        _ => return Err(self.error("invalid escape sequence", escape_start)),
                    }
                }
                _ => {
                    value.push(ch);
                    self.pos += 1;
                }
            }
        }
        Ok(Token::with_value(
            TokenKind::TkString,
            Span::new(start, self.pos),
            TokenValue::Bytes(value),
        ))
    }

    fn lex_regex(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut pattern = String::new();
        loop {
            let Some(ch) = self.peek() else {
                return Err(self.error("unterminated regular expression", start));
            };
            match ch {
                b'/' => {
                    self.pos += 1;
                    break;
                }
                b'\n' => return Err(self.error("unterminated regular expression", start)),
                b'\\' if self.peek_at(1) == Some(b'/') => {
                    pattern.push('/');
                    self.pos += 2;
                }
                b'\\' if matches!(self.peek_at(1), Some(c) if c != b'\n') => {
                    pattern.push('\\');
                    self.pos += 1;
                    let c = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                    pattern.push(c);
                    self.pos += c.len_utf8();
                }
                _ => {
                    let c = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                    pattern.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
        if pattern.is_empty() {
            return Err(self.error("empty regular expression", start));
        }

        let mut case_insensitive = false;
        let mut dot_all = false;
        loop {
            match self.peek() {
                Some(b'i') => case_insensitive = true,
                Some(b's') => dot_all = true,
                Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_') => {
                    self.pos += 1;
                    return Err(self.error("invalid regular expression flag", start));
                }
                _ => break,
            }
            self.pos += 1;
        }

        Ok(Token::with_value(
            TokenKind::TkRegex,
            Span::new(start, self.pos),
            TokenValue::Regex {
                pattern,
                case_insensitive,
                dot_all,
            },
        ))
    }

    fn lex_hex_string(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let body_start = start + 1;
        let Some(len) = self.src[body_start..].find('}') else {
            self.pos = self.bytes.len();
            return Err(self.error("unterminated hex string", start));
        };
        let body = &self.src[body_start..body_start + len];
        self.pos = body_start + len + 1;
        let tokens = parse_hex_body(body, body_start)?;
        Ok(Token::with_value(
            TokenKind::TkHexString,
            Span::new(start, self.pos),
            TokenValue::Hex(tokens),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lex_rule_header() {
        assert_eq!(
            kinds("private rule foo : bar { condition: true }"),
            vec![
                TokenKind::TkPrivate,
                TokenKind::TkRule,
                TokenKind::TkName,
                TokenKind::TkColon,
                TokenKind::TkName,
                TokenKind::TkLeftBrace,
                TokenKind::TkCondition,
                TokenKind::TkColon,
                TokenKind::TkTrue,
                TokenKind::TkRightBrace,
                TokenKind::TkEof,
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        let tokens = Lexer::new("10 0x1F 0o17 2KB 1MB 1.5 0..3").tokenize().unwrap();
        let values: Vec<TokenValue> = tokens.iter().map(|t| t.value.clone()).collect();
        assert_eq!(values[0], TokenValue::Int(10));
        assert_eq!(values[1], TokenValue::Int(31));
        assert_eq!(values[2], TokenValue::Int(15));
        assert_eq!(values[3], TokenValue::Int(2048));
        assert_eq!(values[4], TokenValue::Int(1024 * 1024));
        assert_eq!(values[5], TokenValue::Float(1.5));
        // 区间：0 .. 3
        assert_eq!(tokens[6].kind, TokenKind::TkInt);
        assert_eq!(tokens[7].kind, TokenKind::TkDotDot);
        assert_eq!(tokens[8].kind, TokenKind::TkInt);
        assert!(Lexer::new("99999999999999999999").tokenize().is_err());

        // 2^63 只能作为 i64::MIN 的绝对值出现
        let tokens = Lexer::new("9223372036854775808 0x8000000000000000").tokenize().unwrap();
        assert_eq!(tokens[0].value, TokenValue::Int(1 << 63));
        assert_eq!(tokens[1].value, TokenValue::Int(1 << 63));
        assert!(Lexer::new("9223372036854775809").tokenize().is_err());
        assert!(Lexer::new("9007199254740992MB").tokenize().is_err());
    }

    #[test]
    fn test_lex_string_escapes() {
        let tokens = Lexer::new(r#""a\"b\\c\t\x41""#).tokenize().unwrap();
        assert_eq!(tokens[0].value, TokenValue::Bytes(b"a\"b\\c\tA".to_vec()));
        assert!(Lexer::new(r#""abc"#).tokenize().is_err());
        assert!(Lexer::new(r#""\q""#).tokenize().is_err());
    }

    #[test]
    fn test_lex_regex_and_hex() {
        let tokens = Lexer::new(r"$a = /ab\/c\d+/is $b = { 4D 5A }").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::TkPatternIdent);
        assert_eq!(
            tokens[2].value,
            TokenValue::Regex {
                pattern: r"ab/c\d+".to_string(),
                case_insensitive: true,
                dot_all: true,
            }
        );
        assert_eq!(tokens[5].kind, TokenKind::TkHexString);
    }

    #[test]
    fn test_lex_pattern_operators() {
        assert_eq!(
            kinds("#a @b[1] !c $d* $ != 1"),
            vec![
                TokenKind::TkPatternCount,
                TokenKind::TkPatternOffset,
                TokenKind::TkLeftBracket,
                TokenKind::TkInt,
                TokenKind::TkRightBracket,
                TokenKind::TkPatternLength,
                TokenKind::TkPatternIdentWildcard,
                TokenKind::TkPatternIdent,
                TokenKind::TkNe,
                TokenKind::TkInt,
                TokenKind::TkEof,
            ]
        );
    }

    #[test]
    fn test_lex_comments() {
        assert_eq!(
            kinds("// line\n/* block\n comment */ rule"),
            vec![TokenKind::TkRule, TokenKind::TkEof]
        );
        assert!(Lexer::new("/* open").tokenize().is_err());
    }
}
