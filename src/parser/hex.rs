//! 十六进制串解析：`{ 4D 5A ?? 9? [2-4] ( AA | BB ) ~CC }`

use super::ast::HexToken;
use super::span::Span;
use super::ParseError;

/// 跳转长度上限（合并相邻跳转后计算），超出直接报错，避免降级后的正则超出大小限制
const MAX_HEX_JUMP: u32 = 32767;

/// 解析花括号内部文本，`base` 为其在源码中的起始偏移
pub(crate) fn parse_hex_body(body: &str, base: usize) -> Result<Vec<HexToken>, ParseError> {
    let mut parser = HexParser {
        bytes: body.as_bytes(),
        pos: 0,
        base,
    };
    let tokens = parser.parse_sequence(0)?;
    parser.skip_trivia()?;
    if parser.pos < parser.bytes.len() {
        return Err(parser.error_here("unexpected character in hex string"));
    }
    if tokens.is_empty() {
        return Err(ParseError::new(
            "empty hex string",
            Span::new(base, base + body.len()),
        ));
    }
    if matches!(tokens.first(), Some(HexToken::Jump { .. }))
        || matches!(tokens.last(), Some(HexToken::Jump { .. }))
    {
        return Err(ParseError::new(
            "hex string cannot start or end with a jump",
            Span::new(base, base + body.len()),
        ));
    }
    Ok(tokens)
}

struct HexParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> HexParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error_here(&self, message: &str) -> ParseError {
        let start = self.base + self.pos;
        ParseError::new(message, Span::new(start, start + 1))
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => {
                                self.pos = start;
                                return Err(self.error_here("unterminated comment in hex string"));
                            }
                            Some(b'*') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
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

    /// depth > 0 表示处于分组内部，遇到 `|` / `)` 停止
    fn parse_sequence(&mut self, depth: usize) -> Result<Vec<HexToken>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => break,
                Some(b'|' | b')') if depth > 0 => break,
                Some(b'[') => {
                    let start = self.pos;
                    let jump = self.parse_jump(depth)?;
                    // 相邻跳转合并
                    let merged = match (tokens.last_mut(), &jump) {
                        (
                            Some(HexToken::Jump { min, max }),
                            HexToken::Jump { min: m2, max: x2 },
                        ) => {
                            *min = min.saturating_add(*m2);
                            *max = match (*max, *x2) {
                                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                                _ => None,
                            };
                            true
                        }
                        _ => false,
                    };
                    if !merged {
                        tokens.push(jump);
                    }
                    if let Some(HexToken::Jump { min, max }) = tokens.last() {
                        if *min > MAX_HEX_JUMP || max.is_some_and(|m| m > MAX_HEX_JUMP) {
                            let mut err = self.error_here(&format!(
                                "jump length exceeds {} in hex string",
                                MAX_HEX_JUMP
                            ));
                            err.span.start = self.base + start;
                            return Err(err);
                        }
                    }
                }
                Some(b'(') => {
                    let start = self.pos;
                    self.pos += 1;
                    let mut alternatives = Vec::new();
                    loop {
                        let alt = self.parse_sequence(depth + 1)?;
                        if alt.is_empty() {
                            return Err(self.error_here("empty alternative in hex string"));
                        }
                        if matches!(alt.first(), Some(HexToken::Jump { .. }))
                            || matches!(alt.last(), Some(HexToken::Jump { .. }))
                        {
                            return Err(
                                self.error_here("alternative cannot start or end with a jump")
                            );
                        }
                        alternatives.push(alt);
                        match self.peek() {
                            Some(b'|') => self.pos += 1,
                            Some(b')') => {
                                self.pos += 1;
                                break;
                            }
                            _ => {
                                self.pos = start;
                                return Err(self.error_here("unclosed alternation in hex string"));
                            }
                        }
                    }
                    tokens.push(HexToken::Alternation(alternatives));
                }
                Some(b'~') => {
                    self.pos += 1;
                    let (value, mask) = self.parse_byte()?;
                    if mask == 0 {
                        return Err(self.error_here("negation of `??` is not allowed"));
                    }
                    tokens.push(HexToken::NotByte { value, mask });
                }
                Some(_) => {
                    let (value, mask) = self.parse_byte()?;
                    tokens.push(HexToken::Byte { value, mask });
                }
            }
        }
        Ok(tokens)
    }

    fn parse_byte(&mut self) -> Result<(u8, u8), ParseError> {
        let hi = self.parse_nibble()?;
        let lo = self.parse_nibble()?;
        let value = (hi.unwrap_or(0) << 4) | lo.unwrap_or(0);
        let mask = (if hi.is_some() { 0xF0 } else { 0 }) | (if lo.is_some() { 0x0F } else { 0 });
        Ok((value, mask))
    }

    /// None 表示通配 `?`
    fn parse_nibble(&mut self) -> Result<Option<u8>, ParseError> {
        let ch = self
            .peek()
            .ok_or_else(|| self.error_here("incomplete byte in hex string"))?;
        let nibble = match ch {
            b'0'..=b'9' => Some(ch - b'0'),
            b'a'..=b'f' => Some(ch - b'a' + 10),
            b'A'..=b'F' => Some(ch - b'A' + 10),
            b'?' => None,
            _ => return Err(self.error_here("invalid character in hex string")),
        };
        self.pos += 1;
        Ok(nibble)
    }

    fn parse_jump(&mut self, depth: usize) -> Result<HexToken, ParseError> {
        let start = self.pos;
        self.pos += 1;
        self.skip_trivia()?;
        let min = self.parse_number()?;
        self.skip_trivia()?;
        let (min, max) = match self.peek() {
            Some(b']') => {
                let n = min.ok_or_else(|| self.error_here("empty jump in hex string"))?;
                (n, Some(n))
            }
            Some(b'-') => {
                self.pos += 1;
                self.skip_trivia()?;
                let max = self.parse_number()?;
                self.skip_trivia()?;
                (min.unwrap_or(0), max)
            }
            _ => return Err(self.error_here("invalid jump in hex string")),
        };
        if self.peek() != Some(b']') {
            return Err(self.error_here("expected `]` in hex string jump"));
        }
        self.pos += 1;

        if let Some(max) = max {
            if min > max {
                let mut err = self.error_here("invalid jump range in hex string");
                err.span.start = self.base + start;
                return Err(err);
            }
        } else if depth > 0 {
            return Err(self.error_here("unbounded jump inside alternation"));
        }
        Ok(HexToken::Jump { min, max })
    }

    fn parse_number(&mut self) -> Result<Option<u32>, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if start == self.pos {
            return Ok(None);
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        digits
            .parse::<u32>()
            .map(Some)
            .map_err(|_| self.error_here("jump length out of range"))
    }
}
