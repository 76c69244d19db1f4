//! 十六进制串降级：无通配 → 字面量；否则 → 字节正则源码

use std::fmt::Write;

use crate::parser::ast::HexToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexLowering {
    Literal(Vec<u8>),
    Regex(String),
}

pub fn lower_hex(tokens: &[HexToken]) -> HexLowering {
    let literal: Option<Vec<u8>> = tokens
        .iter()
        .map(|t| match t {
            HexToken::Byte { value, mask: 0xFF } => Some(*value),
            _ => None,
        })
        .collect();
    match literal {
        Some(bytes) => HexLowering::Literal(bytes),
        None => {
            let mut out = String::new();
            write_tokens(&mut out, tokens);
            HexLowering::Regex(out)
        }
    }
}

fn write_tokens(out: &mut String, tokens: &[HexToken]) {
    for token in tokens {
        match token {
            HexToken::Byte { value, mask } => write_byte(out, *value, *mask, false),
            HexToken::NotByte { value, mask } => write_byte(out, *value, *mask, true),
            HexToken::Jump { min, max } => {
                let _ = match max {
                    Some(max) if max == min => write!(out, ".{{{}}}", min),
                    Some(max) => write!(out, ".{{{},{}}}", min, max),
                    None => write!(out, ".{{{},}}", min),
                };
            }
            HexToken::Alternation(alts) => {
                out.push_str("(?:");
                for (idx, alt) in alts.iter().enumerate() {
                    if idx > 0 {
                        out.push('|');
                    }
                    write_tokens(out, alt);
                }
                out.push(')');
            }
        }
    }
}

fn write_byte(out: &mut String, value: u8, mask: u8, negated: bool) {
    match (mask, negated) {
        (0xFF, false) => {
            let _ = write!(out, "\\x{:02X}", value);
        }
        (0x00, _) => out.push('.'),
        _ => {
            out.push('[');
            if negated {
                out.push('^');
            }
            for byte in 0..=u8::MAX {
                if byte & mask == value & mask {
                    let _ = write!(out, "\\x{:02X}", byte);
                }
            }
            out.push(']');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::HexToken::*;

    #[test]
    fn test_literal_hex() {
        let tokens = vec![Byte { value: 0x4D, mask: 0xFF }, Byte { value: 0x5A, mask: 0xFF }];
        assert_eq!(lower_hex(&tokens), HexLowering::Literal(vec![0x4D, 0x5A]));
    }

    #[test]
    fn test_wildcard_hex_to_regex() {
        let tokens = vec![
            Byte { value: 0x4D, mask: 0xFF },
            Byte { value: 0, mask: 0 },
            Jump { min: 2, max: Some(4) },
            Alternation(vec![
                vec![Byte { value: 0xAA, mask: 0xFF }],
                vec![NotByte { value: 0xBB, mask: 0xFF }],
            ]),
            Jump { min: 1, max: None },
            Byte { value: 0x90, mask: 0xF0 },
        ];
        let HexLowering::Regex(src) = lower_hex(&tokens) else {
            panic!("expected regex");
        };
        assert!(src.starts_with(r"\x4D..{2,4}(?:\xAA|[^\xBB]).{1,}["));
        assert!(src.contains(r"\x90\x91"));
        assert!(src.ends_with(r"\x9F]"));
    }
}
