//! 词法单元定义

use std::fmt;

use super::ast::HexToken;
use super::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // KeyWord
    TkRule,
    TkPrivate,
    TkGlobal,
    TkMeta,
    TkStrings,
    TkCondition,
    TkTrue,
    TkFalse,
    TkNot,
    TkAnd,
    TkOr,
    TkAll,
    TkAny,
    TkNone,
    TkOf,
    TkThem,
    TkFor,
    TkAt,
    TkIn,
    TkFilesize,
    TkContains,
    TkIContains,
    TkStartsWith,
    TkIStartsWith,
    TkEndsWith,
    TkIEndsWith,
    TkIEquals,
    TkMatches,
    TkNocase,
    TkWide,
    TkAscii,
    TkFullword,

    TkName,                  // identifier
    TkPatternIdent,          // $a / $
    TkPatternIdentWildcard,  // $a*
    TkPatternCount,          // #a / #
    TkPatternOffset,         // @a / @
    TkPatternLength,         // !a / !
    TkInt,                   // 10 0x10 0o10 10KB
    TkFloat,                 // 1.5
    TkString,                // "..."
    TkRegex,                 // /.../is
    TkHexString,             // { 4D 5A ?? }

    TkLeftBrace,    // {
    TkRightBrace,   // }
    TkLeftParen,    // (
    TkRightParen,   // )
    TkLeftBracket,  // [
    TkRightBracket, // ]
    TkColon,        // :
    TkComma,        // ,
    TkAssign,       // =
    TkDotDot,       // ..
    TkEq,           // ==
    TkNe,           // !=
    TkLt,           // <
    TkLe,           // <=
    TkGt,           // >
    TkGe,           // >=
    TkPlus,         // +
    TkMinus,        // -
    TkMul,          // *
    TkDiv,          // \
    TkMod,          // %
    TkBitAnd,       // &
    TkBitOr,        // |
    TkBitXor,       // ^
    TkBitNot,       // ~
    TkShl,          // <<
    TkShr,          // >>

    TkEof,
}

impl TokenKind {
    /// 模式修饰符关键字
    pub fn is_pattern_modifier(self) -> bool {
        matches!(
            self,
            TokenKind::TkNocase
                | TokenKind::TkWide
                | TokenKind::TkAscii
                | TokenKind::TkFullword
                | TokenKind::TkPrivate
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::TkRule => "`rule`",
            TokenKind::TkPrivate => "`private`",
            TokenKind::TkGlobal => "`global`",
            TokenKind::TkMeta => "`meta`",
            TokenKind::TkStrings => "`strings`",
            TokenKind::TkCondition => "`condition`",
            TokenKind::TkTrue => "`true`",
            TokenKind::TkFalse => "`false`",
            TokenKind::TkNot => "`not`",
            TokenKind::TkAnd => "`and`",
            TokenKind::TkOr => "`or`",
            TokenKind::TkAll => "`all`",
            TokenKind::TkAny => "`any`",
            TokenKind::TkNone => "`none`",
            TokenKind::TkOf => "`of`",
            TokenKind::TkThem => "`them`",
            TokenKind::TkFor => "`for`",
            TokenKind::TkAt => "`at`",
            TokenKind::TkIn => "`in`",
            TokenKind::TkFilesize => "`filesize`",
            TokenKind::TkContains => "`contains`",
            TokenKind::TkIContains => "`icontains`",
            TokenKind::TkStartsWith => "`startswith`",
            TokenKind::TkIStartsWith => "`istartswith`",
            TokenKind::TkEndsWith => "`endswith`",
            TokenKind::TkIEndsWith => "`iendswith`",
            TokenKind::TkIEquals => "`iequals`",
            TokenKind::TkMatches => "`matches`",
            TokenKind::TkNocase => "`nocase`",
            TokenKind::TkWide => "`wide`",
            TokenKind::TkAscii => "`ascii`",
            TokenKind::TkFullword => "`fullword`",
            TokenKind::TkName => "identifier",
            TokenKind::TkPatternIdent => "pattern identifier",
            TokenKind::TkPatternIdentWildcard => "pattern wildcard",
            TokenKind::TkPatternCount => "pattern count",
            TokenKind::TkPatternOffset => "pattern offset",
            TokenKind::TkPatternLength => "pattern length",
            TokenKind::TkInt => "integer",
            TokenKind::TkFloat => "float",
            TokenKind::TkString => "string literal",
            TokenKind::TkRegex => "regular expression",
            TokenKind::TkHexString => "hex string",
            TokenKind::TkLeftBrace => "`{`",
            TokenKind::TkRightBrace => "`}`",
            TokenKind::TkLeftParen => "`(`",
            TokenKind::TkRightParen => "`)`",
            TokenKind::TkLeftBracket => "`[`",
            TokenKind::TkRightBracket => "`]`",
            TokenKind::TkColon => "`:`",
            TokenKind::TkComma => "`,`",
            TokenKind::TkAssign => "`=`",
            TokenKind::TkDotDot => "`..`",
            TokenKind::TkEq => "`==`",
            TokenKind::TkNe => "`!=`",
            TokenKind::TkLt => "`<`",
            TokenKind::TkLe => "`<=`",
            TokenKind::TkGt => "`>`",
            TokenKind::TkGe => "`>=`",
            TokenKind::TkPlus => "`+`",
            TokenKind::TkMinus => "`-`",
            TokenKind::TkMul => "`*`",
            TokenKind::TkDiv => "`\\`",
            TokenKind::TkMod => "`%`",
            TokenKind::TkBitAnd => "`&`",
            TokenKind::TkBitOr => "`|`",
            TokenKind::TkBitXor => "`^`",
            TokenKind::TkBitNot => "`~`",
            TokenKind::TkShl => "`<<`",
            TokenKind::TkShr => "`>>`",
            TokenKind::TkEof => "end of input",
        };
        f.write_str(text)
    }
}

/// 关键字表
pub fn keyword_kind(name: &str) -> Option<TokenKind> {
    let kind = match name {
        "rule" => TokenKind::TkRule,
        "private" => TokenKind::TkPrivate,
        "global" => TokenKind::TkGlobal,
        "meta" => TokenKind::TkMeta,
        "strings" => TokenKind::TkStrings,
        "condition" => TokenKind::TkCondition,
        "true" => TokenKind::TkTrue,
        "false" => TokenKind::TkFalse,
        "not" => TokenKind::TkNot,
        "and" => TokenKind::TkAnd,
        "or" => TokenKind::TkOr,
        "all" => TokenKind::TkAll,
        "any" => TokenKind::TkAny,
        "none" => TokenKind::TkNone,
        "of" => TokenKind::TkOf,
        "them" => TokenKind::TkThem,
        "for" => TokenKind::TkFor,
        "at" => TokenKind::TkAt,
        "in" => TokenKind::TkIn,
        "filesize" => TokenKind::TkFilesize,
        "contains" => TokenKind::TkContains,
        "icontains" => TokenKind::TkIContains,
        "startswith" => TokenKind::TkStartsWith,
        "istartswith" => TokenKind::TkIStartsWith,
        "endswith" => TokenKind::TkEndsWith,
        "iendswith" => TokenKind::TkIEndsWith,
        "iequals" => TokenKind::TkIEquals,
        "matches" => TokenKind::TkMatches,
        "nocase" => TokenKind::TkNocase,
        "wide" => TokenKind::TkWide,
        "ascii" => TokenKind::TkAscii,
        "fullword" => TokenKind::TkFullword,
        _ => return None,
    };
    Some(kind)
}

/// 是否为保留关键字（变量名、规则名不可使用）
pub fn is_keyword(name: &str) -> bool {
    keyword_kind(name).is_some()
}

/// 词法单元携带的已解码值
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Ident(String),
    /// 整数字面量的绝对值
    Int(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Regex {
        pattern: String,
        case_insensitive: bool,
        dot_all: bool,
    },
    Hex(Vec<HexToken>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub value: TokenValue,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token {
            kind,
            span,
            value: TokenValue::None,
        }
    }

    pub fn with_value(kind: TokenKind, span: Span, value: TokenValue) -> Self {
        Token { kind, span, value }
    }
}
