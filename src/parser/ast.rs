//! 规则源码的抽象语法树

use serde::Serialize;
use std::fmt;

use super::span::Span;

/// 一段源码解析出的全部规则
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceFile {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub name_span: Span,
    pub is_private: bool,
    pub is_global: bool,
    pub tags: Vec<String>,
    pub meta: Vec<Meta>,
    pub patterns: Vec<Pattern>,
    pub condition: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Meta {
    pub key: String,
    pub value: MetaValue,
    pub span: Span,
}

/// 元数据取值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Integer(v) => write!(f, "{}", v),
            MetaValue::Float(v) => write!(f, "{}", v),
            MetaValue::Bool(v) => write!(f, "{}", v),
            MetaValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// 模式定义：`$name = <text|hex|regex> modifiers...`
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// 不含 `$` 前缀
    pub identifier: String,
    pub span: Span,
    pub kind: PatternKind,
    pub modifiers: Vec<(Modifier, Span)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    Text(Vec<u8>),
    Hex(Vec<HexToken>),
    Regex {
        pattern: String,
        case_insensitive: bool,
        dot_all: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Nocase,
    Wide,
    Ascii,
    Fullword,
    Private,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Modifier::Nocase => "nocase",
            Modifier::Wide => "wide",
            Modifier::Ascii => "ascii",
            Modifier::Fullword => "fullword",
            Modifier::Private => "private",
        };
        f.write_str(text)
    }
}

/// 十六进制串的组成单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HexToken {
    /// `4D`、`4?`、`??`：(byte & mask) == value
    Byte { value: u8, mask: u8 },
    /// `~4D`、`~4?`：(byte & mask) != value
    NotByte { value: u8, mask: u8 },
    /// `[n]`、`[n-m]`、`[n-]`、`[-]`
    Jump { min: u32, max: Option<u32> },
    /// `( AA | BB CC )`
    Alternation(Vec<Vec<HexToken>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Vec<u8>),
    Regexp {
        pattern: String,
        case_insensitive: bool,
        dot_all: bool,
    },
    Filesize,
    Ident(String),
    Call {
        name: String,
        arg: Box<Expr>,
    },
    /// `$a`、`$a at e`、`$a in (lo..hi)`；ident 为 None 表示匿名 `$`
    PatternMatch {
        ident: Option<String>,
        anchor: Option<Anchor>,
    },
    /// `#a`、`#a in (lo..hi)`
    PatternCount {
        ident: Option<String>,
        range: Option<Range>,
    },
    /// `@a`、`@a[i]`
    PatternOffset {
        ident: Option<String>,
        index: Option<Box<Expr>>,
    },
    /// `!a`、`!a[i]`
    PatternLength {
        ident: Option<String>,
        index: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `<quantifier> of <items> [at e | in range]`
    Of {
        quantifier: Quantifier,
        items: OfItems,
        anchor: Option<Anchor>,
    },
    /// `for <quantifier> of <set> : ( body )`
    ForOf {
        quantifier: Quantifier,
        set: PatternSet,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    At(Box<Expr>),
    In(Range),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub lo: Box<Expr>,
    pub hi: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Quantifier {
    All,
    Any,
    None,
    Expr(Box<Expr>),
    Percent(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OfItems {
    Patterns(PatternSet),
    Exprs(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternSet {
    Them(Span),
    Items(Vec<PatternSetItem>),
}

/// `$a` 或 `$a*`（name 不含 `$`）
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSetItem {
    pub name: String,
    pub wildcard: bool,
    pub span: Span,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum UnaryOp {
    Not,    // not
    Neg,    // -
    BitNot, // ~
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum BinaryOp {
    Or,          // or
    And,         // and
    Eq,          // ==
    Ne,          // !=
    Contains,    // contains
    IContains,   // icontains
    StartsWith,  // startswith
    IStartsWith, // istartswith
    EndsWith,    // endswith
    IEndsWith,   // iendswith
    IEquals,     // iequals
    Matches,     // matches
    Lt,          // <
    Le,          // <=
    Gt,          // >
    Ge,          // >=
    BitOr,       // |
    BitXor,      // ^
    BitAnd,      // &
    Shl,         // <<
    Shr,         // >>
    Add,         // +
    Sub,         // -
    Mul,         // *
    Div,         // \
    Mod,         // %
}

impl BinaryOp {
    /// 结合优先级（数值越大越紧）
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Contains
            | BinaryOp::IContains
            | BinaryOp::StartsWith
            | BinaryOp::IStartsWith
            | BinaryOp::EndsWith
            | BinaryOp::IEndsWith
            | BinaryOp::IEquals
            | BinaryOp::Matches => 3,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
            BinaryOp::BitOr => 5,
            BinaryOp::BitXor => 6,
            BinaryOp::BitAnd => 7,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Contains => "contains",
            BinaryOp::IContains => "icontains",
            BinaryOp::StartsWith => "startswith",
            BinaryOp::IStartsWith => "istartswith",
            BinaryOp::EndsWith => "endswith",
            BinaryOp::IEndsWith => "iendswith",
            BinaryOp::IEquals => "iequals",
            BinaryOp::Matches => "matches",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "\\",
            BinaryOp::Mod => "%",
        };
        f.write_str(text)
    }
}
