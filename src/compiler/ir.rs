//! 条件表达式的中间表示（已完成名称解析与类型检查）
//! 模式按规则内索引引用，变量按 schema 索引引用，规则按规则表索引引用
//! 运算辅助函数同时服务于编译期常量折叠与扫描期求值

use regex::bytes::Regex;

use crate::variables::Type;

/// 编译期常量
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(Vec<u8>),
}

/// 模式引用：规则内索引，或 for-of 循环中的当前模式（匿名 `$` / `#` / `@` / `!`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternRef {
    Id(usize),
    Current,
}

#[derive(Debug, Clone)]
pub enum Anchor {
    At(Box<Expr>),
    In(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum Quantifier {
    All,
    Any,
    None,
    Count(Box<Expr>),
    Percent(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum OfTargets {
    Patterns(Vec<usize>),
    Exprs(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumTy {
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpTy {
    Integer,
    Float,
    String,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrOp {
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    IEquals,
}

/// 整数读取函数：uint8/16/32、int8/16/32 及大端 `be` 变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFn {
    pub width: usize,
    pub signed: bool,
    pub big_endian: bool,
}

impl ReadFn {
    pub fn from_name(name: &str) -> Option<ReadFn> {
        let (base, big_endian) = match name.strip_suffix("be") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let (signed, width) = match base {
            "uint8" => (false, 1),
            "uint16" => (false, 2),
            "uint32" => (false, 4),
            "int8" => (true, 1),
            "int16" => (true, 2),
            "int32" => (true, 4),
            _ => return None,
        };
        // uint8be 之类的名称不存在
        if big_endian && width == 1 {
            return None;
        }
        Some(ReadFn {
            width,
            signed,
            big_endian,
        })
    }

    /// 越界或负偏移返回 None（未定义）
    pub fn read(&self, data: &[u8], offset: i64) -> Option<i64> {
        let start = usize::try_from(offset).ok()?;
        let bytes = data.get(start..start.checked_add(self.width)?)?;
        let mut raw = [0u8; 4];
        let value = match (self.width, self.big_endian) {
            (1, _) => {
                if self.signed {
                    bytes[0] as i8 as i64
                } else {
                    bytes[0] as i64
                }
            }
            (2, be) => {
                raw[..2].copy_from_slice(bytes);
                let v = if be {
                    u16::from_be_bytes([raw[0], raw[1]])
                } else {
                    u16::from_le_bytes([raw[0], raw[1]])
                };
                if self.signed {
                    v as i16 as i64
                } else {
                    v as i64
                }
            }
            (_, be) => {
                raw.copy_from_slice(bytes);
                let v = if be {
                    u32::from_be_bytes(raw)
                } else {
                    u32::from_le_bytes(raw)
                };
                if self.signed {
                    v as i32 as i64
                } else {
                    v as i64
                }
            }
        };
        Some(value)
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Const(Value),
    Filesize,
    Var {
        index: usize,
        ty: Type,
    },
    RuleRef(usize),
    PatternMatch {
        pattern: PatternRef,
        anchor: Option<Anchor>,
    },
    PatternCount {
        pattern: PatternRef,
        range: Option<(Box<Expr>, Box<Expr>)>,
    },
    /// `@a[i]`，i 从1开始
    PatternOffset {
        pattern: PatternRef,
        index: Box<Expr>,
    },
    /// `!a[i]`
    PatternLength {
        pattern: PatternRef,
        index: Box<Expr>,
    },
    Read {
        func: ReadFn,
        offset: Box<Expr>,
    },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Neg {
        ty: NumTy,
        operand: Box<Expr>,
    },
    BitNot(Box<Expr>),
    Arith {
        op: ArithOp,
        ty: NumTy,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Bitwise {
        op: BitOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        ty: CmpTy,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    StrOp {
        op: StrOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Matches {
        lhs: Box<Expr>,
        regex: Regex,
    },
    /// 整数 → 浮点的显式拓宽节点
    IntToFloat(Box<Expr>),
    Of {
        quantifier: Quantifier,
        targets: OfTargets,
        anchor: Option<Anchor>,
    },
    ForOf {
        quantifier: Quantifier,
        patterns: Vec<usize>,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }
}

// ===================== 运算辅助函数 =====================

/// 整数算术；溢出或除零返回 None（未定义）
#[inline]
pub fn int_arith(op: ArithOp, a: i64, b: i64) -> Option<i64> {
    match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => a.checked_div(b),
        ArithOp::Mod => a.checked_rem(b),
    }
}

/// 浮点算术遵循 IEEE 语义
#[inline]
pub fn float_arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => a % b,
    }
}

/// 位运算；移位量为负时未定义，移位量 >= 64 时结果为0
#[inline]
pub fn int_bitwise(op: BitOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BitOp::And => Some(a & b),
        BitOp::Or => Some(a | b),
        BitOp::Xor => Some(a ^ b),
        BitOp::Shl | BitOp::Shr => {
            if b < 0 {
                return None;
            }
            if b >= 64 {
                return Some(0);
            }
            Some(if op == BitOp::Shl {
                a.wrapping_shl(b as u32)
            } else {
                ((a as u64) >> b) as i64
            })
        }
    }
}

#[inline]
pub fn compare<T: PartialOrd + ?Sized>(op: CmpOp, a: &T, b: &T) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

pub fn str_op(op: StrOp, haystack: &[u8], needle: &[u8]) -> bool {
    match op {
        StrOp::Contains => contains(haystack, needle),
        StrOp::IContains => contains(
            &haystack.to_ascii_lowercase(),
            &needle.to_ascii_lowercase(),
        ),
        StrOp::StartsWith => haystack.starts_with(needle),
        StrOp::IStartsWith => haystack.len() >= needle.len()
            && haystack[..needle.len()].eq_ignore_ascii_case(needle),
        StrOp::EndsWith => haystack.ends_with(needle),
        StrOp::IEndsWith => haystack.len() >= needle.len()
            && haystack[haystack.len() - needle.len()..].eq_ignore_ascii_case(needle),
        StrOp::IEquals => haystack.eq_ignore_ascii_case(needle),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_arith_undefined() {
        assert_eq!(int_arith(ArithOp::Add, 1, 2), Some(3));
        assert_eq!(int_arith(ArithOp::Div, 7, 2), Some(3));
        assert_eq!(int_arith(ArithOp::Div, 1, 0), None);
        assert_eq!(int_arith(ArithOp::Mod, 1, 0), None);
        assert_eq!(int_arith(ArithOp::Add, i64::MAX, 1), None);
        assert_eq!(int_arith(ArithOp::Div, i64::MIN, -1), None);
        assert!(float_arith(ArithOp::Div, 1.0, 0.0).is_infinite());
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(int_bitwise(BitOp::Shl, 1, 4), Some(16));
        assert_eq!(int_bitwise(BitOp::Shl, 1, 64), Some(0));
        assert_eq!(int_bitwise(BitOp::Shr, -1, 63), Some(1));
        assert_eq!(int_bitwise(BitOp::Shr, 1, -1), None);
        assert_eq!(int_bitwise(BitOp::Xor, 0b1100, 0b1010), Some(0b0110));
    }

    #[test]
    fn test_str_ops() {
        assert!(str_op(StrOp::Contains, b"hello world", b"o w"));
        assert!(str_op(StrOp::IContains, b"Hello World", b"WORLD"));
        assert!(str_op(StrOp::StartsWith, b"hello", b"he"));
        assert!(str_op(StrOp::IStartsWith, b"Hello", b"hE"));
        assert!(!str_op(StrOp::IStartsWith, b"H", b"he"));
        assert!(str_op(StrOp::IEndsWith, b"file.EXE", b".exe"));
        assert!(str_op(StrOp::IEquals, b"ABC", b"abc"));
        assert!(!str_op(StrOp::EndsWith, b"abc", b"b"));
    }

    #[test]
    fn test_read_functions() {
        let data = [0x4D, 0x5A, 0xFF, 0xFF, 0x01, 0x00];
        let u16le = ReadFn::from_name("uint16").unwrap();
        assert_eq!(u16le.read(&data, 0), Some(0x5A4D));
        let u16be = ReadFn::from_name("uint16be").unwrap();
        assert_eq!(u16be.read(&data, 0), Some(0x4D5A));
        let i8 = ReadFn::from_name("int8").unwrap();
        assert_eq!(i8.read(&data, 2), Some(-1));
        let i32 = ReadFn::from_name("int32").unwrap();
        assert_eq!(i32.read(&data, 2), Some(0x0001_FFFF));
        // 越界 / 负偏移 未定义
        assert_eq!(u16le.read(&data, 5), None);
        assert_eq!(u16le.read(&data, -1), None);
        assert!(ReadFn::from_name("uint8be").is_none());
        assert!(ReadFn::from_name("uint64").is_none());
    }
}
