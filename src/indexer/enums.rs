use std::fmt;

use crate::utils::preview::preview_bytes;

/// 原子：进入 Aho-Corasick 自动机的最小字面量
/// nocase 原子以小写形式存储，放入 ASCII 忽略大小写的自动机
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub bytes: Vec<u8>,
    pub nocase: bool,
}

impl Atom {
    pub fn new(bytes: &[u8], nocase: bool) -> Self {
        let bytes = if nocase {
            bytes.to_ascii_lowercase()
        } else {
            bytes.to_vec()
        };
        Atom { bytes, nocase }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", preview_bytes(&self.bytes, 32))?;
        if self.nocase {
            write!(f, " nocase")?;
        }
        Ok(())
    }
}

/// 正则准入网关 - 编译期从 HIR 折叠出的剪枝规则
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MatchGate {
    /// 无任何准入条件，对整个缓冲区执行正则（慢模式）
    #[default]
    Open,
    /// 前缀锚点：每个匹配都以其中某个原子开头，命中位置处做锚定校验
    Anchor(Vec<Atom>),
    /// 必现字面量（并集）：任一原子命中后才对缓冲区执行正则
    RequireAnyAtom(Vec<Atom>),
}

impl MatchGate {
    pub fn atoms(&self) -> &[Atom] {
        match self {
            MatchGate::Open => &[],
            MatchGate::Anchor(atoms) | MatchGate::RequireAnyAtom(atoms) => atoms,
        }
    }

    /// 最短原子长度（Open 为 None）
    pub fn min_atom_len(&self) -> Option<usize> {
        self.atoms().iter().map(Atom::len).min()
    }
}

impl fmt::Display for MatchGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchGate::Open => write!(f, "Open"),
            MatchGate::Anchor(atoms) => write!(f, "Anchor({} atoms)", atoms.len()),
            MatchGate::RequireAnyAtom(atoms) => write!(f, "RequireAnyAtom({} atoms)", atoms.len()),
        }
    }
}
