use aho_corasick::{AhoCorasick, MatchKind};
use rustc_hash::FxHashMap;

use super::compiled::{CompiledPattern, PatternPlan};
use super::enums::{Atom, MatchGate};
use super::matcher::PatternIndex;
use crate::error::{CompileError, CompileResult};

/// 原子命中后对目标模式执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AtomAction {
    /// 字面量变体：原子即完整模式
    Literal { wide: bool },
    /// 正则前缀：在命中位置做锚定校验
    Anchor,
    /// 正则必现字面量：标记该正则需要执行
    Gate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AtomTarget {
    pub pattern: usize,
    pub action: AtomAction,
}

/// 去重后的原子表项：一个原子扇出到所有注册它的 (规则, 模式)
#[derive(Debug, Clone)]
pub(crate) struct AtomEntry {
    pub atom: Atom,
    pub targets: Vec<AtomTarget>,
}

/// 索引构建统计信息
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// 模式总数
    pub patterns: usize,
    /// 纯字面量模式数
    pub literal_patterns: usize,
    /// 前缀锚定正则数
    pub anchored_regexes: usize,
    /// 必现字面量准入正则数
    pub gated_regexes: usize,
    /// 无准入条件正则数（慢模式）
    pub open_regexes: usize,
    /// 注册的原子总数（去重前）
    pub registered_atoms: usize,
    /// 去重后的原子数
    pub unique_atoms: usize,
}

/// 全局模式索引构建器
/// 核心职责：
/// 1. 按插入顺序收集所有规则的编译模式，分配全局模式ID
/// 2. 原子按（字节, 大小写敏感性）去重，共享同一个自动机条目
/// 3. 构建精确 / ASCII忽略大小写 两个 Aho-Corasick 自动机
#[derive(Debug, Default)]
pub struct PatternIndexBuilder {
    patterns: Vec<CompiledPattern>,
    atoms: Vec<AtomEntry>,
    atom_ids: FxHashMap<Atom, usize>,
    open_patterns: Vec<usize>,
    stats: IndexStats,
}

impl PatternIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个编译模式
    /// 参数：pattern - 编译后的模式
    /// 返回：全局模式ID
    pub fn add_pattern(&mut self, pattern: CompiledPattern) -> usize {
        let id = self.patterns.len();
        self.stats.patterns += 1;

        match &pattern.plan {
            PatternPlan::Literal(variants) => {
                self.stats.literal_patterns += 1;
                for variant in variants {
                    self.register_atom(
                        Atom::new(&variant.bytes, variant.nocase),
                        AtomTarget {
                            pattern: id,
                            action: AtomAction::Literal { wide: variant.wide },
                        },
                    );
                }
            }
            PatternPlan::Regex { gate, .. } => match gate {
                MatchGate::Open => {
                    self.stats.open_regexes += 1;
                    self.open_patterns.push(id);
                }
                MatchGate::Anchor(atoms) => {
                    self.stats.anchored_regexes += 1;
                    for atom in atoms {
                        self.register_atom(
                            atom.clone(),
                            AtomTarget {
                                pattern: id,
                                action: AtomAction::Anchor,
                            },
                        );
                    }
                }
                MatchGate::RequireAnyAtom(atoms) => {
                    self.stats.gated_regexes += 1;
                    for atom in atoms {
                        self.register_atom(
                            atom.clone(),
                            AtomTarget {
                                pattern: id,
                                action: AtomAction::Gate,
                            },
                        );
                    }
                }
            },
        }

        self.patterns.push(pattern);
        id
    }

    fn register_atom(&mut self, atom: Atom, target: AtomTarget) {
        if atom.is_empty() {
            return;
        }
        self.stats.registered_atoms += 1;
        let entry_id = match self.atom_ids.get(&atom) {
            Some(&id) => id,
            None => {
                let id = self.atoms.len();
                self.atom_ids.insert(atom.clone(), id);
                self.atoms.push(AtomEntry {
                    atom,
                    targets: Vec::new(),
                });
                id
            }
        };
        let targets = &mut self.atoms[entry_id].targets;
        // 同一模式的多个相同原子（如 ascii + nocase 变体折叠）只保留一次
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// 构建自动机，生成只读的 PatternIndex
    pub fn build(mut self) -> CompileResult<PatternIndex> {
        self.stats.unique_atoms = self.atoms.len();

        let (exact_ids, nocase_ids): (Vec<usize>, Vec<usize>) =
            (0..self.atoms.len()).partition(|&id| !self.atoms[id].atom.nocase);

        let exact = Self::build_automaton(&self.atoms, &exact_ids, false)?;
        let nocase = Self::build_automaton(&self.atoms, &nocase_ids, true)?;

        log::debug!(
            "Pattern index built | Patterns: {} | Literal: {} | Anchored: {} | Gated: {} | Open: {} | Atoms: {} (unique {}) | Exact automaton: {} | Nocase automaton: {}",
            self.stats.patterns,
            self.stats.literal_patterns,
            self.stats.anchored_regexes,
            self.stats.gated_regexes,
            self.stats.open_regexes,
            self.stats.registered_atoms,
            self.stats.unique_atoms,
            exact_ids.len(),
            nocase_ids.len()
        );

        Ok(PatternIndex::new(
            self.patterns,
            self.atoms,
            (exact, exact_ids),
            (nocase, nocase_ids),
            self.open_patterns,
            self.stats,
        ))
    }

    fn build_automaton(
        atoms: &[AtomEntry],
        ids: &[usize],
        ascii_case_insensitive: bool,
    ) -> CompileResult<Option<AhoCorasick>> {
        if ids.is_empty() {
            return Ok(None);
        }
        let needles: Vec<&[u8]> = ids.iter().map(|&id| atoms[id].atom.bytes.as_slice()).collect();
        AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .ascii_case_insensitive(ascii_case_insensitive)
            .build(needles)
            .map(Some)
            .map_err(|e| CompileError::IndexBuild(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::compiled::LiteralVariant;

    fn literal(rule: usize, id: &str, bytes: &[u8], nocase: bool) -> CompiledPattern {
        CompiledPattern {
            rule,
            identifier: id.to_string(),
            is_private: false,
            fullword: false,
            plan: PatternPlan::Literal(vec![LiteralVariant {
                bytes: bytes.to_vec(),
                nocase,
                wide: false,
            }]),
        }
    }

    #[test]
    fn test_atoms_are_deduplicated() {
        let mut builder = PatternIndexBuilder::new();
        // 两条规则共享同一原子，大小写敏感性不同则不共享
        assert_eq!(builder.add_pattern(literal(0, "a", b"foo", false)), 0);
        assert_eq!(builder.add_pattern(literal(1, "b", b"foo", false)), 1);
        assert_eq!(builder.add_pattern(literal(1, "c", b"FOO", true)), 2);
        assert_eq!(builder.add_pattern(literal(2, "d", b"foo", true)), 3);

        assert_eq!(builder.atoms.len(), 2);
        assert_eq!(builder.atoms[0].targets.len(), 2);
        assert_eq!(builder.atoms[1].atom.bytes, b"foo".to_vec());
        assert_eq!(builder.atoms[1].targets.len(), 2);

        let index = builder.build().unwrap();
        assert_eq!(index.stats().unique_atoms, 2);
        assert_eq!(index.stats().registered_atoms, 4);
    }
}
