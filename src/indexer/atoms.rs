//! 正则原子规划：从 HIR 折叠出 MatchGate
//! 优先级：有限前缀集（锚定校验）> 必现字面量并集（准入）> 短前缀 > 无准入

use regex_syntax::hir::literal::{ExtractKind, Extractor};
use regex_syntax::hir::{Hir, HirKind};

use super::enums::{Atom, MatchGate};

/// 前缀集合规模上限，超过则视为无限
const PREFIX_LIMIT_TOTAL: usize = 64;
/// 字符类展开上限（`[Aa]` 这类大小写类可展开，`\d` 不展开）
const PREFIX_LIMIT_CLASS: usize = 4;

/// 规划正则的准入网关
/// 参数：
/// - hir: 大小写敏感解析得到的 HIR
/// - nocase: 正则是否忽略大小写（原子进入忽略大小写自动机）
/// - min_len: 可接受的最短原子长度
pub fn plan_regex_gate(hir: &Hir, nocase: bool, min_len: usize) -> MatchGate {
    // 含断言（^ $ \b 等）时，切片后的锚定校验会丢失上下文，不能用前缀锚定
    let anchorable = hir.properties().look_set().is_empty();
    let prefixes = if anchorable { prefix_literals(hir) } else { None };

    // 1. 有限前缀集，且最短前缀足够长
    if let Some(prefixes) = &prefixes {
        if prefixes.iter().all(|p| p.len() >= min_len) {
            return MatchGate::Anchor(to_atoms(prefixes, nocase));
        }
    }

    // 2. 必现字面量（拼接取最优子节点，选择取并集）
    if let Some(required) = required_literals(hir) {
        if required.iter().all(|lit| lit.len() >= min_len) {
            return MatchGate::RequireAnyAtom(to_atoms(&required, nocase));
        }
    }

    // 3. 前缀过短也好过无准入（会产生慢模式警告）
    if let Some(prefixes) = prefixes {
        return MatchGate::Anchor(to_atoms(&prefixes, nocase));
    }

    MatchGate::Open
}

fn to_atoms(literals: &[Vec<u8>], nocase: bool) -> Vec<Atom> {
    let mut atoms: Vec<Atom> = literals.iter().map(|lit| Atom::new(lit, nocase)).collect();
    atoms.sort_by(|a, b| a.bytes.cmp(&b.bytes));
    atoms.dedup();
    atoms
}

/// 有限、非空、不含空串的前缀集合
fn prefix_literals(hir: &Hir) -> Option<Vec<Vec<u8>>> {
    let mut extractor = Extractor::new();
    extractor
        .kind(ExtractKind::Prefix)
        .limit_class(PREFIX_LIMIT_CLASS)
        .limit_total(PREFIX_LIMIT_TOTAL);
    let seq = extractor.extract(hir);
    let literals = seq.literals()?;
    if literals.is_empty() || literals.iter().any(|lit| lit.as_bytes().is_empty()) {
        return None;
    }
    Some(literals.iter().map(|lit| lit.as_bytes().to_vec()).collect())
}

/// 每个匹配都必然包含其中至少一个字面量
/// 关键：Concat 取最优子节点（任一必现即可），Alternation 取各分支并集
fn required_literals(hir: &Hir) -> Option<Vec<Vec<u8>>> {
    match hir.kind() {
        HirKind::Literal(lit) => {
            if lit.0.is_empty() {
                None
            } else {
                Some(vec![lit.0.to_vec()])
            }
        }
        HirKind::Capture(cap) => required_literals(&cap.sub),
        HirKind::Repetition(rep) if rep.min >= 1 => required_literals(&rep.sub),
        HirKind::Concat(subs) => {
            let mut candidates: Vec<Vec<Vec<u8>>> = Vec::new();
            let mut run: Vec<u8> = Vec::new();
            for sub in subs {
                // 相邻字面量合并为更长的连续串
                if let HirKind::Literal(lit) = sub.kind() {
                    run.extend_from_slice(&lit.0);
                    continue;
                }
                if !run.is_empty() {
                    candidates.push(vec![std::mem::take(&mut run)]);
                }
                if let Some(set) = required_literals(sub) {
                    candidates.push(set);
                }
            }
            if !run.is_empty() {
                candidates.push(vec![run]);
            }
            candidates.into_iter().max_by(|a, b| score(a).cmp(&score(b)))
        }
        HirKind::Alternation(alts) => {
            let mut union = Vec::new();
            for alt in alts {
                union.extend(required_literals(alt)?);
            }
            union.sort();
            union.dedup();
            Some(union)
        }
        _ => None,
    }
}

/// 评分：最短成员越长越好，其次成员越少越好
fn score(set: &[Vec<u8>]) -> (usize, std::cmp::Reverse<usize>) {
    let min_len = set.iter().map(Vec::len).min().unwrap_or(0);
    (min_len, std::cmp::Reverse(set.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex_syntax::ParserBuilder;

    fn hir(pattern: &str) -> Hir {
        ParserBuilder::new()
            .unicode(false)
            .utf8(false)
            .build()
            .parse(pattern)
            .unwrap()
    }

    fn atom_bytes(gate: &MatchGate) -> Vec<Vec<u8>> {
        gate.atoms().iter().map(|a| a.bytes.clone()).collect()
    }

    #[test]
    fn test_prefix_anchor() {
        let gate = plan_regex_gate(&hir(r"abc\d+"), false, 2);
        assert!(matches!(gate, MatchGate::Anchor(_)));
        assert_eq!(atom_bytes(&gate), vec![b"abc".to_vec()]);

        let gate = plan_regex_gate(&hir(r"(foo|bar)baz"), false, 2);
        assert!(matches!(gate, MatchGate::Anchor(_)));
        assert_eq!(gate.atoms().len(), 2);
    }

    #[test]
    fn test_required_literal_gate() {
        // 前缀为空，退回必现字面量
        let gate = plan_regex_gate(&hir(r"[a-z]+hello\d"), false, 2);
        assert!(matches!(gate, MatchGate::RequireAnyAtom(_)));
        assert_eq!(atom_bytes(&gate), vec![b"hello".to_vec()]);

        // 选择取并集
        let gate = plan_regex_gate(&hir(r"\d+(?:foo|barx)\d"), false, 2);
        assert_eq!(atom_bytes(&gate), vec![b"barx".to_vec(), b"foo".to_vec()]);
    }

    #[test]
    fn test_lookaround_disables_anchor() {
        let gate = plan_regex_gate(&hir(r"\bword\b"), false, 2);
        assert!(matches!(gate, MatchGate::RequireAnyAtom(_)));
    }

    #[test]
    fn test_open_gate() {
        let gate = plan_regex_gate(&hir(r"[a-z]+\d*"), false, 2);
        assert_eq!(gate, MatchGate::Open);
        assert_eq!(gate.min_atom_len(), None);
    }

    #[test]
    fn test_nocase_atoms_lowercased() {
        let gate = plan_regex_gate(&hir(r"HeLLo"), true, 2);
        assert_eq!(atom_bytes(&gate), vec![b"hello".to_vec()]);
        assert!(gate.atoms()[0].nocase);
    }
}
