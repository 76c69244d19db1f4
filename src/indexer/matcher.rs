use aho_corasick::AhoCorasick;
use regex::bytes::Regex;
use serde::Serialize;

use super::builder::{AtomAction, AtomEntry, IndexStats};
use super::compiled::{CompiledPattern, PatternPlan};
use crate::config::ScanOptions;
use crate::utils::preview::preview_bytes;

/// 单次匹配记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Match {
    pub offset: usize,
    pub length: usize,
}

/// 一次扫描的全部匹配，按全局模式ID索引
/// 每个模式的匹配按偏移升序、同一偏移只保留一条
#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    per_pattern: Vec<Vec<Match>>,
}

impl MatchSet {
    pub fn new(pattern_count: usize) -> Self {
        MatchSet {
            per_pattern: vec![Vec::new(); pattern_count],
        }
    }

    /// 某模式的全部匹配（未知ID返回空切片）
    #[inline(always)]
    pub fn get(&self, pattern: usize) -> &[Match] {
        self.per_pattern.get(pattern).map_or(&[], Vec::as_slice)
    }

    pub fn total(&self) -> usize {
        self.per_pattern.iter().map(Vec::len).sum()
    }

    /// 复用内存：清空记录但保留容量
    pub fn reset(&mut self, pattern_count: usize) {
        self.per_pattern.iter_mut().for_each(Vec::clear);
        self.per_pattern.resize_with(pattern_count, Vec::new);
    }

    /// 上限按去重后的偏移计算：命中来自多个原子、两个自动机，到达顺序不保证升序，
    /// 先收下再压缩，保留偏移最小的 cap 条
    #[inline(always)]
    fn push(&mut self, pattern: usize, m: Match, cap: usize) {
        let list = &mut self.per_pattern[pattern];
        list.push(m);
        if list.len() > cap.saturating_mul(2) {
            compact(list, cap);
        }
    }

    fn finalize(&mut self, cap: usize) {
        for list in &mut self.per_pattern {
            compact(list, cap);
        }
    }
}

/// 排序 + 同偏移去重 + 截断
fn compact(list: &mut Vec<Match>, cap: usize) {
    list.sort_unstable();
    list.dedup_by_key(|m| m.offset);
    list.truncate(cap);
}

/// 只读的全局模式索引（编译结果的一部分，扫描期共享）
#[derive(Debug)]
pub struct PatternIndex {
    patterns: Vec<CompiledPattern>,
    atoms: Vec<AtomEntry>,
    exact: Option<AhoCorasick>,
    /// 自动机内部模式ID → 原子表ID
    exact_atoms: Vec<usize>,
    nocase: Option<AhoCorasick>,
    nocase_atoms: Vec<usize>,
    /// 无准入条件的正则，每次扫描都执行
    open_patterns: Vec<usize>,
    stats: IndexStats,
}

impl PatternIndex {
    pub(crate) fn new(
        patterns: Vec<CompiledPattern>,
        atoms: Vec<AtomEntry>,
        exact: (Option<AhoCorasick>, Vec<usize>),
        nocase: (Option<AhoCorasick>, Vec<usize>),
        open_patterns: Vec<usize>,
        stats: IndexStats,
    ) -> Self {
        PatternIndex {
            patterns,
            atoms,
            exact: exact.0,
            exact_atoms: exact.1,
            nocase: nocase.0,
            nocase_atoms: nocase.1,
            open_patterns,
            stats,
        }
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// 单遍扫描：两个自动机各一次线性重叠匹配，命中扇出到所有目标后做校验
    /// 参数：
    /// - data: 待扫描字节
    /// - options: 扫描选项（匹配数上限）
    /// - out: 输出匹配集（会被重置）
    pub fn search(&self, data: &[u8], options: &ScanOptions, out: &mut MatchSet) {
        out.reset(self.patterns.len());
        let cap = options.max_matches_per_pattern;
        let mut triggered = vec![false; self.patterns.len()];

        let automata = [
            (self.exact.as_ref(), &self.exact_atoms),
            (self.nocase.as_ref(), &self.nocase_atoms),
        ];
        for (automaton, atom_ids) in automata {
            let Some(ac) = automaton else {
                continue;
            };
            for hit in ac.find_overlapping_iter(data) {
                let entry = &self.atoms[atom_ids[hit.pattern().as_usize()]];
                for target in &entry.targets {
                    let pattern = &self.patterns[target.pattern];
                    match target.action {
                        AtomAction::Literal { wide } => {
                            if pattern.fullword && !is_full_word(data, hit.start(), hit.end(), wide)
                            {
                                continue;
                            }
                            out.push(
                                target.pattern,
                                Match {
                                    offset: hit.start(),
                                    length: hit.len(),
                                },
                                cap,
                            );
                        }
                        AtomAction::Anchor => {
                            if let PatternPlan::Regex { anchored, .. } = &pattern.plan {
                                if let Some(m) = anchored.find(&data[hit.start()..]) {
                                    let (start, end) = (hit.start(), hit.start() + m.end());
                                    if m.end() > 0
                                        && (!pattern.fullword || is_full_word(data, start, end, false))
                                    {
                                        out.push(
                                            target.pattern,
                                            Match {
                                                offset: start,
                                                length: end - start,
                                            },
                                            cap,
                                        );
                                    }
                                }
                            }
                        }
                        AtomAction::Gate => triggered[target.pattern] = true,
                    }
                }
            }
        }

        for &id in &self.open_patterns {
            triggered[id] = true;
        }
        let triggered_ids = triggered
            .iter()
            .enumerate()
            .filter(|(_, t)| **t)
            .map(|(id, _)| id);
        for id in triggered_ids {
            let pattern = &self.patterns[id];
            if let PatternPlan::Regex { regex, .. } = &pattern.plan {
                scan_regex(regex, data, pattern.fullword, |m| out.push(id, m, cap), cap);
            }
        }

        out.finalize(cap);

        if log::log_enabled!(log::Level::Trace) {
            for (id, pattern) in self.patterns.iter().enumerate() {
                if let Some(first) = out.get(id).first() {
                    log::trace!(
                        "Pattern matched | ${} | Rule: {} | Matches: {} | First: {} \"{}\"",
                        pattern.identifier,
                        pattern.rule,
                        out.get(id).len(),
                        first.offset,
                        preview_bytes(&data[first.offset..first.offset + first.length], 40)
                    );
                }
            }
        }
    }
}

/// 重叠扫描：每次从上一个匹配起点的下一字节继续，空匹配不记录
fn scan_regex(
    regex: &Regex,
    data: &[u8],
    fullword: bool,
    mut record: impl FnMut(Match),
    cap: usize,
) {
    let mut pos = 0;
    let mut recorded = 0;
    while pos <= data.len() && recorded < cap {
        let Some(m) = regex.find_at(data, pos) else {
            break;
        };
        if m.end() > m.start() && (!fullword || is_full_word(data, m.start(), m.end(), false)) {
            record(Match {
                offset: m.start(),
                length: m.end() - m.start(),
            });
            recorded += 1;
        }
        pos = m.start() + 1;
    }
}

/// 全词校验：匹配两侧不得紧邻 ASCII 字母数字（wide 模式检查 UTF-16LE 字符）
#[inline]
pub fn is_full_word(data: &[u8], start: usize, end: usize, wide: bool) -> bool {
    if wide {
        let before = start >= 2 && data[start - 1] == 0 && data[start - 2].is_ascii_alphanumeric();
        let after = end + 1 < data.len() && data[end + 1] == 0 && data[end].is_ascii_alphanumeric();
        !(before || after)
    } else {
        let before = start > 0 && data[start - 1].is_ascii_alphanumeric();
        let after = end < data.len() && data[end].is_ascii_alphanumeric();
        !(before || after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::builder::PatternIndexBuilder;
    use crate::indexer::compiled::LiteralVariant;
    use crate::indexer::enums::{Atom, MatchGate};
    use regex::bytes::RegexBuilder;

    fn literal(id: &str, bytes: &[u8], nocase: bool, wide: bool, fullword: bool) -> CompiledPattern {
        CompiledPattern {
            rule: 0,
            identifier: id.to_string(),
            is_private: false,
            fullword,
            plan: PatternPlan::Literal(vec![LiteralVariant {
                bytes: bytes.to_vec(),
                nocase,
                wide,
            }]),
        }
    }

    fn regex(id: &str, src: &str, gate: MatchGate) -> CompiledPattern {
        let build = |s: &str| RegexBuilder::new(s).unicode(false).build().unwrap();
        CompiledPattern {
            rule: 0,
            identifier: id.to_string(),
            is_private: false,
            fullword: false,
            plan: PatternPlan::Regex {
                regex: build(src),
                anchored: build(&format!(r"\A(?:{})", src)),
                gate,
            },
        }
    }

    fn search(patterns: Vec<CompiledPattern>, data: &[u8]) -> MatchSet {
        let mut builder = PatternIndexBuilder::new();
        for p in patterns {
            builder.add_pattern(p);
        }
        let index = builder.build().unwrap();
        let mut out = MatchSet::default();
        index.search(data, &ScanOptions::default(), &mut out);
        out
    }

    #[test]
    fn test_overlapping_literal_matches() {
        let out = search(vec![literal("a", b"aa", false, false, false)], b"aaaa");
        let offsets: Vec<usize> = out.get(0).iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_nocase_and_fullword() {
        let out = search(
            vec![
                literal("a", b"foo", true, false, false),
                literal("b", b"foo", false, false, true),
            ],
            b"FOO foobar foo",
        );
        assert_eq!(out.get(0).len(), 3);
        // fullword 只接受最后一个
        assert_eq!(out.get(1), &[Match { offset: 11, length: 3 }]);
    }

    #[test]
    fn test_wide_fullword() {
        let data = b"a\x00b\x00c\x00 \x00b\x00c\x00";
        let out = search(vec![literal("w", b"b\x00c\x00", false, true, true)], data);
        assert_eq!(out.get(0), &[Match { offset: 8, length: 4 }]);
    }

    #[test]
    fn test_regex_plans() {
        let data = b"xx abc123 yy abc9";
        let out = search(
            vec![
                regex("anchored", r"abc[0-9]+", MatchGate::Anchor(vec![Atom::new(b"abc", false)])),
                regex("gated", r"[a-z]+9", MatchGate::RequireAnyAtom(vec![Atom::new(b"9", false)])),
                regex("open", r"y+", MatchGate::Open),
            ],
            data,
        );
        assert_eq!(
            out.get(0),
            &[Match { offset: 3, length: 6 }, Match { offset: 13, length: 4 }]
        );
        // 重叠扫描：abc9 / bc9 / c9
        assert_eq!(out.get(1).len(), 3);
        assert_eq!(out.get(2).iter().map(|m| m.offset).collect::<Vec<_>>(), vec![10, 11]);
    }

    #[test]
    fn test_match_cap() {
        let mut builder = PatternIndexBuilder::new();
        builder.add_pattern(literal("a", b"a", false, false, false));
        let index = builder.build().unwrap();
        let mut out = MatchSet::default();
        let options = ScanOptions::custom().max_matches_per_pattern(2).build();
        index.search(b"aaaaa", &options, &mut out);
        assert_eq!(out.get(0).len(), 2);
        assert_eq!(out.total(), 2);
    }

    #[test]
    fn test_cap_counts_distinct_offsets() {
        let mut out = MatchSet::new(1);
        // 同一偏移的重复命中不占名额，乱序到达时保留偏移最小的
        for (offset, length) in [(9, 3), (0, 3), (0, 3), (0, 2), (3, 3), (3, 3), (6, 3)] {
            out.push(0, Match { offset, length }, 2);
        }
        out.finalize(2);
        assert_eq!(
            out.get(0),
            &[Match { offset: 0, length: 2 }, Match { offset: 3, length: 3 }]
        );
    }
}
