//! 扫描结果（全部可序列化）
use serde::Serialize;

use crate::error::EvalError;
use crate::indexer::Match;
use crate::parser::ast::MetaValue;

/// 单个模式的匹配记录（按偏移升序）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatches {
    pub identifier: String,
    pub matches: Vec<Match>,
}

/// 命中的规则
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchingRule {
    pub name: String,
    pub tags: Vec<String>,
    pub metadata: Vec<(String, MetaValue)>,
    /// 仅包含有匹配的非私有模式
    pub patterns: Vec<PatternMatches>,
}

/// 求值失败的规则（不计入命中，也不当作 false 静默丢弃）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleError {
    pub rule: String,
    pub error: EvalError,
}

/// 一次扫描的结果：命中列表按规则声明顺序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanResults {
    matching: Vec<MatchingRule>,
    errors: Vec<RuleError>,
}

impl ScanResults {
    pub(crate) fn new(matching: Vec<MatchingRule>, errors: Vec<RuleError>) -> Self {
        ScanResults { matching, errors }
    }

    pub fn matching_rules(&self) -> &[MatchingRule] {
        &self.matching
    }

    pub fn errors(&self) -> &[RuleError] {
        &self.errors
    }

    /// 命中规则数量
    pub fn len(&self) -> usize {
        self.matching.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matching.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchingRule> {
        self.matching.iter()
    }
}

impl<'a> IntoIterator for &'a ScanResults {
    type Item = &'a MatchingRule;
    type IntoIter = std::slice::Iter<'a, MatchingRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.matching.iter()
    }
}

impl IntoIterator for ScanResults {
    type Item = MatchingRule;
    type IntoIter = std::vec::IntoIter<MatchingRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.matching.into_iter()
    }
}
