use regex::bytes::Regex;

use super::enums::MatchGate;

/// 文本模式的一个编码变体（ascii / wide，可叠加 nocase）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralVariant {
    /// 已按编码展开的字节（wide 为 UTF-16LE 交错）
    pub bytes: Vec<u8>,
    pub nocase: bool,
    pub wide: bool,
}

/// 模式的匹配方案
#[derive(Debug, Clone)]
pub enum PatternPlan {
    /// 纯字面量：原子即完整模式，命中即匹配（仅需 fullword 校验）
    Literal(Vec<LiteralVariant>),
    /// 正则（含带通配的十六进制串）
    Regex {
        /// 非锚定正则，用于 Gate / Open 扫描
        regex: Regex,
        /// `\A(?:...)` 锚定版本，用于前缀原子命中处的校验
        anchored: Regex,
        gate: MatchGate,
    },
}

/// 编译后的匹配模式（全局模式表中的一项）
/// 职责：封装「如何匹配」的完整逻辑，包含匹配方案、准入网关与校验标志
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// 所属规则索引
    pub rule: usize,
    /// 模式标识符（不含 `$`）
    pub identifier: String,
    /// private 模式不出现在扫描结果中
    pub is_private: bool,
    /// 匹配两侧不得紧邻字母数字
    pub fullword: bool,
    pub plan: PatternPlan,
}

impl CompiledPattern {
    /// 方案描述（日志用）
    pub fn describe(&self) -> String {
        match &self.plan {
            PatternPlan::Literal(variants) => format!(
                "Literal(variants={}, fullword={})",
                variants.len(),
                self.fullword
            ),
            PatternPlan::Regex { regex, gate, .. } => {
                format!("Regex({}) gate={}", regex.as_str(), gate)
            }
        }
    }
}
