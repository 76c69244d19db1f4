//! 编译警告：不阻断构建，随 Rules 一起返回

use serde::Serialize;
use std::fmt;

use crate::parser::SourceLocation;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CompileWarning {
    /// 模式没有可用原子或原子过短，扫描时需要对整个缓冲区执行
    SlowPattern {
        rule: String,
        identifier: String,
        location: SourceLocation,
    },
    /// 条件折叠为常量
    InvariantExpression {
        rule: String,
        value: bool,
        location: SourceLocation,
    },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileWarning::SlowPattern {
                rule,
                identifier,
                location,
            } => write!(
                f,
                "slow pattern `${}` in rule `{}` at {}",
                identifier, rule, location
            ),
            CompileWarning::InvariantExpression {
                rule,
                value,
                location,
            } => write!(
                f,
                "condition of rule `{}` is always {} at {}",
                rule, value, location
            ),
        }
    }
}
