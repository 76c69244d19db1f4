//! 编译产物：不可变、Arc 共享的规则集
use serde::Serialize;
use std::sync::Arc;

use crate::compiler::ir;
use crate::compiler::CompileWarning;
use crate::indexer::PatternIndex;
use crate::parser::ast::MetaValue;
use crate::scanner::{ScanResults, Scanner};
use crate::variables::VariableSchema;

/// 规则描述（对外只读）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleInfo {
    pub name: String,
    pub tags: Vec<String>,
    pub metadata: Vec<(String, MetaValue)>,
    pub is_private: bool,
    pub is_global: bool,
    /// 模式标识符（不含 `$`），顺序即声明顺序
    pub patterns: Vec<String>,
}

/// 编译后的规则：条件 + 该规则在全局模式表中的连续区间
#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub info: RuleInfo,
    pub condition: ir::Expr,
    pub first_pattern: usize,
    pub pattern_count: usize,
}

impl CompiledRule {
    /// 规则内模式索引 → 全局模式 ID
    #[inline]
    pub fn global_pattern(&self, local: usize) -> usize {
        self.first_pattern + local
    }
}

#[derive(Debug)]
pub(crate) struct RulesInner {
    pub rules: Vec<CompiledRule>,
    pub index: PatternIndex,
    pub schema: VariableSchema,
    pub warnings: Vec<CompileWarning>,
}

/// 不可变规则集，克隆只增加引用计数，可跨线程共享
#[derive(Debug, Clone)]
pub struct Rules {
    inner: Arc<RulesInner>,
}

impl Rules {
    pub(crate) fn new(
        rules: Vec<CompiledRule>,
        index: PatternIndex,
        schema: VariableSchema,
        warnings: Vec<CompileWarning>,
    ) -> Self {
        Rules {
            inner: Arc::new(RulesInner {
                rules,
                index,
                schema,
                warnings,
            }),
        }
    }

    pub(crate) fn inner(&self) -> &RulesInner {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rules.is_empty()
    }

    /// 按声明顺序遍历规则描述（包含私有规则）
    pub fn iter(&self) -> impl Iterator<Item = &RuleInfo> {
        self.inner.rules.iter().map(|r| &r.info)
    }

    pub fn get(&self, name: &str) -> Option<&RuleInfo> {
        self.iter().find(|info| info.name == name)
    }

    /// 外部变量声明表（只读），调用方可在扫描前校验绑定
    pub fn variables(&self) -> &VariableSchema {
        &self.inner.schema
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.inner.warnings
    }

    /// 一次性扫描：使用变量默认值
    pub fn scan(&self, data: &[u8]) -> ScanResults {
        Scanner::new(self).scan(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_rules_are_send_sync() {
        assert_send_sync::<Rules>();
    }

    #[test]
    fn test_rule_descriptors() {
        let rules = compile(
            r#"
            private rule helper : internal { condition: filesize > 0 }
            rule tagged : one two {
                meta:
                    author = "someone"
                    score = 10
                strings:
                    $a = "abc"
                condition:
                    $a and helper
            }
            "#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.get("helper").unwrap().is_private);

        let tagged = rules.get("tagged").unwrap();
        assert_eq!(tagged.tags, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(tagged.metadata[0].0, "author");
        assert_eq!(tagged.metadata[1].1, MetaValue::Integer(10));
        assert_eq!(tagged.patterns, vec!["a".to_string()]);
    }

    #[test]
    fn test_shared_across_threads() {
        crate::init_test_logger();
        let rules = compile(r#"rule foo { strings: $a = "foo" condition: $a }"#).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let rules = rules.clone();
                std::thread::spawn(move || {
                    let data = if i % 2 == 0 { "foobar" } else { "bar" };
                    rules.scan(data.as_bytes()).len()
                })
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counts, vec![1, 0, 1, 0]);
    }
}
