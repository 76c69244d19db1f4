//! 编译模块：规则源码 → 不可变 Rules
//! add_source 只做解析（语法错误立即返回）；build 统一做语义分析与后端降级

mod analyzer;
mod hex;
pub mod ir;
mod patterns;
mod warnings;

pub use self::analyzer::ExprType;
pub use self::warnings::CompileWarning;

use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::time::Instant;

use self::analyzer::{DeclaredRule, RuleAnalyzer};
use self::patterns::{lower_pattern, PatternContext};
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileErrors, CompileResult, VariableError};
use crate::indexer::{CompiledPattern, PatternIndexBuilder};
use crate::parser::{self, ast, SourceCode, SourceFile, SourceLocation};
use crate::rules::{CompiledRule, RuleInfo, Rules};
use crate::variables::{Type, Variable, VariableSchema};

/// 编译统计
#[derive(Debug, Default)]
struct BuildStats {
    sources: usize,
    rules: usize,
    patterns: usize,
    warnings: usize,
}

/// 单条规则的编译产物（模式尚未写入全局索引）
struct RuleOutput {
    rule: CompiledRule,
    patterns: Vec<CompiledPattern>,
}

/// 规则编译器
/// 典型用法：new → declare_global/define_global → add_source(多次) → build
#[derive(Debug, Default)]
pub struct Compiler {
    config: CompilerConfig,
    sources: Vec<(SourceCode, SourceFile)>,
    schema: VariableSchema,
    warnings: RefCell<Vec<CompileWarning>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Compiler {
            config,
            ..Self::default()
        }
    }

    /// 添加一段规则源码
    /// 失败时编译器状态不变
    pub fn add_source(&mut self, text: &str) -> Result<&mut Self, CompileError> {
        self.push_source(SourceCode::new(text))
    }

    /// 添加一段带来源标记的规则源码（来源出现在错误位置中）
    pub fn add_source_with_origin(
        &mut self,
        text: &str,
        origin: &str,
    ) -> Result<&mut Self, CompileError> {
        self.push_source(SourceCode::new(text).with_origin(origin))
    }

    fn push_source(&mut self, source: SourceCode) -> Result<&mut Self, CompileError> {
        let start = Instant::now();
        let file = parser::parse_source(&source)?;
        log::debug!(
            "Source parsed | Origin: {} | Rules: {} | Time: {}µs",
            source.origin().unwrap_or("<inline>"),
            file.rules.len(),
            start.elapsed().as_micros()
        );
        self.sources.push((source, file));
        Ok(self)
    }

    /// 声明外部变量并给出默认值，变量类型由值决定
    /// 参数：value 可以是 i64/f64/bool/&str/String/Variable/serde_json::Value
    pub fn define_global<V>(&mut self, name: &str, value: V) -> Result<&mut Self, CompileError>
    where
        V: TryInto<Variable>,
        V::Error: Into<VariableError>,
    {
        let value: Variable = value
            .try_into()
            .map_err(|e| CompileError::Variable(e.into()))?;
        self.schema.declare(name, value.ty(), Some(value))?;
        Ok(self)
    }

    /// 仅声明外部变量类型，扫描前必须由 Scanner 绑定取值
    pub fn declare_global(&mut self, name: &str, ty: Type) -> Result<&mut Self, CompileError> {
        self.schema.declare(name, ty, None)?;
        Ok(self)
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn variables(&self) -> &VariableSchema {
        &self.schema
    }

    /// 最近一次 build 产生的警告
    pub fn warnings(&self) -> Vec<CompileWarning> {
        self.warnings.borrow().clone()
    }

    /// 构建不可变规则集；收集全部规则的错误，任一错误都不会产出 Rules
    /// 可重复调用，相同输入得到结构一致的结果
    pub fn build(&self) -> Result<Rules, CompileErrors> {
        let total_start = Instant::now();
        let mut stats = BuildStats {
            sources: self.sources.len(),
            ..BuildStats::default()
        };

        // ===================== 阶段1：规则语义分析与模式降级 =====================
        let stage_start = Instant::now();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut outputs = Vec::new();
        let mut declared: FxHashMap<String, DeclaredRule> = FxHashMap::default();
        let mut first_seen: FxHashMap<&str, SourceLocation> = FxHashMap::default();
        let mut rule_index = 0;

        for (source, file) in &self.sources {
            for rule in &file.rules {
                let location = source.location(rule.name_span);
                if let Some(first) = first_seen.get(rule.name.as_str()) {
                    errors.push(CompileError::DuplicateRule {
                        name: rule.name.clone(),
                        location,
                        first: first.clone(),
                    });
                    continue;
                }
                first_seen.insert(rule.name.as_str(), location.clone());

                match self.compile_rule(rule_index, rule, source, &declared, &mut warnings) {
                    Ok(output) => outputs.push(output),
                    Err(err) => {
                        log::debug!("Rule compile failed | Rule: {} | Error: {}", rule.name, err);
                        errors.push(err);
                    }
                }

                // 失败的规则同样登记，避免后续引用产生连带错误
                declared.insert(
                    rule.name.clone(),
                    DeclaredRule {
                        index: rule_index,
                        is_global: rule.is_global,
                    },
                );
                rule_index += 1;
            }
        }
        log::info!(
            "[Stage 1] Rules analyzed | Time: {}ms | Rules: {} | Errors: {}",
            stage_start.elapsed().as_millis(),
            rule_index,
            errors.len()
        );

        stats.warnings = warnings.len();
        for warning in &warnings {
            log::warn!("{}", warning);
        }
        *self.warnings.borrow_mut() = warnings.clone();

        if !errors.is_empty() {
            return Err(CompileErrors::new(errors));
        }

        // ===================== 阶段2：全局模式索引 =====================
        let stage_start = Instant::now();
        let mut builder = PatternIndexBuilder::new();
        let mut rules = Vec::with_capacity(outputs.len());
        for RuleOutput {
            mut rule,
            patterns,
        } in outputs
        {
            rule.first_pattern = builder.pattern_count();
            rule.pattern_count = patterns.len();
            for pattern in patterns {
                builder.add_pattern(pattern);
            }
            rules.push(rule);
        }
        stats.rules = rules.len();
        stats.patterns = builder.pattern_count();
        let index = builder.build().map_err(CompileErrors::from)?;
        log::info!(
            "[Stage 2] Pattern index built | Time: {}ms | Patterns: {}",
            stage_start.elapsed().as_millis(),
            stats.patterns
        );

        log::info!(
            "Build finished | Total Time: {}ms | Sources: {} | Rules: {} | Warnings: {}",
            total_start.elapsed().as_millis(),
            stats.sources,
            stats.rules,
            stats.warnings
        );
        log::debug!("Build stats: {:?} | Index: {:?}", stats, index.stats());

        Ok(Rules::new(rules, index, self.schema.clone(), warnings))
    }

    /// 编译单条规则：模式校验与降级 → 条件分析
    fn compile_rule(
        &self,
        rule_index: usize,
        rule: &ast::Rule,
        source: &SourceCode,
        declared: &FxHashMap<String, DeclaredRule>,
        warnings: &mut Vec<CompileWarning>,
    ) -> CompileResult<RuleOutput> {
        if self.schema.index_of(&rule.name).is_some() {
            return Err(CompileError::ConflictingRuleIdentifier {
                name: rule.name.clone(),
                location: source.location(rule.name_span),
            });
        }

        let mut seen = FxHashSet::default();
        for pattern in &rule.patterns {
            if !seen.insert(pattern.identifier.as_str()) {
                return Err(CompileError::DuplicatePattern {
                    rule: rule.name.clone(),
                    identifier: pattern.identifier.clone(),
                    location: source.location(pattern.span),
                });
            }
        }

        let ctx = PatternContext {
            rule_index,
            rule_name: &rule.name,
            source,
            config: &self.config,
        };
        let mut rule_warnings = Vec::new();
        let mut patterns = Vec::with_capacity(rule.patterns.len());
        for pattern in &rule.patterns {
            let (compiled, warning) = lower_pattern(&ctx, pattern)?;
            log::debug!(
                "Pattern lowered | Rule: {} | ${} | Plan: {}",
                rule.name,
                compiled.identifier,
                compiled.describe()
            );
            rule_warnings.extend(warning);
            patterns.push(compiled);
        }

        let analyzed =
            RuleAnalyzer::new(rule, source, &self.schema, declared, &self.config).analyze()?;
        rule_warnings.extend(analyzed.warning);
        warnings.extend(rule_warnings);

        let info = RuleInfo {
            name: rule.name.clone(),
            tags: rule.tags.clone(),
            metadata: rule
                .meta
                .iter()
                .map(|m| (m.key.clone(), m.value.clone()))
                .collect(),
            is_private: rule.is_private,
            is_global: rule.is_global,
            patterns: rule.patterns.iter().map(|p| p.identifier.clone()).collect(),
        };

        log::debug!(
            "Rule compiled | Rule: {} | Patterns: {} | Global: {} | Private: {}",
            info.name,
            patterns.len(),
            info.is_global,
            info.is_private
        );

        Ok(RuleOutput {
            rule: CompiledRule {
                info,
                condition: analyzed.condition,
                first_pattern: 0,
                pattern_count: 0,
            },
            patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_add_source_syntax_error_keeps_state() {
        let mut compiler = Compiler::new();
        compiler.add_source("rule a { condition: true }").unwrap();
        let err = compiler.add_source("bad rule").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        // 失败的源码不会进入编译器
        let rules = compiler.build().unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_duplicate_rule_across_sources() {
        let mut compiler = Compiler::new();
        compiler
            .add_source_with_origin("rule a { condition: true }", "one.yar")
            .unwrap()
            .add_source_with_origin("rule a { condition: false }", "two.yar")
            .unwrap();
        let errors = compiler.build().unwrap_err();
        assert_eq!(errors.kind(), ErrorKind::Semantic);
        match errors.first() {
            CompileError::DuplicateRule {
                location, first, ..
            } => {
                assert_eq!(location.origin.as_deref(), Some("two.yar"));
                assert_eq!(first.origin.as_deref(), Some("one.yar"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_errors_are_collected_per_rule() {
        crate::init_test_logger();
        let mut compiler = Compiler::new();
        compiler
            .add_source(
                r#"
                rule a { strings: $x = "abc" condition: true }
                rule b { condition: 1 == "one" }
                rule c { condition: a and b }
                "#,
            )
            .unwrap();
        let errors = compiler.build().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors.first(), CompileError::UnusedPattern { .. }));
        assert_eq!(errors.iter().nth(1).unwrap().kind(), ErrorKind::Type);
    }

    #[test]
    fn test_variables() {
        let mut compiler = Compiler::new();
        compiler.define_global("some_int", 0).unwrap();
        compiler.declare_global("name", Type::String).unwrap();
        assert!(matches!(
            compiler.define_global("some_int", 1),
            Err(CompileError::Variable(VariableError::AlreadyDeclared(_)))
        ));
        assert_eq!(
            compiler
                .define_global("nothing", serde_json::Value::Null)
                .err()
                .unwrap()
                .kind(),
            ErrorKind::Type
        );
        assert!(compiler.define_global("rule", true).is_err());

        compiler
            .add_source("rule some_int { condition: true }")
            .unwrap();
        assert!(matches!(
            compiler.build().unwrap_err().first(),
            CompileError::ConflictingRuleIdentifier { .. }
        ));
    }

    #[test]
    fn test_rule_dependencies() {
        let mut compiler = Compiler::new();
        compiler
            .add_source(
                r#"
                rule helper { condition: true }
                global rule g { condition: helper }
                "#,
            )
            .unwrap();
        assert!(matches!(
            compiler.build().unwrap_err().first(),
            CompileError::WrongRuleDependency { .. }
        ));

        // 只能引用之前声明的规则
        let mut compiler = Compiler::new();
        compiler
            .add_source("rule a { condition: b } rule b { condition: true }")
            .unwrap();
        assert_eq!(compiler.build().unwrap_err().kind(), ErrorKind::Syntax);
    }

    #[test]
    fn test_warnings() {
        crate::init_test_logger();
        let mut compiler = Compiler::new();
        compiler
            .add_source(
                r#"
                rule slow { strings: $a = /[0-9]+/ condition: $a }
                rule fixed { condition: 2 > 1 }
                "#,
            )
            .unwrap();
        let rules = compiler.build().unwrap();
        assert_eq!(rules.warnings().len(), 2);
        assert_eq!(compiler.warnings().len(), 2);

        let mut strict = Compiler::with_config(
            CompilerConfig::custom().error_on_slow_pattern(true).build(),
        );
        strict
            .add_source("rule slow { strings: $a = /[0-9]+/ condition: $a }")
            .unwrap();
        assert!(matches!(
            strict.build().unwrap_err().first(),
            CompileError::SlowPattern { .. }
        ));
    }

    #[test]
    fn test_build_is_deterministic() {
        crate::init_test_logger();
        let mut compiler = Compiler::new();
        compiler
            .add_source(
                r#"
                rule a { strings: $x = "foo" nocase $y = { 4D 5A ?? 00 } condition: any of them }
                rule b { strings: $z = /ba[rz]+/ condition: #z > 1 and a }
                "#,
            )
            .unwrap();
        let first = format!("{:?}", compiler.build().unwrap());
        let second = format!("{:?}", compiler.build().unwrap());
        assert_eq!(first, second);
    }
}
