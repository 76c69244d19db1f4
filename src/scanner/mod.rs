//! 扫描会话：持有变量绑定与匹配缓冲，引用不可变 Rules
//! 同一 Scanner 可反复扫描不同数据、在扫描之间重新绑定变量

mod eval;
mod results;

pub use self::results::{MatchingRule, PatternMatches, RuleError, ScanResults};

use std::time::Instant;

use self::eval::{Evaluator, RuleState};
use crate::config::ScanOptions;
use crate::error::VariableError;
use crate::indexer::MatchSet;
use crate::rules::Rules;
use crate::utils::preview_bytes;
use crate::variables::Variable;

/// 扫描器
#[derive(Debug)]
pub struct Scanner {
    rules: Rules,
    bindings: Vec<Option<Variable>>,
    options: ScanOptions,
    matches: MatchSet,
}

impl Scanner {
    /// 绑定规则集，变量初始化为声明时的默认值（无默认值则未绑定）
    pub fn new(rules: &Rules) -> Self {
        let bindings = rules
            .variables()
            .iter()
            .map(|decl| decl.default.clone())
            .collect();
        let pattern_count = rules.inner().index.len();
        Scanner {
            rules: rules.clone(),
            bindings,
            options: ScanOptions::default(),
            matches: MatchSet::new(pattern_count),
        }
    }

    /// 绑定外部变量
    /// 返回：变量未声明或类型不符时返回 TypeError 类错误，绑定保持不变
    pub fn set_global<V>(&mut self, name: &str, value: V) -> Result<&mut Self, VariableError>
    where
        V: TryInto<Variable>,
        V::Error: Into<VariableError>,
    {
        let value: Variable = value.try_into().map_err(Into::<VariableError>::into)?;
        let index = self.rules.variables().validate(name, &value)?;
        log::debug!("Variable bound | Name: {} | Value: {}", name, value);
        self.bindings[index] = Some(value);
        Ok(self)
    }

    pub fn set_options(&mut self, options: ScanOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// 扫描数据：一次多模式匹配 → 按声明顺序求值全部规则
    pub fn scan(&mut self, data: &[u8]) -> ScanResults {
        let start = Instant::now();
        let inner = self.rules.inner();

        // 1. 模式匹配
        self.matches.reset(inner.index.len());
        inner.index.search(data, &self.options, &mut self.matches);
        let match_time = start.elapsed();

        // 2. 条件求值
        let mut states = vec![RuleState::Pending; inner.rules.len()];
        let mut errors = Vec::new();
        for (idx, rule) in inner.rules.iter().enumerate() {
            let outcome = Evaluator::new(
                inner,
                rule,
                data,
                &self.matches,
                &self.bindings,
                &states,
            )
            .evaluate();
            states[idx] = match outcome {
                Ok(true) => RuleState::True,
                Ok(false) => RuleState::False,
                Err(error) => {
                    log::debug!("Rule evaluation failed | Rule: {} | Error: {}", rule.info.name, error);
                    errors.push(RuleError {
                        rule: rule.info.name.clone(),
                        error,
                    });
                    RuleState::Error
                }
            };
        }

        // 3. 汇总：任一全局规则不成立时，所有非全局规则被抑制；私有规则与私有模式不输出
        let globals_hold = inner
            .rules
            .iter()
            .zip(&states)
            .filter(|(rule, _)| rule.info.is_global)
            .all(|(_, state)| *state == RuleState::True);

        let mut matching = Vec::new();
        for (rule, state) in inner.rules.iter().zip(&states) {
            if *state != RuleState::True || rule.info.is_private {
                continue;
            }
            if !rule.info.is_global && !globals_hold {
                continue;
            }
            let patterns = (0..rule.pattern_count)
                .filter_map(|local| {
                    let id = rule.global_pattern(local);
                    let pattern = &inner.index.patterns()[id];
                    let found = self.matches.get(id);
                    if pattern.is_private || found.is_empty() {
                        return None;
                    }
                    Some(PatternMatches {
                        identifier: pattern.identifier.clone(),
                        matches: if self.options.include_matches {
                            found.to_vec()
                        } else {
                            Vec::new()
                        },
                    })
                })
                .collect();
            matching.push(MatchingRule {
                name: rule.info.name.clone(),
                tags: rule.info.tags.clone(),
                metadata: rule.info.metadata.clone(),
                patterns,
            });
        }

        log::debug!(
            "Scan finished | Data: {} | Size: {} | Pattern Matches: {} | Matched Rules: {} | Errors: {} | Match Time: {}µs | Total Time: {}µs",
            preview_bytes(data, 32),
            data.len(),
            self.matches.total(),
            matching.len(),
            errors.len(),
            match_time.as_micros(),
            start.elapsed().as_micros()
        );

        ScanResults::new(matching, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::error::{EvalError, ErrorKind};
    use crate::indexer::Match;
    use crate::{compile, Type};

    fn names(results: &ScanResults) -> Vec<&str> {
        results.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_simple_match() {
        crate::init_test_logger();
        let rules = compile(r#"rule foo { strings: $a = "foo" condition: $a }"#).unwrap();
        let results = rules.scan(b"foobar");
        assert_eq!(names(&results), vec!["foo"]);
        let pattern = &results.matching_rules()[0].patterns[0];
        assert_eq!(pattern.identifier, "a");
        assert_eq!(pattern.matches, vec![Match { offset: 0, length: 3 }]);

        // 无匹配时结果为空，不是错误
        let results = rules.scan(b"bar");
        assert!(results.is_empty());
        assert!(results.errors().is_empty());
    }

    #[test]
    fn test_rebinding_variables() {
        let mut compiler = Compiler::new();
        compiler.define_global("some_int", 0).unwrap();
        compiler
            .add_source("rule test { condition: some_int == 1 }")
            .unwrap();
        let rules = compiler.build().unwrap();

        let mut scanner = Scanner::new(&rules);
        scanner.set_global("some_int", 1).unwrap();
        assert_eq!(scanner.scan(b"").len(), 1);
        scanner.set_global("some_int", 2).unwrap();
        assert_eq!(scanner.scan(b"").len(), 0);

        // 类型不符或未声明
        let err = scanner.set_global("some_int", "text").err().unwrap();
        assert!(matches!(err, VariableError::TypeMismatch { .. }));
        assert!(matches!(
            scanner.set_global("missing", 1).err().unwrap(),
            VariableError::Undeclared(_)
        ));
        assert!(matches!(
            scanner.set_global("some_int", serde_json::Value::Null),
            Err(VariableError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_unbound_variable_is_an_error() {
        crate::init_test_logger();
        let mut compiler = Compiler::new();
        compiler.declare_global("limit", Type::Integer).unwrap();
        compiler
            .add_source(
                r#"
                rule uses_limit { condition: filesize < limit }
                rule depends { condition: uses_limit or true }
                rule plain { condition: filesize == 3 }
                "#,
            )
            .unwrap();
        let rules = compiler.build().unwrap();

        let results = Scanner::new(&rules).scan(b"abc");
        assert_eq!(names(&results), vec!["plain"]);
        assert_eq!(results.errors().len(), 2);
        assert_eq!(
            results.errors()[0].error,
            EvalError::UnboundVariable("limit".to_string())
        );
        assert_eq!(results.errors()[0].error.kind(), ErrorKind::Evaluation);
        assert_eq!(
            results.errors()[1].error,
            EvalError::DependencyFailed("uses_limit".to_string())
        );

        let mut scanner = Scanner::new(&rules);
        scanner.set_global("limit", 10).unwrap();
        let results = scanner.scan(b"abc");
        assert_eq!(names(&results), vec!["uses_limit", "depends", "plain"]);
    }

    #[test]
    fn test_global_and_private_rules() {
        crate::init_test_logger();
        let rules = compile(
            r#"
            global rule is_mz { condition: uint16(0) == 0x5A4D }
            private rule has_text { strings: $a = "text" condition: $a }
            rule combined { condition: has_text }
            rule other { strings: $b = "zzz" private condition: $b }
            "#,
        )
        .unwrap();

        let results = rules.scan(b"MZ..text..zzz");
        assert_eq!(names(&results), vec!["is_mz", "combined", "other"]);
        // 私有模式不输出
        let other = results.iter().find(|r| r.name == "other").unwrap();
        assert!(other.patterns.is_empty());

        // 全局规则不成立时非全局规则全部被抑制
        let results = rules.scan(b"PE..text..zzz");
        assert!(results.is_empty());
    }

    #[test]
    fn test_pattern_operators() {
        crate::init_test_logger();
        let rules = compile(
            r#"
            rule counts {
                strings:
                    $a = "ab"
                    $b = "cd"
                condition:
                    #a == 3 and @a[2] == 4 and !a[1] == 2 and $a at 8
                    and $b in (0..20) and #a in (0..4) == 2
            }
            rule quantifiers {
                strings:
                    $x1 = "ab"
                    $x2 = "cd"
                    $y = "nope"
                condition:
                    2 of ($x*) and any of them and not all of them
                    and 50% of them and none of ($y) and 1 of (true, false)
            }
            rule loops {
                strings:
                    $p = "ab"
                    $q = "cd"
                condition:
                    for all of them : ( # >= 1 and @ < 12 ) and for 1 of ($p) : ( ! == 2 )
            }
            "#,
        )
        .unwrap();
        let results = rules.scan(b"ab..ab..abcd");
        assert_eq!(names(&results), vec!["counts", "quantifiers", "loops"]);
    }

    #[test]
    fn test_modifiers_and_hex() {
        let rules = compile(
            r#"
            rule nocase { strings: $a = "HeLLo" nocase condition: $a }
            rule wide { strings: $a = "hi" wide condition: $a }
            rule fullword { strings: $a = "cat" fullword condition: #a == 1 }
            rule hex { strings: $a = { 4D 5A [2-4] ?? 00 ( AA | BB ) } condition: $a }
            rule regex { strings: $a = /ab+c/i condition: $a }
            "#,
        )
        .unwrap();
        let data = b"xx hello h\x00i\x00 cat concat MZ\x01\x02\x03\x04\x00\xBB ABBBC";
        let results = rules.scan(data);
        assert_eq!(
            names(&results),
            vec!["nocase", "wide", "fullword", "hex", "regex"]
        );
    }

    #[test]
    fn test_undefined_values_are_false() {
        let rules = compile(
            r#"
            rule div { condition: not (1 \ (filesize - filesize) == 0) }
            rule overflow { condition: 0x7FFFFFFFFFFFFFFF + filesize > 0 }
            rule read { condition: uint32(filesize) == 0 }
            "#,
        )
        .unwrap();
        let results = rules.scan(b"a");
        assert!(results.is_empty());
        assert!(results.errors().is_empty());
    }

    #[test]
    fn test_match_options() {
        let rules = compile(r#"rule a { strings: $a = "aa" condition: $a }"#).unwrap();
        let mut scanner = Scanner::new(&rules);
        scanner.set_options(
            ScanOptions::custom()
                .max_matches_per_pattern(2)
                .include_matches(true)
                .build(),
        );
        let results = scanner.scan(b"aaaaaa");
        assert_eq!(results.matching_rules()[0].patterns[0].matches.len(), 2);

        // 多个前缀原子在同一偏移命中，上限仍按不同偏移计数
        let rules = compile(r#"rule b { strings: $a = /ab(c|)/ condition: $a }"#).unwrap();
        let mut scanner = Scanner::new(&rules);
        scanner.set_options(ScanOptions::custom().max_matches_per_pattern(2).build());
        let results = scanner.scan(b"abcabc");
        let offsets: Vec<usize> = results.matching_rules()[0].patterns[0]
            .matches
            .iter()
            .map(|m| m.offset)
            .collect();
        assert_eq!(offsets, vec![0, 3]);

        scanner.set_options(ScanOptions::custom().include_matches(false).build());
        let results = scanner.scan(b"aaaaaa");
        assert!(results.matching_rules()[0].patterns[0].matches.is_empty());
    }
}

#[cfg(test)]
mod properties {
    use proptest::prelude::*;
    use proptest::test_runner::RngSeed;

    use crate::compile;
    use crate::indexer::is_full_word;

    #[derive(Debug, Clone)]
    struct TextPattern {
        text: Vec<u8>,
        nocase: bool,
        ascii: bool,
        wide: bool,
        fullword: bool,
    }

    impl TextPattern {
        fn declaration(&self, id: usize) -> String {
            let mut line = format!("$p{} = \"{}\"", id, String::from_utf8_lossy(&self.text));
            for (enabled, modifier) in [
                (self.nocase, "nocase"),
                (self.ascii, "ascii"),
                (self.wide, "wide"),
                (self.fullword, "fullword"),
            ] {
                if enabled {
                    line.push(' ');
                    line.push_str(modifier);
                }
            }
            line
        }

        /// 逐位置暴力比较所有编码变体
        fn brute_force(&self, data: &[u8]) -> Vec<usize> {
            let mut variants = Vec::new();
            if self.ascii || !self.wide {
                variants.push((self.text.clone(), false));
            }
            if self.wide {
                variants.push((self.text.iter().flat_map(|&b| [b, 0]).collect(), true));
            }
            (0..data.len())
                .filter(|&start| {
                    variants.iter().any(|(needle, wide)| {
                        let end = start + needle.len();
                        if end > data.len() {
                            return false;
                        }
                        let window = &data[start..end];
                        let equal = if self.nocase {
                            window.eq_ignore_ascii_case(needle)
                        } else {
                            window == needle.as_slice()
                        };
                        equal && (!self.fullword || is_full_word(data, start, end, *wide))
                    })
                })
                .collect()
        }
    }

    fn text_pattern() -> impl Strategy<Value = TextPattern> {
        (
            prop::collection::vec(prop::sample::select(b"abc".to_vec()), 1..4),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(text, nocase, ascii, wide, fullword)| TextPattern {
                text,
                nocase,
                ascii,
                wide,
                fullword,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            failure_persistence: None,
            rng_seed: RngSeed::Fixed(0x5259_5341),
            ..ProptestConfig::default()
        })]

        #[test]
        fn scan_agrees_with_brute_force(
            patterns in prop::collection::vec(text_pattern(), 1..5),
            data in prop::collection::vec(prop::sample::select(b"abcAB \0".to_vec()), 0..96),
        ) {
            let declarations: Vec<String> = patterns
                .iter()
                .enumerate()
                .map(|(i, p)| p.declaration(i))
                .collect();
            // 两条规则声明同一组模式，原子表去重后扇出到各自的模式
            let source = format!(
                "rule shared_a {{ strings: {0} condition: any of them }} \
                 rule shared_b {{ strings: {0} condition: any of them }}",
                declarations.join(" ")
            );
            let rules = compile(&source).unwrap();
            let results = rules.scan(&data);

            let expected: Vec<(String, Vec<usize>)> = patterns
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("p{}", i), p.brute_force(&data)))
                .filter(|(_, offsets)| !offsets.is_empty())
                .collect();
            prop_assert_eq!(results.len(), if expected.is_empty() { 0 } else { 2 });
            for rule in &results {
                let actual: Vec<(String, Vec<usize>)> = rule
                    .patterns
                    .iter()
                    .map(|p| (p.identifier.clone(), p.matches.iter().map(|m| m.offset).collect()))
                    .collect();
                prop_assert_eq!(&actual, &expected);
            }
        }
    }
}
