//! rsyara - YARA 风格的规则编译器与内容扫描引擎
//!
//! 规则源码经 Compiler 编译为不可变的 Rules（Arc 共享，可跨线程），
//! Scanner 持有变量绑定，对字节缓冲执行单遍多模式匹配 + 条件求值。

// 导出错误类型
pub use self::error::{CompileError, CompileErrors, CompileResult, ErrorKind, EvalError, VariableError};

// 导出配置
pub use self::config::{CompilerConfig, CompilerConfigBuilder, ScanOptions, ScanOptionsBuilder};

// 导出外部变量
pub use self::variables::{Type, Variable, VariableDecl, VariableSchema};

// 导出编译接口
pub use self::compiler::{CompileWarning, Compiler};

// 导出规则集与扫描接口
pub use self::indexer::Match;
pub use self::parser::ast::MetaValue;
pub use self::parser::SourceLocation;
pub use self::rules::{RuleInfo, Rules};
pub use self::scanner::{MatchingRule, PatternMatches, RuleError, ScanResults, Scanner};

// 声明所有子模块
pub mod compiler;
pub mod config;
pub mod error;
pub mod indexer;
pub mod parser;
pub mod rules;
pub mod scanner;
pub mod utils;
pub mod variables;

/// 简化接口：编译单段源码（无外部变量）
pub fn compile(source: &str) -> Result<Rules, CompileErrors> {
    let mut compiler = Compiler::new();
    compiler.add_source(source)?;
    compiler.build()
}

/// 测试日志：`RUST_LOG=debug cargo test` 时输出编译/扫描阶段日志
#[cfg(test)]
pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_syntax_error() {
        let err = compile("bad rule").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().starts_with("SyntaxError"));
    }

    #[test]
    fn test_compile_and_scan() {
        init_test_logger();
        let rules = compile(r#"rule foo { strings: $a = "foo" condition: $a }"#).unwrap();
        let results = rules.scan(b"foobar");
        assert_eq!(results.len(), 1);
        assert_eq!(results.matching_rules()[0].name, "foo");
    }

    #[test]
    fn test_unsupported_variable_type() {
        let mut compiler = Compiler::new();
        let err = compiler
            .define_global("nothing", serde_json::Value::Null)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CompileError::Variable(VariableError::UnsupportedType(_))
        ));
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_deep_nesting_is_syntax_error() {
        let src = format!(
            "rule a {{ condition: {}true{} }}",
            "(".repeat(300),
            ")".repeat(300)
        );
        let err = compile(&src).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("nested too deeply"));

        let err = compile(&format!("rule a {{ condition: {}true }}", "not ".repeat(3000))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);

        // 长 or 链照常编译与求值
        let chain = vec!["false"; 2000].join(" or ") + " or $a";
        let rules = compile(&format!(
            r#"rule a {{ strings: $a = "x" condition: {} }}"#,
            chain
        ))
        .unwrap();
        assert_eq!(rules.scan(b"..x..").len(), 1);
        assert!(rules.scan(b"....").is_empty());
    }

    #[test]
    fn test_hex_jump_limit() {
        let err = compile("rule a { strings: $a = { AA [0-100000] BB } condition: $a }").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.to_string().contains("jump length exceeds 32767"));

        let rules = compile("rule a { strings: $a = { AA [2-300] BB } condition: $a }").unwrap();
        let mut data = vec![0xAA];
        data.extend(std::iter::repeat(0x00).take(250));
        data.push(0xBB);
        assert_eq!(rules.scan(&data).len(), 1);
    }

    #[test]
    fn test_most_negative_integer_literal() {
        let rules = compile("rule a { condition: -9223372036854775808 < 0 and -0x8000000000000000 == -9223372036854775808 }").unwrap();
        assert_eq!(rules.scan(b"").len(), 1);
    }
}
