//! 规则语言前端：词法 + 语法分析

pub mod ast;
mod grammar;
mod hex;
mod lexer;
mod span;
mod token;

pub use self::ast::SourceFile;
pub use self::span::{SourceCode, SourceLocation, Span};
pub use self::token::is_keyword;

use crate::error::CompileError;

/// 解析错误：消息 + 源码区间，交给上层转换为带行列的 CompileError
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: &str, span: Span) -> Self {
        ParseError {
            message: message.to_string(),
            span,
        }
    }

    pub fn into_compile_error(self, source: &SourceCode) -> CompileError {
        CompileError::Syntax {
            message: self.message,
            location: source.location(self.span),
        }
    }
}

/// 源码文本 → AST
pub fn parse(text: &str) -> Result<SourceFile, ParseError> {
    let tokens = lexer::Lexer::new(text).tokenize()?;
    grammar::Parser::new(tokens).parse_source()
}

/// 解析一段源码，错误附带来源与行列
pub fn parse_source(source: &SourceCode) -> Result<SourceFile, CompileError> {
    parse(source.text()).map_err(|err| err.into_compile_error(source))
}
