//! rsyara 错误定义
//! 编译期（语法/类型/语义）与扫描期（求值）错误分层定义，基于thiserror实现类型安全处理
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use thiserror::Error;

use crate::parser::SourceLocation;
use crate::variables::Type;

/// 错误大类，对外暴露稳定的分类（调用方据此区分 SyntaxError / TypeError 等）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Syntax,
    Type,
    Semantic,
    Evaluation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Syntax => write!(f, "SyntaxError"),
            ErrorKind::Type => write!(f, "TypeError"),
            ErrorKind::Semantic => write!(f, "SemanticError"),
            ErrorKind::Evaluation => write!(f, "EvaluationError"),
        }
    }
}

/// 外部变量错误（声明/绑定阶段），全部归类为 TypeError
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariableError {
    #[error("invalid variable identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("variable `{0}` is already declared")]
    AlreadyDeclared(String),

    #[error("variable `{0}` is not declared")]
    Undeclared(String),

    #[error("unsupported variable type: {0}")]
    UnsupportedType(String),

    #[error("variable `{name}` is declared as {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: Type,
        actual: Type,
    },
}

impl From<Infallible> for VariableError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// 编译错误（解析 / 分析 / 后端）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    // ===================== 语法错误 =====================
    #[error("syntax error at {location}: {message}")]
    Syntax {
        message: String,
        location: SourceLocation,
    },

    #[error("unknown identifier `{identifier}` at {location}")]
    UnknownIdentifier {
        identifier: String,
        location: SourceLocation,
        note: Option<String>,
    },

    // ===================== 类型错误 =====================
    #[error("wrong type at {location}: expression should be {expected}, but is {actual}")]
    WrongType {
        expected: String,
        actual: String,
        location: SourceLocation,
    },

    #[error("mismatching types at {location}: {lhs} and {rhs}")]
    MismatchingTypes {
        lhs: String,
        rhs: String,
        location: SourceLocation,
    },

    #[error(transparent)]
    Variable(#[from] VariableError),

    // ===================== 语义错误 =====================
    #[error("duplicate rule `{name}` at {location} (first declared at {first})")]
    DuplicateRule {
        name: String,
        location: SourceLocation,
        first: SourceLocation,
    },

    #[error("rule `{name}` conflicts with a global variable at {location}")]
    ConflictingRuleIdentifier {
        name: String,
        location: SourceLocation,
    },

    #[error("global rule `{global_rule}` depends on non-global rule `{dependency}` at {location}")]
    WrongRuleDependency {
        global_rule: String,
        dependency: String,
        location: SourceLocation,
    },

    #[error("duplicate pattern `${identifier}` in rule `{rule}` at {location}")]
    DuplicatePattern {
        rule: String,
        identifier: String,
        location: SourceLocation,
    },

    #[error("unknown pattern `${identifier}` in rule `{rule}` at {location}")]
    UnknownPattern {
        rule: String,
        identifier: String,
        location: SourceLocation,
    },

    #[error("unused pattern `${identifier}` in rule `{rule}` at {location}")]
    UnusedPattern {
        rule: String,
        identifier: String,
        location: SourceLocation,
    },

    #[error("no patterns match `{set}` in rule `{rule}` at {location}")]
    EmptyPatternSet {
        rule: String,
        set: String,
        location: SourceLocation,
    },

    #[error("empty pattern `${identifier}` in rule `{rule}` at {location}")]
    EmptyPattern {
        rule: String,
        identifier: String,
        location: SourceLocation,
    },

    #[error("invalid modifier `{modifier}` at {location}: {reason}")]
    InvalidModifier {
        modifier: String,
        reason: String,
        location: SourceLocation,
    },

    #[error("duplicate modifier `{modifier}` at {location}")]
    DuplicateModifier {
        modifier: String,
        location: SourceLocation,
    },

    #[error("invalid regular expression at {location}: {message}")]
    InvalidRegexp {
        message: String,
        location: SourceLocation,
    },

    #[error("invalid range at {location}: lower bound is greater than upper bound")]
    InvalidRange { location: SourceLocation },

    #[error("number out of range at {location}: {value} is outside [{min}-{max}]")]
    NumberOutOfRange {
        value: i64,
        min: i64,
        max: i64,
        location: SourceLocation,
    },

    #[error("slow pattern `${identifier}` in rule `{rule}` at {location}")]
    SlowPattern {
        rule: String,
        identifier: String,
        location: SourceLocation,
    },

    #[error("pattern index build failed: {0}")]
    IndexBuild(String),
}

impl CompileError {
    /// 错误大类
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Syntax { .. } | CompileError::UnknownIdentifier { .. } => {
                ErrorKind::Syntax
            }
            CompileError::WrongType { .. }
            | CompileError::MismatchingTypes { .. }
            | CompileError::Variable(_) => ErrorKind::Type,
            _ => ErrorKind::Semantic,
        }
    }

    /// 错误位置（变量错误与索引构建错误没有源码位置）
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            CompileError::Syntax { location, .. }
            | CompileError::UnknownIdentifier { location, .. }
            | CompileError::WrongType { location, .. }
            | CompileError::MismatchingTypes { location, .. }
            | CompileError::DuplicateRule { location, .. }
            | CompileError::ConflictingRuleIdentifier { location, .. }
            | CompileError::WrongRuleDependency { location, .. }
            | CompileError::DuplicatePattern { location, .. }
            | CompileError::UnknownPattern { location, .. }
            | CompileError::UnusedPattern { location, .. }
            | CompileError::EmptyPatternSet { location, .. }
            | CompileError::EmptyPattern { location, .. }
            | CompileError::InvalidModifier { location, .. }
            | CompileError::DuplicateModifier { location, .. }
            | CompileError::InvalidRegexp { location, .. }
            | CompileError::InvalidRange { location }
            | CompileError::NumberOutOfRange { location, .. }
            | CompileError::SlowPattern { location, .. } => Some(location),
            CompileError::Variable(_) | CompileError::IndexBuild(_) => None,
        }
    }
}

/// build() 收集到的全部编译错误（非空）
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors(Vec<CompileError>);

impl CompileErrors {
    pub(crate) fn new(errors: Vec<CompileError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self(errors)
    }

    /// 第一个错误（按源码顺序）
    pub fn first(&self) -> &CompileError {
        &self.0[0]
    }

    /// 第一个错误的大类
    pub fn kind(&self) -> ErrorKind {
        self.first().kind()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<CompileError> {
        self.0
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", err.kind(), err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl From<CompileError> for CompileErrors {
    fn from(err: CompileError) -> Self {
        Self(vec![err])
    }
}

impl From<VariableError> for CompileErrors {
    fn from(err: VariableError) -> Self {
        Self(vec![CompileError::Variable(err)])
    }
}

/// 扫描期单条规则求值错误（不会被当作 false 吞掉）
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum EvalError {
    #[error("variable `{0}` has no bound value")]
    UnboundVariable(String),

    #[error("depends on rule `{0}` which could not be evaluated")]
    DependencyFailed(String),

    #[error("evaluator invariant violation: {0}")]
    InvariantViolation(&'static str),
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Evaluation
    }
}

/// 编译层Result类型别名
pub type CompileResult<T> = Result<T, CompileError>;
