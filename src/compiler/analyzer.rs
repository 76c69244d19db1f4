//! 语义分析与类型检查：AST 条件 → 类型化的 ir::Expr
//! 名称解析顺序：模式（`$` 前缀）→ 外部变量 → 先前声明的规则 → 内置函数

use rustc_hash::FxHashMap;
use std::fmt;

use super::ir::{
    self, compare, float_arith, int_arith, int_bitwise, str_op, Anchor, ArithOp, BitOp, CmpOp,
    CmpTy, NumTy, OfTargets, PatternRef, Quantifier, ReadFn, StrOp, Value,
};
use super::patterns::build_regex;
use super::warnings::CompileWarning;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::parser::ast::{self, BinaryOp, Expr, ExprKind, OfItems, PatternSet, UnaryOp};
use crate::parser::{SourceCode, Span};
use crate::variables::{Type, VariableSchema};

/// 表达式静态类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Integer,
    Float,
    Bool,
    String,
}

impl ExprType {
    fn is_numeric(self) -> bool {
        matches!(self, ExprType::Integer | ExprType::Float)
    }
}

impl From<Type> for ExprType {
    fn from(ty: Type) -> Self {
        match ty {
            Type::Integer => ExprType::Integer,
            Type::Float => ExprType::Float,
            Type::Bool => ExprType::Bool,
            Type::String => ExprType::String,
        }
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExprType::Integer => "integer",
            ExprType::Float => "float",
            ExprType::Bool => "boolean",
            ExprType::String => "string",
        };
        f.write_str(text)
    }
}

/// 已声明规则的可见信息（只包含当前规则之前的规则）
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeclaredRule {
    pub index: usize,
    pub is_global: bool,
}

/// 单条规则的分析上下文
pub(crate) struct RuleAnalyzer<'a> {
    rule: &'a ast::Rule,
    source: &'a SourceCode,
    schema: &'a VariableSchema,
    declared_rules: &'a FxHashMap<String, DeclaredRule>,
    config: &'a CompilerConfig,
    pattern_ids: FxHashMap<&'a str, usize>,
    used: Vec<bool>,
    for_of_depth: usize,
}

/// 分析结果
pub(crate) struct AnalyzedCondition {
    pub condition: ir::Expr,
    pub warning: Option<CompileWarning>,
}

impl<'a> RuleAnalyzer<'a> {
    /// 参数：调用前已完成模式重复检查，pattern_ids 与 rule.patterns 一一对应
    pub fn new(
        rule: &'a ast::Rule,
        source: &'a SourceCode,
        schema: &'a VariableSchema,
        declared_rules: &'a FxHashMap<String, DeclaredRule>,
        config: &'a CompilerConfig,
    ) -> Self {
        let pattern_ids = rule
            .patterns
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.identifier.as_str(), idx))
            .collect();
        RuleAnalyzer {
            rule,
            source,
            schema,
            declared_rules,
            config,
            pattern_ids,
            used: vec![false; rule.patterns.len()],
            for_of_depth: 0,
        }
    }

    /// 分析条件：类型必须为布尔；所有模式必须被引用
    pub fn analyze(mut self) -> CompileResult<AnalyzedCondition> {
        let rule = self.rule;
        let (condition, ty) = self.expr(&rule.condition)?;
        self.expect_type(ty, ExprType::Bool, rule.condition.span)?;

        if let Some(idx) = self.used.iter().position(|used| !used) {
            let pattern = &self.rule.patterns[idx];
            return Err(CompileError::UnusedPattern {
                rule: self.rule.name.clone(),
                identifier: pattern.identifier.clone(),
                location: self.source.location(pattern.span),
            });
        }

        let is_literal = matches!(self.rule.condition.kind, ExprKind::Bool(_));
        let warning = match condition.as_const() {
            Some(Value::Bool(value)) if !is_literal && self.config.warn_invariant_expression => {
                Some(CompileWarning::InvariantExpression {
                    rule: self.rule.name.clone(),
                    value: *value,
                    location: self.source.location(self.rule.condition.span),
                })
            }
            _ => None,
        };

        Ok(AnalyzedCondition { condition, warning })
    }

    // ===================== 错误构造 =====================

    fn wrong_type(&self, expected: &str, actual: ExprType, span: Span) -> CompileError {
        CompileError::WrongType {
            expected: expected.to_string(),
            actual: actual.to_string(),
            location: self.source.location(span),
        }
    }

    fn expect_type(&self, actual: ExprType, expected: ExprType, span: Span) -> CompileResult<()> {
        if actual == expected {
            Ok(())
        } else {
            Err(self.wrong_type(&expected.to_string(), actual, span))
        }
    }

    fn expect_numeric(&self, actual: ExprType, span: Span) -> CompileResult<()> {
        if actual.is_numeric() {
            Ok(())
        } else {
            Err(self.wrong_type("integer or float", actual, span))
        }
    }

    fn integer(&mut self, expr: &Expr) -> CompileResult<ir::Expr> {
        let (e, ty) = self.expr(expr)?;
        self.expect_type(ty, ExprType::Integer, expr.span)?;
        Ok(e)
    }

    fn boolean(&mut self, expr: &Expr) -> CompileResult<ir::Expr> {
        let (e, ty) = self.expr(expr)?;
        self.expect_type(ty, ExprType::Bool, expr.span)?;
        Ok(e)
    }

    // ===================== 表达式 =====================

    fn expr(&mut self, expr: &Expr) -> CompileResult<(ir::Expr, ExprType)> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Bool(b) => Ok((ir::Expr::Const(Value::Bool(*b)), ExprType::Bool)),
            ExprKind::Int(v) => Ok((ir::Expr::Const(Value::Integer(*v)), ExprType::Integer)),
            ExprKind::Float(v) => Ok((ir::Expr::Const(Value::Float(*v)), ExprType::Float)),
            ExprKind::Str(s) => Ok((ir::Expr::Const(Value::String(s.clone())), ExprType::String)),
            ExprKind::Regexp { .. } => Err(CompileError::WrongType {
                expected: "boolean, integer, float or string".to_string(),
                actual: "regexp".to_string(),
                location: self.source.location(span),
            }),
            ExprKind::Filesize => Ok((ir::Expr::Filesize, ExprType::Integer)),
            ExprKind::Ident(name) => self.identifier(name, span),
            ExprKind::Call { name, arg } => {
                let Some(func) = ReadFn::from_name(name) else {
                    return Err(CompileError::UnknownIdentifier {
                        identifier: name.clone(),
                        location: self.source.location(span),
                        note: Some("not a built-in function".to_string()),
                    });
                };
                let offset = self.integer(arg)?;
                Ok((
                    ir::Expr::Read {
                        func,
                        offset: Box::new(offset),
                    },
                    ExprType::Integer,
                ))
            }
            ExprKind::PatternMatch { ident, anchor } => {
                let pattern = self.pattern_ref(ident.as_deref(), span)?;
                let anchor = match anchor {
                    Some(anchor) => Some(self.anchor(anchor)?),
                    None => None,
                };
                Ok((ir::Expr::PatternMatch { pattern, anchor }, ExprType::Bool))
            }
            ExprKind::PatternCount { ident, range } => {
                let pattern = self.pattern_ref(ident.as_deref(), span)?;
                let range = match range {
                    Some(range) => Some(self.range(range)?),
                    None => None,
                };
                Ok((ir::Expr::PatternCount { pattern, range }, ExprType::Integer))
            }
            ExprKind::PatternOffset { ident, index } | ExprKind::PatternLength { ident, index } => {
                let pattern = self.pattern_ref(ident.as_deref(), span)?;
                let index = match index {
                    Some(index) => {
                        let e = self.integer(index)?;
                        if let Some(Value::Integer(v)) = e.as_const() {
                            if *v < 1 {
                                return Err(CompileError::NumberOutOfRange {
                                    value: *v,
                                    min: 1,
                                    max: i64::MAX,
                                    location: self.source.location(index.span),
                                });
                            }
                        }
                        e
                    }
                    None => ir::Expr::Const(Value::Integer(1)),
                };
                let index = Box::new(index);
                let e = if matches!(expr.kind, ExprKind::PatternOffset { .. }) {
                    ir::Expr::PatternOffset { pattern, index }
                } else {
                    ir::Expr::PatternLength { pattern, index }
                };
                Ok((e, ExprType::Integer))
            }
            ExprKind::Unary { op, operand } => self.unary(*op, operand),
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, span),
            ExprKind::Of {
                quantifier,
                items,
                anchor,
            } => {
                let quantifier = self.quantifier(quantifier)?;
                let targets = match items {
                    OfItems::Patterns(set) => OfTargets::Patterns(self.pattern_set(set)?),
                    OfItems::Exprs(exprs) => OfTargets::Exprs(
                        exprs
                            .iter()
                            .map(|e| self.boolean(e))
                            .collect::<CompileResult<Vec<_>>>()?,
                    ),
                };
                let anchor = match anchor {
                    Some(anchor) => Some(self.anchor(anchor)?),
                    None => None,
                };
                Ok((
                    ir::Expr::Of {
                        quantifier,
                        targets,
                        anchor,
                    },
                    ExprType::Bool,
                ))
            }
            ExprKind::ForOf {
                quantifier,
                set,
                body,
            } => {
                let quantifier = self.quantifier(quantifier)?;
                let patterns = self.pattern_set(set)?;
                self.for_of_depth += 1;
                let body = self.boolean(body);
                self.for_of_depth -= 1;
                Ok((
                    ir::Expr::ForOf {
                        quantifier,
                        patterns,
                        body: Box::new(body?),
                    },
                    ExprType::Bool,
                ))
            }
        }
    }

    fn identifier(&mut self, name: &str, span: Span) -> CompileResult<(ir::Expr, ExprType)> {
        if let Some(index) = self.schema.index_of(name) {
            let ty = self
                .schema
                .decl(index)
                .map(|d| d.ty)
                .ok_or(CompileError::UnknownIdentifier {
                    identifier: name.to_string(),
                    location: self.source.location(span),
                    note: None,
                })?;
            return Ok((ir::Expr::Var { index, ty }, ExprType::from(ty)));
        }

        if let Some(declared) = self.declared_rules.get(name) {
            if self.rule.is_global && !declared.is_global {
                return Err(CompileError::WrongRuleDependency {
                    global_rule: self.rule.name.clone(),
                    dependency: name.to_string(),
                    location: self.source.location(span),
                });
            }
            return Ok((ir::Expr::RuleRef(declared.index), ExprType::Bool));
        }

        let note = if ReadFn::from_name(name).is_some() {
            Some(format!("`{}` is a function and must be called", name))
        } else if name == self.rule.name {
            Some("a rule cannot reference itself".to_string())
        } else {
            None
        };
        Err(CompileError::UnknownIdentifier {
            identifier: name.to_string(),
            location: self.source.location(span),
            note,
        })
    }

    fn pattern_ref(&mut self, ident: Option<&str>, span: Span) -> CompileResult<PatternRef> {
        match ident {
            Some(name) => match self.pattern_ids.get(name) {
                Some(&idx) => {
                    self.used[idx] = true;
                    Ok(PatternRef::Id(idx))
                }
                None => Err(CompileError::UnknownPattern {
                    rule: self.rule.name.clone(),
                    identifier: name.to_string(),
                    location: self.source.location(span),
                }),
            },
            None if self.for_of_depth > 0 => Ok(PatternRef::Current),
            None => Err(CompileError::Syntax {
                message: "anonymous pattern reference outside of a `for .. of` body".to_string(),
                location: self.source.location(span),
            }),
        }
    }

    /// 模式集合 → 规则内模式索引（升序去重）
    fn pattern_set(&mut self, set: &PatternSet) -> CompileResult<Vec<usize>> {
        let mut ids = Vec::new();
        match set {
            PatternSet::Them(span) => {
                if self.rule.patterns.is_empty() {
                    return Err(CompileError::EmptyPatternSet {
                        rule: self.rule.name.clone(),
                        set: "them".to_string(),
                        location: self.source.location(*span),
                    });
                }
                ids.extend(0..self.rule.patterns.len());
            }
            PatternSet::Items(items) => {
                for item in items {
                    if item.wildcard {
                        let before = ids.len();
                        ids.extend(
                            self.rule
                                .patterns
                                .iter()
                                .enumerate()
                                .filter(|(_, p)| p.identifier.starts_with(item.name.as_str()))
                                .map(|(idx, _)| idx),
                        );
                        if ids.len() == before {
                            return Err(CompileError::EmptyPatternSet {
                                rule: self.rule.name.clone(),
                                set: format!("${}*", item.name),
                                location: self.source.location(item.span),
                            });
                        }
                    } else {
                        match self.pattern_ids.get(item.name.as_str()) {
                            Some(&idx) => ids.push(idx),
                            None => {
                                return Err(CompileError::UnknownPattern {
                                    rule: self.rule.name.clone(),
                                    identifier: item.name.clone(),
                                    location: self.source.location(item.span),
                                })
                            }
                        }
                    }
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        for &idx in &ids {
            self.used[idx] = true;
        }
        Ok(ids)
    }

    fn anchor(&mut self, anchor: &ast::Anchor) -> CompileResult<Anchor> {
        match anchor {
            ast::Anchor::At(offset) => Ok(Anchor::At(Box::new(self.integer(offset)?))),
            ast::Anchor::In(range) => {
                let (lo, hi) = self.range(range)?;
                Ok(Anchor::In(lo, hi))
            }
        }
    }

    fn range(&mut self, range: &ast::Range) -> CompileResult<(Box<ir::Expr>, Box<ir::Expr>)> {
        let lo = self.integer(&range.lo)?;
        let hi = self.integer(&range.hi)?;
        if let (Some(Value::Integer(lo)), Some(Value::Integer(hi))) = (lo.as_const(), hi.as_const())
        {
            if lo > hi {
                return Err(CompileError::InvalidRange {
                    location: self.source.location(range.span),
                });
            }
        }
        Ok((Box::new(lo), Box::new(hi)))
    }

    fn quantifier(&mut self, quantifier: &ast::Quantifier) -> CompileResult<Quantifier> {
        match quantifier {
            ast::Quantifier::All => Ok(Quantifier::All),
            ast::Quantifier::Any => Ok(Quantifier::Any),
            ast::Quantifier::None => Ok(Quantifier::None),
            ast::Quantifier::Expr(e) => Ok(Quantifier::Count(Box::new(self.integer(e)?))),
            ast::Quantifier::Percent(e) => {
                let percent = self.integer(e)?;
                if let Some(Value::Integer(v)) = percent.as_const() {
                    if !(1..=100).contains(v) {
                        return Err(CompileError::NumberOutOfRange {
                            value: *v,
                            min: 1,
                            max: 100,
                            location: self.source.location(e.span),
                        });
                    }
                }
                Ok(Quantifier::Percent(Box::new(percent)))
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> CompileResult<(ir::Expr, ExprType)> {
        let (e, ty) = self.expr(operand)?;
        let result = match op {
            UnaryOp::Not => {
                self.expect_type(ty, ExprType::Bool, operand.span)?;
                (ir::Expr::Not(Box::new(e)), ExprType::Bool)
            }
            UnaryOp::Neg => {
                self.expect_numeric(ty, operand.span)?;
                let num = if ty == ExprType::Float {
                    NumTy::Float
                } else {
                    NumTy::Integer
                };
                (
                    ir::Expr::Neg {
                        ty: num,
                        operand: Box::new(e),
                    },
                    ty,
                )
            }
            UnaryOp::BitNot => {
                self.expect_type(ty, ExprType::Integer, operand.span)?;
                (ir::Expr::BitNot(Box::new(e)), ExprType::Integer)
            }
        };
        Ok((fold(result.0), result.1))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> CompileResult<(ir::Expr, ExprType)> {
        match op {
            BinaryOp::Matches => return self.matches(lhs, rhs),
            BinaryOp::And | BinaryOp::Or => return self.logical(op, lhs, rhs),
            _ => {}
        }

        let (l, lt) = self.expr(lhs)?;
        let (r, rt) = self.expr(rhs)?;

        let (e, ty) = match op {
            BinaryOp::And | BinaryOp::Or => {
                self.expect_type(lt, ExprType::Bool, lhs.span)?;
                self.expect_type(rt, ExprType::Bool, rhs.span)?;
                (flatten_logical(op == BinaryOp::And, vec![l, r]), ExprType::Bool)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                self.expect_numeric(lt, lhs.span)?;
                self.expect_numeric(rt, rhs.span)?;
                let arith = match op {
                    BinaryOp::Add => ArithOp::Add,
                    BinaryOp::Sub => ArithOp::Sub,
                    BinaryOp::Mul => ArithOp::Mul,
                    _ => ArithOp::Div,
                };
                let (l, r, num) = widen(l, lt, r, rt);
                let ty = if num == NumTy::Float {
                    ExprType::Float
                } else {
                    ExprType::Integer
                };
                (
                    ir::Expr::Arith {
                        op: arith,
                        ty: num,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                    ty,
                )
            }
            BinaryOp::Mod => {
                self.expect_type(lt, ExprType::Integer, lhs.span)?;
                self.expect_type(rt, ExprType::Integer, rhs.span)?;
                (
                    ir::Expr::Arith {
                        op: ArithOp::Mod,
                        ty: NumTy::Integer,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                    ExprType::Integer,
                )
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr => {
                self.expect_type(lt, ExprType::Integer, lhs.span)?;
                self.expect_type(rt, ExprType::Integer, rhs.span)?;
                let bit = match op {
                    BinaryOp::BitAnd => BitOp::And,
                    BinaryOp::BitOr => BitOp::Or,
                    BinaryOp::BitXor => BitOp::Xor,
                    BinaryOp::Shl => BitOp::Shl,
                    _ => BitOp::Shr,
                };
                (
                    ir::Expr::Bitwise {
                        op: bit,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                    ExprType::Integer,
                )
            }
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let cmp = match op {
                    BinaryOp::Eq => CmpOp::Eq,
                    BinaryOp::Ne => CmpOp::Ne,
                    BinaryOp::Lt => CmpOp::Lt,
                    BinaryOp::Le => CmpOp::Le,
                    BinaryOp::Gt => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                let mismatch = || CompileError::MismatchingTypes {
                    lhs: lt.to_string(),
                    rhs: rt.to_string(),
                    location: self.source.location(span),
                };
                let (l, r, cmp_ty) = if lt.is_numeric() && rt.is_numeric() {
                    let (l, r, num) = widen(l, lt, r, rt);
                    let cmp_ty = if num == NumTy::Float {
                        CmpTy::Float
                    } else {
                        CmpTy::Integer
                    };
                    (l, r, cmp_ty)
                } else if lt == ExprType::String && rt == ExprType::String {
                    (l, r, CmpTy::String)
                } else if lt == ExprType::Bool
                    && rt == ExprType::Bool
                    && matches!(cmp, CmpOp::Eq | CmpOp::Ne)
                {
                    (l, r, CmpTy::Bool)
                } else {
                    return Err(mismatch());
                };
                (
                    ir::Expr::Compare {
                        op: cmp,
                        ty: cmp_ty,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                    ExprType::Bool,
                )
            }
            BinaryOp::Contains
            | BinaryOp::IContains
            | BinaryOp::StartsWith
            | BinaryOp::IStartsWith
            | BinaryOp::EndsWith
            | BinaryOp::IEndsWith
            | BinaryOp::IEquals => {
                self.expect_type(lt, ExprType::String, lhs.span)?;
                self.expect_type(rt, ExprType::String, rhs.span)?;
                let string_op = match op {
                    BinaryOp::Contains => StrOp::Contains,
                    BinaryOp::IContains => StrOp::IContains,
                    BinaryOp::StartsWith => StrOp::StartsWith,
                    BinaryOp::IStartsWith => StrOp::IStartsWith,
                    BinaryOp::EndsWith => StrOp::EndsWith,
                    BinaryOp::IEndsWith => StrOp::IEndsWith,
                    _ => StrOp::IEquals,
                };
                (
                    ir::Expr::StrOp {
                        op: string_op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                    ExprType::Bool,
                )
            }
            BinaryOp::Matches => return Err(self.wrong_type("regexp", rt, rhs.span)),
        };
        Ok((fold(e), ty))
    }

    /// `a or b or c` 解析为左深树；沿左侧迭代收集操作数，长链不产生深递归
    fn logical(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> CompileResult<(ir::Expr, ExprType)> {
        let mut operands = vec![rhs];
        let mut cursor = lhs;
        while let ExprKind::Binary {
            op: inner,
            lhs,
            rhs,
        } = &cursor.kind
        {
            if *inner != op {
                break;
            }
            operands.push(&**rhs);
            cursor = &**lhs;
        }
        operands.push(cursor);

        let mut lowered = Vec::with_capacity(operands.len());
        for operand in operands.into_iter().rev() {
            lowered.push(self.boolean(operand)?);
        }
        Ok((
            fold(flatten_logical(op == BinaryOp::And, lowered)),
            ExprType::Bool,
        ))
    }

    fn matches(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<(ir::Expr, ExprType)> {
        let (l, lt) = self.expr(lhs)?;
        self.expect_type(lt, ExprType::String, lhs.span)?;
        let ExprKind::Regexp {
            pattern,
            case_insensitive,
            dot_all,
        } = &rhs.kind
        else {
            let (_, rt) = self.expr(rhs)?;
            return Err(self.wrong_type("regexp", rt, rhs.span));
        };
        let regex = build_regex(pattern, *case_insensitive, *dot_all).map_err(|e| {
            CompileError::InvalidRegexp {
                message: e.to_string(),
                location: self.source.location(rhs.span),
            }
        })?;
        Ok((
            fold(ir::Expr::Matches {
                lhs: Box::new(l),
                regex,
            }),
            ExprType::Bool,
        ))
    }
}

/// 混合数值运算：整数一侧插入显式拓宽节点
fn widen(
    l: ir::Expr,
    lt: ExprType,
    r: ir::Expr,
    rt: ExprType,
) -> (ir::Expr, ir::Expr, NumTy) {
    if lt == ExprType::Integer && rt == ExprType::Integer {
        return (l, r, NumTy::Integer);
    }
    let to_float = |e: ir::Expr, ty: ExprType| {
        if ty == ExprType::Integer {
            fold(ir::Expr::IntToFloat(Box::new(e)))
        } else {
            e
        }
    };
    (to_float(l, lt), to_float(r, rt), NumTy::Float)
}

/// `a and (b and c)` 展平为 And([a, b, c])
fn flatten_logical(is_and: bool, exprs: Vec<ir::Expr>) -> ir::Expr {
    let mut operands = Vec::with_capacity(exprs.len());
    for e in exprs {
        match (is_and, e) {
            (true, ir::Expr::And(inner)) | (false, ir::Expr::Or(inner)) => operands.extend(inner),
            (_, e) => operands.push(e),
        }
    }
    if is_and {
        ir::Expr::And(operands)
    } else {
        ir::Expr::Or(operands)
    }
}

/// 常量折叠：仅在所有操作数均为常量且结果有定义时折叠
pub(crate) fn fold(expr: ir::Expr) -> ir::Expr {
    use ir::Expr as E;
    let folded = match &expr {
        E::Not(inner) => match inner.as_const() {
            Some(Value::Bool(b)) => Some(Value::Bool(!b)),
            _ => None,
        },
        E::And(ops) | E::Or(ops) => {
            let values: Option<Vec<bool>> = ops
                .iter()
                .map(|op| match op.as_const() {
                    Some(Value::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect();
            values.map(|vs| {
                if matches!(expr, E::And(_)) {
                    Value::Bool(vs.iter().all(|v| *v))
                } else {
                    Value::Bool(vs.iter().any(|v| *v))
                }
            })
        }
        E::Neg { operand, .. } => match operand.as_const() {
            Some(Value::Integer(v)) => v.checked_neg().map(Value::Integer),
            Some(Value::Float(v)) => Some(Value::Float(-v)),
            _ => None,
        },
        E::BitNot(inner) => match inner.as_const() {
            Some(Value::Integer(v)) => Some(Value::Integer(!v)),
            _ => None,
        },
        E::IntToFloat(inner) => match inner.as_const() {
            Some(Value::Integer(v)) => Some(Value::Float(*v as f64)),
            _ => None,
        },
        E::Arith { op, lhs, rhs, .. } => match (lhs.as_const(), rhs.as_const()) {
            (Some(Value::Integer(a)), Some(Value::Integer(b))) => {
                int_arith(*op, *a, *b).map(Value::Integer)
            }
            (Some(Value::Float(a)), Some(Value::Float(b))) => {
                Some(Value::Float(float_arith(*op, *a, *b)))
            }
            _ => None,
        },
        E::Bitwise { op, lhs, rhs } => match (lhs.as_const(), rhs.as_const()) {
            (Some(Value::Integer(a)), Some(Value::Integer(b))) => {
                int_bitwise(*op, *a, *b).map(Value::Integer)
            }
            _ => None,
        },
        E::Compare { op, lhs, rhs, .. } => match (lhs.as_const(), rhs.as_const()) {
            (Some(Value::Integer(a)), Some(Value::Integer(b))) => {
                Some(Value::Bool(compare(*op, a, b)))
            }
            (Some(Value::Float(a)), Some(Value::Float(b))) => Some(Value::Bool(compare(*op, a, b))),
            (Some(Value::String(a)), Some(Value::String(b))) => {
                Some(Value::Bool(compare(*op, a.as_slice(), b.as_slice())))
            }
            (Some(Value::Bool(a)), Some(Value::Bool(b))) => Some(Value::Bool(compare(*op, a, b))),
            _ => None,
        },
        E::StrOp { op, lhs, rhs } => match (lhs.as_const(), rhs.as_const()) {
            (Some(Value::String(a)), Some(Value::String(b))) => Some(Value::Bool(str_op(*op, a, b))),
            _ => None,
        },
        E::Matches { lhs, regex } => match lhs.as_const() {
            Some(Value::String(s)) => Some(Value::Bool(regex.is_match(s))),
            _ => None,
        },
        _ => None,
    };
    match folded {
        Some(value) => E::Const(value),
        None => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::parse;

    fn analyze_with(src: &str, schema: &VariableSchema) -> CompileResult<AnalyzedCondition> {
        let file = parse(src).unwrap();
        let rule = &file.rules[0];
        let source = SourceCode::new(src);
        let declared = FxHashMap::default();
        let config = CompilerConfig::default();
        RuleAnalyzer::new(rule, &source, schema, &declared, &config).analyze()
    }

    fn analyze(src: &str) -> CompileResult<AnalyzedCondition> {
        analyze_with(src, &VariableSchema::new())
    }

    fn condition(cond: &str) -> CompileResult<AnalyzedCondition> {
        analyze(&format!(
            "rule t {{ strings: $a = \"abc\" $b = \"xyz\" condition: {} }}",
            cond
        ))
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(condition("$a and 1").err().unwrap().kind(), ErrorKind::Type);
        assert_eq!(condition("$a and $b and 1 == \"x\"").err().unwrap().kind(), ErrorKind::Type);
        assert!(matches!(
            condition("$a and $b and true < false"),
            Err(CompileError::MismatchingTypes { .. })
        ));
        assert!(matches!(
            condition("all of them and 1.5 % 2 == 1"),
            Err(CompileError::WrongType { .. })
        ));
        // 条件必须是布尔
        assert!(matches!(
            condition("#a + #b"),
            Err(CompileError::WrongType { .. })
        ));
    }

    #[test]
    fn test_widening_and_folding() {
        let analyzed = analyze("rule t { condition: 1 + 0.5 > 1 }").unwrap();
        assert!(matches!(analyzed.condition, ir::Expr::Const(Value::Bool(true))));
        assert!(matches!(
            analyzed.warning,
            Some(CompileWarning::InvariantExpression { value: true, .. })
        ));

        // 字面量 true 不警告
        let analyzed = analyze("rule t { condition: true }").unwrap();
        assert!(analyzed.warning.is_none());

        // 除零不折叠，留给运行期得到未定义
        let analyzed = analyze("rule t { condition: 1 \\ 0 == 0 }").unwrap();
        assert!(matches!(analyzed.condition, ir::Expr::Compare { .. }));
    }

    #[test]
    fn test_pattern_semantics() {
        assert!(matches!(
            condition("$a"),
            Err(CompileError::UnusedPattern { identifier, .. }) if identifier == "b"
        ));
        assert!(matches!(
            condition("$a and $c and $b"),
            Err(CompileError::UnknownPattern { .. })
        ));
        assert!(matches!(
            condition("any of ($x*) and $a and $b"),
            Err(CompileError::EmptyPatternSet { .. })
        ));
        assert!(matches!(
            condition("@a[0] == 1 and $b"),
            Err(CompileError::NumberOutOfRange { .. })
        ));
        assert!(matches!(
            condition("101% of them"),
            Err(CompileError::NumberOutOfRange { .. })
        ));
        assert!(matches!(
            condition("$a in (10..5) and $b"),
            Err(CompileError::InvalidRange { .. })
        ));
        assert!(matches!(
            condition("$ and all of them"),
            Err(CompileError::Syntax { .. })
        ));
        assert!(condition("for any of them : ( # > 1 and @ < 10 and ! == 3 )").is_ok());
        assert!(condition("2 of ($a, $b) and #a in (0..filesize) > 0").is_ok());
    }

    #[test]
    fn test_identifier_resolution() {
        let mut schema = VariableSchema::new();
        schema.declare("some_int", Type::Integer, None).unwrap();
        schema.declare("name", Type::String, None).unwrap();

        assert!(analyze_with("rule t { condition: some_int == 1 }", &schema).is_ok());
        assert!(analyze_with("rule t { condition: name icontains \"abc\" }", &schema).is_ok());
        assert!(analyze_with("rule t { condition: name matches /a.c/i }", &schema).is_ok());
        assert!(matches!(
            analyze_with("rule t { condition: name matches /a(c/ }", &schema),
            Err(CompileError::InvalidRegexp { .. })
        ));
        let err = analyze_with("rule t { condition: missing }", &schema)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(matches!(
            analyze_with("rule t { condition: uint16 == 1 }", &schema),
            Err(CompileError::UnknownIdentifier { note: Some(_), .. })
        ));
        assert!(analyze_with("rule t { condition: uint16(0) == 0x5A4D }", &schema).is_ok());
    }
}
