//! 条件求值
//! 结果三态：Some(值) / None（未定义：溢出、除零、越界读取等）/ Err（规则级错误）
//! 未定义在布尔上下文中视为 false

use crate::compiler::ir::{
    compare, float_arith, int_arith, int_bitwise, str_op, Anchor, CmpTy, Expr, NumTy, OfTargets,
    PatternRef, Quantifier, Value,
};
use crate::error::EvalError;
use crate::indexer::{Match, MatchSet};
use crate::rules::{CompiledRule, RulesInner};
use crate::variables::Variable;

type EvalResult<T> = Result<Option<T>, EvalError>;

/// 规则求值状态（按声明顺序求值，只会引用已求值的规则）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleState {
    Pending,
    True,
    False,
    Error,
}

/// 单条规则的求值器
pub(crate) struct Evaluator<'a> {
    rules: &'a RulesInner,
    rule: &'a CompiledRule,
    data: &'a [u8],
    matches: &'a MatchSet,
    bindings: &'a [Option<Variable>],
    states: &'a [RuleState],
    /// for..of 当前绑定的模式（规则内索引），内层在栈顶
    current: Vec<usize>,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        rules: &'a RulesInner,
        rule: &'a CompiledRule,
        data: &'a [u8],
        matches: &'a MatchSet,
        bindings: &'a [Option<Variable>],
        states: &'a [RuleState],
    ) -> Self {
        Evaluator {
            rules,
            rule,
            data,
            matches,
            bindings,
            states,
            current: Vec::new(),
        }
    }

    /// 求值规则条件，未定义视为 false
    pub fn evaluate(&mut self) -> Result<bool, EvalError> {
        let rule = self.rule;
        Ok(self.eval_bool(&rule.condition)?.unwrap_or(false))
    }

    // ===================== 类型化求值 =====================

    fn eval_bool(&mut self, expr: &Expr) -> EvalResult<bool> {
        match self.eval(expr)? {
            Some(Value::Bool(b)) => Ok(Some(b)),
            None => Ok(None),
            Some(_) => Err(EvalError::InvariantViolation("expected boolean value")),
        }
    }

    fn eval_int(&mut self, expr: &Expr) -> EvalResult<i64> {
        match self.eval(expr)? {
            Some(Value::Integer(v)) => Ok(Some(v)),
            None => Ok(None),
            Some(_) => Err(EvalError::InvariantViolation("expected integer value")),
        }
    }

    fn eval_float(&mut self, expr: &Expr) -> EvalResult<f64> {
        match self.eval(expr)? {
            Some(Value::Float(v)) => Ok(Some(v)),
            None => Ok(None),
            Some(_) => Err(EvalError::InvariantViolation("expected float value")),
        }
    }

    fn eval_bytes(&mut self, expr: &Expr) -> EvalResult<Vec<u8>> {
        match self.eval(expr)? {
            Some(Value::String(s)) => Ok(Some(s)),
            None => Ok(None),
            Some(_) => Err(EvalError::InvariantViolation("expected string value")),
        }
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        let value = match expr {
            Expr::Const(value) => Some(value.clone()),
            Expr::Filesize => Some(Value::Integer(self.data.len() as i64)),
            Expr::Var { index, .. } => Some(self.variable(*index)?),
            Expr::RuleRef(index) => Some(Value::Bool(self.rule_ref(*index)?)),
            Expr::PatternMatch { pattern, anchor } => {
                let local = self.resolve(*pattern)?;
                self.pattern_matches(local, anchor.as_ref())?.map(Value::Bool)
            }
            Expr::PatternCount { pattern, range } => {
                let local = self.resolve(*pattern)?;
                match range {
                    None => Some(Value::Integer(self.matches_of(local).len() as i64)),
                    Some((lo, hi)) => {
                        let (Some(lo), Some(hi)) = (self.eval_int(lo)?, self.eval_int(hi)?) else {
                            return Ok(None);
                        };
                        let count = self
                            .matches_of(local)
                            .iter()
                            .filter(|m| in_range(m.offset, lo, hi))
                            .count();
                        Some(Value::Integer(count as i64))
                    }
                }
            }
            Expr::PatternOffset { pattern, index } => {
                let local = self.resolve(*pattern)?;
                self.nth_match(local, index)?
                    .map(|m| Value::Integer(m.offset as i64))
            }
            Expr::PatternLength { pattern, index } => {
                let local = self.resolve(*pattern)?;
                self.nth_match(local, index)?
                    .map(|m| Value::Integer(m.length as i64))
            }
            Expr::Read { func, offset } => self
                .eval_int(offset)?
                .and_then(|offset| func.read(self.data, offset))
                .map(Value::Integer),
            Expr::Not(inner) => self.eval_bool(inner)?.map(|b| Value::Bool(!b)),
            Expr::And(operands) => {
                for operand in operands {
                    if self.eval_bool(operand)? != Some(true) {
                        return Ok(Some(Value::Bool(false)));
                    }
                }
                Some(Value::Bool(true))
            }
            Expr::Or(operands) => {
                for operand in operands {
                    if self.eval_bool(operand)? == Some(true) {
                        return Ok(Some(Value::Bool(true)));
                    }
                }
                Some(Value::Bool(false))
            }
            Expr::Neg { ty, operand } => match ty {
                NumTy::Integer => self
                    .eval_int(operand)?
                    .and_then(i64::checked_neg)
                    .map(Value::Integer),
                NumTy::Float => self.eval_float(operand)?.map(|v| Value::Float(-v)),
            },
            Expr::BitNot(inner) => self.eval_int(inner)?.map(|v| Value::Integer(!v)),
            Expr::Arith { op, ty, lhs, rhs } => match ty {
                NumTy::Integer => {
                    let (Some(a), Some(b)) = (self.eval_int(lhs)?, self.eval_int(rhs)?) else {
                        return Ok(None);
                    };
                    int_arith(*op, a, b).map(Value::Integer)
                }
                NumTy::Float => {
                    let (Some(a), Some(b)) = (self.eval_float(lhs)?, self.eval_float(rhs)?) else {
                        return Ok(None);
                    };
                    Some(Value::Float(float_arith(*op, a, b)))
                }
            },
            Expr::Bitwise { op, lhs, rhs } => {
                let (Some(a), Some(b)) = (self.eval_int(lhs)?, self.eval_int(rhs)?) else {
                    return Ok(None);
                };
                int_bitwise(*op, a, b).map(Value::Integer)
            }
            Expr::Compare { op, ty, lhs, rhs } => {
                let result = match ty {
                    CmpTy::Integer => match (self.eval_int(lhs)?, self.eval_int(rhs)?) {
                        (Some(a), Some(b)) => Some(compare(*op, &a, &b)),
                        _ => None,
                    },
                    CmpTy::Float => match (self.eval_float(lhs)?, self.eval_float(rhs)?) {
                        (Some(a), Some(b)) => Some(compare(*op, &a, &b)),
                        _ => None,
                    },
                    CmpTy::String => match (self.eval_bytes(lhs)?, self.eval_bytes(rhs)?) {
                        (Some(a), Some(b)) => Some(compare(*op, a.as_slice(), b.as_slice())),
                        _ => None,
                    },
                    CmpTy::Bool => match (self.eval_bool(lhs)?, self.eval_bool(rhs)?) {
                        (Some(a), Some(b)) => Some(compare(*op, &a, &b)),
                        _ => None,
                    },
                };
                result.map(Value::Bool)
            }
            Expr::StrOp { op, lhs, rhs } => {
                let (Some(a), Some(b)) = (self.eval_bytes(lhs)?, self.eval_bytes(rhs)?) else {
                    return Ok(None);
                };
                Some(Value::Bool(str_op(*op, &a, &b)))
            }
            Expr::Matches { lhs, regex } => self
                .eval_bytes(lhs)?
                .map(|s| Value::Bool(regex.is_match(&s))),
            Expr::IntToFloat(inner) => self.eval_int(inner)?.map(|v| Value::Float(v as f64)),
            Expr::Of {
                quantifier,
                targets,
                anchor,
            } => self.of(quantifier, targets, anchor.as_ref())?.map(Value::Bool),
            Expr::ForOf {
                quantifier,
                patterns,
                body,
            } => self.for_of(quantifier, patterns, body)?.map(Value::Bool),
        };
        Ok(value)
    }

    // ===================== 名称与模式 =====================

    fn variable(&self, index: usize) -> Result<Value, EvalError> {
        match self.bindings.get(index) {
            Some(Some(value)) => Ok(match value {
                Variable::Integer(v) => Value::Integer(*v),
                Variable::Float(v) => Value::Float(*v),
                Variable::Bool(v) => Value::Bool(*v),
                Variable::String(v) => Value::String(v.as_bytes().to_vec()),
            }),
            _ => {
                let name = self
                    .rules
                    .schema
                    .decl(index)
                    .map(|d| d.name.clone())
                    .unwrap_or_default();
                Err(EvalError::UnboundVariable(name))
            }
        }
    }

    fn rule_ref(&self, index: usize) -> Result<bool, EvalError> {
        match self.states.get(index) {
            Some(RuleState::True) => Ok(true),
            Some(RuleState::False) => Ok(false),
            Some(RuleState::Error) => {
                let name = self
                    .rules
                    .rules
                    .get(index)
                    .map(|r| r.info.name.clone())
                    .unwrap_or_default();
                Err(EvalError::DependencyFailed(name))
            }
            _ => Err(EvalError::InvariantViolation(
                "rule referenced before evaluation",
            )),
        }
    }

    fn resolve(&self, pattern: PatternRef) -> Result<usize, EvalError> {
        match pattern {
            PatternRef::Id(local) => Ok(local),
            PatternRef::Current => self.current.last().copied().ok_or(
                EvalError::InvariantViolation("anonymous pattern outside of for..of"),
            ),
        }
    }

    fn matches_of(&self, local: usize) -> &'a [Match] {
        let matches: &'a MatchSet = self.matches;
        matches.get(self.rule.global_pattern(local))
    }

    /// `@a[i]` / `!a[i]`：i 从1开始，越界为未定义
    fn nth_match(&mut self, local: usize, index: &Expr) -> EvalResult<Match> {
        let Some(i) = self.eval_int(index)? else {
            return Ok(None);
        };
        let found = usize::try_from(i)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.matches_of(local).get(i))
            .copied();
        Ok(found)
    }

    /// `$a`、`$a at e`、`$a in (lo..hi)`
    fn pattern_matches(&mut self, local: usize, anchor: Option<&Anchor>) -> EvalResult<bool> {
        let matches = self.matches_of(local);
        match anchor {
            None => Ok(Some(!matches.is_empty())),
            Some(Anchor::At(offset)) => {
                let Some(offset) = self.eval_int(offset)? else {
                    return Ok(None);
                };
                Ok(Some(matches.iter().any(|m| m.offset as i64 == offset)))
            }
            Some(Anchor::In(lo, hi)) => {
                let (Some(lo), Some(hi)) = (self.eval_int(lo)?, self.eval_int(hi)?) else {
                    return Ok(None);
                };
                Ok(Some(matches.iter().any(|m| in_range(m.offset, lo, hi))))
            }
        }
    }

    // ===================== 量词 =====================

    fn of(
        &mut self,
        quantifier: &Quantifier,
        targets: &OfTargets,
        anchor: Option<&Anchor>,
    ) -> EvalResult<bool> {
        let total = match targets {
            OfTargets::Patterns(ids) => ids.len(),
            OfTargets::Exprs(exprs) => exprs.len(),
        };
        let Some(mut counter) = self.quantifier(quantifier, total)? else {
            return Ok(None);
        };
        for idx in 0..total {
            let hit = match targets {
                OfTargets::Patterns(ids) => self.pattern_matches(ids[idx], anchor)?,
                OfTargets::Exprs(exprs) => self.eval_bool(&exprs[idx])?,
            };
            if let Some(done) = counter.feed(hit == Some(true)) {
                return Ok(Some(done));
            }
        }
        Ok(Some(counter.finish()))
    }

    fn for_of(
        &mut self,
        quantifier: &Quantifier,
        patterns: &[usize],
        body: &Expr,
    ) -> EvalResult<bool> {
        let Some(mut counter) = self.quantifier(quantifier, patterns.len())? else {
            return Ok(None);
        };
        for &local in patterns {
            self.current.push(local);
            let hit = self.eval_bool(body);
            self.current.pop();
            if let Some(done) = counter.feed(hit? == Some(true)) {
                return Ok(Some(done));
            }
        }
        Ok(Some(counter.finish()))
    }

    fn quantifier(&mut self, quantifier: &Quantifier, total: usize) -> EvalResult<QuantifierCounter> {
        let required = match quantifier {
            Quantifier::All => Required::AtLeast(total),
            Quantifier::Any => Required::AtLeast(1),
            Quantifier::None => Required::Zero,
            Quantifier::Count(expr) => match self.eval_int(expr)? {
                None => return Ok(None),
                Some(n) if n < 0 => return Ok(None),
                Some(0) => Required::Zero,
                Some(n) => Required::AtLeast(usize::try_from(n).unwrap_or(usize::MAX)),
            },
            Quantifier::Percent(expr) => match self.eval_int(expr)? {
                Some(p) if (1..=100).contains(&p) => {
                    // ceil(p * n / 100)
                    let p = p as usize;
                    Required::AtLeast((p * total + 99) / 100)
                }
                _ => return Ok(None),
            },
        };
        Ok(Some(QuantifierCounter {
            required,
            remaining: total,
            hits: 0,
        }))
    }
}

#[inline]
fn in_range(offset: usize, lo: i64, hi: i64) -> bool {
    let offset = offset as i64;
    lo <= offset && offset <= hi
}

#[derive(Debug, Clone, Copy)]
enum Required {
    /// `none` / `0 of`：没有任何命中
    Zero,
    AtLeast(usize),
}

/// 量词计数器，支持提前结束
#[derive(Debug)]
struct QuantifierCounter {
    required: Required,
    remaining: usize,
    hits: usize,
}

impl QuantifierCounter {
    /// 返回 Some 表示结果已确定
    fn feed(&mut self, hit: bool) -> Option<bool> {
        self.remaining -= 1;
        if hit {
            self.hits += 1;
        }
        match self.required {
            Required::Zero => hit.then_some(false),
            Required::AtLeast(n) => {
                if self.hits >= n {
                    Some(true)
                } else if self.hits + self.remaining < n {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    fn finish(&self) -> bool {
        match self.required {
            Required::Zero => self.hits == 0,
            Required::AtLeast(n) => self.hits >= n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantifier_counter() {
        // 2 of 3：第二次命中即结束
        let mut counter = QuantifierCounter {
            required: Required::AtLeast(2),
            remaining: 3,
            hits: 0,
        };
        assert_eq!(counter.feed(true), None);
        assert_eq!(counter.feed(true), Some(true));

        // all of 2：第一次未命中即结束
        let mut counter = QuantifierCounter {
            required: Required::AtLeast(2),
            remaining: 2,
            hits: 0,
        };
        assert_eq!(counter.feed(false), Some(false));

        // none
        let mut counter = QuantifierCounter {
            required: Required::Zero,
            remaining: 2,
            hits: 0,
        };
        assert_eq!(counter.feed(false), None);
        assert_eq!(counter.feed(false), None);
        assert!(counter.finish());

        // 数量大于集合大小恒为 false
        let counter = QuantifierCounter {
            required: Required::AtLeast(5),
            remaining: 0,
            hits: 0,
        };
        assert!(!counter.finish());
    }

    #[test]
    fn test_in_range_is_inclusive() {
        assert!(in_range(5, 0, 5));
        assert!(in_range(0, 0, 0));
        assert!(!in_range(6, 0, 5));
        assert!(!in_range(0, 1, -1));
    }
}
