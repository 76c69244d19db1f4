//! 语法分析：Token 序列 → AST
//! 表达式采用优先级爬升，结合顺序见 BinaryOp::precedence

use super::ast::*;
use super::span::Span;
use super::token::{Token, TokenKind, TokenValue};
use super::ParseError;

/// `not` 的操作数从比较运算这一层开始解析
const NOT_OPERAND_PREC: u8 = 3;
/// `at` 偏移表达式从按位或这一层开始解析，不吞掉 and/or/比较
const ANCHOR_PREC: u8 = 5;
/// 表达式最大嵌套层数（括号、一元运算、非逻辑二元运算链）
const MAX_EXPR_DEPTH: usize = 64;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn parse_source(mut self) -> Result<SourceFile, ParseError> {
        let mut rules = Vec::new();
        while !self.at(TokenKind::TkEof) {
            rules.push(self.parse_rule()?);
        }
        Ok(SourceFile { rules })
    }

    // ===================== 基础操作 =====================

    fn current(&self) -> &Token {
        // tokenize 保证末尾有 TkEof
        let idx = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[idx]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn kind_at(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map_or(TokenKind::TkEof, |t| t.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::new(
            &format!("expected {}, found {}", expected, token.kind),
            token.span,
        )
    }

    /// 上一个已消费 Token 的结束偏移
    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    /// 进入一层嵌套；超过上限直接报语法错误，后续各阶段的递归深度随之受限
    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            return Err(ParseError::new(
                "expression nested too deeply",
                self.current().span,
            ));
        }
        Ok(())
    }

    fn expect_name(&mut self) -> Result<(String, Span), ParseError> {
        let token = self.expect(TokenKind::TkName)?;
        match token.value {
            TokenValue::Ident(name) => Ok((name, token.span)),
            _ => Err(ParseError::new("expected identifier", token.span)),
        }
    }

    // ===================== 规则 =====================

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        let mut is_private = false;
        let mut is_global = false;
        loop {
            match self.kind() {
                TokenKind::TkPrivate => is_private = true,
                TokenKind::TkGlobal => is_global = true,
                _ => break,
            }
            self.bump();
        }
        self.expect(TokenKind::TkRule)?;
        let (name, name_span) = self.expect_name()?;

        let mut tags = Vec::new();
        if self.eat(TokenKind::TkColon) {
            while self.at(TokenKind::TkName) {
                let (tag, _) = self.expect_name()?;
                tags.push(tag);
            }
            if tags.is_empty() {
                return Err(self.unexpected("tag identifier"));
            }
        }

        self.expect(TokenKind::TkLeftBrace)?;

        let meta = if self.eat(TokenKind::TkMeta) {
            self.expect(TokenKind::TkColon)?;
            self.parse_meta()?
        } else {
            Vec::new()
        };

        let patterns = if self.eat(TokenKind::TkStrings) {
            self.expect(TokenKind::TkColon)?;
            self.parse_patterns()?
        } else {
            Vec::new()
        };

        self.expect(TokenKind::TkCondition)?;
        self.expect(TokenKind::TkColon)?;
        let condition = self.parse_expr(1)?;
        self.expect(TokenKind::TkRightBrace)?;

        Ok(Rule {
            name,
            name_span,
            is_private,
            is_global,
            tags,
            meta,
            patterns,
            condition,
        })
    }

    fn parse_meta(&mut self) -> Result<Vec<Meta>, ParseError> {
        let mut meta = Vec::new();
        while self.at(TokenKind::TkName) {
            let (key, key_span) = self.expect_name()?;
            self.expect(TokenKind::TkAssign)?;
            let negative = self.eat(TokenKind::TkMinus);
            let token = self.bump();
            let value = match (token.kind, token.value, negative) {
                (TokenKind::TkString, TokenValue::Bytes(bytes), false) => {
                    MetaValue::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                (TokenKind::TkInt, TokenValue::Int(v), neg) => {
                    MetaValue::Integer(signed_int(v, neg, token.span)?)
                }
                (TokenKind::TkFloat, TokenValue::Float(v), neg) => {
                    MetaValue::Float(if neg { -v } else { v })
                }
                (TokenKind::TkTrue, _, false) => MetaValue::Bool(true),
                (TokenKind::TkFalse, _, false) => MetaValue::Bool(false),
                _ => {
                    return Err(ParseError::new(
                        &format!("expected metadata value, found {}", token.kind),
                        token.span,
                    ))
                }
            };
            meta.push(Meta {
                key,
                value,
                span: key_span.combine(Span::new(self.prev_end(), self.prev_end())),
            });
        }
        if meta.is_empty() {
            return Err(self.unexpected("metadata identifier"));
        }
        Ok(meta)
    }

    fn parse_patterns(&mut self) -> Result<Vec<Pattern>, ParseError> {
        let mut patterns = Vec::new();
        while self.at(TokenKind::TkPatternIdent) {
            let ident = self.bump();
            let identifier = match ident.value {
                TokenValue::Ident(name) if !name.is_empty() => name,
                _ => {
                    return Err(ParseError::new(
                        "pattern declarations require an identifier",
                        ident.span,
                    ))
                }
            };
            self.expect(TokenKind::TkAssign)?;

            let token = self.bump();
            let kind = match (token.kind, token.value) {
                (TokenKind::TkString, TokenValue::Bytes(bytes)) => PatternKind::Text(bytes),
                (TokenKind::TkHexString, TokenValue::Hex(tokens)) => PatternKind::Hex(tokens),
                (
                    TokenKind::TkRegex,
                    TokenValue::Regex {
                        pattern,
                        case_insensitive,
                        dot_all,
                    },
                ) => PatternKind::Regex {
                    pattern,
                    case_insensitive,
                    dot_all,
                },
                (kind, _) => {
                    return Err(ParseError::new(
                        &format!("expected string, hex string or regular expression, found {}", kind),
                        token.span,
                    ))
                }
            };

            let mut modifiers = Vec::new();
            while self.kind().is_pattern_modifier() {
                let token = self.bump();
                let modifier = match token.kind {
                    TokenKind::TkNocase => Modifier::Nocase,
                    TokenKind::TkWide => Modifier::Wide,
                    TokenKind::TkAscii => Modifier::Ascii,
                    TokenKind::TkFullword => Modifier::Fullword,
                    _ => Modifier::Private,
                };
                modifiers.push((modifier, token.span));
            }

            patterns.push(Pattern {
                identifier,
                span: ident.span.combine(Span::new(self.prev_end(), self.prev_end())),
                kind,
                modifiers,
            });
        }
        if patterns.is_empty() {
            return Err(self.unexpected("pattern identifier"));
        }
        Ok(patterns)
    }

    // ===================== 表达式 =====================

    fn binary_op(&self) -> Option<BinaryOp> {
        let op = match self.kind() {
            TokenKind::TkOr => BinaryOp::Or,
            TokenKind::TkAnd => BinaryOp::And,
            TokenKind::TkEq => BinaryOp::Eq,
            TokenKind::TkNe => BinaryOp::Ne,
            TokenKind::TkContains => BinaryOp::Contains,
            TokenKind::TkIContains => BinaryOp::IContains,
            TokenKind::TkStartsWith => BinaryOp::StartsWith,
            TokenKind::TkIStartsWith => BinaryOp::IStartsWith,
            TokenKind::TkEndsWith => BinaryOp::EndsWith,
            TokenKind::TkIEndsWith => BinaryOp::IEndsWith,
            TokenKind::TkIEquals => BinaryOp::IEquals,
            TokenKind::TkMatches => BinaryOp::Matches,
            TokenKind::TkLt => BinaryOp::Lt,
            TokenKind::TkLe => BinaryOp::Le,
            TokenKind::TkGt => BinaryOp::Gt,
            TokenKind::TkGe => BinaryOp::Ge,
            TokenKind::TkBitOr => BinaryOp::BitOr,
            TokenKind::TkBitXor => BinaryOp::BitXor,
            TokenKind::TkBitAnd => BinaryOp::BitAnd,
            TokenKind::TkShl => BinaryOp::Shl,
            TokenKind::TkShr => BinaryOp::Shr,
            TokenKind::TkPlus => BinaryOp::Add,
            TokenKind::TkMinus => BinaryOp::Sub,
            TokenKind::TkMul => BinaryOp::Mul,
            TokenKind::TkDiv => BinaryOp::Div,
            // `50% of` 中的 % 属于量词
            TokenKind::TkMod if self.kind_at(1) != TokenKind::TkOf => BinaryOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    pub(crate) fn parse_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        // 左结合链每折叠一次，AST 就加深一层；and/or 链由分析阶段迭代展平，不计入
        let mut folds = 0;
        while let Some(op) = self.binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            if !matches!(op, BinaryOp::And | BinaryOp::Or) {
                self.enter()?;
                folds += 1;
            }
            let rhs = self.parse_expr(prec + 1)?;
            let span = lhs.span.combine(rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        self.depth -= folds;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = self.parse_unary_operand();
        self.depth -= 1;
        result
    }

    fn parse_unary_operand(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        let op = match self.kind() {
            TokenKind::TkNot => Some(UnaryOp::Not),
            TokenKind::TkMinus => Some(UnaryOp::Neg),
            TokenKind::TkBitNot => Some(UnaryOp::BitNot),
            _ => None,
        };
        let Some(op) = op else {
            return self.parse_postfix();
        };
        self.bump();
        // `-9223372036854775808` 的绝对值超出 i64，负号直接并入字面量
        if op == UnaryOp::Neg {
            if let TokenValue::Int(v) = self.current().value {
                let span = self.bump().span;
                return Ok(Expr::new(
                    ExprKind::Int(signed_int(v, true, span)?),
                    Span::new(start, span.end),
                ));
            }
        }
        let operand = if op == UnaryOp::Not {
            self.parse_expr(NOT_OPERAND_PREC)?
        } else {
            self.parse_unary()?
        };
        let span = Span::new(start, operand.span.end);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// 基本表达式 + 可选的 `of` / `% of` 量词后缀
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let primary = self.parse_primary()?;
        let start = primary.span.start;
        let quantifier = if self.at(TokenKind::TkOf) {
            Quantifier::Expr(Box::new(primary))
        } else if self.at(TokenKind::TkMod) && self.kind_at(1) == TokenKind::TkOf {
            self.bump();
            Quantifier::Percent(Box::new(primary))
        } else {
            return Ok(primary);
        };
        self.parse_of(quantifier, start)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        let start = token.span.start;
        match token.kind {
            TokenKind::TkTrue | TokenKind::TkFalse => {
                self.bump();
                Ok(Expr::new(
                    ExprKind::Bool(token.kind == TokenKind::TkTrue),
                    token.span,
                ))
            }
            TokenKind::TkInt | TokenKind::TkFloat | TokenKind::TkString | TokenKind::TkRegex => {
                self.bump();
                let kind = match token.value {
                    TokenValue::Int(v) => ExprKind::Int(signed_int(v, false, token.span)?),
                    TokenValue::Float(v) => ExprKind::Float(v),
                    TokenValue::Bytes(b) => ExprKind::Str(b),
                    TokenValue::Regex {
                        pattern,
                        case_insensitive,
                        dot_all,
                    } => ExprKind::Regexp {
                        pattern,
                        case_insensitive,
                        dot_all,
                    },
                    _ => return Err(ParseError::new("malformed literal", token.span)),
                };
                Ok(Expr::new(kind, token.span))
            }
            TokenKind::TkFilesize => {
                self.bump();
                Ok(Expr::new(ExprKind::Filesize, token.span))
            }
            TokenKind::TkName => {
                let (name, _) = self.expect_name()?;
                if self.eat(TokenKind::TkLeftParen) {
                    let arg = self.parse_expr(1)?;
                    self.expect(TokenKind::TkRightParen)?;
                    return Ok(Expr::new(
                        ExprKind::Call {
                            name,
                            arg: Box::new(arg),
                        },
                        Span::new(start, self.prev_end()),
                    ));
                }
                Ok(Expr::new(ExprKind::Ident(name), token.span))
            }
            TokenKind::TkPatternIdent => {
                self.bump();
                let ident = pattern_name(&token.value);
                let anchor = self.parse_anchor()?;
                Ok(Expr::new(
                    ExprKind::PatternMatch { ident, anchor },
                    Span::new(start, self.prev_end()),
                ))
            }
            TokenKind::TkPatternCount => {
                self.bump();
                let ident = pattern_name(&token.value);
                let range = if self.eat(TokenKind::TkIn) {
                    Some(self.parse_range()?)
                } else {
                    None
                };
                Ok(Expr::new(
                    ExprKind::PatternCount { ident, range },
                    Span::new(start, self.prev_end()),
                ))
            }
            TokenKind::TkPatternOffset | TokenKind::TkPatternLength => {
                self.bump();
                let ident = pattern_name(&token.value);
                let index = if self.eat(TokenKind::TkLeftBracket) {
                    let index = self.parse_expr(1)?;
                    self.expect(TokenKind::TkRightBracket)?;
                    Some(Box::new(index))
                } else {
                    None
                };
                let kind = if token.kind == TokenKind::TkPatternOffset {
                    ExprKind::PatternOffset { ident, index }
                } else {
                    ExprKind::PatternLength { ident, index }
                };
                Ok(Expr::new(kind, Span::new(start, self.prev_end())))
            }
            TokenKind::TkAll | TokenKind::TkAny | TokenKind::TkNone => {
                self.bump();
                let quantifier = match token.kind {
                    TokenKind::TkAll => Quantifier::All,
                    TokenKind::TkAny => Quantifier::Any,
                    _ => Quantifier::None,
                };
                if !self.at(TokenKind::TkOf) {
                    return Err(self.unexpected("`of`"));
                }
                self.parse_of(quantifier, start)
            }
            TokenKind::TkFor => self.parse_for_of(),
            TokenKind::TkLeftParen => {
                self.bump();
                let inner = self.parse_expr(1)?;
                self.expect(TokenKind::TkRightParen)?;
                Ok(Expr::new(inner.kind, Span::new(start, self.prev_end())))
            }
            TokenKind::TkPatternIdentWildcard => Err(ParseError::new(
                "pattern wildcards are only allowed in pattern sets",
                token.span,
            )),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `$a at <expr>` / `$a in (<lo>..<hi>)`
    fn parse_anchor(&mut self) -> Result<Option<Anchor>, ParseError> {
        if self.eat(TokenKind::TkAt) {
            let offset = self.parse_expr(ANCHOR_PREC)?;
            Ok(Some(Anchor::At(Box::new(offset))))
        } else if self.eat(TokenKind::TkIn) {
            Ok(Some(Anchor::In(self.parse_range()?)))
        } else {
            Ok(None)
        }
    }

    fn parse_range(&mut self) -> Result<Range, ParseError> {
        let open = self.expect(TokenKind::TkLeftParen)?;
        let lo = self.parse_expr(1)?;
        self.expect(TokenKind::TkDotDot)?;
        let hi = self.parse_expr(1)?;
        self.expect(TokenKind::TkRightParen)?;
        Ok(Range {
            lo: Box::new(lo),
            hi: Box::new(hi),
            span: Span::new(open.span.start, self.prev_end()),
        })
    }

    /// 当前位于 `of`
    fn parse_of(&mut self, quantifier: Quantifier, start: usize) -> Result<Expr, ParseError> {
        self.expect(TokenKind::TkOf)?;
        let items = if self.at(TokenKind::TkThem) || self.pattern_set_ahead() {
            OfItems::Patterns(self.parse_pattern_set()?)
        } else if self.eat(TokenKind::TkLeftParen) {
            let mut exprs = vec![self.parse_expr(1)?];
            while self.eat(TokenKind::TkComma) {
                exprs.push(self.parse_expr(1)?);
            }
            self.expect(TokenKind::TkRightParen)?;
            OfItems::Exprs(exprs)
        } else {
            return Err(self.unexpected("`them` or `(`"));
        };

        let anchor = match items {
            OfItems::Patterns(_) => self.parse_anchor()?,
            OfItems::Exprs(_) => None,
        };

        Ok(Expr::new(
            ExprKind::Of {
                quantifier,
                items,
                anchor,
            },
            Span::new(start, self.prev_end()),
        ))
    }

    /// 向前看：`(` 之后全部是 `$a` / `$a*`，以 `,` 分隔并以 `)` 结束
    fn pattern_set_ahead(&self) -> bool {
        if !self.at(TokenKind::TkLeftParen) {
            return false;
        }
        let mut offset = 1;
        loop {
            if !matches!(
                self.kind_at(offset),
                TokenKind::TkPatternIdent | TokenKind::TkPatternIdentWildcard
            ) {
                return false;
            }
            match self.kind_at(offset + 1) {
                TokenKind::TkComma => offset += 2,
                TokenKind::TkRightParen => return true,
                _ => return false,
            }
        }
    }

    fn parse_pattern_set(&mut self) -> Result<PatternSet, ParseError> {
        if self.at(TokenKind::TkThem) {
            let token = self.bump();
            return Ok(PatternSet::Them(token.span));
        }
        self.expect(TokenKind::TkLeftParen)?;
        let mut items = Vec::new();
        loop {
            let token = self.bump();
            let wildcard = match token.kind {
                TokenKind::TkPatternIdent => false,
                TokenKind::TkPatternIdentWildcard => true,
                kind => {
                    return Err(ParseError::new(
                        &format!("expected pattern identifier, found {}", kind),
                        token.span,
                    ))
                }
            };
            let name = pattern_name(&token.value).unwrap_or_default();
            if name.is_empty() && !wildcard {
                return Err(ParseError::new(
                    "anonymous pattern is not allowed in a pattern set",
                    token.span,
                ));
            }
            items.push(PatternSetItem {
                name,
                wildcard,
                span: token.span,
            });
            if !self.eat(TokenKind::TkComma) {
                break;
            }
        }
        self.expect(TokenKind::TkRightParen)?;
        Ok(PatternSet::Items(items))
    }

    /// `for <quantifier> of <set> : ( <body> )`
    fn parse_for_of(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(TokenKind::TkFor)?.span.start;
        let quantifier = match self.kind() {
            TokenKind::TkAll => {
                self.bump();
                Quantifier::All
            }
            TokenKind::TkAny => {
                self.bump();
                Quantifier::Any
            }
            TokenKind::TkNone => {
                self.bump();
                Quantifier::None
            }
            _ => {
                // 只取基本表达式，避免把 `n of` 当作后缀量词吞掉
                let expr = self.parse_primary()?;
                if self.eat(TokenKind::TkMod) {
                    Quantifier::Percent(Box::new(expr))
                } else {
                    Quantifier::Expr(Box::new(expr))
                }
            }
        };
        self.expect(TokenKind::TkOf)?;
        let set = self.parse_pattern_set()?;
        self.expect(TokenKind::TkColon)?;
        self.expect(TokenKind::TkLeftParen)?;
        let body = self.parse_expr(1)?;
        self.expect(TokenKind::TkRightParen)?;
        Ok(Expr::new(
            ExprKind::ForOf {
                quantifier,
                set,
                body: Box::new(body),
            },
            Span::new(start, self.prev_end()),
        ))
    }
}

/// 整数字面量的绝对值 + 符号 → i64
fn signed_int(magnitude: u64, negative: bool, span: Span) -> Result<i64, ParseError> {
    let value = if negative {
        -i128::from(magnitude)
    } else {
        i128::from(magnitude)
    };
    i64::try_from(value).map_err(|_| ParseError::new("integer literal out of range", span))
}

/// 模式 Token 中的名称；空名称表示匿名
fn pattern_name(value: &TokenValue) -> Option<String> {
    match value {
        TokenValue::Ident(name) if !name.is_empty() => Some(name.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn condition(src: &str) -> Expr {
        let text = format!("rule t {{ condition: {} }}", src);
        let file = parse(&text).unwrap();
        file.rules.into_iter().next().unwrap().condition
    }

    #[test]
    fn test_parse_full_rule() {
        let src = r#"
            global private rule demo : tag1 tag2 {
                meta:
                    author = "me"
                    score = -10
                    ratio = 0.5
                    enabled = true
                strings:
                    $a = "foo" nocase wide
                    $b = { 4D 5A }
                    $c = /ba+r/i
                condition:
                    $a and $b or $c
            }
        "#;
        let file = parse(src).unwrap();
        let rule = &file.rules[0];
        assert_eq!(rule.name, "demo");
        assert!(rule.is_global && rule.is_private);
        assert_eq!(rule.tags, vec!["tag1", "tag2"]);
        assert_eq!(rule.meta.len(), 4);
        assert_eq!(rule.meta[1].value, MetaValue::Integer(-10));
        assert_eq!(rule.patterns.len(), 3);
        assert_eq!(
            rule.patterns[0].modifiers.iter().map(|m| m.0).collect::<Vec<_>>(),
            vec![Modifier::Nocase, Modifier::Wide]
        );
        assert!(matches!(rule.patterns[1].kind, PatternKind::Hex(_)));
        assert!(matches!(
            rule.patterns[2].kind,
            PatternKind::Regex { case_insensitive: true, .. }
        ));
        // or 优先级最低
        assert!(matches!(
            rule.condition.kind,
            ExprKind::Binary { op: BinaryOp::Or, .. }
        ));
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 == 7  =>  ((1 + (2 * 3)) == 7)
        let expr = condition("1 + 2 * 3 == 7");
        let ExprKind::Binary { op, lhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Eq);
        let ExprKind::Binary { op, rhs, .. } = lhs.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));

        // not 仅作用于 and 之前的部分
        let expr = condition("not true and false");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn test_parse_pattern_expressions() {
        let expr = condition("$a at 100 and #a in (0..filesize) > 2 and @a[1] == !a[1]");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::And, .. }));

        let expr = condition("2 of ($a, $b*)");
        let ExprKind::Of { quantifier, items, .. } = expr.kind else {
            panic!("expected of");
        };
        assert!(matches!(quantifier, Quantifier::Expr(_)));
        let OfItems::Patterns(PatternSet::Items(items)) = items else {
            panic!("expected pattern set");
        };
        assert!(items[1].wildcard);

        let expr = condition("50% of them");
        assert!(matches!(
            expr.kind,
            ExprKind::Of { quantifier: Quantifier::Percent(_), .. }
        ));

        let expr = condition("any of (true, false)");
        assert!(matches!(
            expr.kind,
            ExprKind::Of { items: OfItems::Exprs(_), .. }
        ));

        let expr = condition("for all of ($a*) : ( # > 1 and @ < 10 )");
        assert!(matches!(expr.kind, ExprKind::ForOf { quantifier: Quantifier::All, .. }));

        let expr = condition("for 2 of them : ( $ )");
        assert!(matches!(expr.kind, ExprKind::ForOf { quantifier: Quantifier::Expr(_), .. }));
        let expr = condition("for 50% of them : ( $ )");
        assert!(matches!(expr.kind, ExprKind::ForOf { quantifier: Quantifier::Percent(_), .. }));

        let expr = condition("uint16(0) == 0x5A4D");
        let ExprKind::Binary { lhs, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert!(matches!(lhs.kind, ExprKind::Call { .. }));

        // 取模运算仍可用
        let expr = condition("filesize % 2 == 0");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("bad rule").is_err());
        assert!(parse("rule a { condition: }").is_err());
        assert!(parse("rule a { strings: $a = \"x\" }").is_err());
        assert!(parse("rule a { condition: true").is_err());
        assert!(parse("rule a { condition: $a* }").is_err());
        assert!(parse("rule a { strings: $ = \"x\" condition: true }").is_err());
    }

    #[test]
    fn test_integer_bounds() {
        assert_eq!(condition("-9223372036854775808").kind, ExprKind::Int(i64::MIN));
        assert_eq!(condition("-0x8000000000000000").kind, ExprKind::Int(i64::MIN));
        assert_eq!(condition("9223372036854775807").kind, ExprKind::Int(i64::MAX));
        assert!(parse("rule a { condition: 9223372036854775808 > 0 }").is_err());

        let file = parse("rule a { meta: low = -9223372036854775808 condition: true }").unwrap();
        assert_eq!(file.rules[0].meta[0].value, MetaValue::Integer(i64::MIN));
        assert!(parse("rule a { meta: high = 9223372036854775808 condition: true }").is_err());

        // 负号与后续运算的结合不变
        let expr = condition("-2 * 3 == -6");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Eq, .. }));
    }

    #[test]
    fn test_nesting_depth_limit() {
        let nested = |n: usize| format!("{}true{}", "(".repeat(n), ")".repeat(n));
        assert!(parse(&format!("rule a {{ condition: {} }}", nested(MAX_EXPR_DEPTH - 1))).is_ok());

        // 超限返回语法错误而不是栈溢出
        for cond in [
            nested(300),
            "not ".repeat(3000) + "true",
            "-".repeat(3000) + "1 == 1",
            vec!["1"; 500].join(" + ") + " == 500",
        ] {
            let err = parse(&format!("rule a {{ condition: {} }}", cond)).unwrap_err();
            assert_eq!(err.message, "expression nested too deeply");
        }

        // 长 and/or 链不受限制
        let chain = vec!["true"; 500].join(" or ");
        assert!(parse(&format!("rule a {{ condition: {} }}", chain)).is_ok());
    }
}
