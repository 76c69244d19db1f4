//! 模式降级：AST 模式定义 → CompiledPattern（字面量变体 / 正则 + 准入网关）

use regex::bytes::{Regex, RegexBuilder};
use regex_syntax::ParserBuilder;
use rustc_hash::FxHashSet;

use super::hex::{lower_hex, HexLowering};
use super::warnings::CompileWarning;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::indexer::{plan_regex_gate, CompiledPattern, LiteralVariant, MatchGate, PatternPlan};
use crate::parser::ast::{Modifier, Pattern, PatternKind};
use crate::parser::SourceCode;

/// 降级上下文
pub(crate) struct PatternContext<'a> {
    pub rule_index: usize,
    pub rule_name: &'a str,
    pub source: &'a SourceCode,
    pub config: &'a CompilerConfig,
}

/// 已校验的修饰符集合
#[derive(Debug, Clone, Copy, Default)]
struct Modifiers {
    nocase: bool,
    wide: bool,
    ascii: bool,
    fullword: bool,
    private: bool,
}

/// 降级单个模式
/// 返回：编译模式 + 可能的慢模式警告
pub(crate) fn lower_pattern(
    ctx: &PatternContext<'_>,
    pattern: &Pattern,
) -> CompileResult<(CompiledPattern, Option<CompileWarning>)> {
    let modifiers = validate_modifiers(ctx, pattern)?;

    let plan = match &pattern.kind {
        PatternKind::Text(bytes) => {
            if bytes.is_empty() {
                return Err(CompileError::EmptyPattern {
                    rule: ctx.rule_name.to_string(),
                    identifier: pattern.identifier.clone(),
                    location: ctx.source.location(pattern.span),
                });
            }
            PatternPlan::Literal(text_variants(bytes, &modifiers))
        }
        PatternKind::Hex(tokens) => match lower_hex(tokens) {
            HexLowering::Literal(bytes) => PatternPlan::Literal(vec![LiteralVariant {
                bytes,
                nocase: false,
                wide: false,
            }]),
            HexLowering::Regex(src) => regex_plan(ctx, pattern, &src, false, true)?,
        },
        PatternKind::Regex {
            pattern: src,
            case_insensitive,
            dot_all,
        } => regex_plan(
            ctx,
            pattern,
            src,
            *case_insensitive || modifiers.nocase,
            *dot_all,
        )?,
    };

    let min_atom_len = match &plan {
        PatternPlan::Literal(variants) => variants.iter().map(|v| v.bytes.len()).min(),
        PatternPlan::Regex { gate, .. } => gate.min_atom_len(),
    };
    let warning = match min_atom_len {
        Some(len) if len >= ctx.config.min_atom_len => None,
        _ => {
            if ctx.config.error_on_slow_pattern {
                return Err(CompileError::SlowPattern {
                    rule: ctx.rule_name.to_string(),
                    identifier: pattern.identifier.clone(),
                    location: ctx.source.location(pattern.span),
                });
            }
            Some(CompileWarning::SlowPattern {
                rule: ctx.rule_name.to_string(),
                identifier: pattern.identifier.clone(),
                location: ctx.source.location(pattern.span),
            })
        }
    };

    Ok((
        CompiledPattern {
            rule: ctx.rule_index,
            identifier: pattern.identifier.clone(),
            is_private: modifiers.private,
            fullword: modifiers.fullword,
            plan,
        },
        warning,
    ))
}

fn validate_modifiers(ctx: &PatternContext<'_>, pattern: &Pattern) -> CompileResult<Modifiers> {
    let mut seen = FxHashSet::default();
    let mut modifiers = Modifiers::default();

    for (modifier, span) in &pattern.modifiers {
        if !seen.insert(*modifier) {
            return Err(CompileError::DuplicateModifier {
                modifier: modifier.to_string(),
                location: ctx.source.location(*span),
            });
        }

        let invalid_for = match (&pattern.kind, modifier) {
            (PatternKind::Hex(_), Modifier::Nocase | Modifier::Wide | Modifier::Ascii | Modifier::Fullword) => {
                Some("hex strings")
            }
            (PatternKind::Regex { .. }, Modifier::Wide) => Some("regular expressions"),
            _ => None,
        };
        if let Some(kind) = invalid_for {
            return Err(CompileError::InvalidModifier {
                modifier: modifier.to_string(),
                reason: format!("not supported for {}", kind),
                location: ctx.source.location(*span),
            });
        }

        match modifier {
            Modifier::Nocase => modifiers.nocase = true,
            Modifier::Wide => modifiers.wide = true,
            Modifier::Ascii => modifiers.ascii = true,
            Modifier::Fullword => modifiers.fullword = true,
            Modifier::Private => modifiers.private = true,
        }
    }
    Ok(modifiers)
}

/// ascii 为默认编码；仅给出 wide 时只生成 wide 变体
fn text_variants(bytes: &[u8], modifiers: &Modifiers) -> Vec<LiteralVariant> {
    let mut variants = Vec::with_capacity(2);
    if modifiers.ascii || !modifiers.wide {
        variants.push(LiteralVariant {
            bytes: bytes.to_vec(),
            nocase: modifiers.nocase,
            wide: false,
        });
    }
    if modifiers.wide {
        variants.push(LiteralVariant {
            bytes: to_wide(bytes),
            nocase: modifiers.nocase,
            wide: true,
        });
    }
    variants
}

/// UTF-16LE 交错编码
pub(crate) fn to_wide(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|&b| [b, 0]).collect()
}

fn regex_plan(
    ctx: &PatternContext<'_>,
    pattern: &Pattern,
    src: &str,
    case_insensitive: bool,
    dot_all: bool,
) -> CompileResult<PatternPlan> {
    let invalid = |message: String| CompileError::InvalidRegexp {
        message,
        location: ctx.source.location(pattern.span),
    };

    let regex = build_regex(src, case_insensitive, dot_all).map_err(|e| invalid(e.to_string()))?;
    let anchored = build_regex(&format!(r"\A(?:{})", src), case_insensitive, dot_all)
        .map_err(|e| invalid(e.to_string()))?;

    // 原子在大小写敏感的 HIR 上提取，nocase 时统一放入忽略大小写自动机
    let gate = match ParserBuilder::new()
        .unicode(false)
        .utf8(false)
        .dot_matches_new_line(dot_all)
        .build()
        .parse(src)
    {
        Ok(hir) => plan_regex_gate(&hir, case_insensitive, ctx.config.min_atom_len),
        Err(e) => {
            log::debug!("Regex HIR parse failed, pattern runs ungated | ${} | Error: {}", pattern.identifier, e);
            MatchGate::Open
        }
    };

    log::debug!(
        "Regex pattern planned | Rule: {} | ${} | Gate: {}",
        ctx.rule_name,
        pattern.identifier,
        gate
    );

    Ok(PatternPlan::Regex {
        regex,
        anchored,
        gate,
    })
}

/// 字节正则：关闭 Unicode，允许匹配任意字节
pub(crate) fn build_regex(
    src: &str,
    case_insensitive: bool,
    dot_all: bool,
) -> Result<Regex, regex::Error> {
    RegexBuilder::new(src)
        .unicode(false)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(dot_all)
        .build()
}
