//! 源码位置：字节区间 Span + 行列定位 SourceLocation

use serde::Serialize;
use std::fmt;

/// 源码字节区间 [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// 合并两个区间（取覆盖范围）
    #[inline]
    pub fn combine(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// 面向用户的错误位置（来源标签 + 行 + 列，均从1开始）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub origin: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "{}:{}:{}", origin, self.line, self.column),
            None => write!(f, "line {}, column {}", self.line, self.column),
        }
    }
}

/// 一段规则源码（文本 + 来源标签）
/// 行首偏移在构造时预计算，定位错误时二分查找
#[derive(Debug, Clone)]
pub struct SourceCode {
    text: String,
    origin: Option<String>,
    line_starts: Vec<usize>,
}

impl SourceCode {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            text,
            origin: None,
            line_starts,
        }
    }

    /// 设置来源标签（文件名等），用于错误报告
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// 取区间对应的源码片段（越界或非字符边界时返回空串）
    pub fn slice(&self, span: Span) -> &str {
        self.text.get(span.start..span.end).unwrap_or("")
    }

    /// 字节偏移 → 行列
    pub fn location(&self, span: Span) -> SourceLocation {
        let offset = span.start.min(self.text.len());
        let line_idx = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line_idx];
        let column = self
            .text
            .get(line_start..offset)
            .map_or(offset - line_start, |s| s.chars().count())
            + 1;

        SourceLocation {
            origin: self.origin.clone(),
            line: line_idx + 1,
            column,
        }
    }
}

impl From<&str> for SourceCode {
    fn from(text: &str) -> Self {
        SourceCode::new(text)
    }
}

impl From<String> for SourceCode {
    fn from(text: String) -> Self {
        SourceCode::new(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_first_line() {
        let src = SourceCode::new("rule a { condition: true }");
        let loc = src.location(Span::new(5, 6));
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 6);
        assert_eq!(loc.to_string(), "line 1, column 6");
    }

    #[test]
    fn test_location_multi_line_with_origin() {
        let src = SourceCode::new("rule a {\n  condition:\n    true\n}").with_origin("a.yar");
        let offset = src.text().find("true").unwrap();
        let loc = src.location(Span::new(offset, offset + 4));
        assert_eq!(loc.line, 3);
        assert_eq!(loc.column, 5);
        assert_eq!(loc.to_string(), "a.yar:3:5");
    }

    #[test]
    fn test_span_combine() {
        let span = Span::new(10, 12).combine(Span::new(3, 5));
        assert_eq!(span, Span::new(3, 12));
    }
}
