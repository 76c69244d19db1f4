//! 编译与扫描配置，存储所有可配置项

/// 单个模式默认最多记录的匹配数
pub const DEFAULT_MAX_MATCHES_PER_PATTERN: usize = 1_000_000;

/// 编译器配置
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    // 慢模式（无原子/原子过短）是否升级为编译错误
    pub error_on_slow_pattern: bool,
    // 原子最小长度，低于该长度视为慢模式
    pub min_atom_len: usize,
    // 条件折叠为常量时是否产生警告
    pub warn_invariant_expression: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            error_on_slow_pattern: false,
            min_atom_len: 2,
            warn_invariant_expression: true,
        }
    }
}

impl CompilerConfig {
    /// 自定义配置
    pub fn custom() -> CompilerConfigBuilder {
        CompilerConfigBuilder::new()
    }
}

/// 编译器配置构建器
#[derive(Debug, Clone, Default)]
pub struct CompilerConfigBuilder {
    config: CompilerConfig,
}

impl CompilerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CompilerConfig::default(),
        }
    }

    pub fn error_on_slow_pattern(mut self, enabled: bool) -> Self {
        self.config.error_on_slow_pattern = enabled;
        self
    }

    pub fn min_atom_len(mut self, len: usize) -> Self {
        self.config.min_atom_len = len.max(1);
        self
    }

    pub fn warn_invariant_expression(mut self, enabled: bool) -> Self {
        self.config.warn_invariant_expression = enabled;
        self
    }

    pub fn build(self) -> CompilerConfig {
        self.config
    }
}

/// 扫描选项（每个 Scanner 独立持有）
#[derive(Debug, Clone)]
pub struct ScanOptions {
    // 单个模式最多记录的匹配数，超出部分丢弃
    pub max_matches_per_pattern: usize,
    // 结果中是否携带匹配位置
    pub include_matches: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_matches_per_pattern: DEFAULT_MAX_MATCHES_PER_PATTERN,
            include_matches: true,
        }
    }
}

impl ScanOptions {
    pub fn custom() -> ScanOptionsBuilder {
        ScanOptionsBuilder::new()
    }
}

/// 扫描选项构建器
#[derive(Debug, Clone, Default)]
pub struct ScanOptionsBuilder {
    options: ScanOptions,
}

impl ScanOptionsBuilder {
    pub fn new() -> Self {
        Self {
            options: ScanOptions::default(),
        }
    }

    pub fn max_matches_per_pattern(mut self, max: usize) -> Self {
        self.options.max_matches_per_pattern = max;
        self
    }

    pub fn include_matches(mut self, include: bool) -> Self {
        self.options.include_matches = include;
        self
    }

    pub fn build(self) -> ScanOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = CompilerConfig::custom()
            .error_on_slow_pattern(true)
            .min_atom_len(0)
            .build();
        assert!(config.error_on_slow_pattern);
        // 原子长度下限为1
        assert_eq!(config.min_atom_len, 1);

        let options = ScanOptions::custom().max_matches_per_pattern(3).build();
        assert_eq!(options.max_matches_per_pattern, 3);
        assert!(options.include_matches);
        assert_eq!(
            ScanOptions::default().max_matches_per_pattern,
            DEFAULT_MAX_MATCHES_PER_PATTERN
        );
    }
}
