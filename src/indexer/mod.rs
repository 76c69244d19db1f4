mod atoms;
mod builder;
mod compiled;
mod enums;
mod matcher;

// 对外只导出具体内容，不导出模块名
pub use atoms::plan_regex_gate;
pub use builder::{IndexStats, PatternIndexBuilder};
pub use compiled::{CompiledPattern, LiteralVariant, PatternPlan};
pub use enums::{Atom, MatchGate};
pub use matcher::{is_full_word, Match, MatchSet, PatternIndex};
