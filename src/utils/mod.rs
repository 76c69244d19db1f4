//! 工具模块：日志预览等
pub mod preview;

pub use preview::preview_bytes;
