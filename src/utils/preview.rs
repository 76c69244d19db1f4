use std::fmt::{self, Write};

// ======================== 输出截断工具函数 ========================
/// 字节串截断预览 - 零堆分配的日志预览核心函数
/// 逻辑：
/// 1. 可打印 ASCII 原样输出，其余字节输出为 \xNN
/// 2. 达到最大长度时立即终止并追加省略号
/// 3. 全程无堆分配、无String创建
#[inline(always)]
pub fn preview_bytes<'a>(bytes: &'a [u8], max_len: usize) -> impl fmt::Display + 'a {
    struct BytesView<'a> {
        source: &'a [u8],
        max_length: usize,
    }

    impl<'a> fmt::Display for BytesView<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (idx, &byte) in self.source.iter().enumerate() {
                // 达到最大长度，立即退出（避免多余遍历）
                if idx >= self.max_length {
                    f.write_str("...")?;
                    break;
                }
                match byte {
                    b'"' => f.write_str("\\\"")?,
                    b'\\' => f.write_str("\\\\")?,
                    0x20..=0x7E => f.write_char(byte as char)?,
                    _ => write!(f, "\\x{:02x}", byte)?,
                }
            }
            Ok(())
        }
    }

    BytesView {
        source: bytes,
        max_length: max_len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_bytes() {
        assert_eq!(preview_bytes(b"MZ\x90\x00", 10).to_string(), "MZ\\x90\\x00");
        assert_eq!(preview_bytes(b"abcdef", 3).to_string(), "abc...");
        assert_eq!(preview_bytes(b"a\"b", 10).to_string(), "a\\\"b");
    }
}
