//! 文件命名与内容校验的纯函数工具。

use chrono::Utc;
use rand::Rng;
use std::path::Path;

/// 随机段的上界（不含）。
const RANDOM_SUFFIX_BOUND: u32 = 1_000_000_000;

/// 存储文件名：`{unixMillis}-{random}-{originalName}`。
pub fn stored_file_name(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let random = rand::rng().random_range(0..RANDOM_SUFFIX_BOUND);
    format_stored_name(millis, random, original_name)
}

fn format_stored_name(millis: i64, random: u32, original_name: &str) -> String {
    format!("{millis}-{random}-{original_name}")
}

/// 只保留客户端文件名的最后一段路径，空名回退为 `report.pdf`。
pub fn client_file_name(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "report.pdf".to_string())
}

/// 空白串替换为 `_` 并加上毫秒时间戳前缀。
pub fn generate_unique_file_name(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    format!("{millis}-{}", underscore_whitespace(original_name))
}

fn underscore_whitespace(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

/// JPEG SOI 标记（`FF D8`）检查。
pub fn is_valid_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8])
}
