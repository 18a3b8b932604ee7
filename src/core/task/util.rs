use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// HEAD 探测得到的资源信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub size: Option<u64>,
    pub supports_range: bool,
}

/// `Content-Range: bytes <start>-<end>/<total>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = PATTERN.get_or_init(|| {
            Regex::new(r"^bytes\s+(\d+)-(\d+)/(\d+|\*)$").expect("Content-Range 正则无效")
        });
        let caps = re.captures(value.trim())?;
        let start = caps[1].parse().ok()?;
        let end = caps[2].parse().ok()?;
        let total = match &caps[3] {
            "*" => None,
            n => Some(n.parse().ok()?),
        };
        if end < start {
            return None;
        }
        Some(Self { start, end, total })
    }
}

/// `Accept-Ranges` 头里是否声明了 bytes
pub fn accepts_byte_ranges(value: &str) -> bool {
    value
        .split(',')
        .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
}

/// 下载百分比。先乘后除，整数比例可以精确表示
pub fn percent(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    downloaded as f64 * 100.0 / total as f64
}
