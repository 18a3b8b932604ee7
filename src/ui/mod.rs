mod progress;

use std::fmt;
use std::time::Duration;

pub use progress::ProgressManager;
use crate::core::table::TaskStats;

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    println!("✗ {}", message);
}

pub struct DownloadSummary {
    pub stats: TaskStats,
    pub elapsed_time: Duration,
}

impl DownloadSummary {
    pub fn new(stats: TaskStats, elapsed_time: Duration) -> Self {
        Self { stats, elapsed_time }
    }
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "总任务数: {}", self.stats.total)?;
        writeln!(
            f,
            "已下载: {} / {}",
            format_size(self.stats.downloaded_bytes),
            format_size(self.stats.total_bytes)
        )?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        writeln!(f, "完成: {}", self.stats.completed)?;
        writeln!(f, "暂停: {}", self.stats.paused)?;
        writeln!(f, "失败: {}", self.stats.failed)?;
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
