use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::task::meta::{DownloadTask, TaskId};
use crate::core::task::state::TaskStatus;

const BAR_TEMPLATE: &str = "{msg:24!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}";

/// 每个任务一条进度条，由任务快照驱动
pub struct ProgressManager {
    multi: MultiProgress,
    bars: HashMap<TaskId, ProgressBar>,
    style: ProgressStyle,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            style,
        }
    }

    /// 用最新的任务列表刷新进度条
    pub fn sync(&mut self, tasks: &[DownloadTask]) {
        for task in tasks {
            let bar = self.bars.entry(task.task_id).or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(task.total_bytes));
                bar.set_style(self.style.clone());
                bar
            });
            if task.total_bytes > 0 {
                bar.set_length(task.total_bytes);
            }
            bar.set_position(task.downloaded_bytes);
            bar.set_message(format!("{} {}", status_label(task.status), task.filename));
        }
    }

    pub fn position(&self, task_id: &TaskId) -> Option<u64> {
        self.bars.get(task_id).map(|bar| bar.position())
    }

    pub fn finish(&self) {
        for bar in self.bars.values() {
            bar.abandon();
        }
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "等待",
        TaskStatus::Downloading => "下载",
        TaskStatus::Paused => "暂停",
        TaskStatus::Completed => "完成",
        TaskStatus::Failed => "失败",
    }
}
