use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::error::FailureKind;
use super::state::TaskStatus;

pub type TaskId = Uuid;

/// 失败原因
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

/// ================== 任务记录（持久化单元） ==================
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub task_id: TaskId,
    pub url: String,
    pub filename: String,
    pub status: TaskStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl DownloadTask {
    pub fn new(task_id: TaskId, url: String, filename: String) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            url,
            filename,
            status: TaskStatus::Pending,
            downloaded_bytes: 0,
            total_bytes: 0,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 派生的进度百分比，总大小未知时为 0
    pub fn progress_percent(&self) -> f64 {
        super::util::percent(self.downloaded_bytes, self.total_bytes)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
