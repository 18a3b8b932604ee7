//! 内存任务表：按规则把 worker 事件合并进任务记录

use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::core::task::messages::WorkerEvent;
use crate::core::task::meta::{DownloadTask, FailureReason, TaskId};
use crate::core::task::state::TaskStatus;

/// 应用一个事件的结果
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// 仅进度变化
    Progressed,
    /// 状态变化，需要立即落盘（Completed 则从存储删除）
    StatusChanged(TaskStatus),
    /// 与已记录的进度相同
    Duplicate,
    Rejected(String),
    UnknownTask,
}

/// 任务统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub downloading: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: HashMap<TaskId, DownloadTask>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: DownloadTask) {
        self.tasks.insert(task.task_id, task);
    }

    pub fn get(&self, task_id: &TaskId) -> Option<&DownloadTask> {
        self.tasks.get(task_id)
    }

    pub fn get_mut(&mut self, task_id: &TaskId) -> Option<&mut DownloadTask> {
        self.tasks.get_mut(task_id)
    }

    pub fn remove(&mut self, task_id: &TaskId) -> Option<DownloadTask> {
        self.tasks.remove(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// 按创建时间排序的快照
    pub fn list(&self) -> Vec<DownloadTask> {
        let mut list: Vec<DownloadTask> = self.tasks.values().cloned().collect();
        list.sort_by_key(|t| t.created_at);
        list
    }

    pub fn ids_with_status(&self, status: TaskStatus) -> Vec<TaskId> {
        self.list()
            .into_iter()
            .filter(|t| t.status == status)
            .map(|t| t.task_id)
            .collect()
    }

    /// 占用 `filename` 且尚未完成的任务，`except` 用于排除自身
    pub fn filename_owner(&self, filename: &str, except: Option<TaskId>) -> Option<TaskId> {
        self.tasks
            .values()
            .find(|t| {
                t.filename == filename
                    && t.status != TaskStatus::Completed
                    && Some(t.task_id) != except
            })
            .map(|t| t.task_id)
    }

    pub fn stats(&self) -> TaskStats {
        let mut stats = TaskStats { total: self.tasks.len(), ..TaskStats::default() };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Downloading => stats.downloading += 1,
                TaskStatus::Paused => stats.paused += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
            stats.downloaded_bytes += task.downloaded_bytes;
            stats.total_bytes += task.total_bytes;
        }
        stats
    }

    pub fn apply(&mut self, event: &WorkerEvent) -> Applied {
        let Some(task) = self.tasks.get_mut(&event.task_id()) else {
            return Applied::UnknownTask;
        };
        if task.status.is_finished() {
            return Applied::Rejected(format!("任务已处于终态 {:?}", task.status));
        }

        match event {
            WorkerEvent::Init { total_size, .. } => {
                task.total_bytes = *total_size;
                task.status = TaskStatus::Downloading;
                task.failure = None;
            }
            WorkerEvent::Progress { downloaded, .. } => {
                let downloaded = *downloaded;
                if task.status != TaskStatus::Downloading {
                    return Applied::Rejected(format!("任务状态为 {:?}，忽略进度", task.status));
                }
                if downloaded < task.downloaded_bytes {
                    return Applied::Rejected(format!(
                        "进度回退: {} < {}", downloaded, task.downloaded_bytes
                    ));
                }
                if downloaded == task.downloaded_bytes {
                    return Applied::Duplicate;
                }
                if task.total_bytes > 0 && downloaded > task.total_bytes {
                    return Applied::Rejected(format!(
                        "进度 {} 超出总大小 {}", downloaded, task.total_bytes
                    ));
                }
                task.downloaded_bytes = downloaded;
                task.touch();
                return Applied::Progressed;
            }
            WorkerEvent::Paused { downloaded, .. } => {
                task.status = TaskStatus::Paused;
                task.downloaded_bytes = task.downloaded_bytes.max(*downloaded);
            }
            WorkerEvent::Complete { .. } => {
                task.status = TaskStatus::Completed;
                task.downloaded_bytes = task.total_bytes;
            }
            WorkerEvent::Error { error, kind, .. } => {
                task.status = TaskStatus::Failed;
                task.failure = Some(FailureReason { kind: *kind, message: error.clone() });
            }
        }
        task.touch();
        debug!("任务 {} -> {:?} ({} / {})", task.task_id, task.status, task.downloaded_bytes, task.total_bytes);
        Applied::StatusChanged(task.status)
    }
}
