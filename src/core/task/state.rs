use serde::{Serialize, Deserialize};

/// 下载任务状态（持久化）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// 单个 worker 实例的状态机
///
/// `Paused`、`Completed`、`Failed` 对该实例是终态，恢复下载会创建新的实例。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Idle,
    ProbingSize,
    Streaming,
    Paused,
    Completed,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Paused | WorkerState::Completed | WorkerState::Failed)
    }

    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Idle, ProbingSize) | (Idle, Paused) | (Idle, Failed) => true,
            (ProbingSize, Streaming) | (ProbingSize, Paused) | (ProbingSize, Failed) => true,
            (Streaming, Completed) | (Streaming, Paused) | (Streaming, Failed) => true,
            _ => false,
        }
    }
}
