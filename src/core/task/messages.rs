use actix::Message;
use serde::{Serialize, Deserialize};

use crate::core::error::FailureKind;
use super::meta::TaskId;
use super::state::WorkerState;

/// Coordinator → Worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerCommand {
    #[serde(rename_all = "camelCase")]
    Start {
        task_id: TaskId,
        url: String,
        filename: String,
    },
    #[serde(rename_all = "camelCase")]
    Resume {
        task_id: TaskId,
        url: String,
        filename: String,
        downloaded: u64,
        total_size: u64,
    },
    #[serde(rename_all = "camelCase")]
    Pause { task_id: TaskId },
}
impl Message for WorkerCommand { type Result = (); }

/// Worker → Coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerEvent {
    #[serde(rename_all = "camelCase")]
    Init { task_id: TaskId, total_size: u64 },
    #[serde(rename_all = "camelCase")]
    Progress { task_id: TaskId, downloaded: u64, progress: f64 },
    #[serde(rename_all = "camelCase")]
    Paused { task_id: TaskId, downloaded: u64 },
    #[serde(rename_all = "camelCase")]
    Complete { task_id: TaskId },
    #[serde(rename_all = "camelCase")]
    Error { task_id: TaskId, error: String, kind: FailureKind },
}

impl WorkerEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            WorkerEvent::Init { task_id, .. }
            | WorkerEvent::Progress { task_id, .. }
            | WorkerEvent::Paused { task_id, .. }
            | WorkerEvent::Complete { task_id }
            | WorkerEvent::Error { task_id, .. } => *task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerEvent::Paused { .. } | WorkerEvent::Complete { .. } | WorkerEvent::Error { .. }
        )
    }
}

/// 带 worker 代号的事件，用来识别已被替换的旧 worker
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub generation: u64,
    pub event: WorkerEvent,
}
impl Message for WorkerReport { type Result = (); }

/// 查询 worker 当前状态
pub struct QueryWorkerState;
impl Message for QueryWorkerState { type Result = WorkerState; }
