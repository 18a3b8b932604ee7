use thiserror::Error;
use serde::{Serialize, Deserialize};
use std::io;

use crate::core::task::state::{TaskStatus, WorkerState};
use crate::core::task::meta::TaskId;

/// 持久化到任务记录里的失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    RangeNotSupported,
    UnexpectedStatus,
    StreamingIo,
    Sink,
    Probe,
    ResourceChanged,
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DownloadError {
    #[error("服务器不支持断点续传: {0}")]
    RangeNotSupported(String),

    #[error("服务器返回了意外的状态码: {0}")]
    UnexpectedStatus(u16),

    #[error("无法获取文件大小: {0}")]
    MissingContentLength(String),

    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("数据流读取失败: {0}")]
    StreamingIo(String),

    #[error("写入输出失败: {0}")]
    Sink(String),

    #[error("文件大小不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch {
        expected: u64,
        actual: u64,
    },

    #[error("下载暂停")]
    Aborted,

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("无效的文件名: {0}")]
    InvalidFilename(String),

    #[error("任务ID不存在: {0}")]
    TaskNotFound(TaskId),

    #[error("任务没有正在运行的下载: {0}")]
    NoActiveWorker(TaskId),

    #[error("任务 {task_id} 当前状态为 {status:?}，不允许该操作")]
    InvalidTaskState {
        task_id: TaskId,
        status: TaskStatus,
    },

    #[error("文件名 {filename} 已被任务 {task_id} 使用")]
    FilenameInUse {
        filename: String,
        task_id: TaskId,
    },

    #[error("非法的状态转换: {from:?} -> {to:?}")]
    InvalidTransition {
        from: WorkerState,
        to: WorkerState,
    },

    #[error("任务存储错误: {0}")]
    Store(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    IoError(String),
}

impl DownloadError {
    /// 传输层的失败可以从已确认的偏移处重新请求
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::NetworkError(_) | DownloadError::StreamingIo(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::RangeNotSupported(_) => FailureKind::RangeNotSupported,
            DownloadError::UnexpectedStatus(_) => FailureKind::UnexpectedStatus,
            DownloadError::MissingContentLength(_) => FailureKind::Probe,
            DownloadError::NetworkError(_) | DownloadError::StreamingIo(_) => FailureKind::StreamingIo,
            DownloadError::Sink(_) | DownloadError::IoError(_) => FailureKind::Sink,
            DownloadError::SizeMismatch { .. } => FailureKind::ResourceChanged,
            _ => FailureKind::Internal,
        }
    }
}

impl From<io::Error> for DownloadError {
    fn from(error: io::Error) -> Self {
        DownloadError::IoError(error.to_string())
    }
}
