//! `task` 模块包含单个下载任务的全部逻辑
//!
//! - `actor`: `DownloadWorker` 的定义
//! - `state`: 任务状态 `TaskStatus` 与 worker 状态机 `WorkerState`
//! - `meta`: 持久化的任务记录
//! - `messages`: 协调器与 worker 之间的消息
//! - `handlers`: 消息处理器
//! - `download`: 探测与流式下载过程
//! - `retry`: 重试逻辑
//! - `util`: `FileInfo`、`Content-Range` 解析等

pub mod actor;
pub mod state;
pub mod meta;
pub mod messages;
pub mod handlers;
pub mod download;
pub mod retry;
pub mod util;

pub use actor::DownloadWorker;
pub use messages::{WorkerCommand, WorkerEvent, WorkerReport};
pub use meta::{DownloadTask, FailureReason, TaskId};
pub use state::{TaskStatus, WorkerState};
pub use self::util::FileInfo;
pub use self::retry::{RetryStrategy, RetryContext};
