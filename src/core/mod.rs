//! Core: 下载 worker、任务协调器以及任务存储/输出/数据源的接口

pub mod coordinator;
pub mod error;
pub mod sink;
pub mod source;
pub mod store;
pub mod table;
pub mod task;

pub use coordinator::{
    GetStats, ListTasks, PauseAll, PauseDownload, QueryTask, RemoveDownload, ResumeAllPaused,
    ResumeDownload, StartDownload, TaskCoordinator,
};
pub use error::{DownloadError, FailureKind};
pub use store::{JsonTaskStore, MemoryTaskStore, TaskStore};
pub use table::TaskStats;
