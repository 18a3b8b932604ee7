//! 任务存储：按 taskId 保存任务记录，进程重启后依然可用

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::error::DownloadError;
use crate::core::task::meta::{DownloadTask, TaskId};

pub trait TaskStore: Send + Sync {
    fn get_all(&self) -> Result<Vec<DownloadTask>, DownloadError>;
    /// 单条记录原子写入，同一 taskId 后写覆盖先写
    fn upsert(&self, task: &DownloadTask) -> Result<(), DownloadError>;
    fn delete(&self, task_id: &TaskId) -> Result<(), DownloadError>;
}

fn lock_err<T>(_: T) -> DownloadError {
    DownloadError::Store("任务表锁已损坏".to_string())
}

fn sorted(map: &HashMap<TaskId, DownloadTask>) -> Vec<DownloadTask> {
    let mut tasks: Vec<DownloadTask> = map.values().cloned().collect();
    tasks.sort_by_key(|t| t.created_at);
    tasks
}

/// 内存存储，不跨进程
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, DownloadTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &TaskId) -> Option<DownloadTask> {
        self.tasks.lock().ok()?.get(task_id).cloned()
    }
}

impl TaskStore for MemoryTaskStore {
    fn get_all(&self) -> Result<Vec<DownloadTask>, DownloadError> {
        Ok(sorted(&*self.tasks.lock().map_err(lock_err)?))
    }

    fn upsert(&self, task: &DownloadTask) -> Result<(), DownloadError> {
        self.tasks.lock().map_err(lock_err)?.insert(task.task_id, task.clone());
        Ok(())
    }

    fn delete(&self, task_id: &TaskId) -> Result<(), DownloadError> {
        self.tasks.lock().map_err(lock_err)?.remove(task_id);
        Ok(())
    }
}

/// JSON 文件存储
///
/// 整个任务表保存为一个 JSON 数组，写入时先写临时文件再重命名。
pub struct JsonTaskStore {
    path: PathBuf,
    tasks: Mutex<HashMap<TaskId, DownloadTask>>,
}

impl JsonTaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DownloadError> {
        let path = path.as_ref().to_path_buf();
        let mut tasks = HashMap::new();
        if path.exists() {
            let data = fs::read_to_string(&path)
                .map_err(|e| DownloadError::Store(format!("无法读取任务文件 {}: {}", path.display(), e)))?;
            if !data.trim().is_empty() {
                let list: Vec<DownloadTask> = serde_json::from_str(&data)
                    .map_err(|e| DownloadError::Store(format!("任务文件格式错误 {}: {}", path.display(), e)))?;
                for task in list {
                    tasks.insert(task.task_id, task);
                }
            }
        }
        Ok(Self { path, tasks: Mutex::new(tasks) })
    }

    fn flush(&self, tasks: &HashMap<TaskId, DownloadTask>) -> Result<(), DownloadError> {
        let json = serde_json::to_string_pretty(&sorted(tasks))
            .map_err(|e| DownloadError::Store(format!("无法序列化任务表: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| DownloadError::Store(format!("无法写入 {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| DownloadError::Store(format!("无法替换 {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

impl TaskStore for JsonTaskStore {
    fn get_all(&self) -> Result<Vec<DownloadTask>, DownloadError> {
        Ok(sorted(&*self.tasks.lock().map_err(lock_err)?))
    }

    fn upsert(&self, task: &DownloadTask) -> Result<(), DownloadError> {
        let mut tasks = self.tasks.lock().map_err(lock_err)?;
        tasks.insert(task.task_id, task.clone());
        self.flush(&tasks)
    }

    fn delete(&self, task_id: &TaskId) -> Result<(), DownloadError> {
        let mut tasks = self.tasks.lock().map_err(lock_err)?;
        if tasks.remove(task_id).is_some() {
            self.flush(&tasks)?;
        }
        Ok(())
    }
}
