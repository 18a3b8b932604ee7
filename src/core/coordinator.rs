//! 任务协调器：持有任务表和存活的 worker 句柄，把 worker 事件落到任务存储

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::core::sink::{FileSinkFactory, SinkFactory};
use crate::core::source::{HttpRangeSource, RangeSource};
use crate::core::store::TaskStore;
use crate::core::table::{Applied, TaskStats, TaskTable};
use crate::core::task::actor::DownloadWorker;
use crate::core::task::download::WorkerSettings;
use crate::core::task::messages::{WorkerCommand, WorkerReport};
use crate::core::task::meta::{DownloadTask, TaskId};
use crate::core::task::state::TaskStatus;
use crate::utils::validator;

/// 存活 worker 的句柄，只由协调器持有
pub struct WorkerHandle {
    pub generation: u64,
    pub cancel: CancellationToken,
    pub addr: Addr<DownloadWorker>,
}

pub struct TaskCoordinator {
    settings: WorkerSettings,
    persist_interval: Duration,
    store: Arc<dyn TaskStore>,
    source: Rc<dyn RangeSource>,
    sinks: Rc<dyn SinkFactory>,
    table: TaskTable,
    workers: HashMap<TaskId, WorkerHandle>,
    last_persisted: HashMap<TaskId, Instant>,
    next_generation: u64,
}

impl Actor for TaskCoordinator {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("任务协调器已启动，已载入 {} 个任务", self.table.len());
    }
}

impl TaskCoordinator {
    /// 从任务存储载入已有任务
    ///
    /// 上次运行中断时仍处于 `Pending`/`Downloading` 的任务改为 `Paused`，
    /// 存储中残留的 `Completed` 记录直接删除。
    pub fn new(
        settings: WorkerSettings,
        persist_interval: Duration,
        store: Arc<dyn TaskStore>,
        source: Rc<dyn RangeSource>,
        sinks: Rc<dyn SinkFactory>,
    ) -> Result<Self, DownloadError> {
        let mut table = TaskTable::new();
        for mut task in store.get_all()? {
            match task.status {
                TaskStatus::Completed => {
                    debug!("删除已完成任务的残留记录 {}", task.task_id);
                    store.delete(&task.task_id)?;
                    continue;
                }
                TaskStatus::Pending | TaskStatus::Downloading => {
                    info!(
                        "任务 {} 上次未正常结束，标记为暂停 ({} / {} 字节)",
                        task.task_id, task.downloaded_bytes, task.total_bytes
                    );
                    task.status = TaskStatus::Paused;
                    task.touch();
                    store.upsert(&task)?;
                }
                TaskStatus::Paused | TaskStatus::Failed => {}
            }
            table.insert(task);
        }

        Ok(Self {
            settings,
            persist_interval,
            store,
            source,
            sinks,
            table,
            workers: HashMap::new(),
            last_persisted: HashMap::new(),
            next_generation: 1,
        })
    }

    /// 使用 HTTP 数据源和下载目录下的文件输出
    pub fn from_config(config: &Config, store: Arc<dyn TaskStore>) -> Result<Self, DownloadError> {
        Self::new(
            config.worker_settings(),
            config.progress_persist_interval(),
            store,
            Rc::new(HttpRangeSource::new(config)),
            Rc::new(FileSinkFactory::new(&config.download_dir)),
        )
    }

    fn spawn_worker(&mut self, ctx: &mut Context<Self>, task_id: TaskId, command: WorkerCommand) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let worker = DownloadWorker::new(
            generation,
            self.settings.clone(),
            self.source.clone(),
            self.sinks.clone(),
            ctx.address().recipient(),
        );
        let cancel = worker.cancel_token();
        let addr = worker.start();
        addr.do_send(command);
        debug!("任务 {} 启动 worker (generation {})", task_id, generation);
        self.workers.insert(task_id, WorkerHandle { generation, cancel, addr });
    }

    fn persist(&mut self, task_id: &TaskId) {
        let Some(task) = self.table.get(task_id) else { return };
        match self.store.upsert(task) {
            Ok(()) => {
                self.last_persisted.insert(*task_id, Instant::now());
            }
            Err(e) => error!("任务 {} 写入任务存储失败: {}", task_id, e),
        }
    }

    fn persist_throttled(&mut self, task_id: &TaskId) {
        let due = match self.last_persisted.get(task_id) {
            Some(at) => at.elapsed() >= self.persist_interval,
            None => true,
        };
        if due {
            self.persist(task_id);
        }
    }

    fn forget(&mut self, task_id: &TaskId) {
        if let Err(e) = self.store.delete(task_id) {
            error!("任务 {} 从任务存储删除失败: {}", task_id, e);
        }
        self.last_persisted.remove(task_id);
    }

    fn pause(&mut self, task_id: TaskId) -> Result<(), DownloadError> {
        let handle = self.workers.get(&task_id).ok_or(DownloadError::NoActiveWorker(task_id))?;
        handle.addr.do_send(WorkerCommand::Pause { task_id });
        Ok(())
    }

    /// 同一文件名同时只能属于一个未完成的任务
    fn check_filename(&self, filename: &str, except: Option<TaskId>) -> Result<(), DownloadError> {
        match self.table.filename_owner(filename, except) {
            Some(owner) => Err(DownloadError::FilenameInUse { filename: filename.to_string(), task_id: owner }),
            None => Ok(()),
        }
    }

    fn resume(&mut self, ctx: &mut Context<Self>, task_id: TaskId) -> Result<(), DownloadError> {
        let task = self.table.get(&task_id).ok_or(DownloadError::TaskNotFound(task_id))?;
        if task.status != TaskStatus::Paused || self.workers.contains_key(&task_id) {
            return Err(DownloadError::InvalidTaskState { task_id, status: task.status });
        }
        self.check_filename(&task.filename, Some(task_id))?;

        let task = self.table.get_mut(&task_id).ok_or(DownloadError::TaskNotFound(task_id))?;
        task.status = TaskStatus::Downloading;
        task.failure = None;
        task.touch();
        let command = WorkerCommand::Resume {
            task_id,
            url: task.url.clone(),
            filename: task.filename.clone(),
            downloaded: task.downloaded_bytes,
            total_size: task.total_bytes,
        };
        info!("恢复任务 {}，从 {} 字节处继续", task_id, task.downloaded_bytes);
        self.persist(&task_id);
        self.spawn_worker(ctx, task_id, command);
        Ok(())
    }
}

/// 新建下载任务，返回任务ID
pub struct StartDownload {
    pub url: String,
    pub filename: String,
}
impl Message for StartDownload { type Result = Result<TaskId, DownloadError>; }

impl Handler<StartDownload> for TaskCoordinator {
    type Result = Result<TaskId, DownloadError>;
    fn handle(&mut self, msg: StartDownload, ctx: &mut Self::Context) -> Self::Result {
        validator::validate_url(&msg.url).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
        validator::validate_filename(&msg.filename)
            .map_err(|e| DownloadError::InvalidFilename(e.to_string()))?;
        self.check_filename(&msg.filename, None)?;

        let task_id = Uuid::new_v4();
        self.table.insert(DownloadTask::new(task_id, msg.url.clone(), msg.filename.clone()));
        info!("新建任务 {}: {} -> {}", task_id, msg.url, msg.filename);
        self.spawn_worker(ctx, task_id, WorkerCommand::Start {
            task_id,
            url: msg.url,
            filename: msg.filename,
        });
        Ok(task_id)
    }
}

pub struct PauseDownload {
    pub task_id: TaskId,
}
impl Message for PauseDownload { type Result = Result<(), DownloadError>; }

impl Handler<PauseDownload> for TaskCoordinator {
    type Result = Result<(), DownloadError>;
    fn handle(&mut self, msg: PauseDownload, _ctx: &mut Self::Context) -> Self::Result {
        self.pause(msg.task_id)
    }
}

pub struct ResumeDownload {
    pub task_id: TaskId,
}
impl Message for ResumeDownload { type Result = Result<(), DownloadError>; }

impl Handler<ResumeDownload> for TaskCoordinator {
    type Result = Result<(), DownloadError>;
    fn handle(&mut self, msg: ResumeDownload, ctx: &mut Self::Context) -> Self::Result {
        self.resume(ctx, msg.task_id)
    }
}

/// 移除任务，正在下载的会先被取消
pub struct RemoveDownload {
    pub task_id: TaskId,
}
impl Message for RemoveDownload { type Result = Result<(), DownloadError>; }

impl Handler<RemoveDownload> for TaskCoordinator {
    type Result = Result<(), DownloadError>;
    fn handle(&mut self, msg: RemoveDownload, _ctx: &mut Self::Context) -> Self::Result {
        let task_id = msg.task_id;
        self.table.remove(&task_id).ok_or(DownloadError::TaskNotFound(task_id))?;
        if let Some(handle) = self.workers.remove(&task_id) {
            handle.cancel.cancel();
        }
        self.forget(&task_id);
        info!("已移除任务 {}", task_id);
        Ok(())
    }
}

pub struct QueryTask {
    pub task_id: TaskId,
}
impl Message for QueryTask { type Result = Option<DownloadTask>; }

impl Handler<QueryTask> for TaskCoordinator {
    type Result = Option<DownloadTask>;
    fn handle(&mut self, msg: QueryTask, _ctx: &mut Self::Context) -> Self::Result {
        self.table.get(&msg.task_id).cloned()
    }
}

pub struct ListTasks;
impl Message for ListTasks { type Result = Vec<DownloadTask>; }

impl Handler<ListTasks> for TaskCoordinator {
    type Result = MessageResult<ListTasks>;
    fn handle(&mut self, _msg: ListTasks, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.table.list())
    }
}

pub struct GetStats;
impl Message for GetStats { type Result = TaskStats; }

impl Handler<GetStats> for TaskCoordinator {
    type Result = MessageResult<GetStats>;
    fn handle(&mut self, _msg: GetStats, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.table.stats())
    }
}

/// 恢复所有已暂停的任务，返回实际恢复的任务ID
pub struct ResumeAllPaused;
impl Message for ResumeAllPaused { type Result = Vec<TaskId>; }

impl Handler<ResumeAllPaused> for TaskCoordinator {
    type Result = MessageResult<ResumeAllPaused>;
    fn handle(&mut self, _msg: ResumeAllPaused, ctx: &mut Self::Context) -> Self::Result {
        let mut resumed = Vec::new();
        for task_id in self.table.ids_with_status(TaskStatus::Paused) {
            match self.resume(ctx, task_id) {
                Ok(()) => resumed.push(task_id),
                Err(e) => warn!("任务 {} 无法恢复: {}", task_id, e),
            }
        }
        MessageResult(resumed)
    }
}

/// 暂停所有存活的 worker，返回发出暂停命令的数量
pub struct PauseAll;
impl Message for PauseAll { type Result = usize; }

impl Handler<PauseAll> for TaskCoordinator {
    type Result = usize;
    fn handle(&mut self, _msg: PauseAll, _ctx: &mut Self::Context) -> Self::Result {
        let ids: Vec<TaskId> = self.workers.keys().copied().collect();
        for task_id in &ids {
            let _ = self.pause(*task_id);
        }
        ids.len()
    }
}

impl Handler<WorkerReport> for TaskCoordinator {
    type Result = ();
    fn handle(&mut self, msg: WorkerReport, _ctx: &mut Self::Context) {
        let task_id = msg.event.task_id();
        match self.workers.get(&task_id) {
            Some(handle) if handle.generation == msg.generation => {}
            _ => {
                debug!("丢弃任务 {} 的过期事件 (generation {}): {:?}", task_id, msg.generation, msg.event);
                return;
            }
        }

        match self.table.apply(&msg.event) {
            Applied::Progressed => self.persist_throttled(&task_id),
            Applied::StatusChanged(TaskStatus::Completed) => {
                info!("任务 {} 已完成", task_id);
                self.forget(&task_id);
            }
            Applied::StatusChanged(_) => self.persist(&task_id),
            Applied::Duplicate => debug!("任务 {} 重复的进度事件", task_id),
            Applied::Rejected(reason) => warn!("任务 {} 忽略事件: {}", task_id, reason),
            Applied::UnknownTask => warn!("收到未知任务 {} 的事件", task_id),
        }

        if msg.event.is_terminal() {
            self.workers.remove(&task_id);
        }
    }
}
