use actix::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use tokio_util::sync::CancellationToken;

use crate::core::sink::SinkFactory;
use crate::core::source::RangeSource;
use super::download::WorkerSettings;
use super::messages::WorkerReport;
use super::state::WorkerState;

/// 单任务 worker Actor
///
/// 每次开始或恢复下载都会创建一个新实例，实例之间不共享任何可变状态。
pub struct DownloadWorker {
    pub generation: u64,
    pub started: bool,
    pub state: Rc<Cell<WorkerState>>,
    pub cancel: CancellationToken,
    pub source: Rc<dyn RangeSource>,
    pub sinks: Rc<dyn SinkFactory>,
    pub coordinator: Recipient<WorkerReport>,
    pub settings: WorkerSettings,
}

impl Actor for DownloadWorker {
    type Context = Context<Self>;
}

impl DownloadWorker {
    pub fn new(
        generation: u64,
        settings: WorkerSettings,
        source: Rc<dyn RangeSource>,
        sinks: Rc<dyn SinkFactory>,
        coordinator: Recipient<WorkerReport>,
    ) -> Self {
        Self {
            generation,
            started: false,
            state: Rc::new(Cell::new(WorkerState::Idle)),
            cancel: CancellationToken::new(),
            source,
            sinks,
            coordinator,
            settings,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
