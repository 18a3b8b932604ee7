//! 测试用的脚本化数据源和内存输出端

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::core::error::DownloadError;
use crate::core::sink::{Sink, SinkFactory};
use crate::core::source::{RangeResponse, RangeSource};
use crate::core::task::messages::WorkerReport;
use crate::core::task::meta::TaskId;
use crate::core::task::util::{ContentRange, FileInfo};

impl FileInfo {
    pub fn ranged(size: u64) -> Self {
        FileInfo { size: Some(size), supports_range: true, ..FileInfo::default() }
    }
}

pub enum BodyEnd {
    Finish,
    Hang,
    Fail(String),
}

pub enum ScriptedResponse {
    Status(u16),
    Partial { chunks: Vec<usize>, end: BodyEnd },
    SendError(String),
}

impl ScriptedResponse {
    pub fn partial(chunks: Vec<usize>, end: BodyEnd) -> Self {
        ScriptedResponse::Partial { chunks, end }
    }
}

/// 按顺序返回预设响应的数据源，并记录每次 Range 请求的起始位置
pub struct ScriptedSource {
    probe: FileInfo,
    responses: RefCell<VecDeque<ScriptedResponse>>,
    requested: RefCell<Vec<u64>>,
    resume_offset: RefCell<Result<u64, DownloadError>>,
    resume_queries: Cell<usize>,
}

impl ScriptedSource {
    pub fn new(probe: FileInfo) -> Self {
        Self {
            probe,
            responses: RefCell::new(VecDeque::new()),
            requested: RefCell::new(Vec::new()),
            resume_offset: RefCell::new(Err(DownloadError::NetworkError("未设置续传位置".into()))),
            resume_queries: Cell::new(0),
        }
    }

    pub fn respond(self, response: ScriptedResponse) -> Self {
        self.push_response(response);
        self
    }

    pub fn with_resume_offset(self, offset: Result<u64, DownloadError>) -> Self {
        *self.resume_offset.borrow_mut() = offset;
        self
    }

    pub fn push_response(&self, response: ScriptedResponse) {
        self.responses.borrow_mut().push_back(response);
    }

    pub fn requested_offsets(&self) -> Vec<u64> {
        self.requested.borrow().clone()
    }

    pub fn resume_queries(&self) -> usize {
        self.resume_queries.get()
    }
}

#[async_trait(?Send)]
impl RangeSource for ScriptedSource {
    async fn probe(&self, _url: &str) -> Result<FileInfo, DownloadError> {
        Ok(self.probe.clone())
    }

    async fn fetch_from(&self, _url: &str, offset: u64) -> Result<RangeResponse, DownloadError> {
        self.requested.borrow_mut().push(offset);
        let next = self.responses.borrow_mut().pop_front();
        match next {
            None => Err(DownloadError::NetworkError("没有预设的响应".into())),
            Some(ScriptedResponse::SendError(msg)) => Err(DownloadError::NetworkError(msg)),
            Some(ScriptedResponse::Status(status)) => Ok(RangeResponse {
                status,
                content_range: None,
                body: stream::empty().boxed_local(),
            }),
            Some(ScriptedResponse::Partial { chunks, end }) => {
                let len: usize = chunks.iter().sum();
                let content_range = (len > 0).then(|| ContentRange {
                    start: offset,
                    end: offset + len as u64 - 1,
                    total: None,
                });
                let data = stream::iter(
                    chunks.into_iter().map(|n| Ok::<_, DownloadError>(Bytes::from(vec![b'x'; n]))),
                );
                let body = match end {
                    BodyEnd::Finish => data.boxed_local(),
                    BodyEnd::Hang => data.chain(stream::pending()).boxed_local(),
                    BodyEnd::Fail(msg) => data
                        .chain(stream::once(async move { Err(DownloadError::StreamingIo(msg)) }))
                        .boxed_local(),
                };
                Ok(RangeResponse { status: 206, content_range, body })
            }
        }
    }

    async fn query_resume_offset(&self, _endpoint: &str, _task_id: &TaskId) -> Result<u64, DownloadError> {
        self.resume_queries.set(self.resume_queries.get() + 1);
        self.resume_offset.borrow().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    pub data: Vec<u8>,
    pub closed: bool,
    pub aborted: bool,
}

/// 内存输出端，可以模拟写入失败
#[derive(Default)]
pub struct MemorySinkFactory {
    files: Rc<RefCell<HashMap<String, MemoryFile>>>,
    fail_after: Cell<Option<usize>>,
}

impl MemorySinkFactory {
    pub fn seed(&self, name: &str, len: usize) {
        self.files.borrow_mut().insert(
            name.to_string(),
            MemoryFile { data: vec![b'x'; len], ..MemoryFile::default() },
        );
    }

    pub fn file(&self, name: &str) -> Option<MemoryFile> {
        self.files.borrow().get(name).cloned()
    }

    /// 成功写入 `n` 块之后的写入全部失败
    pub fn fail_writes_after(&self, n: usize) {
        self.fail_after.set(Some(n));
    }
}

#[async_trait(?Send)]
impl SinkFactory for MemorySinkFactory {
    async fn open(&self, filename: &str, _total_size: u64, offset: u64) -> Result<Box<dyn Sink>, DownloadError> {
        let mut files = self.files.borrow_mut();
        let file = files.entry(filename.to_string()).or_default();
        if (file.data.len() as u64) < offset {
            return Err(DownloadError::Sink(format!("已有数据不足 {} 字节", offset)));
        }
        file.data.truncate(offset as usize);
        file.closed = false;
        file.aborted = false;
        Ok(Box::new(MemorySink {
            name: filename.to_string(),
            files: self.files.clone(),
            writes_left: self.fail_after.get(),
        }))
    }
}

pub struct MemorySink {
    name: String,
    files: Rc<RefCell<HashMap<String, MemoryFile>>>,
    writes_left: Option<usize>,
}

#[async_trait(?Send)]
impl Sink for MemorySink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        match self.writes_left {
            Some(0) => return Err(DownloadError::Sink("模拟的写入失败".into())),
            Some(n) => self.writes_left = Some(n - 1),
            None => {}
        }
        if let Some(file) = self.files.borrow_mut().get_mut(&self.name) {
            file.data.extend_from_slice(chunk);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DownloadError> {
        if let Some(file) = self.files.borrow_mut().get_mut(&self.name) {
            file.closed = true;
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), DownloadError> {
        if let Some(file) = self.files.borrow_mut().get_mut(&self.name) {
            file.aborted = true;
        }
        Ok(())
    }
}

/// 收集 worker 上报的事件
pub struct EventCollector {
    pub events: Rc<RefCell<Vec<WorkerReport>>>,
}

impl Actor for EventCollector {
    type Context = Context<Self>;
}

impl Handler<WorkerReport> for EventCollector {
    type Result = ();
    fn handle(&mut self, msg: WorkerReport, _ctx: &mut Self::Context) {
        self.events.borrow_mut().push(msg);
    }
}

pub async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "等待条件超时");
        actix_rt::time::sleep(Duration::from_millis(5)).await;
    }
}
