use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use actix::Recipient;
use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::core::sink::{Sink, SinkFactory};
use crate::core::source::RangeSource;
use super::messages::{WorkerEvent, WorkerReport};
use super::meta::TaskId;
use super::retry::{RetryContext, RetryStrategy};
use super::state::WorkerState;
use super::util::percent;

/// worker 运行参数
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub retry: RetryStrategy,
    /// 等待响应头的超时
    pub response_timeout: Duration,
    /// 两次读到数据之间的最大间隔
    pub read_timeout: Duration,
    pub resume_check_endpoint: Option<String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            retry: RetryStrategy::default(),
            response_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            resume_check_endpoint: None,
        }
    }
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry_strategy(),
            response_timeout: Duration::from_secs(config.response_timeout),
            read_timeout: Duration::from_secs(config.read_timeout),
            resume_check_endpoint: config.resume_check_endpoint.clone(),
        }
    }
}

/// 单次运行的下载过程：探测、流式写入、上报
pub struct DownloadJob {
    pub task_id: TaskId,
    pub url: String,
    pub filename: String,
    pub offset: u64,
    /// 续传时已知的总大小，用来发现远端文件已变化
    pub expected_total: Option<u64>,
    pub generation: u64,
    pub state: Rc<Cell<WorkerState>>,
    pub source: Rc<dyn RangeSource>,
    pub sinks: Rc<dyn SinkFactory>,
    pub events: Recipient<WorkerReport>,
    pub cancel: CancellationToken,
    pub settings: WorkerSettings,
}

impl DownloadJob {
    /// 运行到终态并返回该终态
    pub async fn run(mut self) -> WorkerState {
        match self.drive().await {
            Ok(()) => {
                if self.advance(WorkerState::Completed).is_ok() {
                    info!("任务 {} 下载完成: {} 字节", self.task_id, self.offset);
                    self.emit(WorkerEvent::Complete { task_id: self.task_id });
                } else {
                    self.fail(DownloadError::InvalidTransition {
                        from: self.state.get(),
                        to: WorkerState::Completed,
                    });
                }
            }
            Err(DownloadError::Aborted) => {
                if self.advance(WorkerState::Paused).is_ok() {
                    info!("任务 {} 已暂停于 {} 字节", self.task_id, self.offset);
                    self.emit(WorkerEvent::Paused { task_id: self.task_id, downloaded: self.offset });
                }
            }
            Err(e) => self.fail(e),
        }
        self.state.get()
    }

    fn fail(&mut self, error: DownloadError) {
        if self.advance(WorkerState::Failed).is_err() {
            return;
        }
        error!("任务 {} 下载失败: {}", self.task_id, error);
        self.emit(WorkerEvent::Error {
            task_id: self.task_id,
            error: error.to_string(),
            kind: error.kind(),
        });
    }

    fn advance(&mut self, next: WorkerState) -> Result<(), DownloadError> {
        let current = self.state.get();
        if !current.can_transition_to(next) {
            error!("任务 {} 非法状态转换: {:?} -> {:?}", self.task_id, current, next);
            return Err(DownloadError::InvalidTransition { from: current, to: next });
        }
        debug!("任务 {} 状态: {:?} -> {:?}", self.task_id, current, next);
        self.state.set(next);
        Ok(())
    }

    fn emit(&self, event: WorkerEvent) {
        self.events.do_send(WorkerReport { generation: self.generation, event });
    }

    /// 在取消信号和 `fut` 之间竞争，取消优先
    async fn guarded<F: Future>(&self, fut: F) -> Result<F::Output, DownloadError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DownloadError::Aborted),
            out = fut => Ok(out),
        }
    }

    async fn drive(&mut self) -> Result<(), DownloadError> {
        self.advance(WorkerState::ProbingSize)?;
        let total = self.probe().await?;

        if self.expected_total.is_some() {
            self.cross_check_resume_offset().await?;
        }

        self.emit(WorkerEvent::Init { task_id: self.task_id, total_size: total });

        let mut sink = self.guarded(self.sinks.open(&self.filename, total, self.offset)).await??;
        self.advance(WorkerState::Streaming)?;

        match self.stream(sink.as_mut(), total).await {
            Ok(()) => sink.close().await,
            Err(e) => {
                if let Err(abort_err) = sink.abort().await {
                    warn!("任务 {} 中止输出失败: {}", self.task_id, abort_err);
                }
                Err(e)
            }
        }
    }

    async fn probe(&self) -> Result<u64, DownloadError> {
        let info = self.guarded(self.source.probe(&self.url)).await??;
        debug!("任务 {} 探测结果: {:?}", self.task_id, info);

        if !info.supports_range {
            return Err(DownloadError::RangeNotSupported("响应缺少 Accept-Ranges: bytes".to_string()));
        }
        let total = match info.size {
            Some(size) if size > 0 => size,
            _ => return Err(DownloadError::MissingContentLength(self.url.clone())),
        };
        if let Some(expected) = self.expected_total {
            if expected > 0 && expected != total {
                return Err(DownloadError::SizeMismatch { expected, actual: total });
            }
        }
        if self.offset > total {
            return Err(DownloadError::RangeNotSupported(format!(
                "续传位置 {} 超出文件大小 {}", self.offset, total
            )));
        }
        Ok(total)
    }

    /// 向服务端核对续传位置，只做提示，始终以本地持久化的偏移为准
    async fn cross_check_resume_offset(&self) -> Result<(), DownloadError> {
        let Some(endpoint) = self.settings.resume_check_endpoint.as_deref() else {
            return Ok(());
        };
        match self.guarded(self.source.query_resume_offset(endpoint, &self.task_id)).await? {
            Ok(remote) if remote != self.offset => warn!(
                "任务 {} 服务端记录的位置 {} 与本地 {} 不一致，使用本地位置",
                self.task_id, remote, self.offset
            ),
            Ok(_) => {}
            Err(e) => warn!("任务 {} 查询续传位置失败: {}", self.task_id, e),
        }
        Ok(())
    }

    async fn stream(&mut self, sink: &mut dyn Sink, total: u64) -> Result<(), DownloadError> {
        let mut retry = RetryContext::new(self.settings.retry.clone());
        while self.offset < total {
            let before = self.offset;
            let result = match self.fetch_pass(sink, total).await {
                Ok(0) => Err(DownloadError::StreamingIo("服务器返回了空的分段响应".to_string())),
                other => other,
            };
            // 中断前收到过数据，重试次数从头算
            if self.offset > before {
                retry.reset();
            }
            match result {
                Ok(_) => retry.reset(),
                Err(e) if retry.should_retry(&e) => {
                    retry.increment_retry(e.clone());
                    let delay = retry.get_delay();
                    warn!(
                        "任务 {} 传输中断: {}，{:?} 后从 {} 字节处重试 (第 {} 次)",
                        self.task_id, e, delay, self.offset, retry.retry_count
                    );
                    self.guarded(tokio::time::sleep(delay)).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// 发起一次 Range 请求并读完响应体，返回本次写入的字节数
    async fn fetch_pass(&mut self, sink: &mut dyn Sink, total: u64) -> Result<u64, DownloadError> {
        let response_timeout = self.settings.response_timeout;
        let response = self
            .guarded(tokio::time::timeout(response_timeout, self.source.fetch_from(&self.url, self.offset)))
            .await?
            .map_err(|_| DownloadError::StreamingIo(format!("等待响应超过 {:?}", response_timeout)))??;

        match response.status {
            206 => {}
            416 => {
                return Err(DownloadError::RangeNotSupported(format!(
                    "服务器拒绝了从 {} 开始的范围请求", self.offset
                )))
            }
            status => return Err(DownloadError::UnexpectedStatus(status)),
        }
        if let Some(range) = response.content_range {
            if range.start != self.offset {
                return Err(DownloadError::RangeNotSupported(format!(
                    "请求从 {} 开始，服务器返回从 {} 开始", self.offset, range.start
                )));
            }
        }

        let read_timeout = self.settings.read_timeout;
        let mut body = response.body;
        let mut received = 0u64;
        loop {
            let next = self
                .guarded(tokio::time::timeout(read_timeout, body.next()))
                .await?
                .map_err(|_| DownloadError::StreamingIo(format!("超过 {:?} 没有收到数据", read_timeout)))?;
            let chunk = match next {
                Some(chunk) => chunk?,
                None => break,
            };
            if chunk.is_empty() {
                continue;
            }
            let len = chunk.len() as u64;
            if self.offset + len > total {
                return Err(DownloadError::StreamingIo(format!(
                    "服务器返回的数据超过了声明的大小 {}", total
                )));
            }
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Aborted);
            }
            self.guarded(sink.write(&chunk)).await??;
            self.offset += len;
            received += len;
            self.emit(WorkerEvent::Progress {
                task_id: self.task_id,
                downloaded: self.offset,
                progress: percent(self.offset, total),
            });
        }
        Ok(received)
    }
}
