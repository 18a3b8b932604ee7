//! 远端资源访问：HEAD 探测、Range 请求和续传位置查询
//!
//! `RangeSource` 是 worker 与 HTTP 之间唯一的接缝，生产实现基于 awc。

use std::time::Duration;

use async_trait::async_trait;
use awc::http::header;
use bytes::Bytes;
use futures::stream::{LocalBoxStream, StreamExt};
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::core::task::meta::TaskId;
use crate::core::task::util::{accepts_byte_ranges, ContentRange, FileInfo};

/// 一次 Range 请求的响应
pub struct RangeResponse {
    pub status: u16,
    pub content_range: Option<ContentRange>,
    pub body: LocalBoxStream<'static, Result<Bytes, DownloadError>>,
}

#[async_trait(?Send)]
pub trait RangeSource {
    /// HEAD 请求，读取大小和 Range 支持情况
    async fn probe(&self, url: &str) -> Result<FileInfo, DownloadError>;

    /// `GET` + `Range: bytes=<offset>-`
    async fn fetch_from(&self, url: &str, offset: u64) -> Result<RangeResponse, DownloadError>;

    /// `GET <endpoint>?taskId=<id>`，返回服务端记录的已下载字节数
    async fn query_resume_offset(&self, endpoint: &str, task_id: &TaskId) -> Result<u64, DownloadError>;
}

#[derive(Deserialize)]
struct ResumePosition {
    downloaded: u64,
}

/// 基于 awc 的实现
pub struct HttpRangeSource {
    client: awc::Client,
}

impl HttpRangeSource {
    pub fn new(config: &Config) -> Self {
        // 整体超时关闭：大文件的响应体可能持续很久，空闲读超时由 worker 控制
        let client = awc::Client::builder()
            .connector(awc::Connector::new().timeout(Duration::from_secs(config.connect_timeout)))
            .add_default_header((header::USER_AGENT, config.user_agent.clone()))
            .disable_timeout()
            .finish();
        Self { client }
    }
}

fn header_str<'a>(headers: &'a header::HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait(?Send)]
impl RangeSource for HttpRangeSource {
    async fn probe(&self, url: &str) -> Result<FileInfo, DownloadError> {
        let response = self.client.head(url)
            .no_decompress()
            .insert_header((header::ACCEPT_ENCODING, "identity"))
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::UnexpectedStatus(response.status().as_u16()));
        }

        let headers = response.headers();
        Ok(FileInfo {
            size: header_str(headers, header::CONTENT_LENGTH)
                .and_then(|s| s.trim().parse::<u64>().ok()),
            supports_range: header_str(headers, header::ACCEPT_RANGES)
                .map(accepts_byte_ranges)
                .unwrap_or(false),
        })
    }

    async fn fetch_from(&self, url: &str, offset: u64) -> Result<RangeResponse, DownloadError> {
        let response = self.client.get(url)
            .no_decompress()
            .insert_header((header::ACCEPT_ENCODING, "identity"))
            .insert_header((header::RANGE, format!("bytes={}-", offset)))
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

        let status = response.status().as_u16();
        let content_range = header_str(response.headers(), header::CONTENT_RANGE)
            .and_then(ContentRange::parse);
        let body = response
            .map(|item| item.map_err(|e| DownloadError::StreamingIo(e.to_string())))
            .boxed_local();

        Ok(RangeResponse { status, content_range, body })
    }

    async fn query_resume_offset(&self, endpoint: &str, task_id: &TaskId) -> Result<u64, DownloadError> {
        let url = Url::parse_with_params(endpoint, &[("taskId", task_id.to_string())])
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", endpoint, e)))?;

        let mut response = self.client.get(url.as_str())
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DownloadError::UnexpectedStatus(response.status().as_u16()));
        }

        let position: ResumePosition = response.json()
            .await
            .map_err(|e| DownloadError::StreamingIo(e.to_string()))?;
        Ok(position.downloaded)
    }
}
