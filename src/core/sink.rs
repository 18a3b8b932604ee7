//! 输出端：按顺序接收字节，可以关闭或中止

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::warn;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::core::error::DownloadError;

#[async_trait(?Send)]
pub trait Sink {
    /// 写入一块数据，返回即表示这块数据已被确认
    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError>;

    /// 全部数据写完后关闭
    async fn close(self: Box<Self>) -> Result<(), DownloadError>;

    /// 中止：丢弃最后一次确认之后的所有内容
    async fn abort(self: Box<Self>) -> Result<(), DownloadError>;
}

#[async_trait(?Send)]
pub trait SinkFactory {
    /// 为 `filename` 打开输出，大小为 `total_size`，从 `offset` 开始写
    async fn open(&self, filename: &str, total_size: u64, offset: u64) -> Result<Box<dyn Sink>, DownloadError>;
}

fn sink_err(context: &str, e: std::io::Error) -> DownloadError {
    DownloadError::Sink(format!("{}: {}", context, e))
}

/// 写入下载目录的文件输出端
///
/// 数据先写到 `<filename>.part`，关闭时重命名为目标文件名。
pub struct FileSinkFactory {
    dir: PathBuf,
}

impl FileSinkFactory {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn part_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!("{}.part", filename))
    }
}

#[async_trait(?Send)]
impl SinkFactory for FileSinkFactory {
    async fn open(&self, filename: &str, total_size: u64, offset: u64) -> Result<Box<dyn Sink>, DownloadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| sink_err("无法创建下载目录", e))?;

        let part_path = self.part_path(filename);
        let mut file = if offset == 0 {
            tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&part_path)
                .await
                .map_err(|e| sink_err("无法创建临时文件", e))?
        } else {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&part_path)
                .await
                .map_err(|e| sink_err("无法打开已有的临时文件", e))?;
            let existing = file.metadata()
                .await
                .map_err(|e| sink_err("无法读取临时文件信息", e))?
                .len();
            if existing < offset {
                return Err(DownloadError::Sink(format!(
                    "临时文件只有 {} 字节，小于续传位置 {}", existing, offset
                )));
            }
            file
        };

        file.set_len(total_size).await.map_err(|e| sink_err("无法预分配文件", e))?;
        file.seek(SeekFrom::Start(offset)).await.map_err(|e| sink_err("无法定位写入位置", e))?;

        Ok(Box::new(FileSink {
            file,
            part_path,
            final_path: self.dir.join(filename),
            confirmed: offset,
        }))
    }
}

pub struct FileSink {
    file: tokio::fs::File,
    part_path: PathBuf,
    final_path: PathBuf,
    confirmed: u64,
}

#[async_trait(?Send)]
impl Sink for FileSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.file.write_all(chunk).await.map_err(|e| sink_err("写入失败", e))?;
        self.confirmed += chunk.len() as u64;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), DownloadError> {
        self.file.flush().await.map_err(|e| sink_err("刷新失败", e))?;
        self.file.sync_all().await.map_err(|e| sink_err("同步失败", e))?;
        let FileSink { file, part_path, final_path, .. } = *self;
        drop(file);
        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| sink_err("无法重命名为目标文件", e))?;
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> Result<(), DownloadError> {
        // 写入可能在中途被取消，截断到最后确认的位置
        if let Err(e) = self.file.flush().await {
            warn!("中止时刷新 {} 失败: {}", self.part_path.display(), e);
        }
        self.file.set_len(self.confirmed).await.map_err(|e| sink_err("截断失败", e))?;
        self.file.sync_all().await.map_err(|e| sink_err("同步失败", e))?;
        Ok(())
    }
}
