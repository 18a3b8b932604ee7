use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::core::error::DownloadError;
use crate::core::task::download::WorkerSettings;
use crate::core::task::retry::RetryStrategy;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 下载目录
    pub download_dir: String,
    /// 任务记录文件
    pub store_path: String,
    /// 建立连接超时（秒）
    pub connect_timeout: u64,
    /// 等待响应头超时（秒）
    pub response_timeout: u64,
    /// 两次收到数据之间的最长间隔（秒）
    pub read_timeout: u64,
    /// User-Agent
    pub user_agent: String,
    /// 重试次数，0 表示不重试
    pub retry_count: usize,
    /// 重试延迟（秒）
    pub retry_delay: u64,
    /// 最大重试延迟（秒）
    pub retry_max_delay: u64,
    /// 进度写入任务记录的最小间隔（毫秒）
    pub progress_persist_interval_ms: u64,
    /// 启动时自动恢复
    pub auto_resume_on_startup: bool,
    /// 续传位置核对接口，留空不核对
    pub resume_check_endpoint: Option<String>,
    pub log_file: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            store_path: "./downloads/tasks.json".to_string(),
            connect_timeout: 10,
            response_timeout: 30,
            read_timeout: 30,
            user_agent: format!("rangedown/{}", env!("CARGO_PKG_VERSION")),
            retry_count: 3,
            retry_delay: 1,
            retry_max_delay: 60,
            progress_persist_interval_ms: 1000,
            auto_resume_on_startup: false,
            resume_check_endpoint: None,
            log_file: "logs/rangedown.log".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 加载配置文件，不存在时写入默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if !Path::new(path).exists() {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            return Ok(config);
        }
        let content = fs::read_to_string(path)
            .map_err(|e| DownloadError::Config(format!("无法读取配置文件 {}: {}", path, e)))?;
        toml::from_str(&content)
            .map_err(|e| DownloadError::Config(format!("配置文件格式错误 {}: {}", path, e)))
    }

    /// 保存带说明的配置文件
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::Config(format!("无法序列化配置: {}", e)))?;
        fs::write(path, format!("{}\n{}", TUTORIAL, config_content))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.download_dir.trim().is_empty() {
            return Err(DownloadError::Config("下载目录不能为空".into()));
        }
        if self.store_path.trim().is_empty() {
            return Err(DownloadError::Config("任务记录文件路径不能为空".into()));
        }
        if self.connect_timeout == 0 || self.response_timeout == 0 || self.read_timeout == 0 {
            return Err(DownloadError::Config("超时时间必须大于0".into()));
        }
        if self.retry_max_delay < self.retry_delay {
            return Err(DownloadError::Config("最大重试延迟不能小于重试延迟".into()));
        }
        if let Some(endpoint) = &self.resume_check_endpoint {
            if !crate::utils::validator::is_valid_url(endpoint) {
                return Err(DownloadError::Config(format!("续传核对接口不是有效的URL: {}", endpoint)));
            }
        }
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(DownloadError::Config(format!("未知的日志级别: {}", self.log_level)));
        }
        Ok(())
    }

    /// 合并命令行参数，命令行 > 配置文件 > 默认值
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(dir) = &args.download_dir {
            self.download_dir = dir.clone();
        }
        if let Some(endpoint) = &args.resume_endpoint {
            self.resume_check_endpoint = Some(endpoint.clone());
        }
        if args.resume {
            self.auto_resume_on_startup = true;
        }
    }

    pub fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy {
            max_retries: self.retry_count,
            base_delay: Duration::from_secs(self.retry_delay),
            max_delay: Duration::from_secs(self.retry_max_delay),
            ..RetryStrategy::default()
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings::from_config(self)
    }

    pub fn progress_persist_interval(&self) -> Duration {
        Duration::from_millis(self.progress_persist_interval_ms)
    }

    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 任务记录: {}\n\
            - 超时: 连接 {} 秒 / 响应 {} 秒 / 读取 {} 秒\n\
            - 重试: {} 次 ({}~{} 秒)\n\
            - 启动时恢复: {}\n\
            - 续传核对: {}",
            self.download_dir,
            self.store_path,
            self.connect_timeout,
            self.response_timeout,
            self.read_timeout,
            self.retry_count,
            self.retry_delay,
            self.retry_max_delay,
            if self.auto_resume_on_startup { "启用" } else { "禁用" },
            self.resume_check_endpoint.as_deref().unwrap_or("未配置"),
        )
    }
}

const TUTORIAL: &str = r#"# rangedown 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值
#
# 配置文件位置：
# - Windows: %APPDATA%/rangedown/rangedown.conf
# - macOS: ~/Library/Application Support/rangedown/rangedown.conf
# - Linux: ~/.config/rangedown/rangedown.conf
#
# 字段说明：
#   download_dir                  下载目录，未完成的文件以 .part 结尾
#   store_path                    任务记录文件（JSON），用于重启后续传
#   connect_timeout               建立连接超时（秒）
#   response_timeout              等待响应头超时（秒）
#   read_timeout                  超过该时间没有收到数据视为中断（秒）
#   user_agent                    请求使用的 User-Agent
#   retry_count                   传输中断后的重试次数，成功收到数据后重新计数
#   retry_delay / retry_max_delay 指数退避的初始与最大延迟（秒）
#   progress_persist_interval_ms  进度写入任务记录的最小间隔，暂停/失败时总会写入
#   auto_resume_on_startup        启动时自动恢复所有已暂停的任务
#   resume_check_endpoint         可选，续传前查询 GET <endpoint>?taskId=<id>，只用于核对
#   log_file / log_level          日志文件与级别（error/warn/info/debug/trace）
#
# 使用示例：
#   rangedown https://example.com/file.iso
#   rangedown -f urls.txt
#   rangedown --resume
#   rangedown --list
#   rangedown -e
#
# 下载过程中按 p 暂停全部，r 恢复全部，q 暂停并退出。
"#;
