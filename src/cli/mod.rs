//! CLI: 命令行参数解析
//!
//! - 基本下载：`rangedown <url>`
//! - 批量下载：`rangedown -f urls.txt`
//! - 恢复上次暂停的任务：`rangedown --resume`
//! - 查看任务记录：`rangedown --list`
//! - 编辑配置：`rangedown -e`
//!
//! 配置文件默认位置：
//! - Windows: `%APPDATA%/rangedown/rangedown.conf`
//! - macOS: `~/Library/Application Support/rangedown/rangedown.conf`
//! - Linux: `~/.config/rangedown/rangedown.conf`

use clap::Parser;
use std::env;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::core::error::DownloadError;
use crate::utils::validator;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/rangedown/rangedown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/rangedown/rangedown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/rangedown/rangedown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("VERGEN_BUILD_DATE"), ")");

/// rangedown 命令行参数
///
/// 示例用法：
///   rangedown https://example.com/file.iso
///   rangedown --resume
///   rangedown -c /path/to/config.conf https://example.com/file.iso
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rangedown",
    version = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    about = "支持暂停与断点续传的 Range 下载器",
    long_about = "按 HTTP Range 请求下载文件，可随时暂停，进程重启后从上次的位置继续。\n\n示例：\n  rangedown https://example.com/file.iso\n  rangedown --resume\n  rangedown --list\n  rangedown -e\n"
)]
pub struct Args {
    #[arg(required = false, help = "要下载的URL列表，可以同时指定多个URL。")]
    pub urls: Vec<String>,

    #[arg(short, long, help = "包含URL列表的文件路径，每行一个URL，# 开头为注释。")]
    pub file: Option<String>,

    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    #[arg(long, short = 'd', help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    #[arg(long, short = 'n', help = "指定下载文件名，只在下载单个URL时有效。")]
    pub file_name: Option<String>,

    #[arg(long, help = "恢复任务记录中所有已暂停的任务。")]
    pub resume: bool,

    #[arg(long, help = "列出任务记录后退出。")]
    pub list: bool,

    #[arg(long = "resume-endpoint", help = "续传前用于核对位置的接口地址。")]
    pub resume_endpoint: Option<String>,
}

impl Args {
    /// 解析命令行参数并加载、合并、校验配置
    pub fn parse_args() -> Result<(Self, Config), DownloadError> {
        let args = Args::parse();

        if args.edit_config {
            if !Path::new(&args.config).exists() {
                Config::default().save_with_tutorial(&args.config)?;
            }
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    pub fn load_config(&self) -> Result<Config, DownloadError> {
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        config.validate()?;
        Ok(config)
    }

    /// 命令行和URL文件中的全部URL，可以为空（例如只恢复任务）
    pub fn get_urls(&self) -> Result<Vec<String>, DownloadError> {
        let mut urls = Vec::new();
        for url in &self.urls {
            if !validator::is_valid_url(url) {
                return Err(DownloadError::InvalidUrl(url.clone()));
            }
            urls.push(url.clone());
        }

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .map_err(|e| DownloadError::IoError(format!("无法读取URL文件 {}: {}", file_path, e)))?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if !validator::is_valid_url(line) {
                    return Err(DownloadError::InvalidUrl(line.to_string()));
                }
                urls.push(line.to_string());
            }
        }

        if self.file_name.is_some() && urls.len() > 1 {
            return Err(DownloadError::InvalidFilename("多个URL不能共用同一个文件名".to_string()));
        }
        Ok(urls)
    }

    /// 目标文件名：优先 `-n`，其次URL路径，最后用时间戳
    pub fn filename_for(&self, url: &str) -> String {
        if let Some(name) = &self.file_name {
            return name.clone();
        }
        validator::filename_from_url(url)
            .unwrap_or_else(|| format!("download_{}", chrono::Utc::now().timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["rangedown", "--resume", "-d", "/tmp/dl", "https://example.com/a.iso"]).unwrap();
        assert!(args.resume);
        assert!(!args.list);
        assert_eq!(args.download_dir.as_deref(), Some("/tmp/dl"));
        assert_eq!(args.urls, vec!["https://example.com/a.iso".to_string()]);
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("rangedown.conf");
        let mut config = Config::default();
        config.download_dir = "/from/file".into();
        config.save_with_tutorial(conf.to_str().unwrap()).unwrap();

        let args = Args::try_parse_from([
            "rangedown",
            "-c", conf.to_str().unwrap(),
            "-d", "/from/cli",
            "--resume-endpoint", "https://example.com/resume",
        ])
        .unwrap();
        let merged = args.load_config().unwrap();
        assert_eq!(merged.download_dir, "/from/cli");
        assert_eq!(merged.resume_check_endpoint.as_deref(), Some("https://example.com/resume"));
        assert_eq!(merged.retry_count, config.retry_count);
    }

    #[test]
    fn test_url_file_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        fs::write(&list, "# 注释\nhttps://example.com/file1.zip\n\nhttps://example.com/file2.zip\n").unwrap();

        let args = Args::try_parse_from(["rangedown", "-f", list.to_str().unwrap()]).unwrap();
        let urls = args.get_urls().unwrap();
        assert_eq!(urls, vec![
            "https://example.com/file1.zip".to_string(),
            "https://example.com/file2.zip".to_string(),
        ]);
        assert_eq!(args.filename_for(&urls[0]), "file1.zip");
    }

    #[test]
    fn test_rejects_bad_input() {
        let args = Args::try_parse_from(["rangedown", "not-a-url"]).unwrap();
        assert!(matches!(args.get_urls(), Err(DownloadError::InvalidUrl(_))));

        let args = Args::try_parse_from([
            "rangedown", "-n", "x.bin", "https://example.com/a", "https://example.com/b",
        ])
        .unwrap();
        assert!(matches!(args.get_urls(), Err(DownloadError::InvalidFilename(_))));
    }
}
