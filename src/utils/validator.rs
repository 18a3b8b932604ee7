use anyhow::Result;
use url::Url;

/// 只接受 http/https 且带主机名的地址
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn validate_url(url: &str) -> Result<()> {
    if !is_valid_url(url) {
        anyhow::bail!("不支持的URL: {}", url);
    }
    Ok(())
}

/// 文件名不能为空，也不能包含路径分隔符
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        anyhow::bail!("文件名不能为空");
    }
    if filename.contains(['/', '\\']) {
        anyhow::bail!("文件名不能包含路径分隔符: {}", filename);
    }
    if filename == "." || filename == ".." {
        anyhow::bail!("无效的文件名: {}", filename);
    }
    Ok(())
}

pub fn validate_urls(urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        anyhow::bail!("URL列表不能为空");
    }
    for url in urls {
        validate_url(url)?;
    }
    Ok(())
}

/// 从URL路径推断文件名
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    validate_filename(name).ok()?;
    Some(name.to_string())
}
