use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use crossterm::{
    cursor, execute, terminal,
    event::{self, Event, KeyCode},
};
use log::{error, info, warn, LevelFilter};
use tokio::sync::mpsc;

use rangedown::cli;
use rangedown::core::*;
use rangedown::ui::{self, DownloadSummary, ProgressManager};
use rangedown::utils::logger;

const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(100);
const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(50);
const LOG_MAX_SIZE: u64 = 10 * 1024 * 1024;

#[actix::main]
async fn main() -> anyhow::Result<()> {
    let (args, config) = match cli::Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("参数解析失败: {}", e);
            std::process::exit(1);
        }
    };

    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::Info);
    let log_addr = logger::init(&config.log_file, level, LOG_MAX_SIZE)?;
    info!("程序启动，配置文件: {}", args.config);
    info!("{}", config.get_summary());

    let store: Arc<dyn TaskStore> = Arc::new(JsonTaskStore::open(&config.store_path)?);

    if args.list {
        print_task_list(store.as_ref())?;
        return Ok(());
    }

    let urls = args.get_urls()?;
    println!("{}", config.get_summary());

    let coordinator = TaskCoordinator::from_config(&config, store)?.start();

    let mut started = 0;
    for url in &urls {
        let filename = args.filename_for(url);
        match coordinator.send(StartDownload { url: url.clone(), filename: filename.clone() }).await? {
            Ok(task_id) => {
                started += 1;
                ui::print_success(&format!("创建下载任务: {} -> {}", url, filename));
                info!("创建下载任务 {}: {}", task_id, url);
            }
            Err(e) => {
                ui::print_error(&format!("创建下载任务失败: {} - {}", url, e));
                error!("创建下载任务失败: {} - {}", url, e);
            }
        }
    }

    if config.auto_resume_on_startup {
        let resumed = coordinator.send(ResumeAllPaused).await?;
        if !resumed.is_empty() {
            ui::print_success(&format!("恢复了 {} 个已暂停的任务", resumed.len()));
        }
        started += resumed.len();
    }

    if started == 0 {
        eprintln!("没有可下载的任务（提供URL，或使用 --resume 恢复已暂停的任务）");
        return Ok(());
    }

    println!("\n开始下载... (按 'p' 暂停全部, 'r' 恢复全部, 'q' 暂停并退出)");
    let begin = Instant::now();
    run_download_loop(&coordinator).await?;

    let stats = coordinator.send(GetStats).await?;
    println!("{}", DownloadSummary::new(stats.clone(), begin.elapsed()));
    info!("下载结束 - 完成: {}, 暂停: {}, 失败: {}", stats.completed, stats.paused, stats.failed);
    log_addr.do_send(logger::FlushLog);
    Ok(())
}

fn print_task_list(store: &dyn TaskStore) -> anyhow::Result<()> {
    let tasks = store.get_all()?;
    if tasks.is_empty() {
        println!("没有任务记录");
        return Ok(());
    }
    for task in tasks {
        println!(
            "{}  {:<11} {:>6.1}%  {} / {}  {}",
            task.task_id,
            format!("{:?}", task.status),
            task.progress_percent(),
            ui::format_size(task.downloaded_bytes),
            ui::format_size(task.total_bytes),
            task.filename,
        );
        if let Some(failure) = &task.failure {
            println!("    {:?}: {}", failure.kind, failure.message);
        }
    }
    Ok(())
}

/// 键盘与进度主循环，所有任务结束或用户退出时返回
async fn run_download_loop(coordinator: &Addr<TaskCoordinator>) -> anyhow::Result<()> {
    terminal::enable_raw_mode()?;
    execute!(std::io::stdout(), cursor::Hide)?;

    let result = drive(coordinator).await;

    execute!(std::io::stdout(), cursor::Show)?;
    terminal::disable_raw_mode()?;
    result
}

/// 在阻塞线程上轮询键盘，按键通过通道送回 actix 系统
///
/// 接收端被丢弃后线程在下一次轮询超时时退出。
fn spawn_key_reader() -> mpsc::UnboundedReceiver<KeyCode> {
    let (tx, rx) = mpsc::unbounded_channel();
    actix_rt::task::spawn_blocking(move || loop {
        if tx.is_closed() {
            break;
        }
        match event::poll(KEYBOARD_POLL_INTERVAL) {
            Ok(false) => {}
            Ok(true) => match event::read() {
                Ok(Event::Key(key_event)) => {
                    if tx.send(key_event.code).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("读取键盘事件失败: {}", e);
                    break;
                }
            },
            Err(e) => {
                warn!("轮询键盘事件失败: {}", e);
                break;
            }
        }
    });
    rx
}

async fn drive(coordinator: &Addr<TaskCoordinator>) -> anyhow::Result<()> {
    let mut progress = ProgressManager::new();
    let mut last_update = Instant::now();
    let mut quitting = false;
    let mut keys = spawn_key_reader();

    loop {
        while let Ok(code) = keys.try_recv() {
            if quitting {
                continue;
            }
            match code {
                KeyCode::Char('p') | KeyCode::Char('P') => {
                    let count = coordinator.send(PauseAll).await?;
                    info!("用户暂停了 {} 个任务", count);
                }
                KeyCode::Char('r') | KeyCode::Char('R') => {
                    let resumed = coordinator.send(ResumeAllPaused).await?;
                    info!("用户恢复了 {} 个任务", resumed.len());
                }
                KeyCode::Char('q') | KeyCode::Char('Q') => {
                    let count = coordinator.send(PauseAll).await?;
                    info!("用户退出，暂停 {} 个任务", count);
                    quitting = true;
                }
                _ => {}
            }
        }

        if last_update.elapsed() >= PROGRESS_UPDATE_INTERVAL {
            let tasks = coordinator.send(ListTasks).await?;
            progress.sync(&tasks);

            let stats = coordinator.send(GetStats).await?;
            let active = stats.pending + stats.downloading;
            if active == 0 && (quitting || stats.paused == 0) {
                break;
            }
            last_update = Instant::now();
        }

        actix_rt::time::sleep(Duration::from_millis(10)).await;
    }

    progress.finish();
    Ok(())
}
