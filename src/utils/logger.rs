use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use actix::prelude::*;

/// 日志消息
pub struct LogMsg {
    pub level: Level,
    pub target: String,
    pub message: String,
}
impl Message for LogMsg { type Result = (); }

/// 刷新缓冲区，退出前调用
pub struct FlushLog;
impl Message for FlushLog { type Result = (); }

/// 日志Actor，按大小轮转，旧文件保存为 `<file>.backup`
pub struct LoggerActor {
    pub writer: BufWriter<File>,
    pub level: LevelFilter,
    pub file_path: String,
    pub max_size: u64,
    pub current_size: u64,
}

impl LoggerActor {
    pub fn new(file_path: &str, level: LevelFilter, max_size: u64) -> Result<Self, std::io::Error> {
        if let Some(parent) = Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(file_path)?;
        let current_size = file.metadata()?.len();

        Ok(Self {
            writer: BufWriter::new(file),
            level,
            file_path: file_path.to_string(),
            max_size,
            current_size,
        })
    }

    fn check_rotation(&mut self) -> Result<(), std::io::Error> {
        if self.current_size <= self.max_size {
            return Ok(());
        }
        self.writer.flush()?;

        let backup_path = format!("{}.backup", self.file_path);
        if Path::new(&backup_path).exists() {
            std::fs::remove_file(&backup_path)?;
        }
        std::fs::rename(&self.file_path, &backup_path)?;

        let file = OpenOptions::new().create(true).append(true).open(&self.file_path)?;
        self.writer = BufWriter::new(file);
        self.current_size = 0;
        Ok(())
    }

    fn write_log(&mut self, msg: &LogMsg) -> Result<(), std::io::Error> {
        if msg.level > self.level {
            return Ok(());
        }
        let entry = format!(
            "{} [{}] {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            msg.level,
            msg.target,
            msg.message
        );

        self.check_rotation()?;
        self.writer.write_all(entry.as_bytes())?;
        self.current_size += entry.len() as u64;

        if msg.level <= Level::Warn || self.current_size % 1024 < entry.len() as u64 {
            self.writer.flush()?;
        }
        Ok(())
    }
}

impl Actor for LoggerActor {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let _ = self.writer.flush();
    }
}

impl Handler<LogMsg> for LoggerActor {
    type Result = ();
    fn handle(&mut self, msg: LogMsg, _ctx: &mut Self::Context) {
        if let Err(e) = self.write_log(&msg) {
            eprintln!("日志写入失败: {}", e);
        }
    }
}

impl Handler<FlushLog> for LoggerActor {
    type Result = ();
    fn handle(&mut self, _msg: FlushLog, _ctx: &mut Self::Context) {
        if let Err(e) = self.writer.flush() {
            eprintln!("日志刷新失败: {}", e);
        }
    }
}

/// `log` 门面到 `LoggerActor` 的桥接
pub struct ActorLogger {
    addr: Addr<LoggerActor>,
    level: LevelFilter,
}

impl Log for ActorLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.addr.do_send(LogMsg {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {
        self.addr.do_send(FlushLog);
    }
}

/// 启动日志Actor并注册为全局 logger，需要在 actix 系统内调用
pub fn init(file_path: &str, level: LevelFilter, max_size: u64) -> anyhow::Result<Addr<LoggerActor>> {
    let addr = LoggerActor::new(file_path, level, max_size)?.start();
    log::set_boxed_logger(Box::new(ActorLogger { addr: addr.clone(), level }))
        .map_err(|e| anyhow::anyhow!("无法注册日志: {}", e))?;
    log::set_max_level(level);
    Ok(addr)
}
