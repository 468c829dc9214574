//! 日志系统: 控制台与按日期分文件输出.
//!
//! 编码器库通过 `log` 门面输出, 这里安装的 tracing 订阅器会一并接收.
//! 打开 `syntax_trace` 后, 语法追踪 (逐个语法元素) 写入日志文件.

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

mod retention;

pub use retention::prune_expired_logs;

/// 语法追踪输出所在的日志 target
pub const SYNTAX_TRACE_TARGET: &str = "tao_codec::encoders::hevc";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
    /// 把逐语法元素的追踪写入日志文件
    #[serde(default)]
    pub syntax_trace: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_retention_days() -> i64 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_prefix: "tao".to_string(),
            syntax_trace: false,
            retention_days: default_retention_days(),
        }
    }
}

impl LoggingConfig {
    /// 文件输出的过滤指令
    pub fn file_filter_directives(&self) -> String {
        if self.syntax_trace {
            format!("{},{}=trace", self.level, SYNTAX_TRACE_TARGET)
        } else {
            self.level.clone()
        }
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// 初始化全局日志订阅器, 只能调用一次
pub fn init(config: LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("创建日志目录失败, path={}", config.directory))?;

    let today = Local::now().date_naive();
    let removed = prune_expired_logs(
        Path::new(&config.directory),
        &config.file_prefix,
        config.retention_days,
        today,
    )?;

    let file_appender = DatedFileWriter::new(Path::new(&config.directory), &config.file_prefix)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD.set(guard).ok();

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_filter = EnvFilter::try_new(config.file_filter_directives())
        .with_context(|| format!("无效的日志级别: {}", config.level))?;

    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(ConsoleFormatter)
        .with_filter(console_filter);

    let file_layer = fmt::Layer::default()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter);

    Registry::default()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("全局日志订阅器已初始化")?;

    tracing::info!(
        "日志已初始化: 目录 {}, 清理过期文件 {} 个",
        config.directory,
        removed
    );
    Ok(())
}

/// 按本地日期写入 `<prefix>.<YYYY-MM-DD>.log`, 跨日时切换到新文件
struct DatedFileWriter {
    directory: PathBuf,
    prefix: String,
    date: NaiveDate,
    file: File,
}

impl DatedFileWriter {
    fn new(directory: &Path, prefix: &str) -> Result<Self> {
        let date = Local::now().date_naive();
        let file = open_append_file(&build_current_log_path(directory, prefix, date))?;
        Ok(Self {
            directory: directory.to_path_buf(),
            prefix: prefix.to_string(),
            date,
            file,
        })
    }

    fn roll_if_needed(&mut self) -> std::io::Result<()> {
        let today = Local::now().date_naive();
        if today == self.date {
            return Ok(());
        }
        let path = build_current_log_path(&self.directory, &self.prefix, today);
        self.file = open_append_file(&path).map_err(std::io::Error::other)?;
        self.date = today;
        Ok(())
    }
}

impl Write for DatedFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.roll_if_needed()?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

fn open_append_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("打开日志文件失败, path={}", path.display()))
}

pub fn build_current_log_path(directory: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    directory.join(format!("{}.{}.log", prefix, date.format("%Y-%m-%d")))
}

struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}:{:02}:{:02}.{:03}] ",
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis()
        )?;
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(
            writer,
            "{}{:5}\x1b[0m {} > ",
            color,
            meta.level().to_string(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// 文件格式: 日期时间, 级别, target, 内容
struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] {:5} {} > ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis(),
            meta.level().to_string(),
            meta.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
