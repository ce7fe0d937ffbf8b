//! 诊断日志汇与格式化工具。
//!
//! # 设计初衷（Why）
//! - 套接字层只在内部致命条件（例如套接字库启动失败）时输出诊断，诊断从不影响控制流；
//! - 进程级日志汇允许在运行期替换，读取方必须先取快照再使用，避免替换过程中读到悬空或缺失的汇。
//!
//! # 使用方式（How）
//! - 业务代码通过 [`Diagnostics`] 句柄输出；[`Diagnostics::global`] 读取进程级日志汇，
//!   [`Diagnostics::with_sink`] 注入独立的汇，[`Diagnostics::disabled`] 完全静默；
//! - 进程级日志汇保存在 `arc_swap::ArcSwapOption` 中，[`set_log_sink`] 写入，
//!   每次输出只做一次 `load_full` 快照；
//! - 默认日志汇为 [`TracingSink`]，把记录转交 `tracing`；[`ConsoleSink`] 复刻单行文本格式。
//!
//! # 契约说明（What）
//! - 日志汇被设置为 `None` 后，所有输出均为空操作；
//! - [`dump`] 以大写十六进制渲染字节，每个字节后跟一个空格。

use std::fmt::{self, Write as _};
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwapOption;

/// 诊断级别；数值越小越重要。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// 错误，程序可能处于不一致状态。
    Error = 0,
    /// 重要信息，程序仍然一致或可恢复。
    Important = 1,
    /// 常规阶段信息。
    Info = 2,
    /// 调试信息。
    Debug = 3,
    /// 应用自定义级别，内置控制台汇默认跳过。
    Custom = 4,
}

impl Severity {
    /// 控制台格式中紧随标签的后缀。
    pub fn suffix(self) -> &'static str {
        match self {
            Severity::Error => ":ERR",
            Severity::Important => ":IMP",
            Severity::Info => ":INF",
            Severity::Debug => ":DBG",
            Severity::Custom => "",
        }
    }
}

/// 一条诊断记录。`file`/`func` 缺失时表示调用方未提供源码位置。
#[derive(Clone, Copy, Debug)]
pub struct LogRecord<'a> {
    pub file: Option<&'a str>,
    pub line: Option<u32>,
    pub func: Option<&'a str>,
    pub severity: Severity,
    pub tag: &'a str,
    pub message: &'a str,
}

/// 可替换的诊断输出端。
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord<'_>);
}

impl<F> LogSink for F
where
    F: Fn(&LogRecord<'_>) + Send + Sync,
{
    fn emit(&self, record: &LogRecord<'_>) {
        self(record)
    }
}

/// `ArcSwapOption` 需要定长类型，此处以薄包装承载 trait 对象。
struct SinkSlot(Arc<dyn LogSink>);

static GLOBAL_SINK: LazyLock<ArcSwapOption<SinkSlot>> =
    LazyLock::new(|| ArcSwapOption::from_pointee(SinkSlot(Arc::new(TracingSink))));

/// 替换进程级日志汇；传入 `None` 关闭输出。
///
/// 写入与读取互不阻塞：正在输出的调用继续使用替换前取得的快照。
pub fn set_log_sink(sink: Option<Arc<dyn LogSink>>) {
    GLOBAL_SINK.store(sink.map(|sink| Arc::new(SinkSlot(sink))));
}

fn global_sink() -> Option<Arc<dyn LogSink>> {
    GLOBAL_SINK.load_full().map(|slot| Arc::clone(&slot.0))
}

#[derive(Clone)]
enum Target {
    Global,
    Injected(Arc<dyn LogSink>),
    Disabled,
}

/// 可注入的诊断句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以依赖注入取代全局可变指针：需要隔离输出的组件（例如测试）持有自己的汇，
///   其余组件沿用进程级配置；
///
/// ## 契约（What）
/// - `emit` 在目标汇缺失时直接返回；
/// - 进程级目标在每次 `emit` 时重新快照，因此运行期替换对后续调用立即生效。
#[derive(Clone)]
pub struct Diagnostics {
    target: Target,
}

impl Diagnostics {
    /// 使用进程级日志汇。
    pub fn global() -> Self {
        Self {
            target: Target::Global,
        }
    }

    /// 使用注入的日志汇。
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            target: Target::Injected(sink),
        }
    }

    /// 丢弃所有输出。
    pub fn disabled() -> Self {
        Self {
            target: Target::Disabled,
        }
    }

    fn snapshot(&self) -> Option<Arc<dyn LogSink>> {
        match &self.target {
            Target::Global => global_sink(),
            Target::Injected(sink) => Some(Arc::clone(sink)),
            Target::Disabled => None,
        }
    }

    /// 输出一条记录。
    pub fn emit(&self, record: &LogRecord<'_>) {
        if let Some(sink) = self.snapshot() {
            sink.emit(record);
        }
    }

    /// 格式化并输出；目标汇缺失时不做格式化。
    pub fn emit_fmt(
        &self,
        location: (&str, u32, &str),
        severity: Severity,
        tag: &str,
        args: fmt::Arguments<'_>,
    ) {
        let Some(sink) = self.snapshot() else {
            return;
        };
        let message = args.to_string();
        if message.is_empty() {
            return;
        }
        let (file, line, func) = location;
        sink.emit(&LogRecord {
            file: Some(file),
            line: Some(line),
            func: Some(func),
            severity,
            tag,
            message: &message,
        });
    }

    /// 不带源码位置的快捷输出。
    pub fn log(&self, severity: Severity, tag: &str, message: &str) {
        self.emit(&LogRecord {
            file: None,
            line: None,
            func: None,
            severity,
            tag,
            message,
        });
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            Target::Global => "global",
            Target::Injected(_) => "injected",
            Target::Disabled => "disabled",
        };
        f.debug_struct("Diagnostics").field("target", &target).finish()
    }
}

/// 携带源码位置输出一条格式化诊断。
///
/// ```
/// use spark_socket::{Diagnostics, Severity, sock_log};
///
/// let diag = Diagnostics::disabled();
/// sock_log!(diag, Severity::Error, "spark-socket", "startup failed: {}", 10093);
/// ```
#[macro_export]
macro_rules! sock_log {
    ($diag:expr, $severity:expr, $tag:expr, $($arg:tt)+) => {
        $diag.emit_fmt(
            (file!(), line!(), module_path!()),
            $severity,
            $tag,
            format_args!($($arg)+),
        )
    };
}

/// 把诊断记录转交 `tracing` 的默认日志汇。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord<'_>) {
        let file = record.file.unwrap_or("??");
        let line = record.line.unwrap_or_default();
        let func = record.func.unwrap_or("??");
        match record.severity {
            Severity::Error => {
                tracing::error!(tag = record.tag, file, line, func, "{}", record.message)
            }
            Severity::Important => {
                tracing::warn!(tag = record.tag, file, line, func, "{}", record.message)
            }
            Severity::Info => {
                tracing::info!(tag = record.tag, file, line, func, "{}", record.message)
            }
            Severity::Debug => {
                tracing::debug!(tag = record.tag, file, line, func, "{}", record.message)
            }
            Severity::Custom => {
                tracing::trace!(tag = record.tag, file, line, func, "{}", record.message)
            }
        }
    }
}

/// 控制台输出格式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStyle {
    /// `file:line 'func'>> [tag:ERR] message`
    Default,
    /// `[tag:ERR] message`
    Compact,
}

/// 按单行文本格式写入标准输出的日志汇。
#[derive(Clone, Copy, Debug)]
pub struct ConsoleSink {
    style: LogStyle,
    max_severity: Severity,
}

impl ConsoleSink {
    /// 默认详细度：调试构建输出 `Debug`，发布构建输出到 `Info`。
    pub const fn new(style: LogStyle) -> Self {
        let max_severity = if cfg!(debug_assertions) {
            Severity::Debug
        } else {
            Severity::Info
        };
        Self {
            style,
            max_severity,
        }
    }

    pub const fn with_max_severity(mut self, max_severity: Severity) -> Self {
        self.max_severity = max_severity;
        self
    }

    /// 渲染一条记录；超出详细度上限时返回 `None`。
    pub fn render(&self, record: &LogRecord<'_>) -> Option<String> {
        if record.severity > self.max_severity {
            return None;
        }
        Some(match self.style {
            LogStyle::Default => format_default(record),
            LogStyle::Compact => format_compact(record),
        })
    }
}

impl LogSink for ConsoleSink {
    fn emit(&self, record: &LogRecord<'_>) {
        if let Some(line) = self.render(record) {
            println!("{line}");
        }
    }
}

/// `file:line 'func'>> [tag:SUF] message`，缺失的位置字段渲染为 `??`。
pub fn format_default(record: &LogRecord<'_>) -> String {
    let line = record.line.map_or(-1, i64::from);
    format!(
        "{}:{} '{}'>> [{}{}] {}",
        record.file.unwrap_or("??"),
        line,
        record.func.unwrap_or("??"),
        record.tag,
        record.severity.suffix(),
        record.message,
    )
}

/// `[tag:SUF] message`
pub fn format_compact(record: &LogRecord<'_>) -> String {
    format!(
        "[{}{}] {}",
        record.tag,
        record.severity.suffix(),
        record.message
    )
}

/// 以大写十六进制渲染字节序列，每个字节后跟一个空格。
pub fn dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        // 写入 String 不会失败
        let _ = write!(out, "{byte:02X} ");
    }
    out
}
