#![doc = r#"
# spark-socket

## 设计动机（Why）
- **定位**：该 crate 提供 Spark 的同步套接字操作层，封装建连、就绪轮询、阻塞模式切换、
  字节流收发与库生命周期等平台细节。
- **架构角色**：作为传输实现层之下的最底层积木，向上只暴露带分类的返回值，
  重试与退避策略由调用方自行叠加。
- **设计理念**：强调“显式所有权”与“错误分类”。句柄独占底层套接字，`close` 消耗句柄；
  所有失败均映射为 [`SocketError`] 或 [`ReceiveOutcome`]，普通网络状况从不 panic。

## 核心契约（What）
- **建连**：[`SocketHandle::connect`] 走阻塞路径；[`connect_timeout`] 在截止时间内逐个尝试
  解析出的候选地址，成功后句柄保持非阻塞模式；
- **就绪**：[`SocketHandle::wait`] 返回 [`Readiness`] 三态结果，不区分具体触发的条件；
- **收发**：`send`/`recv` 允许部分传输，`recv_from`/`peek_from` 返回分类结果；
- **生命周期**：[`SocketLibrary`] 守卫负责 Windows 上的 Winsock 启动与清理，其余平台为空操作。

## 实现策略（How）
- **平台抽象**：[`platform`] 模块以 `PlatformSocket` 能力集描述每个目标平台的原语，
  编译期按 `cfg` 选定唯一实现；建连逻辑只依赖该接口；
- **时间预算**：每次调用在入口处从 [`time::Deadline`] 推导绝对截止时间，不做全局缓存；
- **诊断通道**：[`diag`] 以 `arc-swap` 保存进程级日志汇，读取前先取快照，替换与读取互不阻塞。

## 风险与考量（Trade-offs）
- **单句柄并发**：句柄不是 `Sync`，同一句柄不得被两个执行上下文同时驱动；
- **取消**：仅以超时参数表达，已进入的阻塞系统调用只能依赖操作系统自身的唤醒机制。
"#]

pub mod config;
pub mod connect;
pub mod diag;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod mode;
pub mod platform;
pub mod readiness;
pub mod time;
pub mod transfer;

pub use config::{ConfigError, SocketConfig};
pub use connect::{ConnectOutcome, Connector, connect_timeout, resolve};
pub use diag::{Diagnostics, LogRecord, LogSink, Severity, dump, set_log_sink};
pub use error::{ErrorCategory, SocketError};
pub use handle::{INVALID_RAW_HANDLE, RawHandle, SocketHandle};
pub use lifecycle::{ShutdownDirection, SocketLibrary};
pub use mode::BlockingMode;
pub use readiness::{Interest, Readiness, select};
pub use socket2::Domain;
pub use transfer::{OsErrorCode, ReceiveOutcome, SOCKET_ERROR, raw_count};
