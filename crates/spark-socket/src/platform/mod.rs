//! 平台能力集。
//!
//! # 模块定位（Why）
//! - 每个套接字原语在不同操作系统上的差异（就绪等待、阻塞模式查询、“连接进行中”错误码、
//!   接收错误分类、库启动）集中在 [`PlatformSocket`] 一处描述；
//! - 建连、收发与生命周期模块只依赖该 trait，编译期通过 `cfg` 选定唯一实现 [`Native`]。
//!
//! # 结构概览（What）
//! - `unix`：基于 `poll(2)`、`fcntl(2)` 与 `errno` 的实现；
//! - `windows`：基于 `select`、`WSAStartup` 与 `WSAGetLastError` 的实现。

use std::io;
use std::time::Duration;

use socket2::Socket;

use crate::error::SocketError;
use crate::mode::BlockingMode;
use crate::readiness::Interest;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) use unix::UnixPlatform as Native;
#[cfg(windows)]
pub(crate) use windows::WindowsPlatform as Native;

/// 平台原生的套接字标识。
#[cfg(unix)]
pub type RawHandle = std::os::fd::RawFd;
/// 平台原生的套接字标识。
#[cfg(windows)]
pub type RawHandle = std::os::windows::io::RawSocket;

/// 无连接接收失败的三类划分。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveErrorClass {
    /// 稍后重试即可，没有数据丢失。
    Recoverable,
    /// 句柄已不可用，调用方应关闭且不再重试。
    Fatal,
    /// 其余情况，原样上报系统错误码。
    Unknown,
}

/// 目标平台必须提供的套接字原语。
///
/// 所有方法均为关联函数：实现类型只是能力集的命名，不持有状态。
pub(crate) trait PlatformSocket {
    /// 单次收发允许的最大长度，对应原语长度参数的表示范围。
    const MAX_TRANSFER_LEN: usize;

    /// 原生句柄的无效哨兵值。
    const INVALID_HANDLE: RawHandle;

    /// 套接字库启动；需要时校验协商版本。
    fn startup() -> Result<(), SocketError>;

    /// 套接字库清理。
    fn cleanup() -> io::Result<()>;

    /// 等待单个句柄满足 `interest` 中任一条件。
    ///
    /// `interest` 非空。返回 `Ok(true)` 表示等待调用报告了至少一个事件，
    /// `Ok(false)` 表示超时，`Err` 表示等待调用本身失败。
    fn poll(socket: &Socket, interest: Interest, timeout: Duration) -> io::Result<bool>;

    /// 查询当前阻塞模式；平台无法查询时返回 `Ok(None)`。
    fn blocking_mode(socket: &Socket) -> io::Result<Option<BlockingMode>>;

    /// 设置阻塞模式。
    fn apply_blocking_mode(socket: &Socket, mode: BlockingMode) -> io::Result<()>;

    /// 建连返回的错误是否表示“握手仍在进行”。
    fn connect_in_progress(error: &io::Error) -> bool;

    /// 将接收失败的系统错误码分类。
    fn classify_receive_error(code: i32) -> ReceiveErrorClass;

    /// 释放句柄并返回系统调用结果。
    fn close(socket: Socket) -> io::Result<()>;
}

/// 把超时换算为毫秒，不足 1 ms 的非零值向上取整，避免退化为忙等。
pub(crate) fn timeout_millis(timeout: Duration, max: i64) -> i64 {
    if timeout.is_zero() {
        return 0;
    }
    let mut millis = timeout.as_millis();
    if timeout.as_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    i64::try_from(millis).unwrap_or(max).min(max)
}
