//! 套接字层的错误分类。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 将“解析失败”“握手失败”“收发失败”“选项被拒”“库生命周期失败”五类结果显式建模，
//!   让调用方可以在不解析文案的前提下决定重试或放弃；
//! - 每个变体都保留原始 [`io::Error`]，保证错误码与系统文案完整透传。
//!
//! ## 契约（What）
//! - [`SocketError::category`]：返回稳定的 [`ErrorCategory`]；
//! - [`SocketError::code`]：返回 `spark.socket.*` 形式的稳定错误码，适合写入日志或指标；
//! - [`SocketError::is_retryable`]：仅依据错误分类与底层 `io::ErrorKind` 给出建议，不包含退避策略。
//!
//! ## 注意事项（Trade-offs）
//! - 无连接接收的“可恢复/致命”分支并不走本枚举，而是由
//!   [`ReceiveOutcome`](crate::transfer::ReceiveOutcome) 作为普通返回值承载。

use std::io;

use thiserror::Error;

use crate::transfer::TransferOp;

/// 套接字操作失败的粗粒度分类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 主机名或地址无法解析；不提供新输入时重试无意义。
    Resolution,
    /// 建连被拒绝、超时或出错；调用方可重试或改用其他地址。
    Handshake,
    /// 已连接套接字上的收发失败。
    Transfer,
    /// 模式或套接字选项被操作系统拒绝，通常只发生在初始化阶段。
    Option,
    /// 套接字库启动或清理失败。
    Lifecycle,
}

/// 被操作系统拒绝的套接字选项。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketOption {
    BlockingMode,
    TcpNoDelay,
    Shutdown,
    Bind,
}

impl std::fmt::Display for SocketOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SocketOption::BlockingMode => "blocking mode",
            SocketOption::TcpNoDelay => "TCP_NODELAY",
            SocketOption::Shutdown => "shutdown",
            SocketOption::Bind => "bind",
        };
        f.write_str(name)
    }
}

/// 套接字层统一错误类型。
#[derive(Debug, Error)]
pub enum SocketError {
    /// 套接字库启动失败。
    #[error("socket library startup: {source}")]
    Startup { source: io::Error },
    /// 套接字库协商出的版本不是 2.2。
    #[error("socket library negotiated version {major}.{minor}, 2.2 required")]
    UnsupportedVersion { major: u8, minor: u8 },
    /// 套接字库清理失败。
    #[error("socket library cleanup: {source}")]
    Cleanup { source: io::Error },
    /// 创建套接字失败。
    #[error("socket create: {source}")]
    Create { source: io::Error },
    /// 目标主机无法解析。
    #[error("host `{host}` not found")]
    HostNotFound {
        host: String,
        #[source]
        source: Option<io::Error>,
    },
    /// 建连失败；`target` 为最后一个尝试的地址（或原始主机串）。
    #[error("tcp connect to {target}: {source}")]
    ConnectFailed { target: String, source: io::Error },
    /// 流式收发失败。
    #[error("{op}: {source}")]
    Transfer { op: TransferOp, source: io::Error },
    /// 缓冲区长度超出平台原语可表达的范围，请求在本地即被拒绝。
    #[error("{op} of {len} bytes exceeds the platform limit of {max} bytes")]
    TransferTooLarge { op: TransferOp, len: usize, max: usize },
    /// 套接字选项或模式变更被拒绝。
    #[error("set {option}: {source}")]
    OptionRejected {
        option: SocketOption,
        source: io::Error,
    },
    /// 释放套接字失败。
    #[error("socket close: {source}")]
    Close { source: io::Error },
}

impl SocketError {
    /// 返回错误所属的分类。
    pub fn category(&self) -> ErrorCategory {
        match self {
            SocketError::HostNotFound { .. } => ErrorCategory::Resolution,
            SocketError::ConnectFailed { .. } => ErrorCategory::Handshake,
            SocketError::Transfer { .. } | SocketError::TransferTooLarge { .. } => {
                ErrorCategory::Transfer
            }
            SocketError::OptionRejected { .. }
            | SocketError::Create { .. }
            | SocketError::Close { .. } => ErrorCategory::Option,
            SocketError::Startup { .. }
            | SocketError::UnsupportedVersion { .. }
            | SocketError::Cleanup { .. } => ErrorCategory::Lifecycle,
        }
    }

    /// 稳定错误码，供日志与指标使用。
    pub fn code(&self) -> &'static str {
        match self {
            SocketError::Startup { .. } => "spark.socket.startup_failed",
            SocketError::UnsupportedVersion { .. } => "spark.socket.unsupported_version",
            SocketError::Cleanup { .. } => "spark.socket.cleanup_failed",
            SocketError::Create { .. } => "spark.socket.create_failed",
            SocketError::HostNotFound { .. } => "spark.socket.host_not_found",
            SocketError::ConnectFailed { .. } => "spark.socket.connect_failed",
            SocketError::Transfer { op, .. } => op.code(),
            SocketError::TransferTooLarge { .. } => "spark.socket.transfer_too_large",
            SocketError::OptionRejected { .. } => "spark.socket.option_rejected",
            SocketError::Close { .. } => "spark.socket.close_failed",
        }
    }

    /// 底层系统错误码（若存在）。
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    /// 给出是否值得重试的建议。
    ///
    /// 握手失败总是可重试；收发失败依据底层 `io::ErrorKind` 判断；
    /// 解析、选项与生命周期失败在不改变输入的情况下重试无意义。
    pub fn is_retryable(&self) -> bool {
        match self {
            SocketError::ConnectFailed { .. } => true,
            SocketError::Transfer { source, .. } => retryable_kind(source.kind()),
            _ => false,
        }
    }

    /// 携带的底层 I/O 错误（若存在），可据此读取 `io::ErrorKind`。
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            SocketError::Startup { source }
            | SocketError::Cleanup { source }
            | SocketError::Create { source }
            | SocketError::ConnectFailed { source, .. }
            | SocketError::Transfer { source, .. }
            | SocketError::OptionRejected { source, .. }
            | SocketError::Close { source } => Some(source),
            SocketError::HostNotFound { source, .. } => source.as_ref(),
            SocketError::UnsupportedVersion { .. } | SocketError::TransferTooLarge { .. } => None,
        }
    }
}

fn retryable_kind(kind: io::ErrorKind) -> bool {
    use io::ErrorKind;
    matches!(
        kind,
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
            | ErrorKind::WriteZero
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
    )
}
