//! 套接字库生命周期与句柄级选项。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - Windows 在任何套接字调用前必须完成 Winsock 2.2 启动，结束时成对清理；
//!   其余平台没有等价步骤。以守卫对象表达这一配对关系，调用方无需关心平台差异；
//! - 半关闭、关闭与 `TCP_NODELAY` 是连接收尾与调优的全部控制面，集中于此便于审计。
//!
//! ## 契约（What）
//! - [`SocketLibrary::init`]：启动失败通过进程级日志汇以 `Error` 级别报告，并以
//!   [`SocketError::Startup`] 或 [`SocketError::UnsupportedVersion`] 返回；
//! - [`SocketLibrary::cleanup`] 报告清理结果，直接丢弃守卫则静默清理；
//! - [`SocketHandle::shutdown`] 只切断方向不释放句柄；[`SocketHandle::close`] 消耗句柄。
//!
//! ## 注意事项（Trade-offs）
//! - `set_nodelay` 只能开启，不提供关闭入口；
//! - 同一进程可持有多个守卫，平台启动计数由操作系统维护。

use std::net::Shutdown;

use crate::diag::{Diagnostics, Severity};
use crate::error::{SocketError, SocketOption};
use crate::handle::SocketHandle;
use crate::platform::{Native, PlatformSocket};

const LIFECYCLE_TAG: &str = "spark-socket";

/// 半关闭方向。
///
/// - `Read`：关闭读方向，继续允许写；
/// - `Write`：关闭写方向，已排队的入站数据仍可读取；
/// - `Both`：同时关闭读写，但句柄仍需 [`SocketHandle::close`] 或 `Drop` 释放。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ShutdownDirection {
    Read,
    Write,
    Both,
}

impl From<ShutdownDirection> for Shutdown {
    fn from(direction: ShutdownDirection) -> Self {
        match direction {
            ShutdownDirection::Read => Shutdown::Read,
            ShutdownDirection::Write => Shutdown::Write,
            ShutdownDirection::Both => Shutdown::Both,
        }
    }
}

/// 套接字库守卫；存活期间平台套接字库保持可用。
#[derive(Debug)]
#[must_use = "dropping the guard immediately cleans the socket library up again"]
pub struct SocketLibrary {
    released: bool,
}

impl SocketLibrary {
    /// 启动平台套接字库，失败写入进程级日志汇。
    pub fn init() -> Result<Self, SocketError> {
        Self::init_with_diagnostics(&Diagnostics::global())
    }

    /// 与 [`SocketLibrary::init`] 相同，但失败写入给定的诊断句柄。
    pub fn init_with_diagnostics(diag: &Diagnostics) -> Result<Self, SocketError> {
        match Native::startup() {
            Ok(()) => {
                tracing::info!(target: "spark_socket::lifecycle", "socket library started");
                Ok(Self { released: false })
            }
            Err(error) => {
                report_startup_failure(diag, &error);
                Err(error)
            }
        }
    }

    /// 显式清理并报告结果。
    pub fn cleanup(mut self) -> Result<(), SocketError> {
        self.released = true;
        Native::cleanup().map_err(|source| SocketError::Cleanup { source })?;
        tracing::info!(target: "spark_socket::lifecycle", "socket library cleaned up");
        Ok(())
    }
}

impl Drop for SocketLibrary {
    fn drop(&mut self) {
        if !self.released {
            let _ = Native::cleanup();
        }
    }
}

fn report_startup_failure(diag: &Diagnostics, error: &SocketError) {
    tracing::error!(target: "spark_socket::lifecycle", code = error.code(), "{error}");
    crate::sock_log!(
        diag,
        Severity::Error,
        LIFECYCLE_TAG,
        "socket library startup failed: {error}"
    );
}

impl SocketHandle {
    /// 开启 `TCP_NODELAY`。
    pub fn set_nodelay(&self) -> Result<(), SocketError> {
        self.socket
            .set_tcp_nodelay(true)
            .map_err(|source| SocketError::OptionRejected {
                option: SocketOption::TcpNoDelay,
                source,
            })
    }

    /// 半关闭指定方向，句柄本身保持有效。
    pub fn shutdown(&self, direction: ShutdownDirection) -> Result<(), SocketError> {
        self.socket
            .shutdown(direction.into())
            .map_err(|source| SocketError::OptionRejected {
                option: SocketOption::Shutdown,
                source,
            })
    }

    /// 释放操作系统句柄并报告结果。
    pub fn close(self) -> Result<(), SocketError> {
        Native::close(self.socket).map_err(|source| SocketError::Close { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::LogRecord;
    use std::io;
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};

    #[test]
    fn library_guard_pairs_startup_with_cleanup() {
        let first = SocketLibrary::init().expect("startup");
        let second = SocketLibrary::init().expect("nested startup");
        second.cleanup().expect("explicit cleanup");
        drop(first);
    }

    #[test]
    fn startup_failure_reaches_injected_sink() {
        let seen: Arc<Mutex<Vec<(Severity, String)>>> = Arc::default();
        let sink_seen = Arc::clone(&seen);
        let diag = Diagnostics::with_sink(Arc::new(move |record: &LogRecord<'_>| {
            sink_seen
                .lock()
                .expect("sink lock")
                .push((record.severity, record.message.to_owned()));
        }));

        let failure = SocketError::Startup {
            source: io::Error::from_raw_os_error(10091),
        };
        report_startup_failure(&diag, &failure);

        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Severity::Error);
        assert!(seen[0].1.starts_with("socket library startup failed"));
    }

    #[test]
    fn shutdown_directions_map_to_std() {
        assert_eq!(Shutdown::from(ShutdownDirection::Read), Shutdown::Read);
        assert_eq!(Shutdown::from(ShutdownDirection::Write), Shutdown::Write);
        assert_eq!(Shutdown::from(ShutdownDirection::Both), Shutdown::Both);
    }

    #[test]
    fn nodelay_is_applied() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let stream = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let handle = SocketHandle::try_from(stream).expect("adopt");
        handle.set_nodelay().expect("enable nodelay");
        assert!(handle.as_socket().tcp_nodelay().expect("query nodelay"));
    }

    #[test]
    fn close_consumes_a_fresh_handle() {
        let handle = SocketHandle::create_tcp().expect("create tcp");
        handle.close().expect("close");
    }

    #[test]
    fn shutdown_on_unconnected_stream_is_rejected() {
        let handle = SocketHandle::create_tcp().expect("create tcp");
        let err = handle
            .shutdown(ShutdownDirection::Both)
            .expect_err("not connected");
        assert_eq!(err.code(), "spark.socket.option_rejected");
    }
}
