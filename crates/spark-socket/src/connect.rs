//! 建连：地址解析、阻塞建连与限时建连。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 阻塞建连保持调用方设定的模式，只做一次连接尝试；
//! - 限时建连按解析顺序逐个尝试候选地址，整个过程共享一个绝对截止时间，
//!   单个慢地址不会让总耗时超过预算。
//!
//! ## 逻辑（How）
//! - 每个候选地址独占一个局部 [`SocketHandle`]：失败即随作用域释放，
//!   成功才把所有权交给调用方；
//! - 非阻塞 `connect` 返回“进行中”后，等待 `WRITE | ERROR` 就绪，再读取挂起错误
//!   （`SO_ERROR`）判定握手结果。
//!
//! ## 契约（What）
//! - 解析失败或无候选地址 ⇒ [`SocketError::HostNotFound`]；
//! - 其余失败 ⇒ [`SocketError::ConnectFailed`]，携带最后一个候选地址的原因；
//! - 限时建连成功后句柄处于非阻塞模式，阻塞建连不改变句柄模式。
//!
//! ## 注意事项（Trade-offs）
//! - 解析本身使用系统解析器，其耗时不受 `timeout` 约束。

use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use socket2::Domain;

use crate::config::{ConfigError, SocketConfig};
use crate::diag::{Diagnostics, Severity};
use crate::error::SocketError;
use crate::handle::SocketHandle;
use crate::mode::BlockingMode;
use crate::platform::{Native, PlatformSocket};
use crate::readiness::{Interest, Readiness};
use crate::time::Deadline;

/// 建连结果的扁平标签及其稳定数值。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectOutcome {
    Success = 1,
    HostNotFound = -1,
    ConnectFailed = -2,
}

impl ConnectOutcome {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// 从建连结果推导标签。
    pub fn from_result<T>(result: &Result<T, SocketError>) -> Self {
        match result {
            Ok(_) => ConnectOutcome::Success,
            Err(SocketError::HostNotFound { .. }) => ConnectOutcome::HostNotFound,
            Err(_) => ConnectOutcome::ConnectFailed,
        }
    }
}

/// 把主机与端口解析为候选地址，顺序与解析器返回一致。
///
/// 字面量 IPv4/IPv6 地址不经过系统解析器。
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, SocketError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    if host.is_empty() {
        return Err(host_not_found(host, None));
    }
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| host_not_found(host, Some(source)))?
        .collect();
    if candidates.is_empty() {
        return Err(host_not_found(host, None));
    }
    Ok(candidates)
}

fn host_not_found(host: &str, source: Option<io::Error>) -> SocketError {
    SocketError::HostNotFound {
        host: host.to_owned(),
        source,
    }
}

impl SocketHandle {
    /// 阻塞建连：选取第一个与句柄同地址族的候选地址，发起一次连接。
    ///
    /// 非阻塞句柄上的“进行中”视为成功，握手结果需调用方自行等待可写后确认。
    /// 名称已解析但没有同族候选（例如 IPv4 句柄而 `localhost` 只解析出 `::1`）时返回
    /// [`SocketError::ConnectFailed`]，其来源的 `io::ErrorKind` 为 `AddrNotAvailable`；
    /// 只有解析本身失败才是 [`SocketError::HostNotFound`]。
    pub fn connect(&self, host: &str, port: u16) -> Result<(), SocketError> {
        let candidates = resolve(host, port)?;
        self.connect_first_matching(host, &candidates)
    }

    fn connect_first_matching(
        &self,
        host: &str,
        candidates: &[SocketAddr],
    ) -> Result<(), SocketError> {
        let family = self.family();
        let Some(addr) = candidates
            .iter()
            .find(|addr| Domain::for_address(**addr) == family)
        else {
            return Err(SocketError::ConnectFailed {
                target: host.to_owned(),
                source: io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    "no resolved address matches the handle's address family",
                ),
            });
        };
        match self.socket.connect(&(*addr).into()) {
            Ok(()) => Ok(()),
            Err(err) if Native::connect_in_progress(&err) => Ok(()),
            Err(source) => Err(SocketError::ConnectFailed {
                target: addr.to_string(),
                source,
            }),
        }
    }
}

/// 在 `timeout` 内依次尝试所有候选地址，返回第一个握手成功的句柄。
///
/// 返回的句柄处于非阻塞模式。
pub fn connect_timeout(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<SocketHandle, SocketError> {
    let deadline = Deadline::after(timeout);
    let candidates = resolve(host, port)?;
    connect_candidates(host, &candidates, &deadline)
}

fn connect_candidates(
    host: &str,
    candidates: &[SocketAddr],
    deadline: &Deadline,
) -> Result<SocketHandle, SocketError> {
    let mut last_failure: Option<(SocketAddr, io::Error)> = None;
    for addr in candidates {
        match attempt(*addr, deadline) {
            Ok(handle) => {
                tracing::debug!(target: "spark_socket::connect", %addr, "connected");
                return Ok(handle);
            }
            Err(error) => {
                tracing::debug!(target: "spark_socket::connect", %addr, %error, "candidate failed");
                last_failure = Some((*addr, error));
            }
        }
    }
    let (target, source) = match last_failure {
        Some((addr, error)) => (addr.to_string(), error),
        None => (
            host.to_owned(),
            io::Error::new(io::ErrorKind::NotFound, "no candidate address"),
        ),
    };
    Err(SocketError::ConnectFailed { target, source })
}

fn attempt(addr: SocketAddr, deadline: &Deadline) -> io::Result<SocketHandle> {
    let handle = SocketHandle::create_tcp_for(&addr).map_err(into_io)?;
    handle
        .set_blocking_mode(BlockingMode::NonBlocking)
        .map_err(into_io)?;

    match handle.socket.connect(&addr.into()) {
        Ok(()) => return Ok(handle),
        Err(err) if Native::connect_in_progress(&err) => {}
        Err(err) => return Err(err),
    }

    match handle.wait(Interest::WRITE | Interest::ERROR, deadline.remaining()) {
        Readiness::Ready => {}
        Readiness::Timeout => {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect did not complete before the deadline",
            ));
        }
        Readiness::Error(err) => return Err(err),
    }

    match handle.socket.take_error()? {
        Some(err) => Err(err),
        None => Ok(handle),
    }
}

fn into_io(error: SocketError) -> io::Error {
    let kind = error
        .raw_os_error()
        .map(|code| io::Error::from_raw_os_error(code).kind())
        .unwrap_or(io::ErrorKind::Other);
    io::Error::new(kind, error)
}

/// 按 [`SocketConfig`] 建连的门面。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - 配置了超时 ⇒ 走 [`connect_timeout`]，`restore_blocking` 为真时成功后切回阻塞模式；
/// - 未配置超时 ⇒ 按第一个候选地址的地址族创建句柄并阻塞建连；
/// - `tcp_nodelay` 为真时在建连成功后开启；选项被拒绝时句柄随错误一同释放，
///   失败同时写入诊断句柄。
#[derive(Clone, Debug)]
pub struct Connector {
    config: SocketConfig,
    diag: Diagnostics,
}

impl Connector {
    pub fn new(config: SocketConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            diag: Diagnostics::global(),
        })
    }

    pub fn with_diagnostics(mut self, diag: Diagnostics) -> Self {
        self.diag = diag;
        self
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub fn connect(&self, host: &str, port: u16) -> Result<SocketHandle, SocketError> {
        let deadline = self.config.connect_timeout().map(Deadline::after);
        let candidates = resolve(host, port)?;
        let handle = match deadline {
            Some(deadline) => {
                let handle = connect_candidates(host, &candidates, &deadline)?;
                if self.config.restore_blocking() {
                    self.checked(handle.set_blocking_mode(BlockingMode::Blocking))?;
                }
                handle
            }
            None => {
                let Some(first) = candidates.first() else {
                    return Err(host_not_found(host, None));
                };
                let handle = SocketHandle::create_tcp_for(first)?;
                handle.connect_first_matching(host, &candidates)?;
                handle
            }
        };
        if self.config.tcp_nodelay() {
            self.checked(handle.set_nodelay())?;
        }
        Ok(handle)
    }

    fn checked(&self, result: Result<(), SocketError>) -> Result<(), SocketError> {
        if let Err(error) = &result {
            crate::sock_log!(
                self.diag,
                Severity::Error,
                "spark-socket",
                "post-connect option failed: {error}"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind scratch listener");
        let port = listener.local_addr().expect("scratch addr").port();
        drop(listener);
        port
    }

    #[test]
    fn literal_addresses_skip_the_resolver() {
        let v4 = resolve("127.0.0.1", 80).expect("literal v4");
        assert_eq!(v4, vec!["127.0.0.1:80".parse::<SocketAddr>().expect("addr")]);
        let v6 = resolve("::1", 443).expect("literal v6");
        assert_eq!(v6, vec!["[::1]:443".parse::<SocketAddr>().expect("addr")]);
    }

    #[test]
    fn unresolvable_host_is_host_not_found() {
        let err = resolve("no-such-host.invalid", 80).expect_err("invalid tld");
        assert_eq!(ConnectOutcome::from_result::<()>(&Err(err)), ConnectOutcome::HostNotFound);
        assert!(matches!(resolve("", 80), Err(SocketError::HostNotFound { .. })));
    }

    #[test]
    fn outcome_codes_are_stable() {
        assert_eq!(ConnectOutcome::Success.code(), 1);
        assert_eq!(ConnectOutcome::HostNotFound.code(), -1);
        assert_eq!(ConnectOutcome::ConnectFailed.code(), -2);
    }

    #[test]
    fn family_mismatch_is_connect_failed() {
        let handle = SocketHandle::create_tcp().expect("create v4");
        let err = handle.connect("::1", 80).expect_err("v6 only candidate");
        assert!(matches!(err, SocketError::ConnectFailed { .. }));
        assert_eq!(
            err.io_error().map(io::Error::kind),
            Some(io::ErrorKind::AddrNotAvailable)
        );
        assert_eq!(
            ConnectOutcome::from_result::<()>(&Err(err)),
            ConnectOutcome::ConnectFailed
        );
    }

    #[test]
    fn refused_connect_fails_on_both_paths() {
        let port = closed_port();

        let handle = SocketHandle::create_tcp().expect("create tcp");
        let immediate = handle.connect("127.0.0.1", port);
        assert_eq!(
            ConnectOutcome::from_result(&immediate),
            ConnectOutcome::ConnectFailed
        );

        let bounded = connect_timeout("127.0.0.1", port, Duration::from_secs(2));
        let err = bounded.expect_err("refused");
        assert!(matches!(err, SocketError::ConnectFailed { .. }));
        let code = err.raw_os_error().expect("os error code");
        assert_eq!(
            io::Error::from_raw_os_error(code).kind(),
            io::ErrorKind::ConnectionRefused
        );
    }

    #[test]
    fn timeout_connect_leaves_handle_non_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("addr").port();
        let handle =
            connect_timeout("127.0.0.1", port, Duration::from_secs(2)).expect("connect");
        assert_eq!(
            handle.blocking_mode().expect("query"),
            Some(BlockingMode::NonBlocking)
        );
        assert_eq!(
            handle.peer_addr().expect("peer"),
            listener.local_addr().expect("addr")
        );
    }

    #[test]
    fn connector_applies_config() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("addr").port();
        let config = SocketConfig::new()
            .with_connect_timeout(Some(Duration::from_secs(2)))
            .with_tcp_nodelay(true)
            .with_restore_blocking(true);
        let connector = Connector::new(config)
            .expect("valid config")
            .with_diagnostics(Diagnostics::disabled());

        let handle = connector.connect("127.0.0.1", port).expect("connect");
        assert_eq!(
            handle.blocking_mode().expect("query"),
            Some(BlockingMode::Blocking)
        );
        assert!(handle.as_socket().tcp_nodelay().expect("nodelay"));
    }

    #[test]
    fn connector_immediate_path_keeps_blocking_mode() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let port = listener.local_addr().expect("addr").port();
        let connector = Connector::new(SocketConfig::new()).expect("valid config");
        let handle = connector.connect("127.0.0.1", port).expect("connect");
        assert_ne!(
            handle.blocking_mode().expect("query"),
            Some(BlockingMode::NonBlocking)
        );
    }

    #[test]
    fn connector_rejects_zero_timeout() {
        let config = SocketConfig::new().with_connect_timeout(Some(Duration::ZERO));
        assert!(matches!(
            Connector::new(config),
            Err(ConfigError::ZeroTimeout)
        ));
    }
}
