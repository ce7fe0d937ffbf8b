use std::cell::Cell;
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpStream, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{SocketError, SocketOption};
use crate::mode::BlockingMode;
use crate::platform::{Native, PlatformSocket};

pub use crate::platform::RawHandle;

/// 原生句柄的无效哨兵值（Unix 为 `-1`，Windows 为 `INVALID_SOCKET`）。
///
/// [`SocketHandle::as_raw`] 永远不会返回该值；它只用于与原生接口互操作。
pub const INVALID_RAW_HANDLE: RawHandle = <Native as PlatformSocket>::INVALID_HANDLE;

/// 独占一个操作系统套接字的句柄。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 以所有权表达“谁创建、谁负责释放”：句柄不可克隆，本层任何组件都不会在调用结束后保留它；
/// - [`SocketHandle::close`] 消耗句柄，因此“已关闭句柄上的操作”在编译期即被排除。
///
/// ## 契约（What）
/// - `family`：创建或接管时确定的地址族，阻塞建连据此挑选同族候选地址；
/// - `applied_mode`：本句柄最近一次设置的阻塞模式，仅在平台无法查询当前模式时作为幂等判断依据；
/// - 未显式关闭的句柄在 `Drop` 时由 `socket2` 释放，错误被忽略。
///
/// ## 注意事项（Trade-offs）
/// - 句柄是 `Send` 但不是 `Sync`：不提供内部锁，同一句柄不得被并发驱动。
pub struct SocketHandle {
    pub(crate) socket: Socket,
    family: Domain,
    pub(crate) applied_mode: Cell<Option<BlockingMode>>,
}

impl SocketHandle {
    /// 接管已创建的 `socket2::Socket`。
    pub fn from_socket(socket: Socket, family: Domain) -> Self {
        Self {
            socket,
            family,
            applied_mode: Cell::new(None),
        }
    }

    /// 创建 IPv4 TCP 套接字。
    pub fn create_tcp() -> Result<Self, SocketError> {
        Self::create(Domain::IPV4, Type::STREAM, Protocol::TCP)
    }

    /// 创建与 `addr` 同地址族的 TCP 套接字。
    pub fn create_tcp_for(addr: &SocketAddr) -> Result<Self, SocketError> {
        Self::create(Domain::for_address(*addr), Type::STREAM, Protocol::TCP)
    }

    /// 创建 UDP 套接字，供无连接接收使用。
    pub fn create_udp(family: Domain) -> Result<Self, SocketError> {
        Self::create(family, Type::DGRAM, Protocol::UDP)
    }

    fn create(family: Domain, ty: Type, protocol: Protocol) -> Result<Self, SocketError> {
        let socket = Socket::new(family, ty, Some(protocol))
            .map_err(|source| SocketError::Create { source })?;
        Ok(Self::from_socket(socket, family))
    }

    /// 绑定本地地址。
    pub fn bind(&self, addr: &SocketAddr) -> Result<(), SocketError> {
        self.socket
            .bind(&(*addr).into())
            .map_err(|source| SocketError::OptionRejected {
                option: SocketOption::Bind,
                source,
            })
    }

    pub fn family(&self) -> Domain {
        self.family
    }

    /// 原生句柄值，仅供诊断或与原生接口互操作；所有权仍归本句柄。
    pub fn as_raw(&self) -> RawHandle {
        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            self.socket.as_raw_fd()
        }
        #[cfg(windows)]
        {
            use std::os::windows::io::AsRawSocket;
            self.socket.as_raw_socket()
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        address_of(self.socket.local_addr()?)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        address_of(self.socket.peer_addr()?)
    }

    /// 借出底层 `socket2::Socket`，用于本层未封装的选项。
    pub fn as_socket(&self) -> &Socket {
        &self.socket
    }

    /// 交出底层套接字的所有权。
    pub fn into_socket(self) -> Socket {
        self.socket
    }
}

fn address_of(addr: socket2::SockAddr) -> io::Result<SocketAddr> {
    addr.as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not an inet address"))
}

fn adopt(socket: Socket) -> io::Result<SocketHandle> {
    let family = socket.local_addr()?.domain();
    Ok(SocketHandle::from_socket(socket, family))
}

impl TryFrom<TcpStream> for SocketHandle {
    type Error = io::Error;

    fn try_from(stream: TcpStream) -> io::Result<Self> {
        adopt(Socket::from(stream))
    }
}

impl TryFrom<UdpSocket> for SocketHandle {
    type Error = io::Error;

    fn try_from(socket: UdpSocket) -> io::Result<Self> {
        adopt(Socket::from(socket))
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("raw", &self.as_raw())
            .field("family", &self.family)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn created_handle_is_never_the_sentinel() {
        let handle = SocketHandle::create_tcp().expect("create tcp");
        assert_ne!(handle.as_raw(), INVALID_RAW_HANDLE);
        assert_eq!(handle.family(), Domain::IPV4);
    }

    #[test]
    fn family_follows_target_address() {
        let v6: SocketAddr = "[::1]:80".parse().expect("parse v6");
        // 部分 CI 容器禁用 IPv6，此时创建失败也是合法结果。
        if let Ok(handle) = SocketHandle::create_tcp_for(&v6) {
            assert_eq!(handle.family(), Domain::IPV6);
        }
    }

    #[test]
    fn adopted_stream_keeps_addresses() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let addr = listener.local_addr().expect("listener addr");
        let stream = TcpStream::connect(addr).expect("connect");
        let handle = SocketHandle::try_from(stream).expect("adopt stream");
        assert_eq!(handle.family(), Domain::IPV4);
        assert_eq!(handle.peer_addr().expect("peer addr"), addr);
    }
}
