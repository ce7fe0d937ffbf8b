//! 字节收发原语。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 流式 `send`/`recv` 直接暴露操作系统语义：允许部分传输，由调用方循环补齐；
//! - 无连接接收把“稍后重试”“致命”“未知”三种失败做成普通返回值，
//!   调用方按分支处理而无需解析错误码。
//!
//! ## 契约（What）
//! - 缓冲区长度超出平台原语可表达的上限时，请求在本地被拒绝为
//!   [`SocketError::TransferTooLarge`]，既不截断也不下发；
//! - `recv` 返回 `Ok(0)` 表示对端已关闭发送方向；
//! - [`raw_count`] 把结果压平为“非负字节数或 [`SOCKET_ERROR`]”的有符号约定。
//!
//! ## 注意事项（Trade-offs）
//! - 不做任何内部重试：被信号打断的调用同样原样返回给调用方。

use std::fmt;
use std::io::{self, Read};
use std::mem::MaybeUninit;

use socket2::SockAddr;

use crate::error::SocketError;
use crate::handle::SocketHandle;
use crate::platform::{Native, PlatformSocket, ReceiveErrorClass};

/// 有符号计数约定中的统一失败值。
pub const SOCKET_ERROR: isize = -1;

/// 操作系统原始错误码。
pub type OsErrorCode = i32;

/// 触发错误的收发方向，用于错误文案与稳定错误码。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferOp {
    Send,
    Recv,
    RecvFrom,
    PeekFrom,
}

impl TransferOp {
    pub fn code(&self) -> &'static str {
        match self {
            TransferOp::Send => "spark.socket.send_failed",
            TransferOp::Recv => "spark.socket.recv_failed",
            TransferOp::RecvFrom => "spark.socket.recv_from_failed",
            TransferOp::PeekFrom => "spark.socket.peek_from_failed",
        }
    }
}

impl fmt::Display for TransferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferOp::Send => "send",
            TransferOp::Recv => "recv",
            TransferOp::RecvFrom => "recv_from",
            TransferOp::PeekFrom => "peek_from",
        };
        f.write_str(name)
    }
}

/// 无连接接收的分类结果。
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// 收到 `len` 字节。
    Data { len: usize, from: SockAddr },
    /// 零长度成功：流式对端有序关闭，或收到空数据报。
    OrderlyClosed { from: SockAddr },
    /// 暂无数据或被信号打断，稍后重试即可。
    TryAgain(OsErrorCode),
    /// 句柄已不可用，不应再重试。
    Fatal(OsErrorCode),
    /// 未归类的失败，原样携带错误码。
    Unknown(OsErrorCode),
}

impl ReceiveOutcome {
    /// 成功时读到的字节数；有序关闭视为 0。
    pub fn len(&self) -> Option<usize> {
        match self {
            ReceiveOutcome::Data { len, .. } => Some(*len),
            ReceiveOutcome::OrderlyClosed { .. } => Some(0),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    pub fn is_try_again(&self) -> bool {
        matches!(self, ReceiveOutcome::TryAgain(_))
    }

    /// 发送方地址（仅成功分支）。
    pub fn peer(&self) -> Option<&SockAddr> {
        match self {
            ReceiveOutcome::Data { from, .. } | ReceiveOutcome::OrderlyClosed { from } => {
                Some(from)
            }
            _ => None,
        }
    }

    fn classify(error: &io::Error) -> Self {
        let code = error.raw_os_error().unwrap_or(SOCKET_ERROR as OsErrorCode);
        match Native::classify_receive_error(code) {
            ReceiveErrorClass::Recoverable => ReceiveOutcome::TryAgain(code),
            ReceiveErrorClass::Fatal => ReceiveOutcome::Fatal(code),
            ReceiveErrorClass::Unknown => ReceiveOutcome::Unknown(code),
        }
    }
}

/// 将收发结果压平为有符号计数：成功为字节数，任何失败为 [`SOCKET_ERROR`]。
pub fn raw_count(result: &Result<usize, SocketError>) -> isize {
    match result {
        Ok(len) => isize::try_from(*len).unwrap_or(SOCKET_ERROR),
        Err(_) => SOCKET_ERROR,
    }
}

fn ensure_len(op: TransferOp, len: usize, max: usize) -> Result<(), SocketError> {
    if len > max {
        return Err(SocketError::TransferTooLarge { op, len, max });
    }
    Ok(())
}

fn as_uninit(buf: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    // SAFETY: `MaybeUninit<u8>` 与 `u8` 布局一致；接收原语只写入、不会写入未初始化值。
    unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) }
}

impl SocketHandle {
    /// 发送 `buf`，返回实际写入的字节数，可能小于 `buf.len()`。
    pub fn send(&self, buf: &[u8]) -> Result<usize, SocketError> {
        ensure_len(TransferOp::Send, buf.len(), Native::MAX_TRANSFER_LEN)?;
        self.socket.send(buf).map_err(|source| SocketError::Transfer {
            op: TransferOp::Send,
            source,
        })
    }

    /// 接收至多 `buf.len()` 字节；`Ok(0)` 表示对端已关闭发送方向。
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, SocketError> {
        ensure_len(TransferOp::Recv, buf.len(), Native::MAX_TRANSFER_LEN)?;
        (&self.socket)
            .read(buf)
            .map_err(|source| SocketError::Transfer {
                op: TransferOp::Recv,
                source,
            })
    }

    /// 无连接接收，并返回发送方地址。
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<ReceiveOutcome, SocketError> {
        ensure_len(TransferOp::RecvFrom, buf.len(), Native::MAX_TRANSFER_LEN)?;
        Ok(outcome_of(self.socket.recv_from(as_uninit(buf))))
    }

    /// 与 [`SocketHandle::recv_from`] 相同，但数据仍留在接收队列中。
    pub fn peek_from(&self, buf: &mut [u8]) -> Result<ReceiveOutcome, SocketError> {
        ensure_len(TransferOp::PeekFrom, buf.len(), Native::MAX_TRANSFER_LEN)?;
        Ok(outcome_of(self.socket.peek_from(as_uninit(buf))))
    }
}

fn outcome_of(result: io::Result<(usize, SockAddr)>) -> ReceiveOutcome {
    match result {
        Ok((0, from)) => ReceiveOutcome::OrderlyClosed { from },
        Ok((len, from)) => ReceiveOutcome::Data { len, from },
        Err(error) => ReceiveOutcome::classify(&error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::BlockingMode;
    use std::net::UdpSocket;

    fn udp_pair() -> (SocketHandle, UdpSocket) {
        let receiver = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        sender
            .connect(receiver.local_addr().expect("receiver addr"))
            .expect("connect sender");
        let handle = SocketHandle::try_from(receiver).expect("adopt receiver");
        (handle, sender)
    }

    #[test]
    fn oversized_buffer_is_rejected_before_the_syscall() {
        let err = ensure_len(TransferOp::Send, 11, 10).expect_err("over the limit");
        assert!(matches!(
            err,
            SocketError::TransferTooLarge {
                op: TransferOp::Send,
                len: 11,
                max: 10
            }
        ));
        assert!(ensure_len(TransferOp::Recv, 10, 10).is_ok());
    }

    #[test]
    fn raw_count_flattens_errors() {
        assert_eq!(raw_count(&Ok(42)), 42);
        let failed = Err(SocketError::Transfer {
            op: TransferOp::Send,
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        });
        assert_eq!(raw_count(&failed), SOCKET_ERROR);
    }

    #[test]
    fn op_codes_are_distinct() {
        let ops = [
            TransferOp::Send,
            TransferOp::Recv,
            TransferOp::RecvFrom,
            TransferOp::PeekFrom,
        ];
        for (i, a) in ops.iter().enumerate() {
            for b in &ops[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
        assert_eq!(TransferOp::RecvFrom.to_string(), "recv_from");
    }

    #[test]
    fn empty_non_blocking_receive_asks_to_try_again() {
        let (handle, _sender) = udp_pair();
        handle
            .set_blocking_mode(BlockingMode::NonBlocking)
            .expect("non-blocking");
        let mut buf = [0u8; 16];
        let outcome = handle.recv_from(&mut buf).expect("within limit");
        assert!(outcome.is_try_again(), "unexpected outcome: {outcome:?}");
    }

    #[test]
    fn peek_leaves_datagram_queued() {
        let (handle, sender) = udp_pair();
        sender.send(b"spark").expect("send datagram");

        let mut buf = [0u8; 16];
        let peeked = handle.peek_from(&mut buf).expect("within limit");
        assert_eq!(peeked.len(), Some(5));
        assert_eq!(&buf[..5], b"spark");

        let mut again = [0u8; 16];
        let received = handle.recv_from(&mut again).expect("within limit");
        assert_eq!(received.len(), Some(5));
        assert_eq!(&again[..5], b"spark");
        let from = received.peer().and_then(SockAddr::as_socket);
        assert_eq!(from, Some(sender.local_addr().expect("sender addr")));
    }

    #[test]
    fn empty_datagram_reads_as_orderly_close() {
        let (handle, sender) = udp_pair();
        sender.send(&[]).expect("send empty datagram");
        let mut buf = [0u8; 4];
        let outcome = handle.recv_from(&mut buf).expect("within limit");
        assert!(matches!(outcome, ReceiveOutcome::OrderlyClosed { .. }));
        assert!(outcome.is_empty());
    }
}
