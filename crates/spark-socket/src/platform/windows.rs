//! Windows 能力集：`select` 等待就绪，`ioctlsocket(FIONBIO)` 设置阻塞模式，Winsock 2.2 生命周期。
//!
//! Winsock 无法查询 `FIONBIO` 的当前值，`blocking_mode` 因此返回 `None`，
//! 幂等性由句柄记录的最近一次设置值保证。

use std::io;
use std::os::windows::io::{AsRawSocket, IntoRawSocket};
use std::time::Duration;

use socket2::Socket;
use windows_sys::Win32::Networking::WinSock::{
    self, FD_SET, INVALID_SOCKET, SOCKET, SOCKET_ERROR, TIMEVAL, WSADATA, WSAEINTR,
    WSAEINPROGRESS, WSAENETDOWN, WSAENOTCONN, WSAENOTSOCK, WSAESHUTDOWN, WSAEWOULDBLOCK,
    WSANOTINITIALISED,
};

use super::{PlatformSocket, RawHandle, ReceiveErrorClass, timeout_millis};
use crate::error::SocketError;
use crate::mode::BlockingMode;
use crate::readiness::Interest;
use crate::time::timeval_from_ms;

const REQUIRED_MAJOR: u8 = 2;
const REQUIRED_MINOR: u8 = 2;

fn last_wsa_error() -> io::Error {
    // SAFETY: 只读取当前线程的 Winsock 错误码。
    io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() })
}

fn single_set(socket: SOCKET) -> FD_SET {
    let mut set = FD_SET {
        fd_count: 1,
        fd_array: [0; 64],
    };
    set.fd_array[0] = socket;
    set
}

pub(crate) struct WindowsPlatform;

impl PlatformSocket for WindowsPlatform {
    const MAX_TRANSFER_LEN: usize = i32::MAX as usize;
    const INVALID_HANDLE: RawHandle = INVALID_SOCKET as RawHandle;

    fn startup() -> Result<(), SocketError> {
        let required = u16::from_le_bytes([REQUIRED_MAJOR, REQUIRED_MINOR]);
        // SAFETY: WSADATA 是纯数据结构，全零是合法初值。
        let mut data: WSADATA = unsafe { std::mem::zeroed() };
        // SAFETY: `data` 在调用期间有效。
        let result = unsafe { WinSock::WSAStartup(required, &mut data) };
        if result != 0 {
            return Err(SocketError::Startup {
                source: io::Error::from_raw_os_error(result),
            });
        }
        let [major, minor] = data.wVersion.to_le_bytes();
        if major != REQUIRED_MAJOR || minor != REQUIRED_MINOR {
            // SAFETY: 与上面成功的 WSAStartup 配对。
            unsafe { WinSock::WSACleanup() };
            return Err(SocketError::UnsupportedVersion { major, minor });
        }
        Ok(())
    }

    fn cleanup() -> io::Result<()> {
        // SAFETY: 调用方保证与一次成功的 startup 配对。
        if unsafe { WinSock::WSACleanup() } == SOCKET_ERROR {
            Err(last_wsa_error())
        } else {
            Ok(())
        }
    }

    fn poll(socket: &Socket, interest: Interest, timeout: Duration) -> io::Result<bool> {
        let raw = socket.as_raw_socket() as SOCKET;
        let mut read_set = single_set(raw);
        let mut write_set = single_set(raw);
        let mut error_set = single_set(raw);
        let pick = |wanted: bool, set: &mut FD_SET| -> *mut FD_SET {
            if wanted { set as *mut FD_SET } else { std::ptr::null_mut() }
        };
        let read_ptr = pick(interest.is_readable(), &mut read_set);
        let write_ptr = pick(interest.is_writable(), &mut write_set);
        let error_ptr = pick(interest.is_error(), &mut error_set);

        let millis = timeout_millis(timeout, i64::from(i32::MAX));
        let (seconds, micros) = timeval_from_ms(millis);
        let timeval = TIMEVAL {
            tv_sec: seconds as i32,
            tv_usec: micros as i32,
        };

        // SAFETY: 三个集合与 `timeval` 在调用期间有效；Winsock 忽略 `nfds`。
        let ready = unsafe { WinSock::select(0, read_ptr, write_ptr, error_ptr, &timeval) };
        match ready {
            SOCKET_ERROR => Err(last_wsa_error()),
            0 => Ok(false),
            _ => Ok(true),
        }
    }

    fn blocking_mode(_socket: &Socket) -> io::Result<Option<BlockingMode>> {
        Ok(None)
    }

    fn apply_blocking_mode(socket: &Socket, mode: BlockingMode) -> io::Result<()> {
        socket.set_nonblocking(mode == BlockingMode::NonBlocking)
    }

    fn connect_in_progress(error: &io::Error) -> bool {
        error.raw_os_error() == Some(WSAEWOULDBLOCK)
    }

    fn classify_receive_error(code: i32) -> ReceiveErrorClass {
        match code {
            WSAEWOULDBLOCK | WSAEINPROGRESS | WSAEINTR => ReceiveErrorClass::Recoverable,
            WSAENOTCONN | WSAENOTSOCK | WSAESHUTDOWN | WSANOTINITIALISED | WSAENETDOWN => {
                ReceiveErrorClass::Fatal
            }
            _ => ReceiveErrorClass::Unknown,
        }
    }

    fn close(socket: Socket) -> io::Result<()> {
        let raw = socket.into_raw_socket() as SOCKET;
        // SAFETY: `into_raw_socket` 转移了所有权，句柄此后只在这里关闭一次。
        if unsafe { WinSock::closesocket(raw) } == SOCKET_ERROR {
            Err(last_wsa_error())
        } else {
            Ok(())
        }
    }
}
