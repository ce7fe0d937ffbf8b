//! Unix 能力集：`poll(2)` 等待就绪，`fcntl(2)` 读写 `O_NONBLOCK`，`errno` 分类接收错误。

use std::io;
use std::os::fd::{AsRawFd, IntoRawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::libc;
use socket2::Socket;

use super::{PlatformSocket, RawHandle, ReceiveErrorClass, timeout_millis};
use crate::error::SocketError;
use crate::mode::BlockingMode;
use crate::readiness::Interest;

/// 将 `Errno` 转换为 `std::io::Error`。
fn nix_err_to_io(errno: Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}

fn status_flags(socket: &Socket) -> io::Result<libc::c_int> {
    // SAFETY: `F_GETFL` 只读取借用期间保持有效的描述符。
    let flags = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_GETFL) };
    if flags == -1 {
        Err(nix_err_to_io(Errno::last()))
    } else {
        Ok(flags)
    }
}

pub(crate) struct UnixPlatform;

impl PlatformSocket for UnixPlatform {
    const MAX_TRANSFER_LEN: usize = isize::MAX as usize;
    const INVALID_HANDLE: RawHandle = -1;

    fn startup() -> Result<(), SocketError> {
        Ok(())
    }

    fn cleanup() -> io::Result<()> {
        Ok(())
    }

    fn poll(socket: &Socket, interest: Interest, timeout: Duration) -> io::Result<bool> {
        let mut events: libc::c_short = 0;
        if interest.is_readable() {
            events |= libc::POLLIN;
        }
        if interest.is_writable() {
            events |= libc::POLLOUT;
        }
        // `select` 的异常集合在 Unix 上对应带外数据；错误与挂断由内核无条件报告。
        if interest.is_error() {
            events |= libc::POLLPRI;
        }
        let mut fds = [libc::pollfd {
            fd: socket.as_raw_fd(),
            events,
            revents: 0,
        }];
        let millis = timeout_millis(timeout, i64::from(libc::c_int::MAX)) as libc::c_int;

        // SAFETY: `fds` 在调用期间有效且长度为 1。
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, millis) };
        if ready < 0 {
            return Err(nix_err_to_io(Errno::last()));
        }
        if ready == 0 {
            return Ok(false);
        }
        if fds[0].revents & libc::POLLNVAL != 0 {
            return Err(nix_err_to_io(Errno::EBADF));
        }
        Ok(true)
    }

    fn blocking_mode(socket: &Socket) -> io::Result<Option<BlockingMode>> {
        let flags = status_flags(socket)?;
        Ok(Some(if flags & libc::O_NONBLOCK != 0 {
            BlockingMode::NonBlocking
        } else {
            BlockingMode::Blocking
        }))
    }

    fn apply_blocking_mode(socket: &Socket, mode: BlockingMode) -> io::Result<()> {
        let flags = status_flags(socket)?;
        let updated = match mode {
            BlockingMode::Blocking => flags & !libc::O_NONBLOCK,
            BlockingMode::NonBlocking => flags | libc::O_NONBLOCK,
        };
        if updated == flags {
            return Ok(());
        }
        // SAFETY: 同上，仅修改借用期间有效的描述符的状态标志。
        let result = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_SETFL, updated) };
        if result == -1 {
            Err(nix_err_to_io(Errno::last()))
        } else {
            Ok(())
        }
    }

    fn connect_in_progress(error: &io::Error) -> bool {
        error.raw_os_error() == Some(libc::EINPROGRESS)
    }

    fn classify_receive_error(code: i32) -> ReceiveErrorClass {
        match code {
            c if c == libc::EAGAIN || c == libc::EWOULDBLOCK || c == libc::EINTR => {
                ReceiveErrorClass::Recoverable
            }
            c if c == libc::EBADF
                || c == libc::ENOTSOCK
                || c == libc::ENOTCONN
                || c == libc::ESHUTDOWN =>
            {
                ReceiveErrorClass::Fatal
            }
            _ => ReceiveErrorClass::Unknown,
        }
    }

    fn close(socket: Socket) -> io::Result<()> {
        let fd = socket.into_raw_fd();
        // SAFETY: `into_raw_fd` 转移了所有权，描述符此后只在这里关闭一次。
        if unsafe { libc::close(fd) } == -1 {
            Err(nix_err_to_io(Errno::last()))
        } else {
            Ok(())
        }
    }
}
