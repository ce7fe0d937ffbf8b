//! 阻塞模式控制。
//!
//! 设置阻塞模式必须幂等：当前模式已与请求一致时跳过系统调用并直接返回成功。
//! 在部分平台上重复下发模式变更本身就可能失败，因此这里的短路是正确性要求。

use crate::error::{SocketError, SocketOption};
use crate::handle::SocketHandle;
use crate::platform::{Native, PlatformSocket};

/// 句柄的 I/O 阻塞模式。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockingMode {
    Blocking = 0,
    NonBlocking = 1,
}

impl SocketHandle {
    /// 查询当前阻塞模式。
    ///
    /// 平台无法查询时返回本句柄最近一次设置的模式；从未设置过则为 `None`。
    pub fn blocking_mode(&self) -> Result<Option<BlockingMode>, SocketError> {
        let queried =
            Native::blocking_mode(&self.socket).map_err(|source| SocketError::OptionRejected {
                option: SocketOption::BlockingMode,
                source,
            })?;
        Ok(queried.or(self.applied_mode.get()))
    }

    /// 设置阻塞或非阻塞模式；重复设置同一模式不会触发第二次系统调用。
    pub fn set_blocking_mode(&self, mode: BlockingMode) -> Result<(), SocketError> {
        if self.blocking_mode()? == Some(mode) {
            return Ok(());
        }
        Native::apply_blocking_mode(&self.socket, mode).map_err(|source| {
            SocketError::OptionRejected {
                option: SocketOption::BlockingMode,
                source,
            }
        })?;
        self.applied_mode.set(Some(mode));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_same_mode_twice_is_stable() {
        let handle = SocketHandle::create_tcp().expect("create tcp");
        handle
            .set_blocking_mode(BlockingMode::NonBlocking)
            .expect("first switch");
        handle
            .set_blocking_mode(BlockingMode::NonBlocking)
            .expect("second switch is a no-op");
        assert_eq!(
            handle.blocking_mode().expect("query mode"),
            Some(BlockingMode::NonBlocking)
        );

        handle
            .set_blocking_mode(BlockingMode::Blocking)
            .expect("back to blocking");
        assert_eq!(
            handle.blocking_mode().expect("query mode"),
            Some(BlockingMode::Blocking)
        );
    }

    #[cfg(unix)]
    #[test]
    fn fresh_unix_socket_reports_blocking() {
        let handle = SocketHandle::create_tcp().expect("create tcp");
        assert_eq!(
            handle.blocking_mode().expect("query mode"),
            Some(BlockingMode::Blocking)
        );
    }
}
