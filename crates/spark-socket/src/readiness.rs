//! 单句柄就绪等待。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 非阻塞建连完成与否只能通过“等待可写/出错”再查询挂起错误得知；
//! - 调用方也需要在不阻塞收发原语的前提下探测可读性。
//!
//! ## 契约（What）
//! - `timeout` 为零时只检查一次并立即返回；
//! - `interest` 为空时退化为单纯的计时等待，结束后返回 [`Readiness::Timeout`]；
//! - [`Readiness::Ready`] 只说明等待调用报告了至少一个事件，不区分是哪一个条件；
//! - 被观察的套接字处于错误状态时表现为 `Ready`，等待调用本身失败才是 [`Readiness::Error`]。
//!
//! ## 注意事项（Trade-offs）
//! - 等待期间不响应任何取消信号，超时是唯一的退出手段。

use std::fmt;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::thread;
use std::time::Duration;

use crate::handle::SocketHandle;
use crate::platform::{Native, PlatformSocket};

/// 等待条件集合。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interest(u8);

impl Interest {
    /// 不等待任何条件。
    pub const EMPTY: Interest = Interest(0);
    /// 可读。
    pub const READ: Interest = Interest(1 << 0);
    /// 可写。
    pub const WRITE: Interest = Interest(1 << 1);
    /// 出错或带外数据。
    pub const ERROR: Interest = Interest(1 << 2);

    /// 以原始位掩码构造，未定义的位被丢弃。
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Interest(bits & 0b111)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    pub const fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

impl BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.is_readable() {
            names.push("READ");
        }
        if self.is_writable() {
            names.push("WRITE");
        }
        if self.is_error() {
            names.push("ERROR");
        }
        if names.is_empty() {
            f.write_str("Interest(EMPTY)")
        } else {
            write!(f, "Interest({})", names.join(" | "))
        }
    }
}

/// 就绪等待的三态结果。
#[derive(Debug)]
pub enum Readiness {
    /// 至少一个请求的条件已满足。
    Ready,
    /// 截止前没有事件。
    Timeout,
    /// 等待调用本身失败。
    Error(io::Error),
}

impl Readiness {
    /// 数值形式：`Ready = 1`、`Timeout = 0`、`Error = -1`。
    pub fn code(&self) -> i32 {
        match self {
            Readiness::Ready => 1,
            Readiness::Timeout => 0,
            Readiness::Error(_) => -1,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

impl SocketHandle {
    /// 阻塞至多 `timeout`，直到句柄满足 `interest` 中任一条件。
    pub fn wait(&self, interest: Interest, timeout: Duration) -> Readiness {
        if interest.is_empty() {
            if !timeout.is_zero() {
                thread::sleep(timeout);
            }
            return Readiness::Timeout;
        }
        match Native::poll(&self.socket, interest, timeout) {
            Ok(true) => Readiness::Ready,
            Ok(false) => Readiness::Timeout,
            Err(err) => Readiness::Error(err),
        }
    }
}

/// [`SocketHandle::wait`] 的自由函数形式。
pub fn select(handle: &SocketHandle, interest: Interest, timeout: Duration) -> Readiness {
    handle.wait(interest, timeout)
}
