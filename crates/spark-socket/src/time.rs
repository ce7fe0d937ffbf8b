//! 时间来源与时间预算。
//!
//! # 模块定位（Why）
//! - 建连超时需要把“请求的毫秒数”换算成绝对截止时间，并在多个候选地址之间扣减剩余预算；
//! - 以 [`TimeSource`] 抽象毫秒/微秒读数，测试与调用方可以替换时间来源。
//!
//! # 结构概览（What）
//! - [`MonotonicClock`]：以进程内首次读数为基准的单调时钟，截止时间计算只使用它；
//! - [`WallClock`]：自 Unix 纪元起的墙钟读数，供需要绝对时间戳的调用方使用；
//! - [`Deadline`]：一次调用的时间预算，入口处推导、不做全局缓存，因此并发调用互不干扰。
//!
//! # 注意事项（Trade-offs）
//! - `now_us`/`now_ms` 以 `i64` 表示，溢出需要约 29 万年，不做处理；
//! - 墙钟可能回拨，[`WallClock::elapsed_since`] 因而可能返回负值，截止时间计算不要使用它。

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const MILLISECONDS_IN_SECOND: i64 = 1_000;
pub const MICROSECONDS_IN_MILLISECOND: i64 = 1_000;
pub const MICROSECONDS_IN_SECOND: i64 = 1_000_000;

/// 可注入的时间来源。
pub trait TimeSource: Send + Sync {
    /// 当前时间，单位微秒。
    fn now_us(&self) -> i64;

    /// 当前时间，单位毫秒。
    fn now_ms(&self) -> i64 {
        self.now_us() / MICROSECONDS_IN_MILLISECOND
    }

    /// 自 `earlier_ms` 起经过的毫秒数。
    fn elapsed_since(&self, earlier_ms: i64) -> i64 {
        self.now_ms() - earlier_ms
    }
}

/// 以进程内首次读数为零点的单调时钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    fn base() -> Instant {
        static BASE: OnceLock<Instant> = OnceLock::new();
        *BASE.get_or_init(Instant::now)
    }
}

impl TimeSource for MonotonicClock {
    fn now_us(&self) -> i64 {
        let offset = Instant::now().duration_since(Self::base());
        i64::try_from(offset.as_micros()).unwrap_or(i64::MAX)
    }
}

/// 自 Unix 纪元起的墙钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now_us(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since) => i64::try_from(since.as_micros()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_micros()).unwrap_or(i64::MAX),
        }
    }
}

/// 单调时钟当前读数（微秒）。
pub fn now_us() -> i64 {
    MonotonicClock.now_us()
}

/// 单调时钟当前读数（毫秒）。
pub fn now_ms() -> i64 {
    MonotonicClock.now_ms()
}

/// 自单调读数 `earlier_ms` 起经过的毫秒数。
pub fn elapsed_since(earlier_ms: i64) -> i64 {
    MonotonicClock.elapsed_since(earlier_ms)
}

/// 将毫秒值拆为 `(秒, 微秒)`，对应 `struct timeval` 的两个字段。
pub fn timeval_from_ms(value_ms: i64) -> (i64, i64) {
    (
        value_ms / MILLISECONDS_IN_SECOND,
        (value_ms % MILLISECONDS_IN_SECOND) * MICROSECONDS_IN_MILLISECOND,
    )
}

/// 将微秒值拆为 `(秒, 微秒)`。
pub fn timeval_from_us(value_us: i64) -> (i64, i64) {
    (
        value_us / MICROSECONDS_IN_SECOND,
        value_us % MICROSECONDS_IN_SECOND,
    )
}

/// 一次调用的时间预算。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 多候选建连需要把同一份超时在各候选之间扣减，而不是给每个候选完整的超时；
///
/// ## 契约（What）
/// - [`Deadline::after`]：以当前单调时间加上 `budget` 构造；
/// - [`Deadline::remaining`]：剩余时长，过期后饱和为零；
/// - [`Deadline::is_expired`]：剩余时长是否为零。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// 以当前时间加上 `budget` 构造截止时间；溢出时退化为尽可能远的时间点。
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(budget)
            .unwrap_or_else(|| now + Duration::from_secs(u32::MAX.into()));
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
