//! 建连配置。
//!
//! # 教案级注释
//!
//! ## 意图（Why）
//! - 把“是否限时建连”“建连后是否开启 `TCP_NODELAY`”“限时建连成功后是否恢复阻塞模式”
//!   三个决策显式配置化，避免调用方在每个调用点重复拼装；
//! - 支持从 TOML 片段加载，便于与宿主程序的配置文件合并。
//!
//! ## 契约（What）
//! - `connect_timeout_ms` 缺省表示走阻塞建连；给出时必须大于零；
//! - `tcp_nodelay`、`restore_blocking` 缺省均为 `false`；
//! - 未知键被拒绝，防止拼写错误被静默忽略。
//!
//! ## 注意事项（Trade-offs）
//! - 反序列化经由内部表示完成，公共类型不直接暴露 `serde` 属性。

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// 配置加载或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid socket config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("connect timeout must be greater than zero")]
    ZeroTimeout,
}

/// 建连配置。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocketConfig {
    connect_timeout: Option<Duration>,
    tcp_nodelay: bool,
    restore_blocking: bool,
}

impl SocketConfig {
    /// 默认配置：阻塞建连，不开启 `TCP_NODELAY`。
    pub const fn new() -> Self {
        Self {
            connect_timeout: None,
            tcp_nodelay: false,
            restore_blocking: false,
        }
    }

    /// 从 TOML 片段加载并校验。
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let raw: RawSocketConfig = toml::from_str(source)?;
        let config = Self {
            connect_timeout: raw.connect_timeout_ms.map(Duration::from_millis),
            tcp_nodelay: raw.tcp_nodelay,
            restore_blocking: raw.restore_blocking,
        };
        config.validate()?;
        Ok(config)
    }

    /// 设置建连超时；`None` 表示阻塞建连。
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// 限时建连成功后把句柄切回阻塞模式。
    pub fn with_restore_blocking(mut self, enabled: bool) -> Self {
        self.restore_blocking = enabled;
        self
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }

    pub fn restore_blocking(&self) -> bool {
        self.restore_blocking
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSocketConfig {
    #[serde(default)]
    connect_timeout_ms: Option<u64>,
    #[serde(default)]
    tcp_nodelay: bool,
    #[serde(default)]
    restore_blocking: bool,
}
