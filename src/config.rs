use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connect::SocketParams;
use crate::errors::{DispatchError, Result};

/// 调度与连接层的部署参数
///
/// 工作池大小由部署方决定，本库不做自动伸缩；调用方应使池大小
/// 与下游连接容量匹配（约定而非强制）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 工作池并发上限
    pub pool_size: usize,

    /// 建连超时（毫秒），缺省表示不限制
    pub connect_timeout_ms: Option<u64>,

    /// 是否开启 TCP_NODELAY
    pub tcp_nodelay: bool,

    /// 读超时（毫秒），记录在连接上由交换引擎逐次施加
    pub read_timeout_ms: Option<u64>,

    /// SO_LINGER 超时（毫秒）。缺省表示跳过设置，保持内核默认；
    /// `0` 表示开启linger且超时为零，与缺省含义不同。
    pub linger_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            connect_timeout_ms: None,
            tcp_nodelay: true,
            read_timeout_ms: None,
            linger_ms: None,
        }
    }
}

impl DispatchConfig {
    /// 从TOML文本加载配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DispatchConfig = toml::from_str(content)
            .map_err(|e| DispatchError::Configuration(format!("TOML解析失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(DispatchError::Configuration(
                "pool_size 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// 转换为连接层的套接字参数
    pub fn socket_params(&self) -> SocketParams {
        SocketParams {
            tcp_nodelay: self.tcp_nodelay,
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            linger: self.linger_ms.map(Duration::from_millis),
        }
    }
}
