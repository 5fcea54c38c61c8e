use std::sync::Arc;

use thiserror::Error;

/// 调度与连接层统一错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("无效的参数: {0}")]
    InvalidArgument(String),

    #[error("未知的协议方案: {0}")]
    UnknownScheme(String),

    #[error("协议方案 '{0}' 不支持安全升级")]
    SchemeNotSecurable(String),

    #[error("连接失败: {0}")]
    Connect(#[from] std::io::Error),

    #[error("任务提交失败: {0}")]
    SchedulingFailed(String),

    #[error("任务已被取消")]
    Cancelled,

    #[error("等待超时")]
    Timeout,

    #[error("响应转换失败: {0}")]
    Conversion(String),

    #[error("请求执行失败: {0}")]
    Exchange(String),

    /// 等待方读取到的终态失败。原始错误保存在 `Arc` 中，
    /// 以便同一任务的多次查询返回相同结果。
    #[error("任务执行失败: {0}")]
    TaskFailed(Arc<DispatchError>),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, DispatchError>;
