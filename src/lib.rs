//! # http-dispatch
//!
//! HTTP客户端库的两个核心设施：
//!
//! 1. **异步执行层**：把阻塞式HTTP请求/响应交换调度到有界工作池，
//!    返回可取消、可等待的 [`AsyncTask`] 句柄，支持可选的生命周期
//!    回调与聚合指标；
//! 2. **连接建立层**：把逻辑目标（方案 + 主机 + 端口）变成一条活的、
//!    可选TLS升级的传输套接字，方案到套接字工厂的映射可插拔。
//!
//! 真正执行HTTP交换的引擎、报文解析、连接池与路由规划都是外部
//! 协作者，只通过 [`ExchangeEngine`] 等窄接口接入。

pub mod config;
pub mod connect;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod traits;

pub use config::DispatchConfig;
pub use connect::{
    ConnectionOperator, ManagedConnection, PlainSocketFactory, SchemeBinding, SchemeRegistry,
    SchemeRegistryBuilder, SecureSocketFactory, SocketFactory, SocketParams, TlsSocketFactory,
    Transport,
};
pub use errors::{DispatchError, Result};
pub use metrics::{ExchangeMetrics, MetricsSnapshot};
pub use models::{ExchangeContext, HttpRequest, HttpResponse, TargetHost, TaskState};
pub use scheduler::{AsyncTask, RequestUnit, Scheduler, SchedulerBuilder, TaskSnapshot};
pub use traits::{ExchangeEngine, LifecycleCallback, ResponseConverter};
