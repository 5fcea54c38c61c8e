use std::sync::Arc;
use std::time::Duration;

use socket2::SockRef;
use tracing::{debug, info, warn};

use crate::connect::connection::{ManagedConnection, Transport};
use crate::connect::scheme::SchemeRegistry;
use crate::errors::{DispatchError, Result};
use crate::models::{ExchangeContext, TargetHost};

/// 套接字参数，打开与升级两条路径共用
///
/// 三项彼此独立，施加顺序无关紧要。`linger` 为 `None` 时完全跳过
/// SO_LINGER 设置；`Some(Duration::ZERO)` 表示开启linger且超时为零，
/// 与未设置含义不同。
#[derive(Debug, Clone, Copy)]
pub struct SocketParams {
    pub tcp_nodelay: bool,
    pub read_timeout: Option<Duration>,
    pub linger: Option<Duration>,
}

impl Default for SocketParams {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketParams {
    pub fn new() -> Self {
        Self {
            tcp_nodelay: true,
            read_timeout: None,
            linger: None,
        }
    }

    pub fn with_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }
}

/// 连接操作器
///
/// 负责把 [`TargetHost`] 解析为方案绑定、创建并连接套接字、施加
/// 套接字参数，以及在既有明文连接上就地完成安全升级。单次调用
/// 内部是单线程的；不同连接上的并发 `open`/`upgrade` 之间不共享
/// 可变状态。由交换引擎调用，调度器不直接接触本类型。
#[derive(Debug, Clone)]
pub struct ConnectionOperator {
    registry: Arc<SchemeRegistry>,
    local_addr: Option<std::net::SocketAddr>,
    connect_timeout: Option<Duration>,
}

impl ConnectionOperator {
    pub fn new(registry: Arc<SchemeRegistry>) -> Self {
        Self {
            registry,
            local_addr: None,
            connect_timeout: None,
        }
    }

    /// 绑定本地地址后再建连，默认不绑定
    pub fn with_local_addr(mut self, local: Option<std::net::SocketAddr>) -> Self {
        self.local_addr = local;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<SchemeRegistry> {
        &self.registry
    }

    /// 打开连接：解析方案、建连、施参，并把套接字附着到连接上
    ///
    /// 前置条件：连接处于关闭状态，目标非空。未注册方案在创建任何
    /// 套接字之前即失败，不产生副作用。
    pub async fn open(
        &self,
        conn: &mut ManagedConnection,
        target: &TargetHost,
        context: Option<&ExchangeContext>,
        params: &SocketParams,
    ) -> Result<()> {
        validate_target(target)?;
        if conn.is_open() {
            return Err(DispatchError::InvalidArgument(
                "连接必须处于关闭状态".to_string(),
            ));
        }

        let binding = self.registry.resolve(&target.scheme)?;
        let factory = binding.factory();

        let addrs = factory.resolve(&target.host, target.port).await?;
        let mut last_error: Option<DispatchError> = None;
        let mut connected: Option<Transport> = None;
        for addr in addrs {
            let socket = factory.create_socket(&addr)?;
            match factory
                .connect_socket(socket, addr, &target.host, self.local_addr, self.connect_timeout)
                .await
            {
                Ok(transport) => {
                    connected = Some(transport);
                    break;
                }
                Err(e) => {
                    debug!("地址 {addr} 建连失败, 尝试下一个: {e}");
                    last_error = Some(e);
                }
            }
        }
        let transport = match connected {
            Some(transport) => transport,
            None => {
                let error = last_error.unwrap_or_else(|| {
                    DispatchError::Internal("地址列表为空".to_string())
                });
                warn!("建连失败: target={}, error={}", target, error);
                return Err(error);
            }
        };

        prepare_socket(&transport, context, params)?;
        let secure = factory.is_secure(&transport);
        conn.attach(transport, target.clone(), secure, params.read_timeout);
        info!("连接已打开: target={}, secure={}", target, secure);
        Ok(())
    }

    /// 在既有明文连接上就地升级为安全连接
    ///
    /// 在同一条TCP流上分层安全握手，不发起新的网络连接；升级后
    /// 连接身份不变（同一对象、同一目标）。握手会消耗原套接字，
    /// 失败时连接转入关闭状态，调用方需重新打开。
    pub async fn upgrade(
        &self,
        conn: &mut ManagedConnection,
        target: &TargetHost,
        context: Option<&ExchangeContext>,
        params: &SocketParams,
    ) -> Result<()> {
        validate_target(target)?;
        if !conn.is_open() {
            return Err(DispatchError::InvalidArgument(
                "连接必须处于打开状态".to_string(),
            ));
        }
        if conn.is_secure() {
            return Err(DispatchError::InvalidArgument(
                "连接已处于安全状态".to_string(),
            ));
        }

        let binding = self.registry.resolve(&target.scheme)?;
        let secure_factory = binding
            .secure_factory()
            .ok_or_else(|| DispatchError::SchemeNotSecurable(target.scheme.clone()))?
            .clone();

        // 此前的所有检查都不触碰套接字，失败时连接保持原状
        let transport = conn
            .take_transport()
            .ok_or_else(|| DispatchError::Internal("打开的连接缺少传输套接字".to_string()))?;
        let stream = match transport {
            Transport::Plain(stream) => stream,
            Transport::Tls(_) => {
                return Err(DispatchError::Internal(
                    "明文连接持有TLS传输套接字".to_string(),
                ));
            }
        };

        let layered = secure_factory
            .layer_secure(stream, &target.host, target.port)
            .await
            .map_err(|e| {
                warn!("安全升级失败, 连接已关闭: target={}, error={}", target, e);
                e
            })?;

        prepare_socket(&layered, context, params)?;
        let secure = secure_factory.is_secure(&layered);
        conn.attach(layered, target.clone(), secure, params.read_timeout);
        info!("连接已升级: target={}, secure={}", target, secure);
        Ok(())
    }
}

fn validate_target(target: &TargetHost) -> Result<()> {
    if target.scheme.is_empty() {
        return Err(DispatchError::InvalidArgument(
            "目标方案不能为空".to_string(),
        ));
    }
    if target.host.is_empty() {
        return Err(DispatchError::InvalidArgument(
            "目标主机不能为空".to_string(),
        ));
    }
    if target.port == 0 {
        return Err(DispatchError::InvalidArgument(
            "目标端口不能为 0".to_string(),
        ));
    }
    Ok(())
}

/// 对新建或分层后的套接字施加标准参数
///
/// 读超时不在这里落到内核（非阻塞套接字上 SO_RCVTIMEO 无效），
/// 而是记录在连接上由交换引擎逐次施加。
fn prepare_socket(
    transport: &Transport,
    _context: Option<&ExchangeContext>,
    params: &SocketParams,
) -> Result<()> {
    let tcp = transport.tcp_stream();
    tcp.set_nodelay(params.tcp_nodelay)?;
    if let Some(linger) = params.linger {
        SockRef::from(tcp).set_linger(Some(linger))?;
    }
    Ok(())
}
