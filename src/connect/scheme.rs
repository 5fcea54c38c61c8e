use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::connect::connection::Transport;
use crate::errors::{DispatchError, Result};

/// 按方案创建并连接传输层套接字的策略接口
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// 解析主机名为套接字地址，默认走系统解析器
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
        if addrs.is_empty() {
            return Err(DispatchError::Connect(io::Error::new(
                io::ErrorKind::NotFound,
                format!("主机 '{host}' 未解析到任何地址"),
            )));
        }
        Ok(addrs)
    }

    /// 创建一个与目标地址族匹配的未连接套接字
    fn create_socket(&self, addr: &SocketAddr) -> Result<TcpSocket> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        Ok(socket)
    }

    /// 执行网络连接，返回已建立的传输套接字
    ///
    /// `local` 给定时先绑定本地地址；`connect_timeout` 给定时限制
    /// 建连（含安全握手）耗时。`host` 供安全工厂做SNI使用。
    async fn connect_socket(
        &self,
        socket: TcpSocket,
        addr: SocketAddr,
        host: &str,
        local: Option<SocketAddr>,
        connect_timeout: Option<Duration>,
    ) -> Result<Transport>;

    /// 判定产出的套接字是否已处于安全层之上
    fn is_secure(&self, transport: &Transport) -> bool;
}

/// 在既有明文流之上分层安全会话的能力
#[async_trait]
pub trait SecureSocketFactory: SocketFactory {
    /// 在同一条TCP流上完成安全握手，不发起新的网络连接
    async fn layer_secure(&self, stream: TcpStream, host: &str, port: u16) -> Result<Transport>;
}

async fn connect_with_timeout(
    socket: TcpSocket,
    addr: SocketAddr,
    connect_timeout: Option<Duration>,
) -> Result<TcpStream> {
    let stream = match connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, socket.connect(addr))
            .await
            .map_err(|_| {
                DispatchError::Connect(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("连接 {addr} 超时"),
                ))
            })??,
        None => socket.connect(addr).await?,
    };
    Ok(stream)
}

/// 明文TCP套接字工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSocketFactory;

impl PlainSocketFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SocketFactory for PlainSocketFactory {
    async fn connect_socket(
        &self,
        socket: TcpSocket,
        addr: SocketAddr,
        _host: &str,
        local: Option<SocketAddr>,
        connect_timeout: Option<Duration>,
    ) -> Result<Transport> {
        if let Some(local_addr) = local {
            socket.bind(local_addr)?;
        }
        let stream = connect_with_timeout(socket, addr, connect_timeout).await?;
        Ok(Transport::Plain(stream))
    }

    fn is_secure(&self, _transport: &Transport) -> bool {
        false
    }
}

/// TLS套接字工厂
///
/// 既能直接建立安全连接（建连后立即握手），也能在既有明文流上
/// 分层握手（CONNECT隧道升级场景）。
#[derive(Clone)]
pub struct TlsSocketFactory {
    config: Arc<ClientConfig>,
}

impl TlsSocketFactory {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

impl std::fmt::Debug for TlsSocketFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsSocketFactory").finish_non_exhaustive()
    }
}

#[async_trait]
impl SocketFactory for TlsSocketFactory {
    async fn connect_socket(
        &self,
        socket: TcpSocket,
        addr: SocketAddr,
        host: &str,
        local: Option<SocketAddr>,
        connect_timeout: Option<Duration>,
    ) -> Result<Transport> {
        if let Some(local_addr) = local {
            socket.bind(local_addr)?;
        }
        let stream = connect_with_timeout(socket, addr, connect_timeout).await?;
        self.layer_secure(stream, host, addr.port()).await
    }

    fn is_secure(&self, transport: &Transport) -> bool {
        transport.is_tls()
    }
}

#[async_trait]
impl SecureSocketFactory for TlsSocketFactory {
    async fn layer_secure(&self, stream: TcpStream, host: &str, port: u16) -> Result<Transport> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| DispatchError::InvalidArgument(format!("无效的主机名 '{host}': {e}")))?;
        let connector = TlsConnector::from(Arc::clone(&self.config));
        debug!("开始TLS握手: host={host}, port={port}");
        let tls_stream = connector.connect(server_name, stream).await.map_err(|e| {
            warn!("TLS握手失败: host={host}, error={e}");
            DispatchError::Connect(e)
        })?;
        Ok(Transport::Tls(Box::new(tls_stream)))
    }
}

/// 一个方案名到套接字工厂的绑定
///
/// 明文工厂负责常规建连；`secure` 存在时表示该方案支持在既有
/// 连接上做安全升级。
#[derive(Clone)]
pub struct SchemeBinding {
    scheme: String,
    factory: Arc<dyn SocketFactory>,
    secure: Option<Arc<dyn SecureSocketFactory>>,
}

impl SchemeBinding {
    /// 仅支持明文连接的绑定
    pub fn plain(scheme: impl Into<String>, factory: Arc<dyn SocketFactory>) -> Self {
        Self {
            scheme: scheme.into(),
            factory,
            secure: None,
        }
    }

    /// 以同一个安全工厂同时承担建连与升级的绑定
    pub fn secure<F>(scheme: impl Into<String>, factory: Arc<F>) -> Self
    where
        F: SecureSocketFactory + 'static,
    {
        Self {
            scheme: scheme.into(),
            factory: factory.clone(),
            secure: Some(factory),
        }
    }

    /// 建连与升级分别由不同工厂承担的绑定
    ///
    /// CONNECT隧道场景：明文工厂先打通隧道，安全工厂负责就地升级。
    pub fn layered(
        scheme: impl Into<String>,
        factory: Arc<dyn SocketFactory>,
        secure: Arc<dyn SecureSocketFactory>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            factory,
            secure: Some(secure),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn factory(&self) -> &Arc<dyn SocketFactory> {
        &self.factory
    }

    pub fn supports_secure_upgrade(&self) -> bool {
        self.secure.is_some()
    }

    pub(crate) fn secure_factory(&self) -> Option<&Arc<dyn SecureSocketFactory>> {
        self.secure.as_ref()
    }
}

impl std::fmt::Debug for SchemeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeBinding")
            .field("scheme", &self.scheme)
            .field("secure", &self.secure.is_some())
            .finish()
    }
}

/// 方案注册表：方案名到绑定的只读映射
///
/// 经构建器一次性构建，之后不再修改，可被多个工作线程无锁并发查询。
#[derive(Debug, Default)]
pub struct SchemeRegistry {
    bindings: HashMap<String, SchemeBinding>,
}

impl SchemeRegistry {
    pub fn builder() -> SchemeRegistryBuilder {
        SchemeRegistryBuilder::default()
    }

    /// 仅注册 `http` 明文方案的注册表
    pub fn plain_default() -> Self {
        Self::builder()
            .register(SchemeBinding::plain("http", Arc::new(PlainSocketFactory)))
            .build()
    }

    /// 注册 `http` 与 `https` 两个方案的注册表
    pub fn with_tls(config: Arc<ClientConfig>) -> Self {
        Self::builder()
            .register(SchemeBinding::plain("http", Arc::new(PlainSocketFactory)))
            .register(SchemeBinding::secure(
                "https",
                Arc::new(TlsSocketFactory::new(config)),
            ))
            .build()
    }

    pub fn lookup(&self, scheme: &str) -> Option<&SchemeBinding> {
        self.bindings.get(scheme)
    }

    /// 解析方案绑定，未注册的方案返回 [`DispatchError::UnknownScheme`]
    pub fn resolve(&self, scheme: &str) -> Result<&SchemeBinding> {
        self.lookup(scheme)
            .ok_or_else(|| DispatchError::UnknownScheme(scheme.to_string()))
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// 注册表构建器，同名方案后注册者覆盖先注册者
#[derive(Debug, Default)]
pub struct SchemeRegistryBuilder {
    bindings: HashMap<String, SchemeBinding>,
}

impl SchemeRegistryBuilder {
    pub fn register(mut self, binding: SchemeBinding) -> Self {
        self.bindings.insert(binding.scheme().to_string(), binding);
        self
    }

    pub fn build(self) -> SchemeRegistry {
        SchemeRegistry {
            bindings: self.bindings,
        }
    }
}
