use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::errors::Result;
use crate::models::TargetHost;

/// 传输层套接字：明文TCP流或在其上分层的TLS会话
#[derive(Debug)]
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// 底层TCP流的引用，用于套接字参数设置
    pub fn tcp_stream(&self) -> &TcpStream {
        match self {
            Transport::Plain(stream) => stream,
            Transport::Tls(stream) => stream.get_ref().0,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.shutdown().await,
            Transport::Tls(stream) => stream.shutdown().await,
        }
    }
}

#[derive(Debug)]
enum ConnState {
    Closed,
    Open {
        transport: Transport,
        target: TargetHost,
        secure: bool,
        read_timeout: Option<Duration>,
    },
}

/// 受管连接：单条传输套接字的有状态包装
///
/// 两个状态：`Closed` 与 `Open`（带 `secure` 子标志）。任一时刻
/// 最多持有一个底层套接字；打开时附着套接字，安全升级时用分层
/// 后的套接字原地替换，连接身份保持不变。
///
/// 状态不变式：
/// - 只有 `Closed` 的连接才能被打开；
/// - 只有 `Open` 且明文的连接才能升级为安全连接。
#[derive(Debug, Default)]
pub struct ManagedConnection {
    state: ConnState,
}

impl Default for ConnState {
    fn default() -> Self {
        ConnState::Closed
    }
}

impl ManagedConnection {
    pub fn new() -> Self {
        Self {
            state: ConnState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnState::Open { .. })
    }

    pub fn is_secure(&self) -> bool {
        matches!(
            self.state,
            ConnState::Open { secure: true, .. }
        )
    }

    /// 当前连接的目标，关闭状态下为 `None`
    pub fn target(&self) -> Option<&TargetHost> {
        match &self.state {
            ConnState::Open { target, .. } => Some(target),
            ConnState::Closed => None,
        }
    }

    /// 打开时记录的读超时，由交换引擎在每次读操作上施加
    pub fn read_timeout(&self) -> Option<Duration> {
        match &self.state {
            ConnState::Open { read_timeout, .. } => *read_timeout,
            ConnState::Closed => None,
        }
    }

    pub fn transport(&self) -> Option<&Transport> {
        match &self.state {
            ConnState::Open { transport, .. } => Some(transport),
            ConnState::Closed => None,
        }
    }

    pub fn transport_mut(&mut self) -> Option<&mut Transport> {
        match &mut self.state {
            ConnState::Open { transport, .. } => Some(transport),
            ConnState::Closed => None,
        }
    }

    /// 关闭连接并释放底层套接字
    pub async fn close(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, ConnState::Closed);
        if let ConnState::Open {
            mut transport,
            target,
            ..
        } = state
        {
            debug!("关闭连接: target={}", target);
            transport.shutdown().await?;
        }
        Ok(())
    }

    pub(crate) fn attach(
        &mut self,
        transport: Transport,
        target: TargetHost,
        secure: bool,
        read_timeout: Option<Duration>,
    ) {
        self.state = ConnState::Open {
            transport,
            target,
            secure,
            read_timeout,
        };
    }

    /// 取出底层套接字用于安全升级，连接临时进入 `Closed`；
    /// 升级成功后由操作器重新附着。
    pub(crate) fn take_transport(&mut self) -> Option<Transport> {
        match std::mem::replace(&mut self.state, ConnState::Closed) {
            ConnState::Open { transport, .. } => Some(transport),
            ConnState::Closed => None,
        }
    }
}
