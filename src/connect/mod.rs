//! 连接建立层
//!
//! 把逻辑目标（方案 + 主机 + 端口）变成一条活的传输层连接，
//! 并支持在原有明文连接上就地完成TLS升级。方案到套接字工厂的
//! 映射由 [`SchemeRegistry`] 提供，构建完成后只读，可被多个
//! 工作线程并发查询。

pub mod connection;
pub mod operator;
pub mod scheme;


pub use connection::{ManagedConnection, Transport};
pub use operator::{ConnectionOperator, SocketParams};
pub use scheme::{
    PlainSocketFactory, SchemeBinding, SchemeRegistry, SchemeRegistryBuilder, SecureSocketFactory,
    SocketFactory, TlsSocketFactory,
};
