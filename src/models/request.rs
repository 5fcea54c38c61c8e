use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 逻辑目标主机：协议方案 + 主机名 + 端口
///
/// 构造后不可变，用于在方案注册表中解析套接字工厂。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHost {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl TargetHost {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// 返回 `host:port` 形式的地址串
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for TargetHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// 一次HTTP交换的请求描述
///
/// 对本库而言是不透明的：调度与连接层不解析其语义，
/// 只负责把它交给交换引擎并在回调中原样传回。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub target: TargetHost,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, target: TargetHost, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target,
            path: path.into(),
            headers: Vec::new(),
        }
    }

    /// GET 请求的便捷构造
    pub fn get(target: TargetHost, path: impl Into<String>) -> Self {
        Self::new("GET", target, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// 交换引擎返回的响应描述，由响应转换器消费
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 可选的执行上下文参数包
///
/// 键值对形式，随请求单元一起传给交换引擎与连接操作器。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeContext {
    values: HashMap<String, serde_json::Value>,
}

impl ExchangeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
