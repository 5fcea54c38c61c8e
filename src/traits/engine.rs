use async_trait::async_trait;

use crate::models::{ExchangeContext, HttpRequest, HttpResponse};
use crate::Result;

/// 阻塞式单请求交换引擎的抽象接口
///
/// 引擎负责在一条受管连接上完成一次完整的HTTP请求/响应交换，
/// 内部可以使用 [`crate::connect::ConnectionOperator`] 建立传输层连接。
/// 调度器只通过本接口调用它，不关心其实现细节。
#[async_trait]
pub trait ExchangeEngine: Send + Sync {
    /// 执行一次请求/响应交换
    ///
    /// 网络与超时类失败通过 `Err` 返回，由任务边界捕获并转为任务失败终态。
    async fn perform(
        &self,
        request: &HttpRequest,
        context: Option<&ExchangeContext>,
    ) -> Result<HttpResponse>;
}
