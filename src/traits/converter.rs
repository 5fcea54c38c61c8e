use crate::models::HttpResponse;
use crate::Result;

/// 响应到类型化结果的转换器
///
/// 每次成功的交换在工作线程上恰好调用一次；转换失败与交换失败
/// 同等对待，任务进入失败终态。
pub trait ResponseConverter<T>: Send + Sync {
    fn convert(&self, response: HttpResponse) -> Result<T>;
}

impl<T, F> ResponseConverter<T> for F
where
    F: Fn(HttpResponse) -> Result<T> + Send + Sync,
{
    fn convert(&self, response: HttpResponse) -> Result<T> {
        self(response)
    }
}
