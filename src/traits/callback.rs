use crate::errors::DispatchError;
use crate::models::HttpRequest;

/// 任务生命周期回调
///
/// 五个钩子全部提供空实现，调用方只需覆写关心的阶段。
/// 调用顺序对单个任务固定为：`on_scheduled` ->（若任务真正运行）
/// `on_started` -> 恰好一个终态钩子（`on_completed` / `on_failed` /
/// `on_cancelled`）。终态钩子在驱动状态迁移的线程上同步调用：
/// 正常情况下是工作线程；若任务在入队前被取消，则是最先观察到
/// 取消的线程（通常为调用 `cancel` 的线程）。
pub trait LifecycleCallback<T>: Send + Sync {
    /// 任务已提交
    fn on_scheduled(&self, _request: &HttpRequest) {}

    /// 交换即将在工作线程上开始
    fn on_started(&self, _request: &HttpRequest) {}

    /// 交换成功并完成响应转换
    fn on_completed(&self, _request: &HttpRequest, _result: &T) {}

    /// 交换或响应转换失败
    fn on_failed(&self, _request: &HttpRequest, _error: &DispatchError) {}

    /// 任务被取消
    fn on_cancelled(&self, _request: &HttpRequest) {}
}
