//! 异步执行层
//!
//! 把阻塞式HTTP交换调度到有界工作池上执行，向调用方立即返回
//! 可取消、可等待的任务句柄，并维护本实例的聚合指标。
//!
//! 工作池是本层唯一可见的并发原语：并发度由信号量许可数决定，
//! 提交是线程安全的，可从多个调用方并发进行。

pub mod task;
pub mod unit;

#[cfg(test)]
mod scheduler_test;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::errors::{DispatchError, Result};
use crate::metrics::ExchangeMetrics;
use crate::models::{ExchangeContext, HttpRequest};
use crate::traits::{ExchangeEngine, ResponseConverter};

pub use task::{AsyncTask, TaskSnapshot};
pub use unit::RequestUnit;

use task::TaskShared;

/// 调度器构建器
pub struct SchedulerBuilder {
    engine: Arc<dyn ExchangeEngine>,
    pool_size: usize,
}

impl SchedulerBuilder {
    pub fn new(engine: Arc<dyn ExchangeEngine>) -> Self {
        Self {
            engine,
            pool_size: DispatchConfig::default().pool_size,
        }
    }

    /// 设置工作池并发上限
    ///
    /// 池大小是部署参数，调用方应使其与下游连接容量匹配；
    /// 本层不做自动伸缩。
    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn build(self) -> Scheduler {
        info!("创建调度器: pool_size={}", self.pool_size);
        Scheduler {
            engine: self.engine,
            semaphore: Arc::new(Semaphore::new(self.pool_size)),
            metrics: Arc::new(ExchangeMetrics::new()),
            pool_size: self.pool_size,
        }
    }
}

/// HTTP交换调度器
///
/// 接受请求单元（单个或批量），提交到有界工作池，返回
/// [`AsyncTask`] 句柄并维护聚合指标。
///
/// 提交约定：`schedule` 对格式良好的单元从不同步失败；工作池
/// 已关闭等提交层失败统一以 [`DispatchError::SchedulingFailed`]
/// 出现在返回句柄的失败终态上。
pub struct Scheduler {
    engine: Arc<dyn ExchangeEngine>,
    semaphore: Arc<Semaphore>,
    metrics: Arc<ExchangeMetrics>,
    pool_size: usize,
}

impl Scheduler {
    pub fn builder(engine: Arc<dyn ExchangeEngine>) -> SchedulerBuilder {
        SchedulerBuilder::new(engine)
    }

    /// 按配置创建调度器
    pub fn from_config(engine: Arc<dyn ExchangeEngine>, config: &DispatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::builder(engine).pool_size(config.pool_size).build())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// 本实例的聚合指标
    pub fn metrics(&self) -> Arc<ExchangeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// 提交一个请求单元，立即返回任务句柄
    ///
    /// 提交时先递增 scheduled 计数并在调用方线程上触发
    /// `on_scheduled`，随后将工作协程送入池中。
    pub fn schedule<T>(&self, unit: RequestUnit<T>) -> AsyncTask<T>
    where
        T: Send + 'static,
    {
        let (task, job) = self.register(unit);
        job.spawn();
        task
    }

    /// 单请求的便捷提交：无上下文、无回调
    pub fn execute<T>(
        &self,
        request: HttpRequest,
        converter: impl ResponseConverter<T> + 'static,
    ) -> AsyncTask<T>
    where
        T: Send + 'static,
    {
        self.schedule(RequestUnit::new(request, converter))
    }

    /// 批量提交请求单元
    ///
    /// 所有单元先完成登记（N次 scheduled 递增与 `on_scheduled`
    /// 全部发生在任何单元开始运行之前），再统一入池。
    ///
    /// 给定 `timeout` 时最多等待该时长让所有任务进入终态；到期
    /// 未完成的任务**不会被隐式取消**，继续在池中运行。返回的
    /// 句柄始终保持提交顺序，与完成顺序无关。
    pub async fn schedule_batch<T>(
        &self,
        units: Vec<RequestUnit<T>>,
        timeout: Option<Duration>,
    ) -> Vec<AsyncTask<T>>
    where
        T: Send + 'static,
    {
        let mut tasks = Vec::with_capacity(units.len());
        let mut jobs = Vec::with_capacity(units.len());
        for unit in units {
            let (task, job) = self.register(unit);
            tasks.push(task);
            jobs.push(job);
        }
        for job in jobs {
            job.spawn();
        }

        if let Some(timeout) = timeout {
            let wait_all = futures::future::join_all(tasks.iter().map(AsyncTask::wait_terminal));
            if tokio::time::timeout(timeout, wait_all).await.is_err() {
                warn!(
                    "批量等待超时: timeout={:?}, 未完成的任务继续运行",
                    timeout
                );
            }
        }
        tasks
    }

    /// 关闭工作池
    ///
    /// 尚未获得许可的任务以及之后提交的任务都会以
    /// [`DispatchError::SchedulingFailed`] 进入失败终态；
    /// 已在途的交换不受影响。
    pub fn shutdown(&self) {
        info!("关闭调度器工作池");
        self.semaphore.close();
    }

    fn register<T>(&self, unit: RequestUnit<T>) -> (AsyncTask<T>, UnitJob<T>)
    where
        T: Send + 'static,
    {
        let (request, context, converter, callback) = unit.into_parts();
        let shared = Arc::new(TaskShared::new(
            Arc::clone(&request),
            callback,
            Arc::clone(&self.metrics),
        ));
        self.metrics.record_scheduled(1);
        if let Some(callback) = shared.callback() {
            callback.on_scheduled(&request);
        }
        debug!("任务已登记: target={}, path={}", request.target, request.path);

        let task = AsyncTask::new(Arc::clone(&shared));
        let job = UnitJob {
            engine: Arc::clone(&self.engine),
            semaphore: Arc::clone(&self.semaphore),
            shared,
            context,
            converter,
        };
        (task, job)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool_size", &self.pool_size)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

/// 一个已登记、尚未入池的工作单元
struct UnitJob<T> {
    engine: Arc<dyn ExchangeEngine>,
    semaphore: Arc<Semaphore>,
    shared: Arc<TaskShared<T>>,
    context: Option<ExchangeContext>,
    converter: Arc<dyn ResponseConverter<T>>,
}

impl<T> UnitJob<T>
where
    T: Send + 'static,
{
    fn spawn(self) {
        tokio::spawn(run_unit(
            self.engine,
            self.semaphore,
            self.shared,
            self.context,
            self.converter,
        ));
    }
}

/// 单个工作单元的执行协程
///
/// 先与取消信号竞争池许可；拿到许可后以单次CAS宣告开始，执行
/// 交换与响应转换，最后把结果裁决进终态。交换内部的任何错误都
/// 在此边界被捕获并转为任务失败，不会外泄拖垮工作池。
async fn run_unit<T>(
    engine: Arc<dyn ExchangeEngine>,
    semaphore: Arc<Semaphore>,
    shared: Arc<TaskShared<T>>,
    context: Option<ExchangeContext>,
    converter: Arc<dyn ResponseConverter<T>>,
) where
    T: Send + 'static,
{
    let mut done_rx = shared.subscribe_done();
    let permit = tokio::select! {
        biased;
        // 入队期间被取消：终态已由取消方送达，直接退出
        _ = done_rx.wait_for(|done| *done) => return,
        permit = Arc::clone(&semaphore).acquire_owned() => permit,
    };
    let _permit = match permit {
        Ok(permit) => permit,
        Err(_) => {
            debug!("工作池已关闭, 任务提交失败: target={}", shared.request().target);
            shared.fail(Arc::new(DispatchError::SchedulingFailed(
                "工作池已关闭".to_string(),
            )));
            return;
        }
    };

    if !shared.mark_started() {
        // 在获得许可与开始之间输给了取消方
        return;
    }

    let mut cancel_rx = shared.subscribe_cancel();
    let exchange = async {
        let response = engine.perform(shared.request(), context.as_ref()).await?;
        converter.convert(response)
    };
    tokio::select! {
        result = exchange => match result {
            Ok(value) => shared.complete(value),
            Err(error) => {
                debug!("交换失败: target={}, error={}", shared.request().target, error);
                shared.fail(Arc::new(error));
            }
        },
        _ = cancel_rx.wait_for(|cancelled| *cancelled) => {
            // 终态已由取消方送达，在途交换随本协程一并中止
            debug!("在途交换被中断: target={}", shared.request().target);
        }
    }
}
