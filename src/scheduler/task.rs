use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::errors::{DispatchError, Result};
use crate::metrics::ExchangeMetrics;
use crate::models::{HttpRequest, TaskState};
use crate::traits::LifecycleCallback;

/// 任务终局：三个互斥的结果之一
///
/// 失败保存在 `Arc` 中，保证同一任务的多次查询返回同一份错误。
pub(crate) enum Outcome<T> {
    Completed(T),
    Failed(Arc<DispatchError>),
    Cancelled,
}

struct TaskTimes {
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// 任务句柄与工作协程共享的内部状态
///
/// 终态迁移通过 `state` 上的单次CAS裁决：取消方与工作协程可能
/// 同时竞争同一个任务，谁赢得CAS谁负责写入终局、更新指标并触发
/// 终态回调，由此保证终态恰好送达一次。
pub(crate) struct TaskShared<T> {
    state: AtomicU8,
    /// 串行化状态迁移与回调触发，保证回调顺序与状态迁移一致。
    /// 回调在持锁期间同步调用，回调内不得再操作同一任务句柄。
    transition: Mutex<()>,
    outcome: Mutex<Option<Outcome<T>>>,
    times: Mutex<TaskTimes>,
    done_tx: watch::Sender<bool>,
    cancel_tx: watch::Sender<bool>,
    request: Arc<HttpRequest>,
    callback: Option<Arc<dyn LifecycleCallback<T>>>,
    metrics: Arc<ExchangeMetrics>,
}

impl<T> TaskShared<T> {
    pub(crate) fn new(
        request: Arc<HttpRequest>,
        callback: Option<Arc<dyn LifecycleCallback<T>>>,
        metrics: Arc<ExchangeMetrics>,
    ) -> Self {
        let (done_tx, _) = watch::channel(false);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            state: AtomicU8::new(TaskState::Scheduled as u8),
            transition: Mutex::new(()),
            outcome: Mutex::new(None),
            times: Mutex::new(TaskTimes {
                scheduled_at: Utc::now(),
                started_at: None,
                completed_at: None,
            }),
            done_tx,
            cancel_tx,
            request,
            callback,
            metrics,
        }
    }

    pub(crate) fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub(crate) fn callback(&self) -> Option<&Arc<dyn LifecycleCallback<T>>> {
        self.callback.as_ref()
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn subscribe_done(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }

    pub(crate) fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// 尝试向给定终态迁移，返回迁移前的状态；已是终态则返回 `None`
    fn try_terminal(&self, to: TaskState) -> Option<TaskState> {
        debug_assert!(to.is_terminal());
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let state = TaskState::from_u8(current);
            if state.is_terminal() {
                return None;
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(state),
                Err(actual) => current = actual,
            }
        }
    }

    /// 工作协程拿到许可后宣告开始，输给取消方时返回 `false`
    pub(crate) fn mark_started(&self) -> bool {
        let _guard = self.transition.lock().expect("transition锁中毒");
        let swapped = self
            .state
            .compare_exchange(
                TaskState::Scheduled as u8,
                TaskState::Started as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if swapped {
            self.times.lock().expect("times锁中毒").started_at = Some(Utc::now());
            self.metrics.record_started();
            if let Some(callback) = &self.callback {
                callback.on_started(&self.request);
            }
        }
        swapped
    }

    pub(crate) fn complete(&self, value: T) {
        let _guard = self.transition.lock().expect("transition锁中毒");
        if let Some(previous) = self.try_terminal(TaskState::Completed) {
            self.record_completed_at();
            self.metrics
                .record_completed(previous == TaskState::Started);
            if let Some(callback) = &self.callback {
                callback.on_completed(&self.request, &value);
            }
            *self.outcome.lock().expect("outcome锁中毒") = Some(Outcome::Completed(value));
            let _ = self.done_tx.send(true);
        }
    }

    pub(crate) fn fail(&self, error: Arc<DispatchError>) {
        let _guard = self.transition.lock().expect("transition锁中毒");
        if let Some(previous) = self.try_terminal(TaskState::Failed) {
            self.record_completed_at();
            self.metrics.record_failed(previous == TaskState::Started);
            if let Some(callback) = &self.callback {
                callback.on_failed(&self.request, &error);
            }
            *self.outcome.lock().expect("outcome锁中毒") = Some(Outcome::Failed(error));
            let _ = self.done_tx.send(true);
        }
    }

    /// 取消任务，首个生效的调用赢得CAS并送达终局
    ///
    /// `interrupt` 为真时额外触发取消信号，尽力中断进行中的交换；
    /// 为假时在途交换任其跑完，结果在CAS处被丢弃。
    pub(crate) fn cancel(&self, interrupt: bool) -> bool {
        let _guard = self.transition.lock().expect("transition锁中毒");
        match self.try_terminal(TaskState::Cancelled) {
            Some(previous) => {
                debug!(
                    "任务已取消: target={}, 取消前状态={}",
                    self.request.target, previous
                );
                self.record_completed_at();
                self.metrics
                    .record_cancelled(previous == TaskState::Started);
                if let Some(callback) = &self.callback {
                    callback.on_cancelled(&self.request);
                }
                *self.outcome.lock().expect("outcome锁中毒") = Some(Outcome::Cancelled);
                if interrupt {
                    let _ = self.cancel_tx.send(true);
                }
                let _ = self.done_tx.send(true);
                true
            }
            None => false,
        }
    }

    fn record_completed_at(&self) {
        self.times.lock().expect("times锁中毒").completed_at = Some(Utc::now());
    }
}

impl<T: Clone> TaskShared<T> {
    fn read_outcome(&self) -> Result<T> {
        let guard = self.outcome.lock().expect("outcome锁中毒");
        match guard.as_ref() {
            Some(Outcome::Completed(value)) => Ok(value.clone()),
            Some(Outcome::Failed(error)) => Err(DispatchError::TaskFailed(Arc::clone(error))),
            Some(Outcome::Cancelled) => Err(DispatchError::Cancelled),
            None => Err(DispatchError::Internal(
                "任务已终结但缺少结果".to_string(),
            )),
        }
    }
}

/// 可取消、可等待的任务句柄
///
/// 包装一个请求单元的最终结果，在工作协程与调用方之间架桥。
/// 句柄可克隆，各克隆共享同一任务状态。
pub struct AsyncTask<T> {
    shared: Arc<TaskShared<T>>,
}

impl<T> Clone for AsyncTask<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> AsyncTask<T> {
    pub(crate) fn new(shared: Arc<TaskShared<T>>) -> Self {
        Self { shared }
    }

    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn request(&self) -> &HttpRequest {
        self.shared.request()
    }

    /// 取消任务，不打断已在途的交换
    ///
    /// 只有第一次生效的调用返回 `true`；任务已终结时是无操作。
    /// 取消从调用方视角是非阻塞的：只发信号，不等待完全停止。
    pub fn cancel(&self) -> bool {
        self.shared.cancel(false)
    }

    /// 取消任务并尽力中断在途交换
    ///
    /// 中断依赖交换引擎对取消信号的响应；不响应时任务对外仍呈
    /// 取消终态，但底层交换可能继续运行直至自行解除阻塞。
    pub fn cancel_interrupt(&self) -> bool {
        self.shared.cancel(true)
    }

    /// 等待任务进入终态，不读取结果
    pub async fn wait_terminal(&self) {
        let mut rx = self.shared.subscribe_done();
        // done_tx与任务状态同生命周期，发送端不会先行关闭
        let _ = rx.wait_for(|done| *done).await;
    }

    /// 任务的时间线快照
    pub fn snapshot(&self) -> TaskSnapshot {
        let times = self.shared.times.lock().expect("times锁中毒");
        TaskSnapshot {
            state: self.state(),
            scheduled_at: times.scheduled_at,
            started_at: times.started_at,
            completed_at: times.completed_at,
        }
    }
}

impl<T: Clone> AsyncTask<T> {
    /// 等待终态并返回结果
    ///
    /// 成功返回转换器的产出；失败返回 [`DispatchError::TaskFailed`]
    /// 包装的原始错误；取消返回 [`DispatchError::Cancelled`]。
    /// 重复调用返回相同结果。
    pub async fn result(&self) -> Result<T> {
        self.wait_terminal().await;
        self.shared.read_outcome()
    }

    /// 限时等待结果
    ///
    /// 截止前未进入终态则返回 [`DispatchError::Timeout`]；超时不
    /// 改变任务本身的状态，任务之后仍可正常完成。
    pub async fn result_timeout(&self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self.wait_terminal()).await {
            Ok(()) => self.shared.read_outcome(),
            Err(_) => Err(DispatchError::Timeout),
        }
    }
}

impl<T> std::fmt::Debug for AsyncTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTask")
            .field("state", &self.state())
            .field("target", &self.shared.request().target)
            .finish()
    }
}

/// 任务状态与时间线的只读快照
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub state: TaskState,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
