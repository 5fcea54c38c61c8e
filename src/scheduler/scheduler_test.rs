use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::errors::{DispatchError, Result};
use crate::models::{ExchangeContext, HttpRequest, HttpResponse, TargetHost, TaskState};
use crate::scheduler::{RequestUnit, Scheduler};
use crate::traits::{ExchangeEngine, LifecycleCallback};

fn test_request(path: &str) -> HttpRequest {
    HttpRequest::get(TargetHost::new("http", "localhost", 8080), path)
}

fn ok_converter(response: HttpResponse) -> Result<bool> {
    Ok(response.status == 200)
}

/// 立即返回200的引擎
struct OkEngine;

#[async_trait]
impl ExchangeEngine for OkEngine {
    async fn perform(
        &self,
        _request: &HttpRequest,
        _context: Option<&ExchangeContext>,
    ) -> Result<HttpResponse> {
        Ok(HttpResponse::new(200))
    }
}

/// 阻塞到外部开关翻转才返回的引擎
struct GatedEngine {
    gate: watch::Receiver<bool>,
}

impl GatedEngine {
    fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { gate: rx })
    }
}

#[async_trait]
impl ExchangeEngine for GatedEngine {
    async fn perform(
        &self,
        _request: &HttpRequest,
        _context: Option<&ExchangeContext>,
    ) -> Result<HttpResponse> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| DispatchError::Exchange("开关已关闭".to_string()))?;
        Ok(HttpResponse::new(200))
    }
}

/// 总是失败的引擎
struct FailingEngine;

#[async_trait]
impl ExchangeEngine for FailingEngine {
    async fn perform(
        &self,
        _request: &HttpRequest,
        _context: Option<&ExchangeContext>,
    ) -> Result<HttpResponse> {
        Err(DispatchError::Exchange("模拟网络故障".to_string()))
    }
}

/// 各阶段计数回调，对应上游测试里的CountingCallback
#[derive(Default)]
struct CountingCallback {
    scheduled: AtomicUsize,
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl LifecycleCallback<bool> for CountingCallback {
    fn on_scheduled(&self, _request: &HttpRequest) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
    }

    fn on_started(&self, _request: &HttpRequest) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_completed(&self, _request: &HttpRequest, _result: &bool) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_failed(&self, _request: &HttpRequest, _error: &DispatchError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _request: &HttpRequest) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_single_call_returns_converter_output() {
    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(5).build();
    let task = scheduler.execute(test_request("/wait"), ok_converter);
    assert!(task.result().await.unwrap());
    assert_eq!(task.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_cancel_then_result_is_cancelled_error() {
    let (_gate, engine) = GatedEngine::new();
    let scheduler = Scheduler::builder(Arc::new(engine)).pool_size(5).build();
    let task = scheduler.execute(test_request("/wait"), ok_converter);
    assert!(task.cancel_interrupt());
    let error = task.result().await.unwrap_err();
    assert!(matches!(error, DispatchError::Cancelled));
    assert_eq!(task.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_result_timeout_does_not_cancel_task() {
    let (gate, engine) = GatedEngine::new();
    let scheduler = Scheduler::builder(Arc::new(engine)).pool_size(5).build();
    let task = scheduler.execute(test_request("/wait"), ok_converter);

    let error = task.result_timeout(Duration::from_millis(10)).await.unwrap_err();
    assert!(matches!(error, DispatchError::Timeout));
    // 超时不改变任务状态，解除阻塞后仍应正常完成
    assert!(!task.is_terminal());
    gate.send(true).unwrap();
    assert!(task.result().await.unwrap());
    assert_eq!(task.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_terminal_state_is_idempotent() {
    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(2).build();
    let task = scheduler.execute(test_request("/idempotent"), ok_converter);
    assert!(task.result().await.unwrap());

    // 终态后取消是无操作，重复读取返回相同结果
    assert!(!task.cancel());
    assert!(!task.cancel_interrupt());
    assert!(task.result().await.unwrap());
    assert_eq!(task.state(), TaskState::Completed);
}

#[tokio::test]
async fn test_failed_exchange_surfaces_engine_error() {
    let scheduler = Scheduler::builder(Arc::new(FailingEngine)).pool_size(2).build();
    let callback = Arc::new(CountingCallback::default());
    let unit = RequestUnit::new(test_request("/fail"), ok_converter)
        .with_callback(callback.clone());
    let task = scheduler.schedule(unit);

    let error = task.result().await.unwrap_err();
    match error {
        DispatchError::TaskFailed(inner) => {
            assert!(matches!(*inner, DispatchError::Exchange(_)));
        }
        other => panic!("期望TaskFailed, 实际为 {other}"),
    }
    assert_eq!(callback.failed.load(Ordering::SeqCst), 1);
    assert_eq!(callback.completed.load(Ordering::SeqCst), 0);
    let snapshot = scheduler.metrics().snapshot();
    assert_eq!(snapshot.failed, 1);
}

#[tokio::test]
async fn test_conversion_failure_fails_task() {
    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(2).build();
    let task = scheduler.execute(test_request("/convert"), |_response: HttpResponse| {
        Err::<bool, _>(DispatchError::Conversion("响应体不合法".to_string()))
    });
    let error = task.result().await.unwrap_err();
    match error {
        DispatchError::TaskFailed(inner) => {
            assert!(matches!(*inner, DispatchError::Conversion(_)));
        }
        other => panic!("期望TaskFailed, 实际为 {other}"),
    }
}

#[tokio::test]
async fn test_scheduled_counter_equals_submission_count() {
    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(3).build();
    let mut tasks = Vec::new();
    for i in 0..17 {
        tasks.push(scheduler.execute(test_request(&format!("/n/{i}")), ok_converter));
    }
    assert_eq!(scheduler.metrics().scheduled(), 17);
    for task in tasks {
        task.result().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_units_run_to_success() {
    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(5).build();
    let callback = Arc::new(CountingCallback::default());
    let mut units = Vec::new();
    for i in 0..100 {
        units.push(
            RequestUnit::new(test_request(&format!("/bulk/{i}")), ok_converter)
                .with_callback(callback.clone()),
        );
    }
    let tasks = scheduler.schedule_batch(units, None).await;
    for task in &tasks {
        assert!(task.result().await.unwrap());
    }

    let snapshot = scheduler.metrics().snapshot();
    assert_eq!(snapshot.scheduled, 100);
    assert_eq!(snapshot.completed, 100);
    assert_eq!(snapshot.failed, 0);
    assert_eq!(snapshot.cancelled, 0);
    assert_eq!(snapshot.active, 0);
    assert_eq!(callback.scheduled.load(Ordering::SeqCst), 100);
    assert_eq!(callback.completed.load(Ordering::SeqCst), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_all_before_unblocking() {
    let (_gate, engine) = GatedEngine::new();
    let scheduler = Scheduler::builder(Arc::new(engine)).pool_size(5).build();
    let callback = Arc::new(CountingCallback::default());
    let mut units = Vec::new();
    for i in 0..100 {
        units.push(
            RequestUnit::new(test_request(&format!("/gated/{i}")), ok_converter)
                .with_callback(callback.clone()),
        );
    }
    let tasks = scheduler.schedule_batch(units, None).await;
    for task in &tasks {
        task.cancel_interrupt();
    }
    for task in &tasks {
        assert!(matches!(
            task.result().await.unwrap_err(),
            DispatchError::Cancelled
        ));
    }

    assert_eq!(callback.completed.load(Ordering::SeqCst), 0);
    assert_eq!(callback.failed.load(Ordering::SeqCst), 0);
    assert_eq!(callback.cancelled.load(Ordering::SeqCst), 100);
    let snapshot = scheduler.metrics().snapshot();
    assert_eq!(snapshot.cancelled, 100);
    assert_eq!(snapshot.completed, 0);
    assert_eq!(snapshot.active, 0);
}

#[tokio::test]
async fn test_cancel_before_start_never_invokes_started() {
    // 单线程运行时里spawn的协程在首个await点之前不会运行，
    // 取消必然发生在工作协程出队之前
    let (_gate, engine) = GatedEngine::new();
    let scheduler = Scheduler::builder(Arc::new(engine)).pool_size(1).build();
    let callback = Arc::new(CountingCallback::default());
    let unit = RequestUnit::new(test_request("/early-cancel"), ok_converter)
        .with_callback(callback.clone());
    let task = scheduler.schedule(unit);

    assert!(task.cancel());
    assert!(matches!(
        task.result().await.unwrap_err(),
        DispatchError::Cancelled
    ));
    assert_eq!(callback.started.load(Ordering::SeqCst), 0);
    assert_eq!(callback.cancelled.load(Ordering::SeqCst), 1);
    assert!(task.snapshot().started_at.is_none());
}

#[tokio::test]
async fn test_callback_order_for_completed_task() {
    struct OrderCallback {
        log: std::sync::Mutex<Vec<&'static str>>,
    }
    impl LifecycleCallback<bool> for OrderCallback {
        fn on_scheduled(&self, _request: &HttpRequest) {
            self.log.lock().unwrap().push("scheduled");
        }
        fn on_started(&self, _request: &HttpRequest) {
            self.log.lock().unwrap().push("started");
        }
        fn on_completed(&self, _request: &HttpRequest, result: &bool) {
            assert!(*result);
            self.log.lock().unwrap().push("completed");
        }
    }

    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(1).build();
    let callback = Arc::new(OrderCallback {
        log: std::sync::Mutex::new(Vec::new()),
    });
    let unit = RequestUnit::new(test_request("/order"), ok_converter)
        .with_callback(callback.clone());
    let task = scheduler.schedule(unit);
    assert!(task.result().await.unwrap());

    assert_eq!(
        *callback.log.lock().unwrap(),
        vec!["scheduled", "started", "completed"]
    );
}

#[tokio::test]
async fn test_batch_preserves_submission_order() {
    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(2).build();
    let units: Vec<_> = (0..10)
        .map(|i| RequestUnit::new(test_request(&format!("/order/{i}")), ok_converter))
        .collect();
    let tasks = scheduler.schedule_batch(units, Some(Duration::from_secs(5))).await;

    for (i, task) in tasks.iter().enumerate() {
        assert_eq!(task.request().path, format!("/order/{i}"));
        assert!(task.result().await.unwrap());
    }
}

#[tokio::test]
async fn test_batch_timeout_leaves_tasks_running() {
    let (gate, engine) = GatedEngine::new();
    let scheduler = Scheduler::builder(Arc::new(engine)).pool_size(5).build();
    let units: Vec<_> = (0..5)
        .map(|i| RequestUnit::new(test_request(&format!("/slow/{i}")), ok_converter))
        .collect();
    let tasks = scheduler
        .schedule_batch(units, Some(Duration::from_millis(20)))
        .await;

    // 批量等待超时不隐式取消任何任务
    for task in &tasks {
        assert!(!task.is_terminal());
    }
    gate.send(true).unwrap();
    for task in &tasks {
        assert!(task.result().await.unwrap());
    }
    assert_eq!(scheduler.metrics().cancelled(), 0);
}

#[tokio::test]
async fn test_schedule_after_shutdown_fails_on_task() {
    let scheduler = Scheduler::builder(Arc::new(OkEngine)).pool_size(2).build();
    scheduler.shutdown();

    // schedule本身不同步失败，失败出现在任务终态上
    let task = scheduler.execute(test_request("/late"), ok_converter);
    let error = task.result().await.unwrap_err();
    match error {
        DispatchError::TaskFailed(inner) => {
            assert!(matches!(*inner, DispatchError::SchedulingFailed(_)));
        }
        other => panic!("期望TaskFailed, 实际为 {other}"),
    }
    assert_eq!(task.state(), TaskState::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_limits_concurrency() {
    struct TrackingEngine {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeEngine for TrackingEngine {
        async fn perform(
            &self,
            _request: &HttpRequest,
            _context: Option<&ExchangeContext>,
        ) -> Result<HttpResponse> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(HttpResponse::new(200))
        }
    }

    let engine = Arc::new(TrackingEngine {
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let scheduler = Scheduler::builder(engine.clone()).pool_size(3).build();
    let units: Vec<_> = (0..30)
        .map(|i| RequestUnit::new(test_request(&format!("/limit/{i}")), ok_converter))
        .collect();
    let tasks = scheduler.schedule_batch(units, None).await;
    for task in tasks {
        task.result().await.unwrap();
    }
    assert!(engine.peak.load(Ordering::SeqCst) <= 3);
}
