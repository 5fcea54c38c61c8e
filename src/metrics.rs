use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 单个调度器实例的聚合指标
///
/// 所有计数器都是无锁的原子递增，由多个工作线程并发更新；
/// 读取不加锁，允许读到最终一致的快照。除 `active` 外全部单调递增。
/// 每个 `Scheduler` 实例持有自己的一份，实例之间互不共享。
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
    scheduled: AtomicU64,
    started: AtomicU64,
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl ExchangeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_scheduled(&self, count: u64) {
        self.scheduled.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self, was_started: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if was_started {
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_failed(&self, was_started: bool) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if was_started {
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_cancelled(&self, was_started: bool) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        if was_started {
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// 生成当前指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scheduled: self.scheduled(),
            started: self.started(),
            active: self.active(),
            completed: self.completed(),
            failed: self.failed(),
            cancelled: self.cancelled(),
        }
    }
}

/// 指标快照，可直接序列化用于上报
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub scheduled: u64,
    pub started: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ExchangeMetrics::new();
        metrics.record_scheduled(3);
        metrics.record_started();
        metrics.record_completed(true);
        metrics.record_cancelled(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scheduled, 3);
        assert_eq!(snapshot.started, 1);
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.cancelled, 1);
    }

    #[test]
    fn test_active_tracks_started_tasks() {
        let metrics = ExchangeMetrics::new();
        metrics.record_scheduled(2);
        metrics.record_started();
        metrics.record_started();
        assert_eq!(metrics.active(), 2);
        metrics.record_failed(true);
        assert_eq!(metrics.active(), 1);
        metrics.record_completed(true);
        assert_eq!(metrics.active(), 0);
    }
}
