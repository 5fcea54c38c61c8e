use serde::{Deserialize, Serialize};

/// 调度任务的生命周期状态
///
/// 状态只沿单一方向迁移：
/// `Scheduled -> Started -> {Completed | Failed | Cancelled}`，
/// 其中 `Scheduled` 也可以直接被取消。三个终态一旦进入即不再改变。
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "SCHEDULED")]
    Scheduled = 0,
    #[serde(rename = "STARTED")]
    Started = 1,
    #[serde(rename = "COMPLETED")]
    Completed = 2,
    #[serde(rename = "FAILED")]
    Failed = 3,
    #[serde(rename = "CANCELLED")]
    Cancelled = 4,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub(crate) fn from_u8(value: u8) -> TaskState {
        match value {
            0 => TaskState::Scheduled,
            1 => TaskState::Started,
            2 => TaskState::Completed,
            3 => TaskState::Failed,
            _ => TaskState::Cancelled,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Scheduled => "SCHEDULED",
            TaskState::Started => "STARTED",
            TaskState::Completed => "COMPLETED",
            TaskState::Failed => "FAILED",
            TaskState::Cancelled => "CANCELLED",
        };
        write!(f, "{name}")
    }
}
