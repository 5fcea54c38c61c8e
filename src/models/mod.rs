pub mod request;
pub mod task;

pub use request::{ExchangeContext, HttpRequest, HttpResponse, TargetHost};
pub use task::TaskState;
