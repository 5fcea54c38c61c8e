pub mod callback;
pub mod converter;
pub mod engine;

pub use callback::LifecycleCallback;
pub use converter::ResponseConverter;
pub use engine::ExchangeEngine;
