use std::sync::Arc;

use crate::models::{ExchangeContext, HttpRequest};
use crate::traits::{LifecycleCallback, ResponseConverter};

/// 一次待调度交换的不可变描述
///
/// 由请求描述、可选上下文、响应转换器与可选生命周期回调组成。
/// 构造后不再修改；在被提交给调度器之前由创建方独占持有。
pub struct RequestUnit<T> {
    request: Arc<HttpRequest>,
    context: Option<ExchangeContext>,
    converter: Arc<dyn ResponseConverter<T>>,
    callback: Option<Arc<dyn LifecycleCallback<T>>>,
}

impl<T> RequestUnit<T> {
    pub fn new(request: HttpRequest, converter: impl ResponseConverter<T> + 'static) -> Self {
        Self {
            request: Arc::new(request),
            context: None,
            converter: Arc::new(converter),
            callback: None,
        }
    }

    pub fn with_context(mut self, context: ExchangeContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn LifecycleCallback<T>>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Arc<HttpRequest>,
        Option<ExchangeContext>,
        Arc<dyn ResponseConverter<T>>,
        Option<Arc<dyn LifecycleCallback<T>>>,
    ) {
        (self.request, self.context, self.converter, self.callback)
    }
}

impl<T> std::fmt::Debug for RequestUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestUnit")
            .field("request", &self.request)
            .field("has_context", &self.context.is_some())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
