//! Handlers for traffic that no caller is waiting on

use crate::messages::{Request, Response, ServerNotification};
use std::sync::Arc;
use tracing::{info, warn};

/// Receives responses that have no live consumer.
///
/// The request is `Some` when the response matched a pending entry whose
/// waiter had gone away, and `None` for responses that matched nothing.
pub type DefaultHandler = Arc<dyn Fn(Option<&Request>, &Response) + Send + Sync>;

/// Receives notifications pushed by the server
pub type NotificationHandler = Arc<dyn Fn(&ServerNotification) + Send + Sync>;

/// Callback registered with `call_with_callback`; fires at most once
pub type ResponseCallback = Box<dyn FnOnce(Request, Response) + Send + 'static>;

/// Default handler that logs the orphaned exchange
pub fn logging_handler() -> DefaultHandler {
    Arc::new(|request, response| match request {
        Some(request) => info!(
            id = response.id(),
            method = %request.method,
            success = response.is_success(),
            "Response with no waiting consumer"
        ),
        None => warn!(
            id = response.id(),
            success = response.is_success(),
            "Uncorrelated response"
        ),
    })
}

/// Notification handler that logs every server notification
pub fn logging_notification_handler() -> NotificationHandler {
    Arc::new(|notification| {
        info!(method = %notification.method, "Server notification");
    })
}
