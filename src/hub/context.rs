//! Per-invocation context.
//!
//! One [`InvocationContext`] exists for every inbound method call. It carries
//! the correlation ids the response envelope echoes back, the raw request,
//! a lazily created item store for middleware, and the owning connection.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use hubwire_server::hub::{InvocationContext, StreamingServiceContext};
//! use hubwire_server::Result;
//!
//! struct Discard;
//!
//! impl StreamingServiceContext for Discard {
//!     fn connection_id(&self) -> uuid::Uuid { uuid::Uuid::nil() }
//!     fn queue_response_write(&self, _frame: Bytes) -> Result<()> { Ok(()) }
//! }
//!
//! let ctx = InvocationContext::builder(Arc::new(Discard), 42, 7)
//!     .path("ChatHub/SendMessage")
//!     .request(Bytes::from_static(&[0x91, 0xa2, b'h', b'i']))
//!     .build();
//!
//! ctx.set_item("user", "ada".to_string());
//! assert_eq!(ctx.get_item::<String>("user").as_deref().map(String::as_str), Some("ada"));
//! ```

use std::any::Any;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::connection::StreamingServiceContext;
use crate::protocol::FIRE_AND_FORGET_ID;

/// Value stored in the item map.
pub type ItemValue = Arc<dyn Any + Send + Sync>;

/// Item map shared by everything wrapping one invocation.
pub type Items = DashMap<String, ItemValue>;

/// Context for one method invocation.
///
/// # Thread Safety
///
/// `InvocationContext` is `Send + Sync`. Share it across tasks with `Arc`;
/// the item map and the diagnostic fields synchronize themselves, so no lock
/// is ever taken on the context itself.
pub struct InvocationContext {
    service_context: Arc<dyn StreamingServiceContext>,
    invocation_id: i32,
    method_id: i32,
    request: Bytes,
    path: String,
    received_at: DateTime<Utc>,
    hub_instance: Option<ItemValue>,
    items: OnceLock<Items>,
    response_size: OnceLock<usize>,
    response_type: OnceLock<&'static str>,
}

impl InvocationContext {
    /// Start building a context for a decoded request.
    pub fn builder(
        service_context: Arc<dyn StreamingServiceContext>,
        invocation_id: i32,
        method_id: i32,
    ) -> InvocationContextBuilder {
        InvocationContextBuilder {
            service_context,
            invocation_id,
            method_id,
            request: Bytes::new(),
            path: String::new(),
            received_at: None,
            hub_instance: None,
        }
    }

    /// Id of the owning connection.
    #[inline]
    pub fn connection_id(&self) -> Uuid {
        self.service_context.connection_id()
    }

    /// The owning connection.
    #[inline]
    pub fn service_context(&self) -> &Arc<dyn StreamingServiceContext> {
        &self.service_context
    }

    /// Correlation id; `-1` for fire-and-forget calls.
    #[inline]
    pub fn invocation_id(&self) -> i32 {
        self.invocation_id
    }

    #[inline]
    pub fn method_id(&self) -> i32 {
        self.method_id
    }

    /// Raw request payload.
    #[inline]
    pub fn request(&self) -> &Bytes {
        &self.request
    }

    /// Method path, e.g. `"ChatHub/SendMessage"`.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Time since the request was accepted.
    pub fn elapsed(&self) -> TimeDelta {
        Utc::now() - self.received_at
    }

    /// The hub object serving this call, if the dispatcher attached one.
    pub fn hub_instance(&self) -> Option<&ItemValue> {
        self.hub_instance.as_ref()
    }

    /// Typed view of [`hub_instance`](Self::hub_instance).
    pub fn hub<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.hub_instance.clone()?.downcast::<T>().ok()
    }

    /// Check if the caller expects no response.
    #[inline]
    pub fn is_fire_and_forget(&self) -> bool {
        self.invocation_id == FIRE_AND_FORGET_ID
    }

    /// Item map for this invocation, created on first access.
    ///
    /// Concurrent first callers all observe the same map.
    pub fn items(&self) -> &Items {
        self.items.get_or_init(DashMap::new)
    }

    /// Typed lookup; `None` if the key is missing or holds another type.
    pub fn get_item<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.items().get(key)?.value().clone();
        value.downcast::<T>().ok()
    }

    /// Insert an item, returning the previous value.
    pub fn set_item<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Option<ItemValue> {
        self.items().insert(key.into(), Arc::new(value))
    }

    pub fn remove_item(&self, key: &str) -> Option<ItemValue> {
        self.items().remove(key).map(|(_, v)| v)
    }

    /// Byte length of the response envelope, once one has been written.
    pub fn response_size(&self) -> Option<usize> {
        self.response_size.get().copied()
    }

    /// Type name of the response value, once a success envelope has been written.
    pub fn response_type(&self) -> Option<&'static str> {
        self.response_type.get().copied()
    }

    pub(crate) fn record_response(&self, size: usize, response_type: Option<&'static str>) {
        if self.response_size.set(size).is_err() {
            tracing::warn!(
                invocation_id = self.invocation_id,
                path = %self.path,
                "More than one response written for invocation"
            );
        }
        if let Some(t) = response_type {
            let _ = self.response_type.set(t);
        }
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("connection_id", &self.connection_id())
            .field("invocation_id", &self.invocation_id)
            .field("method_id", &self.method_id)
            .field("path", &self.path)
            .field("request_len", &self.request.len())
            .field("received_at", &self.received_at)
            .field("has_hub_instance", &self.hub_instance.is_some())
            .field("response_size", &self.response_size())
            .field("response_type", &self.response_type())
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`InvocationContext::builder`].
pub struct InvocationContextBuilder {
    service_context: Arc<dyn StreamingServiceContext>,
    invocation_id: i32,
    method_id: i32,
    request: Bytes,
    path: String,
    received_at: Option<DateTime<Utc>>,
    hub_instance: Option<ItemValue>,
}

impl InvocationContextBuilder {
    pub fn request(mut self, request: Bytes) -> Self {
        self.request = request;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Override the accept timestamp (defaults to now at `build`).
    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    /// Attach the hub object so filters can reach it.
    pub fn hub_instance(mut self, hub: ItemValue) -> Self {
        self.hub_instance = Some(hub);
        self
    }

    pub fn build(self) -> InvocationContext {
        InvocationContext {
            service_context: self.service_context,
            invocation_id: self.invocation_id,
            method_id: self.method_id,
            request: self.request,
            path: self.path,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            hub_instance: self.hub_instance,
            items: OnceLock::new(),
            response_size: OnceLock::new(),
            response_type: OnceLock::new(),
        }
    }
}
