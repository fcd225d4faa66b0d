//! Metrics and observability infrastructure.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder and the optional HTTP endpoint

pub mod events;
pub mod server;

pub use server::{init_global, init_recorder};

/// Emit a metric event.
///
/// Calls `InternalEvent::emit()` on the given event, recording the
/// corresponding Prometheus metric.
///
/// ```ignore
/// use sluice_core::emit;
/// use sluice_core::metrics::events::{BytesWritten, InternalEvent};
///
/// emit!(BytesWritten { bytes: 1024, target: "account".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
