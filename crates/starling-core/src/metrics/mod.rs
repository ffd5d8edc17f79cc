//! Metrics and observability infrastructure.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `server`: Prometheus exporter initialization

pub mod events;
pub mod server;

pub use server::init;
#[cfg(any(test, feature = "test-util"))]
pub use server::init_test;

/// Macro for emitting metric events.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding Prometheus metric.
///
/// ```ignore
/// use starling_core::metrics::events::RowsProduced;
///
/// emit!(RowsProduced { table: "songs", count: 71 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;
