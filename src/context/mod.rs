//! # Application context and call-site helpers.
//!
//! - [`AppContext`] is built once at startup, owns the [`EventBus`](crate::EventBus)
//!   and drives its lifecycle (start, graceful shutdown, signal handling).
//! - [`Emitter`] is the per-service handle services keep: it stamps the
//!   service name as event source, names listeners `<service>_<handler>`,
//!   and counts what the service emitted.
//!
//! Components receive the context (or an emitter) explicitly; there is no
//! global lookup.

mod app;
mod emitter;
mod signal;

pub use app::AppContext;
pub use emitter::{Emitter, ServiceHealth, ServiceStats};
pub use signal::wait_for_shutdown_signal;
