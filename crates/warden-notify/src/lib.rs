//! warden-notify — Outbound alert paths for the access loop.
//!
//! [`NetworkDispatcher`] implements
//! [`AlertDispatcher`](warden_access::AlertDispatcher) over an HTTP telemetry
//! endpoint and an SMTP relay. Either path may be left unconfigured, in which
//! case calls to it return [`DispatchError::Disabled`](warden_access::DispatchError).
//!
//! All calls are blocking and make exactly one attempt, bounded by the
//! configured timeouts. Do not call them from inside an async runtime.

pub mod dispatcher;
pub mod http;
pub mod link;
pub mod smtp;

pub use dispatcher::NetworkDispatcher;
pub use http::{HttpReporter, ReportConfig};
pub use link::wait_for_link;
pub use smtp::{SmtpConfig, SmtpNotifier};
