//! Operator alerting.
//!
//! Alerts are best effort: they are delivered on background tasks and a
//! failed delivery is logged, never propagated.

pub mod alert;

pub use alert::{AlertEvent, AlertNotifier, AlertTransport, WebhookTransport, local_hostname};
