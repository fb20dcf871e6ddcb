//! Quill in-process events and user notifications.
//!
//! - [`EventBus`]: publish/subscribe hub for [`WorkspaceEvent`]s, backed by
//!   `tokio::sync::broadcast`.
//! - [`NotificationService`]: owned toast queue with timed dismissal.

pub mod bus;
pub mod toast;

pub use bus::{Envelope, EventBus, WorkspaceEvent};
pub use toast::{NotificationService, Toast, ToastEvent, ToastLevel};
