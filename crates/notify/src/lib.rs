//! Member notifications through the notification service.
//!
//! This crate provides:
//! - `NotificationService` trait the engine sends through
//! - `HttpNotificationClient`, the REST implementation
//! - Builders for the status-change messages the engine sends

pub mod client;
pub mod messages;
pub mod traits;

pub use client::HttpNotificationClient;
pub use messages::{status_notification, REJECTED_KEY};
pub use traits::{
    NotificationReport, NotificationRequest, NotificationService, NotifyError, RecipientError,
};
