//! Correlated Messaging & Tracing Spine: envelope
//! construction, the Bus port, publish/subscribe, and at-least-once
//! delivery with redelivery and dead-lettering.

#![forbid(unsafe_code)]

pub mod bus;
pub mod config;
pub mod consumer;
pub mod egress;
pub mod publisher;
pub mod subject;

pub use bus::{Bus, InProcessBus, Subscription};
pub use config::MessagingConfig;
pub use consumer::{Consumer, ConsumerCallback};
pub use egress::{AllowAllEgressPolicy, EgressPolicy};
pub use publisher::{PublishParams, Publisher};
pub use subject::SubjectPattern;
