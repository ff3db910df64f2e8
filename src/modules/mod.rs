//! Secrets engines. Each engine lives in its own module and exposes a backend that serves
//! [`crate::logical::Request`]s.

pub mod rabbitmq;
