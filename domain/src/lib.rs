//! Core behavior of the notification demo, kept free of any web framework
//! types. The `web` crate adapts HTTP requests and responses into the plain
//! data this crate evaluates.

pub mod notification;
pub mod stopwatch;
