//! Shared HTTP utilities for the relay.

mod client;
mod sse;

pub use client::HttpClient;
pub use sse::{SseEvent, SseFrame, SseParser};
