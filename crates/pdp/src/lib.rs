//! Enforcement adapters for the policy decision point (PDP).

pub mod client;
pub mod noop;
pub mod wire;

pub use client::{PdpClient, PdpClientError};
pub use noop::NoopEnforcementClient;
pub use wire::{ticker, PolicyPayload};
