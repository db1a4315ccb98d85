//! Prism Central v3 control plane.
//!
//! Implements the [`ControlPlane`](super::ControlPlane) trait for the Prism Central v3 API.

mod client;
mod models;

pub use client::PrismCentral;
pub use models::*;
