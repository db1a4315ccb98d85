//! Virtual machine provisioning against Prism Central.
//!
//! This crate resolves clusters, subnets and images by name or UUID, submits
//! a VM creation request with a cloud-init customization, and tracks the
//! resulting asynchronous task until it finishes.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use prism_vm::providers::prism::PrismCentral;
//! use prism_vm::{ControlPlaneConfig, EntityRef, ProvisionRequest, Provisioner};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ControlPlaneConfig::new("pc.example.com", "admin", "secret");
//!     let client = Arc::new(PrismCentral::new(&config)?);
//!
//!     let outcome = Provisioner::new(client)
//!         .provision(
//!             &ProvisionRequest {
//!                 vm_name: "worker-0".into(),
//!                 cluster: EntityRef::Name("prod".into()),
//!                 subnet: EntityRef::Name("app-net".into()),
//!                 image: EntityRef::Name("ubuntu22".into()),
//!                 user_data: "#cloud-config\n".into(),
//!             },
//!             &CancellationToken::new(),
//!         )
//!         .await?;
//!
//!     println!("created {}", outcome.vm_id);
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod providers;
pub mod provision;
pub mod resolve;
pub mod task;

pub use config::{ConfigError, ControlPlaneConfig};
pub use error::{EntityKind, Error};
pub use providers::prism::PrismCentral;
pub use providers::{ClientError, ControlPlane, TaskInfo, TaskStatus, VmEntity};
pub use provision::{ProvisionOutcome, ProvisionRequest, Provisioner, VmShape};
pub use resolve::{EntityRef, Resolver};
pub use task::{TaskTracker, POLL_INTERVAL};
