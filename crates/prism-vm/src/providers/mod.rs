//! Control plane client abstractions.

pub mod prism;
mod traits;

#[cfg(test)]
pub use traits::MockControlPlane;
pub use traits::{
    BootType, ClientError, CloudInitPayload, ClusterEntity, ControlPlane, ImageEntity,
    SubnetEntity, SubnetKind, TaskInfo, TaskStatus, VmCreateRequest, VmCreated, VmEntity,
};
