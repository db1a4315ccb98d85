//! Control plane trait and common types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Errors that can occur while talking to the control plane.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Entity not found.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Response was well-formed JSON but lacked a required field.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the control plane reported the entity as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// Catalog entities
// ============================================================================

/// A cluster as seen by the control plane catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntity {
    /// Cluster UUID.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Services enabled on the cluster (e.g. "AOS").
    pub services: Vec<String>,
}

/// Kind of a subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubnetKind {
    /// Overlay subnet, visible from every cluster managed by the control plane.
    Overlay,
    /// VLAN subnet, scoped to a single cluster.
    Vlan,
    /// Any other kind reported by the API.
    Other(String),
}

impl SubnetKind {
    /// Parse the API representation (e.g. "OVERLAY", "VLAN").
    #[must_use]
    pub fn from_api(value: &str) -> Self {
        match value {
            "OVERLAY" => Self::Overlay,
            "VLAN" => Self::Vlan,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for SubnetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overlay => write!(f, "OVERLAY"),
            Self::Vlan => write!(f, "VLAN"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// A subnet as seen by the control plane catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetEntity {
    /// Subnet UUID.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Subnet kind.
    pub kind: Option<SubnetKind>,
    /// UUID of the owning cluster, absent for overlay subnets.
    pub cluster_id: Option<String>,
}

/// A disk image as seen by the control plane catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntity {
    /// Image UUID.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
}

/// A virtual machine as seen by the control plane catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmEntity {
    /// VM UUID.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Power state (e.g. "ON", "OFF").
    pub power_state: Option<String>,
    /// UUID of the cluster hosting the VM.
    pub cluster_id: Option<String>,
    /// When the VM was created.
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Tasks
// ============================================================================

/// Status of an asynchronous control plane task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Task is waiting to run.
    Queued,
    /// Task is running.
    Running,
    /// Task finished successfully.
    Succeeded,
    /// Task failed.
    Failed,
    /// The task UUID does not refer to a known task.
    InvalidUuid,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Whether the status is a terminal failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::InvalidUuid)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::InvalidUuid => write!(f, "INVALID_UUID"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A snapshot of an asynchronous task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task UUID.
    pub id: String,
    /// Current status.
    pub status: TaskStatus,
    /// Error detail reported by the control plane.
    pub error_detail: Option<String>,
    /// Progress message reported by the control plane.
    pub progress_message: Option<String>,
    /// Completion percentage.
    pub percentage_complete: Option<u32>,
}

// ============================================================================
// VM creation
// ============================================================================

/// Firmware boot mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BootType {
    /// UEFI firmware.
    Uefi,
    /// Legacy BIOS.
    Legacy,
}

impl std::fmt::Display for BootType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uefi => write!(f, "UEFI"),
            Self::Legacy => write!(f, "LEGACY"),
        }
    }
}

/// Cloud-init payload embedded in the VM, already base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudInitPayload {
    /// Base64 encoded user-data.
    pub user_data: String,
    /// Base64 encoded meta-data.
    pub meta_data: String,
    /// Whether the customization may be overridden when cloning.
    pub overridable: bool,
}

/// Fully resolved request to create a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmCreateRequest {
    /// VM name.
    pub name: String,
    /// Target cluster UUID.
    pub cluster_id: String,
    /// Subnet UUID for the single NIC.
    pub subnet_id: String,
    /// Image UUID backing the boot disk.
    pub image_id: String,
    /// Boot mode.
    pub boot_type: BootType,
    /// Memory in MiB.
    pub memory_mib: i64,
    /// Number of CPU sockets.
    pub sockets: i64,
    /// Cores per socket.
    pub cores_per_socket: i64,
    /// Boot disk size in MiB.
    pub disk_mib: i64,
    /// Power the VM on after creation.
    pub power_on: bool,
    /// Hardware clock timezone.
    pub clock_timezone: String,
    /// Guest customization.
    pub cloud_init: CloudInitPayload,
}

/// Identifiers returned when a VM creation is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmCreated {
    /// UUID of the VM being created.
    pub vm_id: String,
    /// UUID of the task tracking the creation.
    pub task_id: String,
}

/// Trait for the remote control plane.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Get a cluster by UUID.
    async fn get_cluster(&self, id: &str) -> Result<ClusterEntity, ClientError>;

    /// List all clusters matching a filter expression.
    async fn list_clusters(&self, filter: &str) -> Result<Vec<ClusterEntity>, ClientError>;

    /// Get a subnet by UUID.
    async fn get_subnet(&self, id: &str) -> Result<SubnetEntity, ClientError>;

    /// List all subnets matching a filter expression.
    async fn list_subnets(&self, filter: &str) -> Result<Vec<SubnetEntity>, ClientError>;

    /// Get an image by UUID.
    async fn get_image(&self, id: &str) -> Result<ImageEntity, ClientError>;

    /// List all images matching a filter expression.
    async fn list_images(&self, filter: &str) -> Result<Vec<ImageEntity>, ClientError>;

    /// Get a VM by UUID.
    async fn get_vm(&self, id: &str) -> Result<VmEntity, ClientError>;

    /// List all VMs matching a filter expression.
    async fn list_vms(&self, filter: &str) -> Result<Vec<VmEntity>, ClientError>;

    /// Submit a VM creation request.
    async fn create_vm(&self, req: &VmCreateRequest) -> Result<VmCreated, ClientError>;

    /// Get the current state of a task.
    async fn get_task(&self, id: &str) -> Result<TaskInfo, ClientError>;
}
