//! Prism Central v3 API request and response models.
//!
//! Every v3 resource is an intent document of `metadata`, `spec` and `status`.
//! Fields the API may omit are `Option` so partially populated entities still
//! deserialize.

use serde::{Deserialize, Serialize};

// ============================================================================
// Common intent types
// ============================================================================

/// Entity metadata.
#[derive(Debug, Default, Deserialize)]
pub struct EntityMetadata {
    /// Entity UUID.
    pub uuid: Option<String>,
    /// Entity kind.
    pub kind: Option<String>,
    /// Creation timestamp (RFC 3339).
    pub creation_time: Option<String>,
}

/// Reference to another entity in a request body.
#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    /// Referenced entity kind.
    pub kind: String,
    /// Referenced entity UUID.
    pub uuid: String,
}

impl Reference {
    /// Build a reference of the given kind.
    pub fn new(kind: &str, uuid: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            uuid: uuid.into(),
        }
    }
}

/// Reference as returned by the API, where either field may be missing.
#[derive(Debug, Default, Deserialize)]
pub struct EntityReference {
    /// Referenced entity kind.
    pub kind: Option<String>,
    /// Referenced entity UUID.
    pub uuid: Option<String>,
}

/// Request body for `POST /{kind}s/list`.
#[derive(Debug, Serialize)]
pub struct ListRequest {
    /// Entity kind being listed.
    pub kind: String,
    /// FIQL filter expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Page size.
    pub length: u32,
    /// Page offset.
    pub offset: u32,
}

/// List response metadata.
#[derive(Debug, Default, Deserialize)]
pub struct ListMetadata {
    /// Total number of entities matching the filter.
    pub total_matches: Option<u32>,
    /// Number of entities in this page.
    pub length: Option<u32>,
    /// Offset of this page.
    pub offset: Option<u32>,
}

/// Response body for `POST /{kind}s/list`.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    /// Entities in this page.
    #[serde(default = "Vec::new")]
    pub entities: Vec<T>,
    /// Paging metadata.
    #[serde(default)]
    pub metadata: ListMetadata,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Overall state, usually "ERROR".
    pub state: Option<String>,
    /// Error code.
    pub code: Option<u16>,
    /// Individual messages.
    #[serde(default)]
    pub message_list: Vec<ApiErrorMessage>,
}

/// Individual API error message.
#[derive(Debug, Deserialize)]
pub struct ApiErrorMessage {
    /// Machine readable reason (e.g. `ENTITY_NOT_FOUND`).
    pub reason: Option<String>,
    /// Human readable message.
    pub message: Option<String>,
}

// ============================================================================
// Cluster types
// ============================================================================

/// Cluster intent response.
#[derive(Debug, Deserialize)]
pub struct ClusterIntent {
    /// Metadata.
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Spec.
    pub spec: Option<NamedSpec>,
    /// Status.
    pub status: Option<ClusterStatus>,
}

/// Spec carrying only a name.
#[derive(Debug, Deserialize)]
pub struct NamedSpec {
    /// Entity name.
    pub name: Option<String>,
}

/// Cluster status.
#[derive(Debug, Deserialize)]
pub struct ClusterStatus {
    /// Cluster name.
    pub name: Option<String>,
    /// Cluster resources.
    pub resources: Option<ClusterResources>,
}

/// Cluster resources.
#[derive(Debug, Deserialize)]
pub struct ClusterResources {
    /// Cluster configuration.
    pub config: Option<ClusterConfig>,
}

/// Cluster configuration.
#[derive(Debug, Deserialize)]
pub struct ClusterConfig {
    /// Enabled services (e.g. "AOS", "PRISM_CENTRAL").
    #[serde(default)]
    pub service_list: Vec<Option<String>>,
}

// ============================================================================
// Subnet types
// ============================================================================

/// Subnet intent response.
#[derive(Debug, Deserialize)]
pub struct SubnetIntent {
    /// Metadata.
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Spec.
    pub spec: Option<SubnetSpec>,
}

/// Subnet spec.
#[derive(Debug, Deserialize)]
pub struct SubnetSpec {
    /// Subnet name.
    pub name: Option<String>,
    /// Subnet resources.
    pub resources: Option<SubnetResources>,
    /// Owning cluster, absent for overlay subnets.
    pub cluster_reference: Option<EntityReference>,
}

/// Subnet resources.
#[derive(Debug, Deserialize)]
pub struct SubnetResources {
    /// Subnet type ("VLAN" or "OVERLAY").
    pub subnet_type: Option<String>,
}

// ============================================================================
// Image types
// ============================================================================

/// Image intent response.
#[derive(Debug, Deserialize)]
pub struct ImageIntent {
    /// Metadata.
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Spec.
    pub spec: Option<NamedSpec>,
}

// ============================================================================
// VM types
// ============================================================================

/// VM intent response.
#[derive(Debug, Deserialize)]
pub struct VmIntent {
    /// Metadata.
    #[serde(default)]
    pub metadata: EntityMetadata,
    /// Spec.
    pub spec: Option<VmIntentSpec>,
    /// Status.
    pub status: Option<VmIntentStatus>,
}

/// Spec part of a VM intent response.
#[derive(Debug, Deserialize)]
pub struct VmIntentSpec {
    /// VM name.
    pub name: Option<String>,
    /// Hosting cluster.
    pub cluster_reference: Option<EntityReference>,
}

/// Status part of a VM intent response.
#[derive(Debug, Deserialize)]
pub struct VmIntentStatus {
    /// Intent state (e.g. "PENDING", "COMPLETE").
    pub state: Option<String>,
    /// VM resources.
    pub resources: Option<VmStatusResources>,
    /// Execution context of the pending operation.
    pub execution_context: Option<ExecutionContext>,
}

/// VM status resources.
#[derive(Debug, Deserialize)]
pub struct VmStatusResources {
    /// Power state.
    pub power_state: Option<String>,
}

/// Execution context of an intent operation.
#[derive(Debug, Deserialize)]
pub struct ExecutionContext {
    /// Task UUID. The API returns either a single string or a list.
    pub task_uuid: Option<serde_json::Value>,
}

impl ExecutionContext {
    /// First task UUID in the context.
    pub fn first_task_uuid(&self) -> Option<String> {
        match self.task_uuid.as_ref()? {
            serde_json::Value::String(uuid) => Some(uuid.clone()),
            serde_json::Value::Array(uuids) => uuids
                .iter()
                .find_map(|v| v.as_str().map(ToString::to_string)),
            _ => None,
        }
    }
}

/// Request body for `POST /vms`.
#[derive(Debug, Serialize)]
pub struct VmCreateBody {
    /// Metadata.
    pub metadata: CreateMetadata,
    /// Spec.
    pub spec: VmSpec,
}

/// Metadata for a create request.
#[derive(Debug, Serialize)]
pub struct CreateMetadata {
    /// Entity kind.
    pub kind: String,
    /// Spec version.
    pub spec_version: i64,
}

/// VM spec for a create request.
#[derive(Debug, Serialize)]
pub struct VmSpec {
    /// VM name.
    pub name: String,
    /// Target cluster.
    pub cluster_reference: Reference,
    /// VM resources.
    pub resources: VmResources,
}

/// VM resources for a create request.
#[derive(Debug, Serialize)]
pub struct VmResources {
    /// Boot configuration.
    pub boot_config: BootConfig,
    /// NICs.
    pub nic_list: Vec<VmNic>,
    /// Disks.
    pub disk_list: Vec<VmDisk>,
    /// Memory in MiB.
    pub memory_size_mib: i64,
    /// vCPUs per socket.
    pub num_vcpus_per_socket: i64,
    /// Sockets.
    pub num_sockets: i64,
    /// Desired power state ("ON" or "OFF").
    pub power_state: String,
    /// Hardware clock timezone.
    pub hardware_clock_timezone: String,
    /// Guest customization.
    pub guest_customization: GuestCustomization,
}

/// Boot configuration.
#[derive(Debug, Serialize)]
pub struct BootConfig {
    /// Boot type ("UEFI" or "LEGACY").
    pub boot_type: String,
}

/// VM NIC.
#[derive(Debug, Serialize)]
pub struct VmNic {
    /// Subnet the NIC is attached to.
    pub subnet_reference: Reference,
}

/// VM disk.
#[derive(Debug, Serialize)]
pub struct VmDisk {
    /// Image the disk is cloned from.
    pub data_source_reference: Reference,
    /// Disk size in MiB.
    pub disk_size_mib: i64,
}

/// Guest customization.
#[derive(Debug, Serialize)]
pub struct GuestCustomization {
    /// Whether the customization may be overridden.
    pub is_overridable: bool,
    /// Cloud-init payload.
    pub cloud_init: CloudInit,
}

/// Cloud-init payload, base64 encoded.
#[derive(Debug, Serialize)]
pub struct CloudInit {
    /// User-data.
    pub user_data: String,
    /// Meta-data.
    pub meta_data: String,
}

// ============================================================================
// Task types
// ============================================================================

/// Task response from `GET /tasks/{uuid}`.
#[derive(Debug, Deserialize)]
pub struct TaskResponse {
    /// Task UUID.
    pub uuid: Option<String>,
    /// Task status (e.g. "QUEUED", "RUNNING", "SUCCEEDED", "FAILED").
    pub status: Option<String>,
    /// Error detail for failed tasks.
    pub error_detail: Option<String>,
    /// Progress message.
    pub progress_message: Option<String>,
    /// Completion percentage.
    pub percentage_complete: Option<u32>,
}
