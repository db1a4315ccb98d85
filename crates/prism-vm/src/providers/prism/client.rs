//! Prism Central v3 API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use super::models::{
    ApiErrorBody, BootConfig, CloudInit, ClusterIntent, CreateMetadata, GuestCustomization,
    ImageIntent, ListRequest, ListResponse, Reference, SubnetIntent, TaskResponse, VmCreateBody,
    VmDisk, VmIntent, VmNic, VmResources, VmSpec,
};
use crate::config::ControlPlaneConfig;
use crate::providers::traits::{
    ClientError, ClusterEntity, ControlPlane, ImageEntity, SubnetEntity, SubnetKind, TaskInfo,
    TaskStatus, VmCreateRequest, VmCreated, VmEntity,
};

/// Path prefix of the v3 API.
const API_PREFIX: &str = "api/nutanix/v3";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Page size used when listing entities.
const LIST_PAGE_SIZE: u32 = 250;

/// Reason code the API uses for missing entities.
const ENTITY_NOT_FOUND: &str = "ENTITY_NOT_FOUND";

/// Prism Central control plane client.
#[derive(Clone)]
pub struct PrismCentral {
    /// HTTP client.
    client: Client,
    /// API base URL (scheme, host and port).
    base_url: Url,
    /// User name for basic auth.
    username: String,
    /// Password for basic auth.
    password: String,
}

impl PrismCentral {
    /// Create a new Prism Central client.
    ///
    /// # Errors
    /// Returns error if the configuration is incomplete, the trust bundle is
    /// not valid PEM, or the HTTP client cannot be created.
    pub fn new(config: &ControlPlaneConfig) -> Result<Self, ClientError> {
        let base_url = config
            .base_url()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let (username, password) = config
            .credentials()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let mut builder = Client::builder().timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        if let Some(pem) = config.trust_bundle() {
            let certs = Certificate::from_pem_bundle(pem.as_bytes())
                .map_err(|e| ClientError::Config(format!("invalid trust bundle: {e}")))?;
            debug!(count = certs.len(), "Adding trust bundle certificates");
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if config.insecure {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Build the URL of a v3 API path.
    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(&format!("{API_PREFIX}/{path}"))
            .map_err(|e| ClientError::Config(format!("invalid API path '{path}': {e}")))
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path)?;
        debug!(url = %url, "GET request");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let url = self.url(path)?;
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(body)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Handle API response, parsing JSON or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ClientError::Serialization(e)
            })
        } else if status == StatusCode::NOT_FOUND || Self::is_entity_not_found(&text) {
            Err(ClientError::NotFound(Self::error_message(&text)))
        } else {
            Err(ClientError::Api {
                status: status.as_u16(),
                message: Self::error_message(&text),
            })
        }
    }

    /// Whether an error body carries the `ENTITY_NOT_FOUND` reason.
    fn is_entity_not_found(text: &str) -> bool {
        serde_json::from_str::<ApiErrorBody>(text).map_or_else(
            |_| text.contains(ENTITY_NOT_FOUND),
            |body| {
                body.message_list
                    .iter()
                    .any(|m| m.reason.as_deref() == Some(ENTITY_NOT_FOUND))
            },
        )
    }

    /// Human readable message from an error body, falling back to the raw text.
    fn error_message(text: &str) -> String {
        serde_json::from_str::<ApiErrorBody>(text)
            .ok()
            .and_then(|body| {
                let messages: Vec<String> = body
                    .message_list
                    .into_iter()
                    .filter_map(|m| m.message.or(m.reason))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            })
            .unwrap_or_else(|| text.to_string())
    }

    /// List every entity of `kind` matching `filter`, following pagination.
    async fn list_all<T: serde::de::DeserializeOwned>(
        &self,
        kind: &str,
        filter: &str,
    ) -> Result<Vec<T>, ClientError> {
        let mut entities = Vec::new();
        let mut offset = 0;

        loop {
            let body = ListRequest {
                kind: kind.to_string(),
                filter: (!filter.is_empty()).then(|| filter.to_string()),
                length: LIST_PAGE_SIZE,
                offset,
            };
            let page: ListResponse<T> = self.post(&format!("{kind}s/list"), &body).await?;

            let fetched = u32::try_from(page.entities.len()).unwrap_or(u32::MAX);
            entities.extend(page.entities);

            let total = page.metadata.total_matches.unwrap_or(0);
            debug!(kind, filter, offset, fetched, total, "Listed page");

            if fetched == 0 || u32::try_from(entities.len()).unwrap_or(u32::MAX) >= total {
                break;
            }
            offset += fetched;
        }

        Ok(entities)
    }

    fn require_uuid(kind: &str, uuid: Option<String>) -> Result<String, ClientError> {
        uuid.filter(|u| !u.is_empty())
            .ok_or_else(|| ClientError::Malformed(format!("{kind} without metadata.uuid")))
    }

    /// Convert a cluster intent to our entity type.
    fn to_cluster(intent: ClusterIntent) -> Result<ClusterEntity, ClientError> {
        let id = Self::require_uuid("cluster", intent.metadata.uuid)?;
        let (status_name, services) = match intent.status {
            Some(status) => {
                let services = status
                    .resources
                    .and_then(|r| r.config)
                    .map(|c| c.service_list.into_iter().flatten().collect())
                    .unwrap_or_default();
                (status.name, services)
            }
            None => (None, Vec::new()),
        };

        Ok(ClusterEntity {
            id,
            name: intent.spec.and_then(|s| s.name).or(status_name),
            services,
        })
    }

    /// Convert a subnet intent to our entity type.
    fn to_subnet(intent: SubnetIntent) -> Result<SubnetEntity, ClientError> {
        let id = Self::require_uuid("subnet", intent.metadata.uuid)?;
        let (name, kind, cluster_id) = match intent.spec {
            Some(spec) => (
                spec.name,
                spec.resources
                    .and_then(|r| r.subnet_type)
                    .map(|t| SubnetKind::from_api(&t)),
                spec.cluster_reference.and_then(|r| r.uuid),
            ),
            None => (None, None, None),
        };

        Ok(SubnetEntity {
            id,
            name,
            kind,
            cluster_id,
        })
    }

    /// Convert an image intent to our entity type.
    fn to_image(intent: ImageIntent) -> Result<ImageEntity, ClientError> {
        Ok(ImageEntity {
            id: Self::require_uuid("image", intent.metadata.uuid)?,
            name: intent.spec.and_then(|s| s.name),
        })
    }

    /// Convert a VM intent to our entity type.
    fn to_vm(intent: VmIntent) -> Result<VmEntity, ClientError> {
        let created_at = intent
            .metadata
            .creation_time
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));
        let id = Self::require_uuid("vm", intent.metadata.uuid)?;
        let (name, cluster_id) = intent
            .spec
            .map(|s| (s.name, s.cluster_reference.and_then(|r| r.uuid)))
            .unwrap_or_default();

        Ok(VmEntity {
            id,
            name,
            power_state: intent
                .status
                .and_then(|s| s.resources)
                .and_then(|r| r.power_state),
            cluster_id,
            created_at,
        })
    }

    /// Convert listed intents, skipping entries that cannot be converted.
    ///
    /// A skipped entry never matches a lookup, so one incomplete record does
    /// not hide the others.
    fn convert_listed<I, O>(
        kind: &str,
        intents: Vec<I>,
        convert: fn(I) -> Result<O, ClientError>,
    ) -> Vec<O> {
        intents
            .into_iter()
            .filter_map(|intent| match convert(intent) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(kind, error = %e, "Skipping malformed list entry");
                    None
                }
            })
            .collect()
    }

    /// Map an API task status string to our status type.
    fn to_task_status(status: &str) -> TaskStatus {
        match status {
            "QUEUED" | "PENDING" => TaskStatus::Queued,
            "RUNNING" => TaskStatus::Running,
            "SUCCEEDED" => TaskStatus::Succeeded,
            "FAILED" => TaskStatus::Failed,
            "INVALID_UUID" => TaskStatus::InvalidUuid,
            _ => TaskStatus::Unknown,
        }
    }

    /// Build the v3 request body for a VM creation.
    fn to_create_body(req: &VmCreateRequest) -> VmCreateBody {
        VmCreateBody {
            metadata: CreateMetadata {
                kind: "vm".to_string(),
                spec_version: 1,
            },
            spec: VmSpec {
                name: req.name.clone(),
                cluster_reference: Reference::new("cluster", &req.cluster_id),
                resources: VmResources {
                    boot_config: BootConfig {
                        boot_type: req.boot_type.to_string(),
                    },
                    nic_list: vec![VmNic {
                        subnet_reference: Reference::new("subnet", &req.subnet_id),
                    }],
                    disk_list: vec![VmDisk {
                        data_source_reference: Reference::new("image", &req.image_id),
                        disk_size_mib: req.disk_mib,
                    }],
                    memory_size_mib: req.memory_mib,
                    num_vcpus_per_socket: req.cores_per_socket,
                    num_sockets: req.sockets,
                    power_state: if req.power_on { "ON" } else { "OFF" }.to_string(),
                    hardware_clock_timezone: req.clock_timezone.clone(),
                    guest_customization: GuestCustomization {
                        is_overridable: req.cloud_init.overridable,
                        cloud_init: CloudInit {
                            user_data: req.cloud_init.user_data.clone(),
                            meta_data: req.cloud_init.meta_data.clone(),
                        },
                    },
                },
            },
        }
    }
}

#[async_trait]
impl ControlPlane for PrismCentral {
    async fn get_cluster(&self, id: &str) -> Result<ClusterEntity, ClientError> {
        let intent: ClusterIntent = self.get(&format!("clusters/{id}")).await?;
        Self::to_cluster(intent)
    }

    async fn list_clusters(&self, filter: &str) -> Result<Vec<ClusterEntity>, ClientError> {
        let intents = self.list_all::<ClusterIntent>("cluster", filter).await?;
        Ok(Self::convert_listed("cluster", intents, Self::to_cluster))
    }

    async fn get_subnet(&self, id: &str) -> Result<SubnetEntity, ClientError> {
        let intent: SubnetIntent = self.get(&format!("subnets/{id}")).await?;
        Self::to_subnet(intent)
    }

    async fn list_subnets(&self, filter: &str) -> Result<Vec<SubnetEntity>, ClientError> {
        let intents = self.list_all::<SubnetIntent>("subnet", filter).await?;
        Ok(Self::convert_listed("subnet", intents, Self::to_subnet))
    }

    async fn get_image(&self, id: &str) -> Result<ImageEntity, ClientError> {
        let intent: ImageIntent = self.get(&format!("images/{id}")).await?;
        Self::to_image(intent)
    }

    async fn list_images(&self, filter: &str) -> Result<Vec<ImageEntity>, ClientError> {
        let intents = self.list_all::<ImageIntent>("image", filter).await?;
        Ok(Self::convert_listed("image", intents, Self::to_image))
    }

    async fn get_vm(&self, id: &str) -> Result<VmEntity, ClientError> {
        let intent: VmIntent = self.get(&format!("vms/{id}")).await?;
        Self::to_vm(intent)
    }

    async fn list_vms(&self, filter: &str) -> Result<Vec<VmEntity>, ClientError> {
        let intents = self.list_all::<VmIntent>("vm", filter).await?;
        Ok(Self::convert_listed("vm", intents, Self::to_vm))
    }

    async fn create_vm(&self, req: &VmCreateRequest) -> Result<VmCreated, ClientError> {
        info!(
            name = %req.name,
            cluster_id = %req.cluster_id,
            subnet_id = %req.subnet_id,
            image_id = %req.image_id,
            "Submitting VM creation"
        );

        let intent: VmIntent = self.post("vms", &Self::to_create_body(req)).await?;

        let task_id = intent
            .status
            .as_ref()
            .and_then(|s| s.execution_context.as_ref())
            .and_then(super::models::ExecutionContext::first_task_uuid)
            .ok_or_else(|| ClientError::Malformed("vm create response without task uuid".into()))?;
        let vm_id = Self::require_uuid("vm", intent.metadata.uuid)?;

        info!(vm_id = %vm_id, task_id = %task_id, "VM creation accepted");
        Ok(VmCreated { vm_id, task_id })
    }

    async fn get_task(&self, id: &str) -> Result<TaskInfo, ClientError> {
        let task: TaskResponse = self.get(&format!("tasks/{id}")).await?;
        let status = task
            .status
            .as_deref()
            .map_or(TaskStatus::Unknown, Self::to_task_status);

        Ok(TaskInfo {
            id: task.uuid.unwrap_or_else(|| id.to_string()),
            status,
            error_detail: task.error_detail,
            progress_message: task.progress_message,
            percentage_complete: task.percentage_complete,
        })
    }
}
