//! End-to-end VM provisioning.
//!
//! Resolves the cluster, subnet and image, submits the creation request and
//! waits for the resulting task. Steps run in order and the first failure
//! aborts the sequence. A VM that was submitted but whose task later fails
//! is left in place.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::Error;
use crate::providers::{BootType, CloudInitPayload, ControlPlane, VmCreateRequest};
use crate::resolve::{EntityRef, Resolver};
use crate::task::TaskTracker;

/// Default VM name.
pub const DEFAULT_VM_NAME: &str = "cluster-api-nutanix-provider";

/// Compute shape and creation options of the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmShape {
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
    /// Allow the guest customization to be overridden.
    pub customization_overridable: bool,
}

impl Default for VmShape {
    fn default() -> Self {
        Self {
            boot_type: BootType::Uefi,
            memory_mib: 4096,
            sockets: 2,
            cores_per_socket: 2,
            disk_mib: 8192,
            power_on: true,
            clock_timezone: "UTC".to_string(),
            customization_overridable: true,
        }
    }
}

/// What to provision.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// VM name, also written into the guest as its hostname.
    pub vm_name: String,
    /// Target cluster.
    pub cluster: EntityRef,
    /// Subnet for the VM's NIC.
    pub subnet: EntityRef,
    /// Image backing the boot disk.
    pub image: EntityRef,
    /// Pre-rendered cloud-init user-data.
    pub user_data: String,
}

/// UUIDs the request's references resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRefs {
    /// Cluster UUID.
    pub cluster_id: String,
    /// Subnet UUID.
    pub subnet_id: String,
    /// Image UUID.
    pub image_id: String,
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    /// UUID of the created VM.
    pub vm_id: String,
    /// UUID of the creation task.
    pub task_id: String,
    /// Cluster UUID.
    pub cluster_id: String,
    /// Subnet UUID.
    pub subnet_id: String,
    /// Image UUID.
    pub image_id: String,
}

fn encode(content: &str) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, content)
}

/// Cloud-init payload for a VM.
///
/// The meta-data carries the hostname and a correlation UUID. The UUID only
/// identifies the guest; it does not deduplicate creation requests.
#[must_use]
pub fn cloud_init_payload(
    hostname: &str,
    user_data: &str,
    correlation: Uuid,
    overridable: bool,
) -> CloudInitPayload {
    let meta_data = serde_json::json!({
        "hostname": hostname,
        "uuid": correlation.to_string(),
    })
    .to_string();

    CloudInitPayload {
        user_data: encode(user_data),
        meta_data: encode(&meta_data),
        overridable,
    }
}

/// Assemble the creation request from resolved UUIDs and the VM shape.
#[must_use]
pub fn build_create_request(
    req: &ProvisionRequest,
    refs: &ResolvedRefs,
    shape: &VmShape,
    correlation: Uuid,
) -> VmCreateRequest {
    VmCreateRequest {
        name: req.vm_name.clone(),
        cluster_id: refs.cluster_id.clone(),
        subnet_id: refs.subnet_id.clone(),
        image_id: refs.image_id.clone(),
        boot_type: shape.boot_type,
        memory_mib: shape.memory_mib,
        sockets: shape.sockets,
        cores_per_socket: shape.cores_per_socket,
        disk_mib: shape.disk_mib,
        power_on: shape.power_on,
        clock_timezone: shape.clock_timezone.clone(),
        cloud_init: cloud_init_payload(
            &req.vm_name,
            &req.user_data,
            correlation,
            shape.customization_overridable,
        ),
    }
}

/// Runs the resolve, submit and wait sequence.
pub struct Provisioner {
    client: Arc<dyn ControlPlane>,
    resolver: Resolver,
    tracker: TaskTracker,
    shape: VmShape,
}

impl Provisioner {
    /// Create a provisioner with the default VM shape.
    #[must_use]
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&client)),
            tracker: TaskTracker::new(Arc::clone(&client)),
            client,
            shape: VmShape::default(),
        }
    }

    /// Set the VM shape.
    #[must_use]
    pub fn with_shape(mut self, shape: VmShape) -> Self {
        self.shape = shape;
        self
    }

    /// Resolve the cluster, subnet and image references.
    ///
    /// The subnet is resolved after the cluster because non-overlay subnets
    /// are scoped to it.
    ///
    /// # Errors
    /// Returns an error naming the reference that failed to resolve.
    pub async fn resolve(&self, req: &ProvisionRequest) -> Result<ResolvedRefs, Error> {
        let cluster_id = self
            .resolver
            .resolve_cluster(&req.cluster)
            .await
            .map_err(|e| e.context(format!("get identifier for cluster {}", req.cluster)))?;

        let subnet_id = self
            .resolver
            .resolve_subnet(&cluster_id, &req.subnet)
            .await
            .map_err(|e| e.context(format!("get identifier for subnet {}", req.subnet)))?;

        let image_id = self
            .resolver
            .resolve_image(&req.image)
            .await
            .map_err(|e| e.context(format!("get identifier for image {}", req.image)))?;

        Ok(ResolvedRefs {
            cluster_id,
            subnet_id,
            image_id,
        })
    }

    /// Provision a VM and wait for its creation task to finish.
    ///
    /// Every run creates a new VM; re-running after a failure does not reuse
    /// an earlier attempt.
    ///
    /// # Errors
    /// Returns an error wrapped with the step that failed.
    pub async fn provision(
        &self,
        req: &ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<ProvisionOutcome, Error> {
        let refs = self.resolve(req).await?;

        let create = build_create_request(req, &refs, &self.shape, Uuid::new_v4());
        info!(
            vm_name = %create.name,
            memory_mib = create.memory_mib,
            sockets = create.sockets,
            cores_per_socket = create.cores_per_socket,
            disk_mib = create.disk_mib,
            "Creating VM"
        );

        let created = self
            .client
            .create_vm(&create)
            .await
            .map_err(|source| Error::Remote {
                action: format!("create vm {}", create.name),
                source,
            })?;
        info!(vm_id = %created.vm_id, task_id = %created.task_id, "Task started");

        self.tracker
            .wait_for_task(&created.task_id, cancel)
            .await
            .map_err(|e| e.context(format!("create vm {}", create.name)))?;

        info!(vm_id = %created.vm_id, "VM created");
        Ok(ProvisionOutcome {
            vm_id: created.vm_id,
            task_id: created.task_id,
            cluster_id: refs.cluster_id,
            subnet_id: refs.subnet_id,
            image_id: refs.image_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::EntityKind;
    use crate::providers::{
        ClusterEntity, ImageEntity, MockControlPlane, SubnetEntity, SubnetKind, TaskInfo,
        TaskStatus, VmCreated,
    };

    fn decode(encoded: &str) -> String {
        let bytes =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            vm_name: "capx".into(),
            cluster: EntityRef::Name("prod".into()),
            subnet: EntityRef::Name("app-net".into()),
            image: EntityRef::Name("ubuntu22".into()),
            user_data: "#cloud-config\n".into(),
        }
    }

    fn refs() -> ResolvedRefs {
        ResolvedRefs {
            cluster_id: "c-1".into(),
            subnet_id: "s-9".into(),
            image_id: "i-4".into(),
        }
    }

    fn catalog(mock: &mut MockControlPlane) {
        mock.expect_list_clusters().returning(|_| {
            Ok(vec![ClusterEntity {
                id: "c-1".into(),
                name: Some("prod".into()),
                services: vec!["AOS".into()],
            }])
        });
        mock.expect_list_subnets().returning(|_| {
            Ok(vec![SubnetEntity {
                id: "s-9".into(),
                name: Some("app-net".into()),
                kind: Some(SubnetKind::Overlay),
                cluster_id: None,
            }])
        });
        mock.expect_list_images().returning(|_| {
            Ok(vec![ImageEntity {
                id: "i-4".into(),
                name: Some("ubuntu22".into()),
            }])
        });
    }

    #[test]
    fn test_default_shape() {
        let shape = VmShape::default();
        assert_eq!(shape.boot_type, BootType::Uefi);
        assert_eq!(shape.memory_mib, 4096);
        assert_eq!(shape.sockets, 2);
        assert_eq!(shape.cores_per_socket, 2);
        assert_eq!(shape.disk_mib, 8192);
        assert!(shape.power_on);
        assert_eq!(shape.clock_timezone, "UTC");
        assert!(shape.customization_overridable);
    }

    #[test]
    fn test_build_create_request_embeds_customization() {
        let correlation = Uuid::new_v4();
        let create = build_create_request(&request(), &refs(), &VmShape::default(), correlation);

        assert_eq!(create.cluster_id, "c-1");
        assert_eq!(create.subnet_id, "s-9");
        assert_eq!(create.image_id, "i-4");
        assert_eq!(decode(&create.cloud_init.user_data), "#cloud-config\n");

        let meta: serde_json::Value =
            serde_json::from_str(&decode(&create.cloud_init.meta_data)).unwrap();
        assert_eq!(meta["hostname"], "capx");
        assert_eq!(meta["uuid"], correlation.to_string());
    }

    #[test]
    fn test_custom_shape_is_applied() {
        let shape = VmShape {
            memory_mib: 16384,
            sockets: 4,
            power_on: false,
            ..VmShape::default()
        };
        let create = build_create_request(&request(), &refs(), &shape, Uuid::new_v4());
        assert_eq!(create.memory_mib, 16384);
        assert_eq!(create.sockets, 4);
        assert!(!create.power_on);
    }

    #[test]
    fn test_each_build_gets_fresh_metadata() {
        let a = build_create_request(&request(), &refs(), &VmShape::default(), Uuid::new_v4());
        let b = build_create_request(&request(), &refs(), &VmShape::default(), Uuid::new_v4());
        assert_ne!(a.cloud_init.meta_data, b.cloud_init.meta_data);
        assert_eq!(a.cloud_init.user_data, b.cloud_init.user_data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_end_to_end() {
        let mut mock = MockControlPlane::new();
        catalog(&mut mock);
        mock.expect_create_vm()
            .withf(|req: &VmCreateRequest| {
                req.cluster_id == "c-1"
                    && req.subnet_id == "s-9"
                    && req.image_id == "i-4"
                    && req.memory_mib == 4096
                    && req.sockets == 2
                    && req.cores_per_socket == 2
                    && req.disk_mib == 8192
                    && req.boot_type == BootType::Uefi
            })
            .times(1)
            .returning(|_| {
                Ok(VmCreated {
                    vm_id: "vm-1".into(),
                    task_id: "op-77".into(),
                })
            });

        let statuses = Mutex::new(vec![TaskStatus::Succeeded, TaskStatus::Running]);
        mock.expect_get_task()
            .withf(|id: &str| id == "op-77")
            .times(2)
            .returning(move |id| {
                let status = statuses.lock().unwrap().pop().unwrap();
                Ok(TaskInfo {
                    id: id.into(),
                    status,
                    error_detail: None,
                    progress_message: None,
                    percentage_complete: None,
                })
            });

        let outcome = Provisioner::new(Arc::new(mock))
            .provision(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProvisionOutcome {
                vm_id: "vm-1".into(),
                task_id: "op-77".into(),
                cluster_id: "c-1".into(),
                subnet_id: "s-9".into(),
                image_id: "i-4".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_before_create() {
        let mut mock = MockControlPlane::new();
        mock.expect_list_clusters().returning(|_| {
            Ok(vec![ClusterEntity {
                id: "c-1".into(),
                name: Some("prod".into()),
                services: vec!["AOS".into()],
            }])
        });
        mock.expect_list_subnets().returning(|_| Ok(vec![]));
        mock.expect_list_images().never();
        mock.expect_create_vm().never();

        let err = Provisioner::new(Arc::new(mock))
            .provision(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err
            .to_string()
            .starts_with("failed to get identifier for subnet app-net"));
        assert!(matches!(
            err.root(),
            Error::NotFoundByName {
                kind: EntityKind::Subnet,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_failure_is_reported_with_step() {
        let mut mock = MockControlPlane::new();
        catalog(&mut mock);
        mock.expect_create_vm().returning(|_| {
            Ok(VmCreated {
                vm_id: "vm-1".into(),
                task_id: "op-77".into(),
            })
        });
        mock.expect_get_task().times(1).returning(|id| {
            Ok(TaskInfo {
                id: id.into(),
                status: TaskStatus::Failed,
                error_detail: Some("image not ready".into()),
                progress_message: None,
                percentage_complete: None,
            })
        });

        let err = Provisioner::new(Arc::new(mock))
            .provision(&request(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("create vm capx"));
        assert!(err.to_string().contains("image not ready"));
        assert!(!err.is_cancelled());
    }
}
