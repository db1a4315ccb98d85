//! Name to UUID resolution against the control plane catalog.
//!
//! Names are looked up with an exact-name filter and then post-filtered per
//! entity kind. A name must match exactly one entity; zero or several matches
//! are errors, never resolved by picking the first.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{EntityKind, Error};
use crate::providers::{
    ClientError, ClusterEntity, ControlPlane, ImageEntity, SubnetEntity, SubnetKind, VmEntity,
};

/// Service that marks a cluster as a Prism Element able to host VMs.
pub const CLUSTER_SERVICE: &str = "AOS";

/// A reference to a catalog entity, either by name or by UUID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// Human readable name, resolved through the catalog.
    Name(String),
    /// UUID, used directly after confirming it exists.
    Id(String),
}

impl EntityRef {
    /// Build a reference from optional name and id inputs.
    ///
    /// Empty or whitespace-only strings count as absent; anything else is
    /// kept exactly as given. The id wins when both are given.
    ///
    /// # Errors
    /// Returns [`Error::MissingReference`] when neither is supplied.
    pub fn from_parts(
        kind: EntityKind,
        name: Option<&str>,
        id: Option<&str>,
    ) -> Result<Self, Error> {
        let present = |v: Option<&str>| v.filter(|v| !v.trim().is_empty()).map(String::from);

        match (present(name), present(id)) {
            (_, Some(id)) => Ok(Self::Id(id)),
            (Some(name), None) => Ok(Self::Name(name)),
            (None, None) => Err(Error::MissingReference { kind }),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Exact-name filter expression for catalog lists.
fn name_filter(name: &str) -> String {
    format!("name=={name}")
}

/// Exact-name filter expression for VM lists.
fn vm_name_filter(name: &str) -> String {
    format!("vm_name=={name}")
}

fn has_name(name: Option<&str>, wanted: &str) -> bool {
    name == Some(wanted)
}

/// Cluster filter: exact name and the cluster service enabled.
fn cluster_matches(cluster: &ClusterEntity, name: &str) -> bool {
    has_name(cluster.name.as_deref(), name)
        && cluster
            .services
            .iter()
            .any(|s| s.eq_ignore_ascii_case(CLUSTER_SERVICE))
}

/// Subnet filter: exact name, and either overlay or owned by `cluster_id`.
fn subnet_matches(subnet: &SubnetEntity, name: &str, cluster_id: &str) -> bool {
    if !has_name(subnet.name.as_deref(), name) {
        return false;
    }
    match &subnet.kind {
        Some(SubnetKind::Overlay) => true,
        Some(_) => subnet.cluster_id.as_deref() == Some(cluster_id),
        None => false,
    }
}

/// Exactly one survivor, or a not-found / ambiguity error.
fn exactly_one<T>(kind: EntityKind, name: &str, mut found: Vec<T>) -> Result<T, Error> {
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(Error::NotFoundByName {
            kind,
            name: name.to_string(),
        }),
        count => Err(Error::Ambiguous {
            kind,
            name: name.to_string(),
            count,
        }),
    }
}

/// Map a lookup-by-id failure, keeping not-found distinct from transport errors.
fn id_error(kind: EntityKind, id: &str, source: ClientError) -> Error {
    if source.is_not_found() {
        Error::IdNotFound {
            kind,
            id: id.to_string(),
            source,
        }
    } else {
        Error::Remote {
            action: format!("get {kind} {id}"),
            source,
        }
    }
}

fn list_error(kind: EntityKind, name: &str, source: ClientError) -> Error {
    Error::Remote {
        action: format!("list {kind}s named '{name}'"),
        source,
    }
}

/// Resolves names and UUIDs of clusters, subnets, images and VMs.
#[derive(Clone)]
pub struct Resolver {
    client: Arc<dyn ControlPlane>,
}

impl Resolver {
    /// Create a resolver over a control plane client.
    #[must_use]
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self { client }
    }

    /// Resolve a cluster to its UUID.
    ///
    /// # Errors
    /// Returns an error if the cluster cannot be resolved to exactly one UUID.
    pub async fn resolve_cluster(&self, cluster: &EntityRef) -> Result<String, Error> {
        let kind = EntityKind::Cluster;
        let id = match cluster {
            EntityRef::Id(id) => {
                self.client
                    .get_cluster(id)
                    .await
                    .map_err(|e| id_error(kind, id, e))?
                    .id
            }
            EntityRef::Name(name) => {
                let clusters = self
                    .client
                    .list_clusters(&name_filter(name))
                    .await
                    .map_err(|e| list_error(kind, name, e))?;
                debug!(name = %name, candidates = clusters.len(), "Listed clusters");

                let found: Vec<ClusterEntity> = clusters
                    .into_iter()
                    .filter(|c| cluster_matches(c, name))
                    .collect();
                exactly_one(kind, name, found)?.id
            }
        };

        info!(cluster = %cluster, cluster_id = %id, "Resolved cluster");
        Ok(id)
    }

    /// Resolve a subnet to its UUID.
    ///
    /// Overlay subnets are visible from every cluster and always eligible;
    /// other subnets must belong to `cluster_id`.
    ///
    /// # Errors
    /// Returns an error if the subnet cannot be resolved to exactly one UUID.
    pub async fn resolve_subnet(
        &self,
        cluster_id: &str,
        subnet: &EntityRef,
    ) -> Result<String, Error> {
        let kind = EntityKind::Subnet;
        let id = match subnet {
            EntityRef::Id(id) => {
                self.client
                    .get_subnet(id)
                    .await
                    .map_err(|e| id_error(kind, id, e))?
                    .id
            }
            EntityRef::Name(name) => {
                let subnets = self
                    .client
                    .list_subnets(&name_filter(name))
                    .await
                    .map_err(|e| list_error(kind, name, e))?;
                debug!(name = %name, candidates = subnets.len(), "Listed subnets");

                let found: Vec<SubnetEntity> = subnets
                    .into_iter()
                    .filter(|s| subnet_matches(s, name, cluster_id))
                    .collect();
                exactly_one(kind, name, found)?.id
            }
        };

        info!(subnet = %subnet, subnet_id = %id, "Resolved subnet");
        Ok(id)
    }

    /// Resolve an image to its UUID.
    ///
    /// # Errors
    /// Returns an error if the image cannot be resolved to exactly one UUID.
    pub async fn resolve_image(&self, image: &EntityRef) -> Result<String, Error> {
        let kind = EntityKind::Image;
        let id = match image {
            EntityRef::Id(id) => {
                self.client
                    .get_image(id)
                    .await
                    .map_err(|e| id_error(kind, id, e))?
                    .id
            }
            EntityRef::Name(name) => {
                let images = self
                    .client
                    .list_images(&name_filter(name))
                    .await
                    .map_err(|e| list_error(kind, name, e))?;
                debug!(name = %name, candidates = images.len(), "Listed images");

                let found: Vec<ImageEntity> = images
                    .into_iter()
                    .filter(|i| has_name(i.name.as_deref(), name))
                    .collect();
                exactly_one(kind, name, found)?.id
            }
        };

        info!(image = %image, image_id = %id, "Resolved image");
        Ok(id)
    }

    /// Find a VM by UUID. A VM the control plane does not know is `None`.
    ///
    /// # Errors
    /// Returns an error if the lookup fails for any other reason.
    pub async fn find_vm_by_id(&self, id: &str) -> Result<Option<VmEntity>, Error> {
        match self.client.get_vm(id).await {
            Ok(vm) => Ok(Some(vm)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(id_error(EntityKind::Vm, id, e)),
        }
    }

    /// Find a VM by name. No match is `None`; several matches are an error.
    ///
    /// # Errors
    /// Returns an error if the name is ambiguous or the lookup fails.
    pub async fn find_vm_by_name(&self, name: &str) -> Result<Option<VmEntity>, Error> {
        let kind = EntityKind::Vm;
        let vms = self
            .client
            .list_vms(&vm_name_filter(name))
            .await
            .map_err(|e| list_error(kind, name, e))?;

        let found: Vec<VmEntity> = vms
            .into_iter()
            .filter(|vm| has_name(vm.name.as_deref(), name))
            .collect();

        match exactly_one(kind, name, found) {
            Ok(vm) => self.find_vm_by_id(&vm.id).await,
            Err(Error::NotFoundByName { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Find a VM by name or UUID.
    ///
    /// # Errors
    /// Returns an error if the name is ambiguous or the lookup fails.
    pub async fn find_vm(&self, vm: &EntityRef) -> Result<Option<VmEntity>, Error> {
        match vm {
            EntityRef::Id(id) => self.find_vm_by_id(id).await,
            EntityRef::Name(name) => self.find_vm_by_name(name).await,
        }
    }
}
