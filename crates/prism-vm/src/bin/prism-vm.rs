//! Prism VM CLI - provision virtual machines on Prism Central.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use prism_vm::error::EntityKind;
use prism_vm::providers::ControlPlane;
use prism_vm::provision::DEFAULT_VM_NAME;
use prism_vm::{
    ControlPlaneConfig, EntityRef, PrismCentral, ProvisionRequest, Provisioner, Resolver,
    TaskTracker, VmShape,
};

/// Prism VM CLI - provision virtual machines on Prism Central.
#[derive(Parser)]
#[command(name = "prism-vm")]
#[command(about = "Provision and inspect virtual machines on Prism Central")]
struct Cli {
    #[command(flatten)]
    control_plane: ControlPlaneConfig,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a VM and wait for the creation task to finish.
    Create {
        /// VM name.
        #[arg(long, default_value = DEFAULT_VM_NAME)]
        vm_name: String,

        /// Cluster name.
        #[arg(long)]
        cluster: Option<String>,

        /// Cluster UUID (takes precedence over --cluster).
        #[arg(long)]
        cluster_id: Option<String>,

        /// Subnet name.
        #[arg(long)]
        subnet: Option<String>,

        /// Subnet UUID (takes precedence over --subnet).
        #[arg(long)]
        subnet_id: Option<String>,

        /// Image name.
        #[arg(long)]
        image: Option<String>,

        /// Image UUID (takes precedence over --image).
        #[arg(long)]
        image_id: Option<String>,

        /// File holding the rendered cloud-init user-data.
        #[arg(long)]
        user_data: PathBuf,

        /// Memory in MiB.
        #[arg(long, default_value = "4096")]
        memory_mib: i64,

        /// Number of CPU sockets.
        #[arg(long, default_value = "2")]
        sockets: i64,

        /// Cores per socket.
        #[arg(long, default_value = "2")]
        cores_per_socket: i64,

        /// Boot disk size in MiB.
        #[arg(long, default_value = "8192")]
        disk_mib: i64,

        /// Give up waiting after this many seconds. Waits indefinitely if unset.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Look up a VM by name or UUID.
    GetVm {
        /// VM name.
        #[arg(long)]
        name: Option<String>,

        /// VM UUID.
        #[arg(long)]
        id: Option<String>,
    },

    /// Wait for an existing task to finish.
    WaitTask {
        /// Task UUID.
        #[arg(long)]
        id: String,

        /// Give up waiting after this many seconds. Waits indefinitely if unset.
        #[arg(long)]
        timeout: Option<u64>,
    },
}

/// Cancellation token fired by Ctrl-C or, if set, the deadline.
fn cancellation(timeout: Option<u64>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    if let Some(secs) = timeout {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "Deadline reached, cancelling");
            on_deadline.cancel();
        });
    }

    cancel
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client: Arc<dyn ControlPlane> = Arc::new(
        PrismCentral::new(&cli.control_plane).context("Failed to create Prism Central client")?,
    );

    match cli.command {
        Commands::Create {
            vm_name,
            cluster,
            cluster_id,
            subnet,
            subnet_id,
            image,
            image_id,
            user_data,
            memory_mib,
            sockets,
            cores_per_socket,
            disk_mib,
            timeout,
        } => {
            let request = ProvisionRequest {
                vm_name,
                cluster: EntityRef::from_parts(
                    EntityKind::Cluster,
                    cluster.as_deref(),
                    cluster_id.as_deref(),
                )?,
                subnet: EntityRef::from_parts(
                    EntityKind::Subnet,
                    subnet.as_deref(),
                    subnet_id.as_deref(),
                )?,
                image: EntityRef::from_parts(
                    EntityKind::Image,
                    image.as_deref(),
                    image_id.as_deref(),
                )?,
                user_data: std::fs::read_to_string(&user_data).with_context(|| {
                    format!("Failed to read user-data from {}", user_data.display())
                })?,
            };

            let shape = VmShape {
                memory_mib,
                sockets,
                cores_per_socket,
                disk_mib,
                ..VmShape::default()
            };

            info!(vm_name = %request.vm_name, "Provisioning VM");
            let outcome = Provisioner::new(client)
                .with_shape(shape)
                .provision(&request, &cancellation(timeout))
                .await
                .with_context(|| format!("Failed to provision VM {}", request.vm_name))?;

            println!("\n✅ VM created!");
            println!("  VM ID:    {}", outcome.vm_id);
            println!("  Task ID:  {}", outcome.task_id);
            println!("  Cluster:  {}", outcome.cluster_id);
            println!("  Subnet:   {}", outcome.subnet_id);
            println!("  Image:    {}", outcome.image_id);
        }

        Commands::GetVm { name, id } => {
            let vm_ref = EntityRef::from_parts(EntityKind::Vm, name.as_deref(), id.as_deref())?;
            let Some(vm) = Resolver::new(client).find_vm(&vm_ref).await? else {
                bail!("No VM found for {vm_ref}");
            };

            println!("\nVM Details:");
            println!("  ID:       {}", vm.id);
            println!("  Name:     {}", vm.name.unwrap_or_default());
            println!("  Power:    {}", vm.power_state.unwrap_or_default());
            println!("  Cluster:  {}", vm.cluster_id.unwrap_or_default());
            if let Some(created_at) = vm.created_at {
                println!("  Created:  {created_at}");
            }
        }

        Commands::WaitTask { id, timeout } => {
            let task = TaskTracker::new(client)
                .wait_for_task(&id, &cancellation(timeout))
                .await
                .with_context(|| format!("Task {id} did not succeed"))?;

            println!("\n✅ Task {} {}", task.id, task.status);
        }
    }

    Ok(())
}
