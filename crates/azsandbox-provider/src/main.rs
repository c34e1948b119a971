//! azsandbox: Azure sandbox VM lifecycle tool
//!
//! Tears down sandbox VMs and manages inbound port rules on their security
//! groups.

use anyhow::Result;
use azsandbox_common::PortRule;
use azsandbox_provider::actions::NsgActions;
use azsandbox_provider::azure::AzureClient;
use azsandbox_provider::collaborators::{DisabledIpPool, InMemoryLockManager};
use azsandbox_provider::config::{
    self, DEFAULT_REGION, DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_WAIT_MS,
    DISK_DETACH_MAX_ATTEMPTS,
};
use azsandbox_provider::flows::{
    DeleteInstanceFlow, OpenPortsRequest, open_inbound_ports, provision_vm_security_group,
};
use azsandbox_provider::reservation::{DeployedApp, DeploymentKind, ReservationInfo};
use azsandbox_provider::rollback::CancellationManager;
use azsandbox_provider::wait::PollConfig;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "azsandbox")]
#[command(about = "Azure sandbox VM lifecycle")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Service principal and subscription
#[derive(clap::Args, Debug)]
struct AzureArgs {
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    subscription_id: String,

    #[arg(long, env = "AZURE_TENANT_ID")]
    tenant_id: String,

    #[arg(long, env = "AZURE_CLIENT_ID")]
    client_id: String,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Region for newly created security groups
    #[arg(long, env = "AZURE_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// Attempts for connection and provider-retryable faults
    #[arg(long, default_value_t = DEFAULT_RETRY_MAX_ATTEMPTS)]
    retry_attempts: usize,

    /// Attempts for deleting a disk still attached to a VM
    #[arg(long, default_value_t = DISK_DETACH_MAX_ATTEMPTS)]
    disk_detach_attempts: usize,

    /// Wait between attempts in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_WAIT_MS)]
    retry_wait_ms: u64,

    /// Give up on a long-running operation after this many seconds
    #[arg(long, default_value_t = 30 * 60)]
    operation_timeout_secs: u64,
}

impl From<AzureArgs> for config::ProviderConfig {
    fn from(args: AzureArgs) -> Self {
        Self {
            azure: config::AzureConfig {
                subscription_id: args.subscription_id,
                tenant_id: args.tenant_id,
                client_id: args.client_id,
                client_secret: args.client_secret,
                region: args.region,
            },
            retry: config::RetryConfig {
                transient_attempts: args.retry_attempts,
                disk_detach_attempts: args.disk_detach_attempts,
                wait_ms: args.retry_wait_ms,
            },
            poll: PollConfig {
                timeout: Duration::from_secs(args.operation_timeout_secs),
                ..Default::default()
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete a deployed VM and every resource it owns
    DeleteInstance {
        #[command(flatten)]
        azure: AzureArgs,

        /// VM name
        #[arg(long)]
        vm_name: String,

        /// Sandbox reservation id
        #[arg(long)]
        reservation_id: String,

        /// VM resource group (defaults to the sandbox resource group)
        #[arg(long)]
        resource_group: Option<String>,

        /// Sandbox resource group (defaults to the reservation id)
        #[arg(long)]
        sandbox_resource_group: Option<String>,

        /// Deployment kind: marketplace or custom-image
        #[arg(long, default_value = "marketplace")]
        deployment: DeploymentKind,
    },

    /// Open inbound ports on a security group, rolling back on failure
    OpenPorts {
        #[command(flatten)]
        azure: AzureArgs,

        #[arg(long)]
        vm_name: String,

        /// Existing security group; omit with --create-nsg
        #[arg(long, required_unless_present = "create_nsg")]
        nsg_name: Option<String>,

        #[arg(long)]
        resource_group: String,

        /// Create NSG_<vm_name> first
        #[arg(long)]
        create_nsg: bool,

        /// Port spec: 80, 20-80, 22:tcp or 80-50000:udp (repeatable)
        #[arg(long = "port", required = true)]
        ports: Vec<String>,
    },

    /// Delete every custom_rule_ rule from a security group
    DeleteCustomRules {
        #[command(flatten)]
        azure: AzureArgs,

        #[arg(long)]
        nsg_name: String,

        #[arg(long)]
        resource_group: String,
    },

    /// Parse a port spec and print its range and protocol
    ParsePort {
        spec: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Cancel `cancellation` on the first ctrl-c
fn cancel_on_ctrl_c(cancellation: &CancellationManager) {
    let cancellation = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancellation.cancel();
        }
    });
}

/// Print error and its causes to stderr
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match args.command {
        Command::DeleteInstance {
            azure,
            vm_name,
            reservation_id,
            resource_group,
            sandbox_resource_group,
            deployment,
        } => {
            // Teardown has nothing to roll back; ctrl-c only stops the waits
            let cancellation = CancellationManager::new();
            cancel_on_ctrl_c(&cancellation);
            let client = AzureClient::from_config(&azure.into())?
                .with_cancellation(cancellation.token().clone());

            let reservation = ReservationInfo::from(config::SandboxConfig {
                reservation_id,
                resource_group: sandbox_resource_group,
            });
            let mut app = DeployedApp::new(vm_name).with_kind(deployment);
            if let Some(rg) = resource_group {
                app = app.with_resource_group(rg);
            }

            let locks = InMemoryLockManager::new();
            let flow = DeleteInstanceFlow::new(&client, &reservation, &DisabledIpPool, &locks);
            let report = flow.delete_instance(&app).await?;

            if report.vm_found {
                println!(
                    "Deleted VM {}: {} resources deleted, {} already absent, {} IPs released",
                    report.vm_name,
                    report.deleted.len(),
                    report.already_absent.len(),
                    report.released_ips.len()
                );
            } else {
                println!("VM {} was already deleted", report.vm_name);
            }
        }

        Command::OpenPorts {
            azure,
            vm_name,
            nsg_name,
            resource_group,
            create_nsg,
            ports,
        } => {
            let config: config::ProviderConfig = azure.into();
            let client = AzureClient::from_config(&config)?;
            // Client polls are not cancelled so rollback deletes can finish
            let cancellation = CancellationManager::new();
            cancel_on_ctrl_c(&cancellation);

            if create_nsg {
                let nsg = provision_vm_security_group(
                    &client,
                    &cancellation,
                    &vm_name,
                    &resource_group,
                    config.region(),
                    &ports,
                )
                .await?;
                println!("Created {nsg}");
            } else {
                let nsg_name = nsg_name.unwrap_or_default();
                let request = OpenPortsRequest {
                    vm_name: &vm_name,
                    nsg_name: &nsg_name,
                    resource_group: &resource_group,
                    ports: &ports,
                };
                for rule in open_inbound_ports(&client, &cancellation, &request).await? {
                    println!("{rule}");
                }
            }
        }

        Command::DeleteCustomRules {
            azure,
            nsg_name,
            resource_group,
        } => {
            let client = AzureClient::from_config(&azure.into())?;
            let deleted = NsgActions::new(&client)
                .delete_custom_nsg_rules(&nsg_name, &resource_group)
                .await?;
            info!(nsg_name = %nsg_name, count = deleted.len(), "Deleted custom rules");
            for rule in deleted {
                println!("{rule}");
            }
        }

        Command::ParsePort { spec } => {
            let rule = PortRule::parse(&spec)?;
            let (range, protocol) = rule.as_pair();
            println!("{range} {protocol}");
        }
    }

    Ok(())
}
