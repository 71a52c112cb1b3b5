//! Arca Storage operator CLI
//!
//! Thin front end over the orchestration engine: parses a subcommand,
//! builds the matching request, runs it and prints the result as JSON on
//! stdout. Logs go to stderr.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arca_storage::config::{DEFAULT_BOOTSTRAP_CONFIG_PATH, DEFAULT_RUNTIME_CONFIG_PATH};
use arca_storage::{
    AddExportRequest, ArcaConfig, CloneVolumeRequest, CreateSnapshotRequest, CreateSvmRequest,
    CreateVolumeRequest, Orchestrator,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Arca Storage - SVM, volume, snapshot and export orchestration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bootstrap (install-time) configuration file
    #[arg(long, env = "ARCA_BOOTSTRAP_CONFIG_PATH", default_value = DEFAULT_BOOTSTRAP_CONFIG_PATH)]
    bootstrap_config: PathBuf,

    /// Runtime (operator-tunable) configuration file
    #[arg(long, env = "ARCA_RUNTIME_CONFIG_PATH", default_value = DEFAULT_RUNTIME_CONFIG_PATH)]
    runtime_config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Storage Virtual Machines
    #[command(subcommand)]
    Svm(SvmCommand),
    /// Volumes
    #[command(subcommand)]
    Volume(VolumeCommand),
    /// NFS exports and rendered configuration
    #[command(subcommand)]
    Export(ExportCommand),
    /// Snapshots and clones
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Subcommand, Debug)]
enum SvmCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        vlan: u16,
        /// Service address with prefix, e.g. 192.168.10.5/24
        #[arg(long)]
        ip_cidr: String,
        /// Inferred from the CIDR when omitted
        #[arg(long)]
        gateway: Option<String>,
        #[arg(long, default_value_t = 1500)]
        mtu: u32,
        /// Create a root volume of this size for the cluster Filesystem resource
        #[arg(long)]
        root_size_gib: Option<u64>,
    },
    Delete {
        #[arg(long)]
        name: String,
        /// Delete the SVM's volumes first
        #[arg(long)]
        force: bool,
    },
    List {
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum VolumeCommand {
    Create {
        #[command(flatten)]
        target: VolumeTarget,
        #[arg(long)]
        size_gib: u64,
        /// Allocate from the volume group instead of the thin pool
        #[arg(long)]
        thick: bool,
        #[arg(long, default_value = "xfs")]
        fs_type: String,
    },
    Resize {
        #[command(flatten)]
        target: VolumeTarget,
        #[arg(long)]
        size_gib: u64,
    },
    Delete {
        #[command(flatten)]
        target: VolumeTarget,
        /// Remove the volume's exports and snapshots first
        #[arg(long)]
        force: bool,
    },
    List {
        #[arg(long)]
        svm: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(ClapArgs, Debug)]
struct VolumeTarget {
    #[arg(long)]
    svm: String,
    #[arg(long)]
    name: String,
}

#[derive(Subcommand, Debug)]
enum ExportCommand {
    Add {
        #[arg(long)]
        svm: String,
        #[arg(long)]
        volume: String,
        /// Client network in CIDR form
        #[arg(long)]
        client: String,
        #[arg(long, default_value = "rw")]
        access: String,
        #[arg(long)]
        no_root_squash: bool,
        #[arg(long, value_delimiter = ',', default_value = "sys")]
        sec: Vec<String>,
    },
    Remove {
        #[arg(long)]
        svm: String,
        #[arg(long)]
        volume: String,
        #[arg(long)]
        client: String,
    },
    List {
        #[arg(long)]
        svm: Option<String>,
        #[arg(long)]
        volume: Option<String>,
        #[arg(long)]
        client: Option<String>,
    },
    /// Re-render from the stored export list and reload
    Sync {
        #[arg(long)]
        svm: String,
    },
    /// Restore a rendered configuration snapshot
    Rollback {
        #[arg(long)]
        svm: String,
        #[arg(long, default_value = "latest")]
        version: String,
    },
    /// List rendered configuration snapshots, newest first
    Snapshots {
        #[arg(long)]
        svm: String,
    },
    /// Show the metadata of a configuration snapshot
    Meta {
        #[arg(long)]
        svm: String,
        #[arg(long, default_value = "latest")]
        version: String,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    Create {
        #[command(flatten)]
        target: SnapshotTarget,
    },
    Delete {
        #[command(flatten)]
        target: SnapshotTarget,
    },
    List {
        #[arg(long)]
        svm: Option<String>,
        #[arg(long)]
        volume: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a new volume from a snapshot
    Clone {
        #[arg(long)]
        svm: String,
        /// Name of the new volume
        #[arg(long)]
        name: String,
        #[arg(long)]
        snapshot: String,
        /// Required when the snapshot name exists on several volumes
        #[arg(long)]
        source_volume: Option<String>,
        #[arg(long)]
        size_gib: Option<u64>,
    },
}

#[derive(ClapArgs, Debug)]
struct SnapshotTarget {
    #[arg(long)]
    svm: String,
    #[arg(long)]
    volume: String,
    #[arg(long)]
    name: String,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = ArcaConfig::load(&args.bootstrap_config, &args.runtime_config)
        .context("failed to load configuration")?;
    debug!(
        "Arca Storage {} (state_dir={})",
        arca_storage::VERSION,
        config.state_dir.display()
    );

    let orchestrator = Orchestrator::system(config);

    match args.command {
        Command::Svm(cmd) => run_svm(&orchestrator, cmd).await,
        Command::Volume(cmd) => run_volume(&orchestrator, cmd).await,
        Command::Export(cmd) => run_export(&orchestrator, cmd).await,
        Command::Snapshot(cmd) => run_snapshot(&orchestrator, cmd).await,
    }
}

// =============================================================================
// Subcommands
// =============================================================================

async fn run_svm(o: &Orchestrator, cmd: SvmCommand) -> anyhow::Result<()> {
    match cmd {
        SvmCommand::Create {
            name,
            vlan,
            ip_cidr,
            gateway,
            mtu,
            root_size_gib,
        } => {
            let request = CreateSvmRequest {
                gateway,
                mtu,
                root_volume_size_gib: root_size_gib,
                ..CreateSvmRequest::new(name, vlan, ip_cidr)
            };
            print_json(&o.create_svm(request).await?)
        }
        SvmCommand::Delete { name, force } => print_json(&o.delete_svm(&name, force).await?),
        SvmCommand::List { name } => print_json(&o.list_svms(name.as_deref()).await?),
    }
}

async fn run_volume(o: &Orchestrator, cmd: VolumeCommand) -> anyhow::Result<()> {
    match cmd {
        VolumeCommand::Create {
            target,
            size_gib,
            thick,
            fs_type,
        } => {
            let request = CreateVolumeRequest {
                thin: !thick,
                fs_type,
                ..CreateVolumeRequest::new(target.svm, target.name, size_gib)
            };
            print_json(&o.create_volume(request).await?)
        }
        VolumeCommand::Resize { target, size_gib } => {
            print_json(&o.resize_volume(&target.svm, &target.name, size_gib).await?)
        }
        VolumeCommand::Delete { target, force } => {
            print_json(&o.delete_volume(&target.svm, &target.name, force).await?)
        }
        VolumeCommand::List { svm, name } => {
            print_json(&o.list_volumes(svm.as_deref(), name.as_deref()).await?)
        }
    }
}

async fn run_export(o: &Orchestrator, cmd: ExportCommand) -> anyhow::Result<()> {
    match cmd {
        ExportCommand::Add {
            svm,
            volume,
            client,
            access,
            no_root_squash,
            sec,
        } => {
            let request = AddExportRequest {
                access,
                root_squash: !no_root_squash,
                sec,
                ..AddExportRequest::new(svm, volume, client)
            };
            print_json(&o.add_export(request).await?)
        }
        ExportCommand::Remove {
            svm,
            volume,
            client,
        } => print_json(&o.remove_export(&svm, &volume, &client).await?),
        ExportCommand::List {
            svm,
            volume,
            client,
        } => print_json(
            &o.list_exports(svm.as_deref(), volume.as_deref(), client.as_deref())
                .await?,
        ),
        ExportCommand::Sync { svm } => print_json(&o.sync_exports(&svm).await?),
        ExportCommand::Rollback { svm, version } => {
            print_json(&o.rollback_exports(&svm, &version).await?)
        }
        ExportCommand::Snapshots { svm } => print_json(&o.list_config_snapshots(&svm).await?),
        ExportCommand::Meta { svm, version } => {
            print_json(&o.read_config_snapshot_meta(&svm, &version).await?)
        }
    }
}

async fn run_snapshot(o: &Orchestrator, cmd: SnapshotCommand) -> anyhow::Result<()> {
    match cmd {
        SnapshotCommand::Create { target } => {
            let request = CreateSnapshotRequest {
                svm: target.svm,
                volume: target.volume,
                name: target.name,
            };
            print_json(&o.create_snapshot(request).await?)
        }
        SnapshotCommand::Delete { target } => print_json(
            &o.delete_snapshot(&target.svm, &target.volume, &target.name)
                .await?,
        ),
        SnapshotCommand::List { svm, volume, name } => print_json(
            &o.list_snapshots(svm.as_deref(), volume.as_deref(), name.as_deref())
                .await?,
        ),
        SnapshotCommand::Clone {
            svm,
            name,
            snapshot,
            source_volume,
            size_gib,
        } => {
            let request = CloneVolumeRequest {
                svm,
                name,
                snapshot,
                source_volume,
                size_gib,
            };
            print_json(&o.clone_volume(request).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
