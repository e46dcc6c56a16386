use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use declarative::CachingType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skyplan")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative provisioning of interdependent cloud resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding run state and the local cloud
    #[arg(long, global = true, env = "SKYPLAN_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the order resources would be created in
    Plan(PlanArgs),

    /// Create or update every declared resource
    Apply(ApplyArgs),

    /// Delete every resource created by previous applies
    Destroy(DestroyArgs),

    /// Show recorded and remote state of a stack
    Status(FileArgs),

    /// Virtual machine lifecycle operations
    #[command(subcommand)]
    Vm(VmCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Stack Commands
// ============================================================================

#[derive(Args)]
pub struct FileArgs {
    /// Declaration file (TOML, or JSON with a .json extension)
    pub file: PathBuf,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Declaration file (TOML, or JSON with a .json extension)
    pub file: PathBuf,

    /// Group resources into levels that may run concurrently
    #[arg(long)]
    pub levels: bool,

    /// Show the teardown order instead
    #[arg(long)]
    pub destroy: bool,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Declaration file (TOML, or JSON with a .json extension)
    pub file: PathBuf,

    /// Number of parallel jobs (1 runs strictly in order)
    #[arg(short, long, env = "SKYPLAN_JOBS")]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Declaration file (TOML, or JSON with a .json extension)
    pub file: PathBuf,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel jobs (1 runs strictly in order)
    #[arg(short, long, env = "SKYPLAN_JOBS")]
    pub jobs: Option<usize>,
}

// ============================================================================
// VM Commands
// ============================================================================

#[derive(Args)]
pub struct VmTarget {
    /// Declaration file (TOML, or JSON with a .json extension)
    pub file: PathBuf,

    /// Name of the virtual machine
    pub name: String,
}

#[derive(Subcommand)]
pub enum VmCommand {
    /// Show hardware, storage, OS, network and power state
    Show(VmTarget),

    /// Start a stopped or deallocated VM
    Start(VmTarget),

    /// Stop a running VM (compute stays allocated)
    Stop(VmTarget),

    /// Change the VM size
    Resize {
        #[command(flatten)]
        target: VmTarget,

        /// New size, e.g. Standard_DS3_v2
        size: String,
    },

    /// Attach an empty managed data disk
    AttachDisk {
        #[command(flatten)]
        target: VmTarget,

        /// Logical unit number for the disk
        #[arg(long)]
        lun: u32,

        /// Disk size in GB
        #[arg(long = "size-gb", value_name = "GB")]
        size_gb: u32,

        /// Host caching: none, read_only or read_write
        #[arg(long, default_value = "read_write")]
        caching: CachingType,
    },

    /// Release compute while keeping disks
    Deallocate(VmTarget),
}
