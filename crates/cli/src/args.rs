use clap::{Parser, Subcommand, ValueEnum};
use quill_core::status::DependencyType;

/// Terminal client for the Quill content-production backend.
///
/// Every project-scoped command loads the project (fields and blocks) into
/// a local workspace first, then performs one action against the backend.
#[derive(Debug, Parser)]
#[command(version, about, name = "quill")]
pub struct Args {
    /// Backend base URL. Overrides QUILL_BACKEND_URL.
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List projects
    #[command(alias = "ls")]
    Projects,

    /// List the fields and blocks of a project
    Units {
        project: String,
        /// Only show units of this phase
        #[arg(long)]
        phase: Option<String>,
    },

    /// Generate one unit, streaming its output, or every pending unit of a
    /// phase. A finished current phase advances when the next one is
    /// autonomous. Ctrl-C cancels.
    #[command(alias = "gen")]
    Generate {
        project: String,
        /// Unit id
        #[arg(required_unless_present = "phase")]
        unit: Option<String>,
        #[arg(long, conflicts_with = "unit")]
        phase: Option<String>,
    },

    /// Send a message to the project agent. `@name` references units.
    Chat {
        project: String,
        message: String,
        /// Print agent node updates as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// Reorder the middle phases of a project
    Reorder {
        project: String,
        /// New order of the reorderable phases
        #[arg(required = true, num_args = 1..)]
        phases: Vec<String>,
    },

    /// Turn agent autonomy on or off for a phase, or for all phases
    Autonomy {
        project: String,
        state: Toggle,
        #[arg(required_unless_present = "all")]
        phase: Option<String>,
        #[arg(long, conflicts_with = "phase")]
        all: bool,
    },

    /// Replace the dependencies of a unit
    Deps {
        project: String,
        unit: String,
        /// Unit ids this unit depends on; none clears them
        depends_on: Vec<String>,
        #[arg(long, value_enum, default_value_t = DepMode::All)]
        mode: DepMode,
    },

    /// Move a content block
    #[command(name = "move")]
    MoveBlock {
        project: String,
        block: String,
        /// New parent block; root level when omitted
        #[arg(long)]
        parent: Option<String>,
        /// Position among the new siblings
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// Delete a content block and its children. Ctrl-C within the undo
    /// window restores it.
    Delete { project: String, block: String },

    /// Move the project past its current phase
    Advance {
        project: String,
        /// Advance even when the next phase requires confirmation
        #[arg(long)]
        confirm: bool,
    },

    /// Snapshot the project as a new version
    Version {
        project: String,
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn is_on(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DepMode {
    /// Every dependency must be completed
    All,
    /// At least one dependency must be completed
    Any,
}

impl From<DepMode> for DependencyType {
    fn from(mode: DepMode) -> Self {
        match mode {
            DepMode::All => DependencyType::All,
            DepMode::Any => DependencyType::Any,
        }
    }
}
