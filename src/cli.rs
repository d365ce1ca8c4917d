use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::ProvisionConfig;
use crate::paths;

#[derive(Parser)]
#[command(name = "fcrepo-provision")]
#[command(version)]
#[command(about = "Converge a host into a running Fedora Commons repository", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List resources in convergence order with their dependencies
    Plan(PlanArgs),

    /// Show what apply would change
    Diff(PlanArgs),

    /// Converge the host to the declared state
    Apply(ApplyArgs),

    /// Print the rendered body of a templated file
    Render(RenderArgs),

    /// Print the facts gathered from the host
    Facts(TargetArgs),

    /// Print the resolved configuration as TOML
    Config(TargetArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Target host and configuration
// ============================================================================

/// Where to converge and with which configuration
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Configuration file (.toml or .json)
    #[arg(short, long, env = "FCREPO_PROVISION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root that declared paths and the identity database live under
    #[arg(long, env = paths::ENV_ROOT, default_value = "/")]
    pub root: PathBuf,

    /// Directory holding the source artifacts
    #[arg(long, env = paths::ENV_ARTIFACTS, default_value = paths::DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// Use this host name instead of asking the system
    #[arg(long)]
    pub hostname: Option<String>,

    /// Use this OS family instead of reading os-release
    #[arg(long)]
    pub os_family: Option<String>,

    /// Set an option by name, e.g. --set fcrepo_datadir=/srv/data
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    #[command(flatten)]
    pub options: OptionArgs,
}

/// The configuration options, each overriding the config file
#[derive(Args, Debug, Clone, Default)]
pub struct OptionArgs {
    /// Service account name
    #[arg(long, env = "FCREPO_USER")]
    pub user: Option<String>,

    /// Primary group of the service account
    #[arg(long, env = "FCREPO_GROUP")]
    pub group: Option<String>,

    /// Shell profile receiving environment exports
    #[arg(long, env = "FCREPO_USER_PROFILE")]
    pub user_profile: Option<String>,

    /// Root directory for software and configuration
    #[arg(long, env = "FCREPO_SANDBOX_HOME")]
    pub sandbox_home: Option<String>,

    /// Repository data directory
    #[arg(long, env = "FCREPO_DATADIR")]
    pub datadir: Option<String>,

    /// Repository configuration directory
    #[arg(long, env = "FCREPO_CONFIGDIR")]
    pub configdir: Option<String>,

    /// Java runtime artifact
    #[arg(long, env = "FCREPO_JAVA_SOURCE")]
    pub java_source: Option<String>,

    /// Java runtime install directory
    #[arg(long, env = "FCREPO_JAVA_DEPLOYDIR")]
    pub java_deploydir: Option<String>,

    /// Maven artifact
    #[arg(long, env = "FCREPO_MAVEN_SOURCE")]
    pub maven_source: Option<String>,

    /// Maven install directory
    #[arg(long, env = "FCREPO_MAVEN_DEPLOYDIR")]
    pub maven_deploydir: Option<String>,

    /// Tomcat artifact
    #[arg(long, env = "FCREPO_TOMCAT_SOURCE")]
    pub tomcat_source: Option<String>,

    /// Tomcat install directory
    #[arg(long, env = "FCREPO_TOMCAT_DEPLOYDIR")]
    pub tomcat_deploydir: Option<String>,
}

impl From<OptionArgs> for ProvisionConfig {
    fn from(args: OptionArgs) -> Self {
        Self {
            user: args.user,
            group: args.group,
            user_profile: args.user_profile,
            fcrepo_sandbox_home: args.sandbox_home,
            fcrepo_datadir: args.datadir,
            fcrepo_configdir: args.configdir,
            java_source: args.java_source,
            java_deploydir: args.java_deploydir,
            maven_source: args.maven_source,
            maven_deploydir: args.maven_deploydir,
            tomcat_source: args.tomcat_source,
            tomcat_deploydir: args.tomcat_deploydir,
        }
    }
}

// ============================================================================
// Command arguments
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Only show resources of a kind or one resource (e.g. `files`,
    /// `deployment.tomcat`)
    pub target: Option<String>,

    #[command(flatten)]
    pub host: TargetArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    /// Show the diff without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Stop before the next resource once this many seconds have passed
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Lock file guarding against concurrent runs
    #[arg(long, env = "FCREPO_PROVISION_LOCK")]
    pub lock_file: Option<PathBuf>,

    #[command(flatten)]
    pub host: TargetArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Declared path of the templated file, e.g. /fedora/config/repository.json
    pub path: PathBuf,

    #[command(flatten)]
    pub host: TargetArgs,
}
