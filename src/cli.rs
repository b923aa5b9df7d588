//! CLI surface (A1): the full flag listing from spec §6, implemented with `clap`'s
//! derive API in the teacher's style (`#[derive(Parser)]`, one struct per
//! subcommand-shaped set of options). Argument parsing itself is out of the core's
//! scope per spec §1, but a shippable binary still needs one.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "sos-collector", about = "Collect sos reports from multiple nodes over SSH")]
pub struct Args {
    /// Enable all sos options
    #[arg(short = 'a', long)]
    pub alloptions: bool,

    /// Collect logs regardless of size
    #[arg(long = "all-logs")]
    pub all_logs: bool,

    /// Become root on the remote nodes
    #[arg(short = 'b', long = "become")]
    pub become_root: bool,

    /// Do not prompt interactively (except passwords)
    #[arg(long)]
    pub batch: bool,

    /// Specify case number
    #[arg(long = "case-id")]
    pub case_id: Option<String>,

    /// Specify a type of cluster profile
    #[arg(long = "cluster-type")]
    pub cluster_type: Option<String>,

    /// Specify a cluster option used by a profile: cluster.option=value
    #[arg(short = 'c', long = "cluster-option")]
    pub cluster_options: Vec<String>,

    #[arg(long, value_enum, default_value_t = Chroot::Auto)]
    pub chroot: Chroot,

    /// Enable specific plugins for sosreport
    #[arg(short = 'e', long = "enable-plugins")]
    pub enable_plugins: Vec<String>,

    /// Use a predefined group JSON file
    #[arg(long)]
    pub group: Option<String>,

    /// Save the resulting node list to a group
    #[arg(long = "save-group")]
    pub save_group: Option<String>,

    /// Specify the container image to use for containerized hosts
    #[arg(long)]
    pub image: Option<String>,

    /// Specify an ssh key to use
    #[arg(short = 'i', long = "ssh-key")]
    pub ssh_key: Option<PathBuf>,

    /// Use when passwordless sudo is configured
    #[arg(long = "insecure-sudo")]
    pub insecure_sudo: bool,

    /// Plugin option as plugname.option=value
    #[arg(short = 'k', long = "plugin-options")]
    pub plugin_options: Vec<String>,

    /// List options available for profiles
    #[arg(short = 'l', long = "list-options")]
    pub list_options: bool,

    /// Assign a label to the archives
    #[arg(long)]
    pub label: Option<String>,

    /// Limit the size of individual logs (in MiB)
    #[arg(long = "log-size", default_value_t = 0)]
    pub log_size: u64,

    /// Skip these plugins
    #[arg(short = 'n', long = "skip-plugins")]
    pub skip_plugins: Vec<String>,

    /// Provide a comma delimited list of nodes, or a regex to match against
    #[arg(long)]
    pub nodes: Vec<String>,

    /// Do not run package checks
    #[arg(long = "no-pkg-check")]
    pub no_pkg_check: bool,

    /// Do not collect a sosreport from localhost
    #[arg(long = "no-local")]
    pub no_local: bool,

    /// Specify a remote master (primary) node
    #[arg(long = "master")]
    pub master: Option<String>,

    /// Run these plugins only
    #[arg(short = 'o', long = "only-plugins")]
    pub only_plugins: Vec<String>,

    /// Specify SSH port for all nodes
    #[arg(short = 'p', long = "ssh-port", default_value_t = 22)]
    pub ssh_port: u16,

    /// Prompt for user password for nodes
    #[arg(long)]
    pub password: bool,

    /// Prompt for password separately for each node
    #[arg(long = "password-per-node")]
    pub password_per_node: bool,

    /// Specify a sos preset to use
    #[arg(long)]
    pub preset: Option<String>,

    /// Specify an alternate root directory to collect from
    #[arg(short = 's', long)]
    pub sysroot: Option<String>,

    /// Manually specify the command line options for sosreport on remote nodes
    #[arg(long = "sos-cmd")]
    pub sos_cmd: Option<String>,

    /// Specify an SSH user. Default root
    #[arg(long = "ssh-user", default_value = "root")]
    pub ssh_user: String,

    /// Timeout for sosreport on each node, in seconds
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Perform data verification during collection
    #[arg(long)]
    pub verify: bool,

    #[arg(short = 'z', long = "compression-type", value_enum, default_value_t = Compression::Auto)]
    pub compression: Compression,

    /// Number of nodes to collect from concurrently (ambient: spec §4.6 requires a
    /// configurable degree of parallelism; the abbreviated flag listing omits the
    /// flag name, so this follows the original's `--threads`).
    #[arg(long, default_value_t = 4)]
    pub threads: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chroot {
    Auto,
    Always,
    Never,
}

impl std::fmt::Display for Chroot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Chroot::Auto => "auto",
            Chroot::Always => "always",
            Chroot::Never => "never",
        };
        write!(f, "{s}")
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Auto,
    Gzip,
    Bzip2,
    Xz,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Compression::Auto => "auto",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
        };
        write!(f, "{s}")
    }
}
