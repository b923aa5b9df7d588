//! Driver (C9): the top-level control flow tying every other component together —
//! preamble, node-set resolution, collection, archive assembly — matching the
//! original's `SosCollector.execute()` sequence (`prep()` → `intro()` → `collect()`).

use std::collections::HashSet;
use std::io::Write as _;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::thread_rng;
use thiserror::Error;

use crate::archive::{self, ArchiveInputs};
use crate::cli::Args;
use crate::cluster::ClusterRegistry;
use crate::context::{self, Commons};
use crate::credentials::CredentialBroker;
use crate::hostgroup::{self, HostGroup};
use crate::logger::{DriverLogger, UiLog};
use crate::node::NodeSession;
use crate::nodeset;
use crate::prelude::*;
use crate::scheduler::{Interrupted, Scheduler};

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to determine local installation: {0}")]
    LocalProbeFailed(String),

    #[error("no nodes were detected, or nodes do not have sos installed")]
    NoNodes,

    #[error("{0}")]
    ClusterOption(String),

    #[error("unknown cluster type '{0}'")]
    UnknownClusterType(String),

    #[error(transparent)]
    Archive(#[from] archive::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub enum Outcome {
    Completed { archive_path: PathBuf, retrieved: usize },
    Interrupted,
    /// `--list-options` was given: options were printed and no collection ran.
    Listed,
}

const DISCLAIMER: &str = "\
This utility is used to collect sosreports from multiple nodes simultaneously. \
It uses OpenSSH's ControlPersist feature to connect to nodes and run commands \
remotely.

An archive of sosreport tarballs collected from the nodes will be generated in \
{tmp_dir} and may be provided to an appropriate support representative.

The generated archive may contain data considered sensitive and its content \
should be reviewed by the originating organization before being passed to any \
third party.

No configuration changes will be made to the system running this utility or \
remote systems that it connects to.\n";

/// Runs the full preamble-through-archive sequence. `confirm` is a callback so the
/// driver itself never touches stdin directly except through it and the credential
/// broker, keeping interactive I/O at the edges (spec §4.9).
pub async fn run(args: Args, confirm: impl FnOnce() -> std::io::Result<()>) -> Result<Outcome, Error> {
    if args.list_options {
        print_available_options();
        return Ok(Outcome::Listed);
    }

    let tmp_dir = context::create_tmp_dir().map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    let driver_log_path = tmp_dir.path().join("sos-collector.log");
    let ui_log_path = tmp_dir.path().join("ui.log");

    DriverLogger::init(&driver_log_path).map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    let ui_log = UiLog::create(ui_log_path.clone()).map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    ui_log.info(format!("\nsos-collector (version {})\n", env!("CARGO_PKG_VERSION")));
    ui_log.info(wrap_disclaimer(tmp_dir.path().display().to_string()));

    if !args.batch {
        confirm()?;
    }

    let ssh_user = args.ssh_user.clone();
    let needs_sudo = ssh_user != "root";
    let mut become_root = args.become_root;

    if !args.password && !args.password_per_node {
        debug!("password not specified, assuming SSH keys");
        ui_log.info(
            "sos-collector ASSUMES that SSH keys are installed on all nodes unless the --password option is provided.\n",
        );
    }

    let credentials = CredentialBroker::resolve(&args, needs_sudo, &mut become_root)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    let mut master_override = args.master.clone();
    let mut cluster_type_override = args.cluster_type.clone();
    let mut nodes = args.nodes.clone();

    if let Some(group_name) = &args.group {
        match hostgroup::load(group_name) {
            Ok(group) => hostgroup::apply(&group, &mut master_override, &mut cluster_type_override, &mut nodes),
            Err(e) => ui_log.error(format!("Could not load specified group {group_name}: {e}")),
        }
    }

    let mut no_local = args.no_local;
    let primary_address = if let Some(master) = &master_override {
        no_local = true;
        master.clone()
    } else {
        "localhost".to_string()
    };

    let mut primary = NodeSession::new(primary_address.clone(), &credentials, tmp_dir.path().to_path_buf());
    if primary.connect().await.is_err() && master_override.is_none() {
        return Err(Error::LocalProbeFailed(
            "Use the --no-local option if localhost should not be included".to_string(),
        ));
    }

    let mut registry = ClusterRegistry::with_builtin_profiles();
    let cluster_type = if let Some(requested) = &cluster_type_override {
        if registry.get(requested).is_none() {
            return Err(Error::UnknownClusterType(requested.clone()));
        }
        Some(requested.clone())
    } else {
        registry.detect(&mut primary).await.map(|s| s.to_string())
    };

    if let Some(name) = &cluster_type {
        for raw_option in &args.cluster_options {
            apply_cluster_option(&mut registry, name, raw_option)?;
        }
    }

    let cluster_nodes = if let Some(name) = &cluster_type {
        ui_log.info(format!("Cluster type set to {name}"));
        match registry.get(name) {
            Some(profile) => profile.kind.get_nodes(&mut primary).await,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    if cluster_type.is_none() && nodes.is_empty() {
        return Err(Error::NoNodes);
    }

    let mut local_identities = local_identities().await;
    if let Some(hostname) = &primary.resolved_hostname {
        local_identities.insert(hostname.clone());
    }

    let resolved_nodes = nodeset::resolve(&nodes, &cluster_nodes, &local_identities, no_local)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    if let Some(save_as) = &args.save_group {
        let group = HostGroup {
            name: save_as.clone(),
            master: master_override.clone().unwrap_or_default(),
            cluster_type: cluster_type.clone().unwrap_or_default(),
            nodes: resolved_nodes.clone(),
        };
        match hostgroup::save(&group) {
            Ok(path) => ui_log.info(format!("Wrote group '{save_as}' to {}", path.display())),
            Err(e) => ui_log.error(format!("Could not save group {save_as}: {e}")),
        }
    }

    ui_log.info("");
    if resolved_nodes.is_empty() && primary.state != crate::node::ConnectionState::Connected {
        return Err(Error::NoNodes);
    }
    ui_log.info("The following is a list of nodes to collect from:");
    let width = nodeset::hostname_field_width(&resolved_nodes).max(primary_address.len());
    if primary.state == crate::node::ConnectionState::Connected {
        ui_log.info(format!("\t{:width$}", primary_address, width = width));
    }
    let mut sorted_nodes = resolved_nodes.clone();
    sorted_nodes.sort();
    for node in &sorted_nodes {
        ui_log.info(format!("\t{:width$}", node, width = width));
    }
    ui_log.info("");

    let case_id = if args.case_id.is_none() && !args.batch {
        Some(prompt_case_id()?)
    } else {
        args.case_id.clone()
    };

    let agent_command = build_agent_command(&args, case_id.as_deref());

    let commons = Commons {
        tmp_dir,
        credentials,
        need_sudo: needs_sudo && !args.insecure_sudo,
        become_root,
        hostname_field_width: width,
        timeout_secs: args.timeout,
    };

    primary.close().await;

    let scheduler = Scheduler::new(args.threads);
    scheduler.watch_for_interrupt();

    let result = match scheduler.run(sorted_nodes, &commons.credentials, &commons, agent_command).await {
        Ok(result) => result,
        Err(Interrupted) => return Ok(Outcome::Interrupted),
    };

    let retrieved_by_node: Vec<(String, Vec<PathBuf>)> = result
        .outcomes
        .iter()
        .filter_map(|(node, outcome)| match outcome {
            crate::scheduler::NodeOutcome::Succeeded { retrieved_files } => {
                Some((node.clone(), retrieved_files.clone()))
            }
            crate::scheduler::NodeOutcome::Failed { reason } => {
                warn!("node {node} failed: {reason}");
                None
            }
        })
        .collect();

    if result.retrieved == 0 {
        ui_log.error("No sosreports were collected, nothing to archive");
        return Err(Error::Archive(archive::Error::NothingRetrieved));
    }

    let mut rng = thread_rng();
    let alphabet: Vec<char> = ('a'..='z').collect();
    let suffix = archive::random_suffix(|| *alphabet.choose(&mut rng).expect("alphabet is non-empty"));
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let root_name = archive::archive_root_name(args.label.as_deref(), case_id.as_deref(), &today, &suffix);

    let archive_path = archive::build(ArchiveInputs {
        root_name: &root_name,
        retrieved_files: &retrieved_by_node,
        driver_log_path: &driver_log_path,
        ui_log_path: &ui_log_path,
        dest_dir: &commons.tmp_path(),
    })?;

    ui_log.info(format!("The following archive has been created: {}", archive_path.display()));

    Ok(Outcome::Completed {
        archive_path,
        retrieved: result.retrieved,
    })
}

/// `--list-options`: prints every declared option across the registered cluster
/// profiles, grouped by profile short name, matching the original's `-l` flag.
fn print_available_options() {
    let registry = ClusterRegistry::with_builtin_profiles();
    for name in ["none"] {
        if let Some(profile) = registry.get(name) {
            let options = profile.kind.declared_options();
            if options.is_empty() {
                continue;
            }
            println!("{}:", profile.kind.human_name());
            for option in options {
                println!("\t{:<20}{}", option.name, option.description);
            }
        }
    }
}

fn wrap_disclaimer(tmp_dir: String) -> String {
    DISCLAIMER.replace("{tmp_dir}", &tmp_dir)
}

/// Gathers every name/address that identifies the driver's own host, for
/// `--no-local` to strip (spec §3, §4.4 step 6): the short hostname, the FQDN, and
/// every local IP address, alongside the `localhost` literal. Shells out the same
/// way `NodeSession`'s local transport resolves its own hostname, since nothing in
/// the dependency tree otherwise exposes this.
async fn local_identities() -> HashSet<String> {
    let mut ids = HashSet::new();
    ids.insert("localhost".to_string());

    if let Ok(out) = tokio::process::Command::new("hostname").output().await {
        let short = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if !short.is_empty() {
            ids.insert(short);
        }
    }
    if let Ok(out) = tokio::process::Command::new("hostname").arg("-f").output().await {
        let fqdn = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if !fqdn.is_empty() {
            ids.insert(fqdn);
        }
    }
    if let Ok(out) = tokio::process::Command::new("hostname").arg("-I").output().await {
        for ip in String::from_utf8_lossy(&out.stdout).split_whitespace() {
            ids.insert(ip.to_string());
        }
    }

    ids
}

/// Matches the original's `configure_sos_cmd`: builds `sosreport --batch ...`,
/// rejecting `--sos-cmd` outright (rather than filtering it) if it contains any of
/// the shell metacharacters `& | > < ;` that could smuggle a second command in.
fn build_agent_command(args: &Args, case_id: Option<&str>) -> impl Fn(&str) -> String + Send + Sync + 'static {
    let mut cmd = String::from("sosreport --batch");

    if let Some(sos_cmd) = &args.sos_cmd {
        const REJECTED: [char; 5] = ['&', '|', '>', '<', ';'];
        if sos_cmd.chars().any(|c| REJECTED.contains(&c)) {
            warn!("Possible shell script found in provided sos command. Ignoring --sos-cmd entirely.");
        } else {
            cmd.push(' ');
            cmd.push_str(&crate::util::shell_quote(sos_cmd));
            return move |_node: &str| cmd.clone();
        }
    }

    if let Some(case_id) = case_id {
        cmd.push_str(&format!(" --case-id={}", crate::util::shell_quote(case_id)));
    }
    if args.alloptions {
        cmd.push_str(" --alloptions");
    }
    if args.all_logs {
        cmd.push_str(" --all-logs");
    }
    if args.verify {
        cmd.push_str(" --verify");
    }
    if args.log_size > 0 {
        cmd.push_str(&format!(" --log-size={}", args.log_size));
    }
    if let Some(sysroot) = &args.sysroot {
        cmd.push_str(&format!(" -s {}", crate::util::shell_quote(sysroot)));
    }
    cmd.push_str(&format!(" -c {}", args.chroot));
    cmd.push_str(&format!(" -z {}", args.compression));

    for plugin in &args.enable_plugins {
        cmd.push_str(&format!(" -e {}", crate::util::shell_quote(plugin)));
    }
    for plugin in &args.skip_plugins {
        cmd.push_str(&format!(" -n {}", crate::util::shell_quote(plugin)));
    }
    for plugin in &args.only_plugins {
        cmd.push_str(&format!(" -o {}", crate::util::shell_quote(plugin)));
    }
    for opt in &args.plugin_options {
        cmd.push_str(&format!(" -k {}", crate::util::shell_quote(opt)));
    }

    move |_node: &str| cmd.clone()
}

/// Applies a single `-c cluster.option=value` override (spec §6). Unknown profile
/// names, unknown option names, and values that fail coercion are all fatal
/// pre-flight errors (spec §4.3, §7 kind 1), not warnings to log past — an operator
/// who mistypes an option should never silently collect with the wrong settings.
fn apply_cluster_option(registry: &mut ClusterRegistry, active_cluster: &str, raw_option: &str) -> Result<(), Error> {
    let malformed = || Error::ClusterOption(format!("Malformed cluster option '{raw_option}', expected cluster.option=value"));
    let (target, assignment) = raw_option.split_once('.').ok_or_else(malformed)?;
    let (name, value) = assignment.split_once('=').ok_or_else(malformed)?;

    if target != active_cluster {
        return Err(Error::ClusterOption(format!(
            "Option '{name}' given for inactive cluster '{target}'"
        )));
    }

    match registry.get_mut(target) {
        Some(profile) => profile
            .apply_override(name, value)
            .map_err(|e| Error::ClusterOption(e.to_string())),
        None => Err(Error::UnknownClusterType(target.to_string())),
    }
}

pub fn prompt_case_id() -> std::io::Result<String> {
    print!("Please enter the case id you are collecting reports for: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sos_cmd_override_rejects_shell_metacharacters() {
        let mut args = base_args();
        args.sos_cmd = Some("--battery && rm -rf /".to_string());
        let command = build_agent_command(&args, None);
        assert_eq!(command("anynode"), "sosreport --batch -c auto -z auto");
    }

    #[test]
    fn sos_cmd_override_is_used_verbatim_when_clean() {
        let mut args = base_args();
        args.sos_cmd = Some("--plugin-timeout=30".to_string());
        let command = build_agent_command(&args, None);
        assert_eq!(command("anynode"), "sosreport --batch --plugin-timeout=30");
    }

    #[test]
    fn default_command_includes_case_id_and_log_size() {
        let mut args = base_args();
        args.log_size = 100;
        let command = build_agent_command(&args, Some("01234567"));
        assert_eq!(
            command("anynode"),
            "sosreport --batch --case-id=01234567 --log-size=100 -c auto -z auto"
        );
    }

    fn base_args() -> Args {
        use clap::Parser;
        Args::parse_from(["sos-collector"])
    }
}
