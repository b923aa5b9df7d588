//! Credential broker (C5): resolves SSH/sudo/root passwords once during the
//! preamble per the decision matrix in spec §4.5, then hands an immutable
//! [`Credentials`] value into every worker. Nothing in worker context ever prompts.

use std::collections::HashMap;

use dialoguer::Password;
use thiserror::Error;

use crate::cli::Args;
use crate::prelude::*;
use crate::util::Secret;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read password: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Immutable once [`CredentialBroker::resolve`] returns (spec §3: "Immutable after
/// C5 returns", and Design Note "Credentials as captured state").
#[derive(Clone, Default)]
pub struct Credentials {
    pub ssh_password: Option<Secret<String>>,
    pub sudo_password: Option<Secret<String>>,
    pub root_password: Option<Secret<String>>,
    pub per_node_password: Option<HashMap<String, Secret<String>>>,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub ssh_key: Option<std::path::PathBuf>,
}

pub struct CredentialBroker;

impl CredentialBroker {
    /// Applies the decision matrix from spec §4.5. `needs_sudo` is
    /// `ssh_user != "root"`; `become_root` may be cleared as a side effect when the
    /// ssh user is already root, matching the original's `prep()` behavior.
    pub fn resolve(args: &Args, needs_sudo: bool, become_root: &mut bool) -> Result<Credentials, Error> {
        let mut creds = Credentials {
            ssh_user: args.ssh_user.clone(),
            ssh_port: args.ssh_port,
            ssh_key: args.ssh_key.clone(),
            ..Default::default()
        };

        if args.password_per_node {
            // Deferred to C6: each worker prompts (or looks up) its own password.
            // Nothing to resolve here, by design (spec §4.5 last row).
            return Ok(creds);
        }

        if args.password {
            debug!("password specified, not using SSH keys");
            let prompt = format!("Provide the SSH password for user {}", creds.ssh_user);
            creds.ssh_password = Some(Secret::new(Self::prompt_password(&prompt)?));
        } else {
            debug!("password not specified, assuming SSH keys");
        }

        if needs_sudo && !args.insecure_sudo {
            creds.sudo_password = match &creds.ssh_password {
                Some(pw) => Some(pw.clone()),
                None => {
                    debug!("non-root user specified, will request sudo password");
                    let prompt = format!(
                        "A non-root user has been provided. Provide sudo password for {}",
                        creds.ssh_user
                    );
                    Some(Secret::new(Self::prompt_password(&prompt)?))
                }
            };
        }

        if *become_root {
            if creds.ssh_user != "root" {
                debug!("non-root user asking to become root remotely");
                let prompt = format!(
                    "User {} will attempt to become root. Provide root password",
                    creds.ssh_user
                );
                creds.root_password = Some(Secret::new(Self::prompt_password(&prompt)?));
            } else {
                info!("option to become root but ssh user is root, ignoring request");
                *become_root = false;
            }
        }

        Ok(creds)
    }

    fn prompt_password(prompt: &str) -> Result<String, Error> {
        Ok(Password::new()
            .with_prompt(prompt)
            .allow_empty_password(false)
            .interact()?)
    }

    /// Per-node password prompt used by the scheduler when `--password-per-node` was
    /// given; resolved eagerly before the connect phase starts so that worker
    /// context only ever reads from the resulting map (spec §4.6: "Per-node
    /// passwords in the credential broker's map are read-only in worker context").
    pub fn resolve_per_node(nodes: &[String], ssh_user: &str) -> Result<HashMap<String, Secret<String>>, Error> {
        let mut map = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let prompt = format!("Please enter the password for {ssh_user}@{node}");
            map.insert(node.clone(), Secret::new(Self::prompt_password(&prompt)?));
        }
        Ok(map)
    }
}
