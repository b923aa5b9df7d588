//! Collection scheduler (C6): a bounded worker pool run in two sequential phases —
//! connect, then collect — matching the original's two separate
//! `ThreadPoolExecutor(max_workers=threads)` calls rather than one pool doing both at
//! once (spec §4.6). Concurrency is gated with a `Semaphore`; both phases drain a
//! `JoinSet` so a slow node never blocks the rest of the pool from starting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::context::Commons;
use crate::credentials::Credentials;
use crate::node::NodeSession;
use crate::prelude::*;

#[derive(Debug)]
pub enum NodeOutcome {
    Succeeded { retrieved_files: Vec<PathBuf> },
    Failed { reason: String },
}

/// A node counts toward `retrieved` once it delivered at least one artifact, never
/// once per artifact (spec §3's `retrieved <= attempted` invariant — attempted is a
/// node count, so retrieved must be measured in the same unit).
fn node_retrieved(files: &[PathBuf]) -> bool {
    !files.is_empty()
}

pub struct RunResult {
    pub attempted: usize,
    pub retrieved: usize,
    pub outcomes: Vec<(String, NodeOutcome)>,
    pub sessions: Vec<NodeSession>,
}

/// Raised (cooperatively, not as a panic) by Ctrl-C while a run is in flight. The
/// driver maps this to exit code 130 without attempting archive assembly (spec §4.6,
/// mirroring the original's `except KeyboardInterrupt: ... os._exit(130)`).
pub struct Interrupted;

pub struct Scheduler {
    max_concurrency: usize,
    cancel: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Installs the Ctrl-C handler that flips the cooperative cancel flag. Must be
    /// called once before `run`; spawning it here (rather than in `main`) keeps the
    /// flag and the handler's lifetime tied together.
    pub fn watch_for_interrupt(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Runs the connect phase, then the collect phase, over `nodes`. `agent_command`
    /// builds the per-node sosreport invocation; it is `Fn` rather than `FnOnce`
    /// since every node shares the same base command line (spec §4.9).
    pub async fn run(
        &self,
        nodes: Vec<String>,
        credentials: &Credentials,
        commons: &Commons,
        agent_command: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Result<RunResult, Interrupted> {
        let attempted = nodes.len();
        let agent_command = Arc::new(agent_command);

        let sessions = self
            .connect_phase(nodes, credentials, commons.tmp_path(), commons.become_root, commons.need_sudo)
            .await?;
        if self.is_cancelled() {
            return Err(Interrupted);
        }

        let (outcomes, retrieved, sessions) = self
            .collect_phase(sessions, commons.timeout_secs, agent_command)
            .await?;

        Ok(RunResult {
            attempted,
            retrieved,
            outcomes,
            sessions,
        })
    }

    async fn connect_phase(
        &self,
        nodes: Vec<String>,
        credentials: &Credentials,
        dest_dir: PathBuf,
        become_root: bool,
        need_sudo: bool,
    ) -> Result<Vec<(String, Result<NodeSession, String>)>, Interrupted> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut joins = JoinSet::new();

        for address in nodes {
            if self.is_cancelled() {
                return Err(Interrupted);
            }
            let semaphore = semaphore.clone();
            let credentials = credentials.clone();
            let dest_dir = dest_dir.clone();
            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let mut session = NodeSession::new(address.clone(), &credentials, dest_dir);
                let result = session.connect().await.map_err(|e| e.to_string());
                if result.is_ok() {
                    // Privilege escalation (spec §4.1): become_root wins over plain sudo
                    // when both would otherwise apply.
                    if become_root {
                        session.escalate_to_root();
                    } else if need_sudo {
                        session.escalate_to_sudo();
                    }
                }
                (address, result.map(|_| session))
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((address, Ok(session))) => results.push((address, Ok(session))),
                Ok((address, Err(reason))) => {
                    warn!("failed to connect to {address}: {reason}");
                    results.push((address, Err(reason)));
                }
                Err(join_err) => warn!("connect task panicked: {join_err}"),
            }
        }
        Ok(results)
    }

    async fn collect_phase(
        &self,
        connect_results: Vec<(String, Result<NodeSession, String>)>,
        timeout_secs: u64,
        agent_command: Arc<impl Fn(&str) -> String + Send + Sync + 'static>,
    ) -> Result<(Vec<(String, NodeOutcome)>, usize, Vec<NodeSession>), Interrupted> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let retrieved_count = Arc::new(Mutex::new(0usize));
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let mut outcomes = Vec::with_capacity(connect_results.len());
        let mut joins = JoinSet::new();

        for (address, connected) in connect_results {
            let mut session = match connected {
                Ok(session) => session,
                Err(reason) => {
                    outcomes.push((address, NodeOutcome::Failed { reason }));
                    continue;
                }
            };

            if self.is_cancelled() {
                return Err(Interrupted);
            }

            let semaphore = semaphore.clone();
            let retrieved_count = retrieved_count.clone();
            let sessions = sessions.clone();
            let agent_command = agent_command.clone();
            let timeout = Duration::from_secs(timeout_secs);

            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let command = agent_command(&address);
                let result = session.run_agent(&command, timeout).await;
                session.close().await;

                match result {
                    Ok(files) => {
                        let mut count = retrieved_count.lock().await;
                        if node_retrieved(&files) {
                            *count += 1;
                        }
                        drop(count);
                        let mut list = sessions.lock().await;
                        list.push(session);
                        (address, NodeOutcome::Succeeded { retrieved_files: files })
                    }
                    Err(e) => {
                        let mut list = sessions.lock().await;
                        list.push(session);
                        (address, NodeOutcome::Failed { reason: e.to_string() })
                    }
                }
            });
        }

        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((address, outcome)) => outcomes.push((address, outcome)),
                Err(join_err) => warn!("collect task panicked: {join_err}"),
            }
        }

        let retrieved = *retrieved_count.lock().await;
        let sessions = Arc::try_unwrap(sessions)
            .map(|m| m.into_inner())
            .unwrap_or_default();

        Ok((outcomes, retrieved, sessions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_enforces_a_minimum_of_one_worker() {
        let scheduler = Scheduler::new(0);
        assert_eq!(scheduler.max_concurrency, 1);
    }

    #[test]
    fn scheduler_starts_uncancelled() {
        let scheduler = Scheduler::new(4);
        assert!(!scheduler.is_cancelled());
    }

    #[test]
    fn retrieved_count_is_one_per_node_regardless_of_file_count() {
        assert!(!node_retrieved(&[]));
        assert!(node_retrieved(&[PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]));
    }
}
