//! Batch execution of command scripts against a fleet.
//!
//! A script is a list of sessions, each one a sequence of commands typed at one
//! node. Sessions run concurrently on a thread pool, so a script can have several
//! nodes sending files to each other at the same time. Commands of one session run
//! in order.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Instant,
};

use log::info;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use crate::{command::execute_line, error::NodeError, fleet::Fleet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSession {
    /// Id or address of the node the commands are typed at.
    pub node: String,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub sessions: Vec<ScriptSession>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub command: String,
    pub output: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionResult {
    /// Position of the session in the script.
    pub session: usize,
    pub node: String,
    pub steps: Vec<StepResult>,
}

impl Script {
    pub fn run(self, fleet: Arc<Fleet>, threads: usize) -> Vec<SessionResult> {
        let total_sessions = self.sessions.len();
        let finished_sessions = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        let pool = ThreadPool::new(threads.max(1));
        let start_time = Instant::now();
        for (index, session) in self.sessions.into_iter().enumerate() {
            let fleet = fleet.clone();
            let finished_sessions = finished_sessions.clone();
            let results = results.clone();
            pool.execute(move || {
                let node = fleet.node(&session.node);
                let steps = session
                    .commands
                    .iter()
                    .filter_map(|command| {
                        let output = match &node {
                            Some(node) => execute_line(node, command)?,
                            None => format!("Error: {}", NodeError::UnknownTarget(session.node.clone())),
                        };
                        Some(StepResult {
                            command: command.clone(),
                            output,
                        })
                    })
                    .collect();

                results.lock().unwrap_or_else(PoisonError::into_inner).push(SessionResult {
                    session: index,
                    node: session.node,
                    steps,
                });

                let finished = finished_sessions.fetch_add(1, Ordering::SeqCst) + 1;
                info!(
                    "Finished {}/{} sessions in {:.2?}",
                    finished,
                    total_sessions,
                    start_time.elapsed()
                );
            });
        }

        pool.join();

        let mut results = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        results.sort_by_key(|result| result.session);
        results
    }
}
