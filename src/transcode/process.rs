use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::warn;

/// How a transcoder process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exit code 0: the input was fully consumed.
    Completed,
    /// Terminated through [`ProcessHandle::kill`]. Never a failure.
    Killed,
    Failed {
        code: Option<i32>,
        diagnostics: String,
    },
}

impl ProcessExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Session-side half of a running process: kill it, or wait for it.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    killed: Arc<AtomicBool>,
    exit: watch::Receiver<Option<ProcessExit>>,
    kill_timeout: Duration,
}

/// Supervisor-side half: learns about kill requests and reports the exit.
pub struct ProcessMonitor {
    kill_rx: Option<oneshot::Receiver<()>>,
    killed: Arc<AtomicBool>,
    exit: watch::Sender<Option<ProcessExit>>,
}

pub fn process_channel(pid: Option<u32>, kill_timeout: Duration) -> (ProcessHandle, ProcessMonitor) {
    let (kill_tx, kill_rx) = oneshot::channel();
    let (exit_tx, exit_rx) = watch::channel(None);
    let killed = Arc::new(AtomicBool::new(false));

    (
        ProcessHandle {
            pid,
            kill_tx: Arc::new(Mutex::new(Some(kill_tx))),
            killed: killed.clone(),
            exit: exit_rx,
            kill_timeout,
        },
        ProcessMonitor {
            kill_rx: Some(kill_rx),
            killed,
            exit: exit_tx,
        },
    )
}

impl ProcessHandle {
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_status(&self) -> Option<ProcessExit> {
        self.exit.borrow().clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    pub async fn wait(&self) -> ProcessExit {
        let mut rx = self.exit.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone().unwrap_or(ProcessExit::Killed),
            // Monitor dropped without reporting
            Err(_) if self.killed.load(Ordering::Acquire) => ProcessExit::Killed,
            Err(_) => ProcessExit::Failed {
                code: None,
                diagnostics: "process monitor went away".to_string(),
            },
        }
    }

    /// Forcefully terminates the process and waits until it is confirmed dead.
    /// Safe to call on a process that already exited, and more than once.
    pub async fn kill(&self) -> ProcessExit {
        if let Some(exit) = self.exit_status() {
            return exit;
        }

        self.killed.store(true, Ordering::Release);
        if let Some(tx) = self.kill_tx.lock().take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(self.kill_timeout, self.wait()).await {
            Ok(exit) => exit,
            Err(_) => {
                warn!(
                    "Process {:?} did not confirm termination within {:?}",
                    self.pid, self.kill_timeout
                );
                ProcessExit::Killed
            }
        }
    }
}

impl ProcessMonitor {
    /// Resolves once a kill was requested or every handle was dropped.
    /// Pending forever after it resolved once.
    pub async fn kill_requested(&mut self) {
        match self.kill_rx.as_mut() {
            Some(rx) => {
                let _ = rx.await;
                self.kill_rx = None;
            }
            None => std::future::pending().await,
        }
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Publishes the exit. Anything after a kill request is reported as `Killed`.
    pub fn report(self, exit: ProcessExit) -> ProcessExit {
        let exit = if self.was_killed() {
            ProcessExit::Killed
        } else {
            exit
        };
        self.exit.send_replace(Some(exit.clone()));
        exit
    }
}
