use std::cell::Cell;
use std::process::Stdio;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("commit request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("commit endpoint answered {0}")]
    Status(reqwest::StatusCode),
}

/// External target that finalizes the displayed text. Zero-argument by contract.
pub trait CommitTarget {
    fn commit(&self) -> LocalBoxFuture<'_, Result<(), CommitError>>;
}

/// Default target: just records that a commit happened.
pub struct LogCommit;

impl CommitTarget for LogCommit {
    fn commit(&self) -> LocalBoxFuture<'_, Result<(), CommitError>> {
        async {
            log::info!("Text committed");
            Ok(())
        }
        .boxed_local()
    }
}

/// Runs a program per commit. Non-zero exit counts as failure.
pub struct CommandCommit {
    pub program: String,
    pub args: Vec<String>,
}

impl CommitTarget for CommandCommit {
    fn commit(&self) -> LocalBoxFuture<'_, Result<(), CommitError>> {
        async move {
            let status = tokio::process::Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|source| CommitError::Spawn {
                    program: self.program.clone(),
                    source,
                })?;
            if !status.success() {
                return Err(CommitError::Exit {
                    program: self.program.clone(),
                    status,
                });
            }
            Ok(())
        }
        .boxed_local()
    }
}

/// POSTs an empty request to a URL per commit.
pub struct HttpCommit {
    pub url: String,
    pub client: reqwest::Client,
}

impl HttpCommit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl CommitTarget for HttpCommit {
    fn commit(&self) -> LocalBoxFuture<'_, Result<(), CommitError>> {
        async move {
            let resp = self.client.post(&self.url).send().await?;
            if !resp.status().is_success() {
                return Err(CommitError::Status(resp.status()));
            }
            Ok(())
        }
        .boxed_local()
    }
}

#[derive(Debug, Default)]
pub struct CommitStats {
    pub issued: Cell<u64>,
    pub succeeded: Cell<u64>,
    pub failed: Cell<u64>,
}

/// Issues exactly one commit per nod without blocking the event loop.
pub struct CommitCoordinator {
    target: Rc<dyn CommitTarget>,
    stats: Rc<CommitStats>,
}

impl CommitCoordinator {
    pub fn new(target: Rc<dyn CommitTarget>) -> Self {
        Self {
            target,
            stats: Rc::new(CommitStats::default()),
        }
    }

    pub fn stats(&self) -> Rc<CommitStats> {
        self.stats.clone()
    }

    /// Fire one commit on the local task set. Failures are logged, never retried.
    pub fn on_commit_trigger(&self) {
        let target = self.target.clone();
        let stats = self.stats.clone();
        stats.issued.set(stats.issued.get() + 1);
        let seq = stats.issued.get();

        tokio::task::spawn_local(async move {
            match target.commit().await {
                Ok(()) => {
                    stats.succeeded.set(stats.succeeded.get() + 1);
                    log::info!("Commit #{seq} done");
                }
                Err(e) => {
                    stats.failed.set(stats.failed.get() + 1);
                    log::error!("Commit #{seq} failed: {e}");
                }
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use futures_util::future::LocalBoxFuture;
    use futures_util::FutureExt;

    use super::{CommitError, CommitTarget};

    /// Counts invocations and runs an optional hook at call time.
    #[derive(Default)]
    pub struct CountingCommit {
        pub calls: Cell<usize>,
        pub fail: bool,
        pub on_call: RefCell<Option<Box<dyn Fn()>>>,
    }

    impl CountingCommit {
        pub fn failing() -> Rc<Self> {
            Rc::new(Self {
                fail: true,
                ..Self::default()
            })
        }
    }

    impl CommitTarget for CountingCommit {
        fn commit(&self) -> LocalBoxFuture<'_, Result<(), CommitError>> {
            self.calls.set(self.calls.get() + 1);
            if let Some(hook) = self.on_call.borrow().as_ref() {
                hook();
            }
            let fail = self.fail;
            async move {
                tokio::task::yield_now().await;
                if fail {
                    Err(CommitError::Status(reqwest::StatusCode::BAD_GATEWAY))
                } else {
                    Ok(())
                }
            }
            .boxed_local()
        }
    }
}
