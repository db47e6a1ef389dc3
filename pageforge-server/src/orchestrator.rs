//! Build orchestrator: runs one round for a request, then notifies.
//!
//! A round is either `Build` (generate, create the repository, write the
//! three files, switch on Pages) or `Revise` (read the published page,
//! regenerate it, overwrite it guarded by its version token). Both end by
//! reading the head commit and posting the result to the caller's
//! evaluation URL.
//!
//! Nothing is kept between requests. Round 2 gets everything it needs by
//! reading the repository back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Datelike;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{BuildError, BuildResult};
use crate::llm::{self, CodeGenerator};
use crate::model::{BuildRequest, NotificationPayload, Round};
use crate::notifier::Notifier;
use crate::prompts;
use crate::publisher::{Project, ProjectRef, RepoPublisher, Visibility};
use crate::stats::Stats;

pub const INDEX_PATH: &str = "index.html";
pub const README_PATH: &str = "README.md";
pub const LICENSE_PATH: &str = "LICENSE";

/// Knobs for round execution.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Fixed wait after round 1 before notifying. Pages is not polled; this
    /// is a guess at how long the first deployment takes.
    pub pages_propagation: Duration,
    /// Hold a per-task lock for the whole round so two rounds of the same
    /// task never interleave. Off by default: concurrent rounds race and
    /// only the round 2 version check catches a clash.
    pub serialize_tasks: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pages_propagation: Duration::from_secs(10),
            serialize_tasks: false,
        }
    }
}

/// What a finished round produced.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub payload: NotificationPayload,
    pub notify_attempts: u32,
}

pub struct Orchestrator {
    generator: Arc<dyn CodeGenerator>,
    publisher: Arc<dyn RepoPublisher>,
    notifier: Notifier,
    config: OrchestratorConfig,
    stats: Arc<Stats>,
    task_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        publisher: Arc<dyn RepoPublisher>,
        notifier: Notifier,
        config: OrchestratorConfig,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            generator,
            publisher,
            notifier,
            config,
            stats,
            task_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Run `req` in the background once `start` resolves.
    ///
    /// The round runs in its own task; this outer task only waits for it and
    /// turns the result (including a panic) into a log event and a counter.
    pub fn spawn(
        self: &Arc<Self>,
        req: BuildRequest,
        start: impl Future<Output = ()> + Send + 'static,
    ) -> JoinHandle<()> {
        let span = tracing::info_span!("round", task = %req.task, round = req.round.number());
        let orchestrator = Arc::clone(self);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(
            async move {
                start.await;
                let inner = tokio::spawn(
                    async move { orchestrator.run(req).await }.in_current_span(),
                );
                match inner.await {
                    Ok(Ok(report)) => {
                        stats.record_completed();
                        let totals = stats.snapshot();
                        tracing::info!(
                            commit = %report.payload.commit_sha,
                            pages_url = %report.payload.pages_url,
                            notify_attempts = report.notify_attempts,
                            completed = totals.completed,
                            failed = totals.failed,
                            panicked = totals.panicked,
                            notify_failed = totals.notify_failed,
                            "Round complete"
                        );
                    }
                    Ok(Err(e @ BuildError::NotificationDelivery { .. })) => {
                        stats.record_notify_failed();
                        let totals = stats.snapshot();
                        tracing::error!(
                            kind = e.kind(),
                            error = %e,
                            completed = totals.completed,
                            failed = totals.failed,
                            panicked = totals.panicked,
                            notify_failed = totals.notify_failed,
                            "Round published but not reported"
                        );
                    }
                    Ok(Err(e)) => {
                        stats.record_failed();
                        let totals = stats.snapshot();
                        tracing::error!(
                            kind = e.kind(),
                            error = %e,
                            completed = totals.completed,
                            failed = totals.failed,
                            panicked = totals.panicked,
                            notify_failed = totals.notify_failed,
                            "Round aborted"
                        );
                    }
                    Err(join_err) if join_err.is_panic() => {
                        stats.record_panicked();
                        let totals = stats.snapshot();
                        let panic = panic_message(join_err.into_panic());
                        tracing::error!(
                            kind = "panic",
                            panic = %panic,
                            completed = totals.completed,
                            failed = totals.failed,
                            panicked = totals.panicked,
                            notify_failed = totals.notify_failed,
                            "Round panicked"
                        );
                    }
                    Err(join_err) => {
                        stats.record_failed();
                        let totals = stats.snapshot();
                        tracing::warn!(
                            error = %join_err,
                            completed = totals.completed,
                            failed = totals.failed,
                            panicked = totals.panicked,
                            notify_failed = totals.notify_failed,
                            "Round cancelled"
                        );
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Execute one round and deliver its notification.
    pub async fn run(&self, req: BuildRequest) -> BuildResult<RoundReport> {
        let _lock = if self.config.serialize_tasks {
            Some(self.lock_task(&req.task).await)
        } else {
            None
        };
        self.run_unlocked(&req).await
    }

    /// Number of task ids with a live lock entry.
    pub fn locked_tasks(&self) -> usize {
        self.task_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn run_unlocked(&self, req: &BuildRequest) -> BuildResult<RoundReport> {
        tracing::info!(checks = req.checks.len(), attachments = req.attachments.len(), "Round started");

        let project = match req.round {
            Round::Build => self.build(req).await?,
            Round::Revise => self.revise(req).await?,
        };

        let commit_sha = self
            .publisher
            .latest_commit(&project.reference, &project.default_branch)
            .await?;
        let payload = NotificationPayload {
            email: req.email.clone(),
            task: req.task.clone(),
            round: req.round.number(),
            nonce: req.nonce.clone(),
            repo_url: project.reference.repo_url(),
            commit_sha,
            pages_url: project.reference.pages_url(),
        };

        match req.round {
            Round::Build => {
                tracing::info!(
                    wait_secs = self.config.pages_propagation.as_secs_f64(),
                    "Waiting for Pages to come up"
                );
                tokio::time::sleep(self.config.pages_propagation).await;
            }
            Round::Revise => {}
        }

        let notify_attempts = self.notifier.notify(&req.evaluation_url, &payload).await?;
        Ok(RoundReport {
            payload,
            notify_attempts,
        })
    }

    /// Round 1: generate the app and publish a fresh repository.
    async fn build(&self, req: &BuildRequest) -> BuildResult<Project> {
        let owner = self.publisher.whoami().await?;

        let context = prompts::attachment_context(&req.attachments);
        let prompt = prompts::build_prompt(&req.brief, &context, &req.checks);
        let html = self.generate(&prompt).await?;

        let created = self.publisher.create_project(&req.task, Visibility::Public).await?;
        let project = Project {
            reference: ProjectRef::new(owner, req.task.clone()),
            default_branch: created.default_branch,
        };
        tracing::info!(repo = %project.reference, branch = %project.default_branch, "Repository created");

        let readme = prompts::readme(&req.task, &req.brief, &project.reference.pages_url());
        let license = prompts::mit_license(&project.reference.owner, chrono::Utc::now().year());
        let files = [
            (INDEX_PATH, html.as_str(), "Add generated app"),
            (README_PATH, readme.as_str(), "Add README"),
            (LICENSE_PATH, license.as_str(), "Add MIT license"),
        ];
        for (path, content, message) in files {
            self.publisher
                .upsert_file(&project.reference, path, content, message, None)
                .await?;
            tracing::debug!(path, bytes = content.len(), "File written");
        }

        self.publisher
            .enable_static_hosting(&project.reference, &project.default_branch, "/")
            .await?;
        tracing::info!(pages_url = %project.reference.pages_url(), "Pages enabled");
        Ok(project)
    }

    /// Round 2: regenerate the published page with the new brief.
    async fn revise(&self, req: &BuildRequest) -> BuildResult<Project> {
        let owner = self.publisher.whoami().await?;
        let reference = ProjectRef::new(owner, req.task.clone());

        let existing = self.publisher.get_file(&reference, INDEX_PATH).await?;
        tracing::info!(version = %existing.version, bytes = existing.content.len(), "Loaded current page");

        let prompt = prompts::revise_prompt(&existing.content, &req.brief);
        let html = self.generate(&prompt).await?;

        let version = self
            .publisher
            .upsert_file(
                &reference,
                INDEX_PATH,
                &html,
                "Update app for round 2",
                Some(existing.version.as_str()),
            )
            .await?;
        tracing::info!(version = %version, "Page updated");

        self.publisher.get_project(&reference).await
    }

    async fn generate(&self, prompt: &str) -> BuildResult<String> {
        let raw = self.generator.generate(prompt).await?;
        let html = llm::strip_code_fence(&raw);
        if html.trim().is_empty() {
            return Err(BuildError::Generation("completion has no document".to_string()));
        }
        Ok(html.to_string())
    }

    async fn lock_task(&self, task: &str) -> TaskLock<'_> {
        let lock = {
            let mut locks = self.task_locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(task.to_string()).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        TaskLock {
            orchestrator: self,
            task: task.to_string(),
            lock,
            guard: Some(guard),
        }
    }
}

/// Held for the length of a serialized round. Dropping it, including while
/// a panicking round unwinds, unlocks the task and forgets the entry once
/// nobody else wants it.
struct TaskLock<'a> {
    orchestrator: &'a Orchestrator,
    task: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for TaskLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self
            .orchestrator
            .task_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // Map entry plus ours means no other round is waiting on it.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.task);
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
