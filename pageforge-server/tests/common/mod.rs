//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use pageforge_server::error::{BuildError, BuildResult};
use pageforge_server::llm::CodeGenerator;
use pageforge_server::model::{Attachment, BuildRequest, NotificationPayload, Round};
use pageforge_server::notifier::NotifyTransport;
use pageforge_server::publisher::{Project, ProjectRef, RemoteFile, RepoPublisher, Visibility};

pub const OWNER: &str = "octo";
pub const SECRET: &str = "s3cret";
pub const EVAL_URL: &str = "http://evaluator.test/notify";

pub fn request(task: &str, round: Round, brief: &str) -> BuildRequest {
    BuildRequest {
        secret: SECRET.to_string(),
        task: task.to_string(),
        round,
        brief: brief.to_string(),
        attachments: Vec::<Attachment>::new(),
        checks: Vec::new(),
        email: "student@example.com".to_string(),
        nonce: "nonce-42".to_string(),
        evaluation_url: EVAL_URL.to_string(),
    }
}

// ─── Generator ───────────────────────────────────────────────────────────────

enum Reply {
    Text(String),
    Fail(String),
    Panic,
}

pub struct FakeGenerator {
    reply: Reply,
    gate: Option<Arc<Semaphore>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(Reply::Text(text.to_string()), None)
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new(Reply::Fail(message.to_string()), None)
    }

    pub fn panicking() -> Arc<Self> {
        Self::new(Reply::Panic, None)
    }

    /// Each call records its prompt, then waits for one permit on `gate`.
    pub fn gated(text: &str, gate: Arc<Semaphore>) -> Arc<Self> {
        Self::new(Reply::Text(text.to_string()), Some(gate))
    }

    fn new(reply: Reply, gate: Option<Arc<Semaphore>>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            gate,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> BuildResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(message) => Err(BuildError::Generation(message.clone())),
            Reply::Panic => panic!("generator exploded"),
        }
    }
}

// ─── Publisher ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherCall {
    Whoami,
    CreateProject { name: String, visibility: Visibility },
    GetProject { name: String },
    Upsert { name: String, path: String, prior: Option<String> },
    GetFile { name: String, path: String },
    EnableHosting { name: String, branch: String, path: String },
    LatestCommit { name: String, branch: String },
}

#[derive(Default)]
struct Store {
    projects: Vec<String>,
    /// (project, path) → (content, version)
    files: HashMap<(String, String), (String, String)>,
    hosting: Vec<String>,
    next_version: u64,
    commits: HashMap<String, u64>,
    calls: Vec<PublisherCall>,
}

impl Store {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        format!("blob-{}", self.next_version)
    }
}

#[derive(Default)]
pub struct InMemoryPublisher {
    store: Mutex<Store>,
}

impl InMemoryPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend round 1 already ran for `task`. Returns the page's version.
    pub fn seed(&self, task: &str, index_html: &str) -> String {
        let mut store = self.store.lock().unwrap();
        store.projects.push(task.to_string());
        let version = store.bump();
        store.files.insert(
            (task.to_string(), "index.html".to_string()),
            (index_html.to_string(), version.clone()),
        );
        *store.commits.entry(task.to_string()).or_default() += 1;
        version
    }

    /// Change a file behind the pipeline's back.
    pub fn touch(&self, task: &str, path: &str) {
        let mut store = self.store.lock().unwrap();
        let version = store.bump();
        if let Some(entry) = store.files.get_mut(&(task.to_string(), path.to_string())) {
            entry.1 = version;
        }
    }

    pub fn file(&self, task: &str, path: &str) -> Option<String> {
        let store = self.store.lock().unwrap();
        store
            .files
            .get(&(task.to_string(), path.to_string()))
            .map(|(content, _)| content.clone())
    }

    pub fn calls(&self) -> Vec<PublisherCall> {
        self.store.lock().unwrap().calls.clone()
    }

    pub fn hosting_enabled(&self, task: &str) -> usize {
        let store = self.store.lock().unwrap();
        store.hosting.iter().filter(|t| *t == task).count()
    }

    fn record(&self, call: PublisherCall) {
        self.store.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl RepoPublisher for InMemoryPublisher {
    async fn whoami(&self) -> BuildResult<String> {
        self.record(PublisherCall::Whoami);
        Ok(OWNER.to_string())
    }

    async fn create_project(&self, name: &str, visibility: Visibility) -> BuildResult<Project> {
        self.record(PublisherCall::CreateProject {
            name: name.to_string(),
            visibility,
        });
        let mut store = self.store.lock().unwrap();
        if store.projects.iter().any(|p| p == name) {
            return Err(BuildError::Publish(format!("{name}: name already exists")));
        }
        store.projects.push(name.to_string());
        Ok(Project {
            reference: ProjectRef::new(OWNER, name),
            default_branch: "main".to_string(),
        })
    }

    async fn get_project(&self, project: &ProjectRef) -> BuildResult<Project> {
        self.record(PublisherCall::GetProject {
            name: project.name.clone(),
        });
        let store = self.store.lock().unwrap();
        if !store.projects.contains(&project.name) {
            return Err(BuildError::Publish(format!("{project}: not found")));
        }
        Ok(Project {
            reference: project.clone(),
            default_branch: "main".to_string(),
        })
    }

    async fn upsert_file(
        &self,
        project: &ProjectRef,
        path: &str,
        content: &str,
        _message: &str,
        prior_version: Option<&str>,
    ) -> BuildResult<String> {
        self.record(PublisherCall::Upsert {
            name: project.name.clone(),
            path: path.to_string(),
            prior: prior_version.map(str::to_string),
        });
        let mut store = self.store.lock().unwrap();
        let key = (project.name.clone(), path.to_string());
        if let Some(prior) = prior_version {
            let current = store.files.get(&key).map(|(_, v)| v.as_str());
            if current != Some(prior) {
                return Err(BuildError::PublishConflict {
                    path: path.to_string(),
                });
            }
        }
        let version = store.bump();
        store.files.insert(key, (content.to_string(), version.clone()));
        *store.commits.entry(project.name.clone()).or_default() += 1;
        Ok(version)
    }

    async fn get_file(&self, project: &ProjectRef, path: &str) -> BuildResult<RemoteFile> {
        self.record(PublisherCall::GetFile {
            name: project.name.clone(),
            path: path.to_string(),
        });
        let store = self.store.lock().unwrap();
        store
            .files
            .get(&(project.name.clone(), path.to_string()))
            .map(|(content, version)| RemoteFile {
                content: content.clone(),
                version: version.clone(),
            })
            .ok_or_else(|| BuildError::Publish(format!("{project}/{path}: not found")))
    }

    async fn enable_static_hosting(
        &self,
        project: &ProjectRef,
        branch: &str,
        path: &str,
    ) -> BuildResult<()> {
        self.record(PublisherCall::EnableHosting {
            name: project.name.clone(),
            branch: branch.to_string(),
            path: path.to_string(),
        });
        self.store.lock().unwrap().hosting.push(project.name.clone());
        Ok(())
    }

    async fn latest_commit(&self, project: &ProjectRef, branch: &str) -> BuildResult<String> {
        self.record(PublisherCall::LatestCommit {
            name: project.name.clone(),
            branch: branch.to_string(),
        });
        let store = self.store.lock().unwrap();
        let n = store.commits.get(&project.name).copied().unwrap_or(0);
        Ok(format!("commit-{n}"))
    }
}

// ─── Notification transport ──────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingTransport {
    fail: bool,
    delivered: Mutex<Vec<(String, NotificationPayload)>>,
    attempts: Mutex<usize>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn always_failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn delivered(&self) -> Vec<(String, NotificationPayload)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl NotifyTransport for RecordingTransport {
    async fn post(&self, url: &str, payload: &NotificationPayload) -> anyhow::Result<()> {
        *self.attempts.lock().unwrap() += 1;
        if self.fail {
            anyhow::bail!("connection refused");
        }
        self.delivered
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(())
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, desc: &str, check: impl Fn() -> bool) {
    let start = tokio::time::Instant::now();
    while !check() {
        if start.elapsed() > timeout {
            panic!("Timeout waiting for: {desc}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
