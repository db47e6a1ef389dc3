//! Repository publishing contract.
//!
//! The orchestrator only talks to this trait. `github::GitHubPublisher` is
//! the production implementation; tests plug in an in-memory one.

use async_trait::async_trait;

use crate::error::BuildResult;

/// Who can see a newly created project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Owner/name pair addressing a hosted project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectRef {
    pub owner: String,
    pub name: String,
}

impl ProjectRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    pub fn pages_url(&self) -> String {
        format!("https://{}.github.io/{}/", self.owner, self.name)
    }
}

impl std::fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Metadata of a hosted project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub reference: ProjectRef,
    pub default_branch: String,
}

/// A stored file together with its version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub version: String,
}

#[async_trait]
pub trait RepoPublisher: Send + Sync {
    /// Login of the authenticated account.
    async fn whoami(&self) -> BuildResult<String>;

    /// Create a project under the authenticated account.
    async fn create_project(&self, name: &str, visibility: Visibility) -> BuildResult<Project>;

    /// Look up an existing project.
    async fn get_project(&self, project: &ProjectRef) -> BuildResult<Project>;

    /// Write `path`. Without `prior_version` this is a fresh write; with one
    /// it fails with `PublishConflict` if the stored version moved.
    /// Returns the new version token.
    async fn upsert_file(
        &self,
        project: &ProjectRef,
        path: &str,
        content: &str,
        message: &str,
        prior_version: Option<&str>,
    ) -> BuildResult<String>;

    async fn get_file(&self, project: &ProjectRef, path: &str) -> BuildResult<RemoteFile>;

    /// Serve `branch` at `path` as a static site.
    async fn enable_static_hosting(
        &self,
        project: &ProjectRef,
        branch: &str,
        path: &str,
    ) -> BuildResult<()>;

    /// Id of the newest commit on `branch`.
    async fn latest_commit(&self, project: &ProjectRef, branch: &str) -> BuildResult<String>;
}
