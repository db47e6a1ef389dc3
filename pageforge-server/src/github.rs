//! GitHub REST implementation of [`RepoPublisher`].
//!
//! Files go through the contents API (one commit per write), Pages is
//! switched on with the legacy branch source, and the blob `sha` serves as
//! the version token.

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::error::{BuildError, BuildResult};
use crate::publisher::{Project, ProjectRef, RemoteFile, RepoPublisher, Visibility};

const USER_AGENT: &str = "pageforge-server";

#[derive(Debug, Deserialize)]
struct UserJson {
    login: String,
}

#[derive(Debug, Deserialize)]
struct OwnerJson {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoJson {
    name: String,
    owner: OwnerJson,
    #[serde(default)]
    default_branch: Option<String>,
}

impl From<RepoJson> for Project {
    fn from(repo: RepoJson) -> Self {
        Project {
            reference: ProjectRef::new(repo.owner.login, repo.name),
            default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentJson {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct PutContentJson {
    content: ContentRef,
}

#[derive(Debug, Deserialize)]
struct ContentRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitJson {
    sha: String,
}

pub struct GitHubPublisher {
    api_base: String,
    token: String,
    http: reqwest::Client,
}

impl GitHubPublisher {
    pub fn new(api_base: &str, token: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build GitHub HTTP client")?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> BuildResult<Response> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {what}"))
            .map_err(|e| BuildError::Publish(format!("{e:#}")))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BuildError::Publish(format!("{what}: GitHub API error {status}: {body}")))
    }

    async fn json<T: serde::de::DeserializeOwned>(resp: Response, what: &str) -> BuildResult<T> {
        resp.json::<T>()
            .await
            .map_err(|e| BuildError::Publish(format!("{what}: bad GitHub response: {e}")))
    }
}

/// Whether a failed contents write means the sha we sent is out of date.
fn is_version_conflict(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("sha"))
}

/// `POST /user/repos` body. The repository starts empty; every file is
/// written through the contents API.
fn create_repo_body(name: &str, visibility: Visibility) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "private": visibility == Visibility::Private,
        "auto_init": false,
    })
}

fn decode_content(raw: &str) -> BuildResult<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| BuildError::Publish(format!("file content is not base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| BuildError::Publish(format!("file is not UTF-8: {e}")))
}

#[async_trait]
impl RepoPublisher for GitHubPublisher {
    async fn whoami(&self) -> BuildResult<String> {
        let resp = self.send(self.request(Method::GET, "/user"), "get user").await?;
        let user: UserJson = Self::json(resp, "get user").await?;
        Ok(user.login)
    }

    async fn create_project(&self, name: &str, visibility: Visibility) -> BuildResult<Project> {
        let req = self
            .request(Method::POST, "/user/repos")
            .json(&create_repo_body(name, visibility));
        let resp = self.send(req, "create repository").await?;
        let repo: RepoJson = Self::json(resp, "create repository").await?;
        Ok(repo.into())
    }

    async fn get_project(&self, project: &ProjectRef) -> BuildResult<Project> {
        let path = format!("/repos/{}/{}", project.owner, project.name);
        let resp = self.send(self.request(Method::GET, &path), "get repository").await?;
        let repo: RepoJson = Self::json(resp, "get repository").await?;
        Ok(repo.into())
    }

    async fn upsert_file(
        &self,
        project: &ProjectRef,
        path: &str,
        content: &str,
        message: &str,
        prior_version: Option<&str>,
    ) -> BuildResult<String> {
        let mut body = serde_json::json!({
            "message": message,
            "content": base64::engine::general_purpose::STANDARD.encode(content),
        });
        if let Some(sha) = prior_version {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }
        let url = format!("/repos/{}/{}/contents/{path}", project.owner, project.name);
        let resp = self
            .request(Method::PUT, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BuildError::Publish(format!("write {path}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if prior_version.is_some() && is_version_conflict(status, &text) {
                return Err(BuildError::PublishConflict {
                    path: path.to_string(),
                });
            }
            return Err(BuildError::Publish(format!(
                "write {path}: GitHub API error {status}: {text}"
            )));
        }
        let put: PutContentJson = Self::json(resp, "write file").await?;
        Ok(put.content.sha)
    }

    async fn get_file(&self, project: &ProjectRef, path: &str) -> BuildResult<RemoteFile> {
        let url = format!("/repos/{}/{}/contents/{path}", project.owner, project.name);
        let resp = self.send(self.request(Method::GET, &url), "read file").await?;
        let file: ContentJson = Self::json(resp, "read file").await?;
        if file.encoding != "base64" {
            return Err(BuildError::Publish(format!(
                "read {path}: unexpected encoding {:?}",
                file.encoding
            )));
        }
        Ok(RemoteFile {
            content: decode_content(&file.content)?,
            version: file.sha,
        })
    }

    async fn enable_static_hosting(
        &self,
        project: &ProjectRef,
        branch: &str,
        path: &str,
    ) -> BuildResult<()> {
        let body = serde_json::json!({ "source": { "branch": branch, "path": path } });
        let url = format!("/repos/{}/{}/pages", project.owner, project.name);
        let resp = self
            .request(Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BuildError::Publish(format!("enable pages: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            tracing::warn!(project = %project, "Pages already enabled");
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(BuildError::Publish(format!(
            "enable pages: GitHub API error {status}: {text}"
        )))
    }

    async fn latest_commit(&self, project: &ProjectRef, branch: &str) -> BuildResult<String> {
        let url = format!("/repos/{}/{}/commits/{branch}", project.owner, project.name);
        let resp = self.send(self.request(Method::GET, &url), "latest commit").await?;
        let commit: CommitJson = Self::json(resp, "latest commit").await?;
        Ok(commit.sha)
    }
}
