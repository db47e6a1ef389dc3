//! Wiring: config → collaborators → orchestrator → HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::github::GitHubPublisher;
use crate::llm::{CodeGenerator, LlmClient};
use crate::notifier::{HttpTransport, Notifier, NotifyTransport};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::publisher::RepoPublisher;
use crate::retry::RetryPolicy;
use crate::stats::Stats;
use crate::web::{self, AppState};

pub struct Server {
    config: ServerConfig,
    generator: Arc<dyn CodeGenerator>,
    publisher: Arc<dyn RepoPublisher>,
    transport: Arc<dyn NotifyTransport>,
    stats: Arc<Stats>,
}

impl Server {
    /// Build a server talking to the real Claude and GitHub APIs.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let generator = LlmClient::new(config.anthropic_api_key.clone())
            .with_model(&config.model)
            .with_endpoint(&config.anthropic_api_url);
        let publisher = GitHubPublisher::new(&config.github_api_url, config.github_token.clone())
            .context("Failed to set up GitHub publisher")?;
        Ok(Self::with_collaborators(
            config,
            Arc::new(generator),
            Arc::new(publisher),
            Arc::new(HttpTransport::new()),
        ))
    }

    /// Build a server with injected collaborators (used by tests).
    pub fn with_collaborators(
        config: ServerConfig,
        generator: Arc<dyn CodeGenerator>,
        publisher: Arc<dyn RepoPublisher>,
        transport: Arc<dyn NotifyTransport>,
    ) -> Self {
        Self {
            config,
            generator,
            publisher,
            transport,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    fn router(&self) -> axum::Router {
        let notifier = Notifier::new(
            Arc::clone(&self.transport),
            RetryPolicy::new(self.config.notify_max_attempts, self.config.notify_base_delay()),
        );
        let orchestrator = Orchestrator::new(
            Arc::clone(&self.generator),
            Arc::clone(&self.publisher),
            notifier,
            OrchestratorConfig {
                pages_propagation: self.config.pages_propagation(),
                serialize_tasks: self.config.serialize_tasks,
            },
            Arc::clone(&self.stats),
        );
        web::router(Arc::new(AppState {
            secret: self.config.secret.clone(),
            orchestrator: Arc::new(orchestrator),
        }))
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!(%addr, serialize_tasks = self.config.serialize_tasks, "pageforge listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down");
            })
            .await
            .context("HTTP server error")
    }

    /// Bind `listen_addr` and serve in the background; returns the bound
    /// address and the server task (for testing).
    pub async fn start(self, listen_addr: &str) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(listen_addr).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await?;
            Ok(())
        });
        Ok((addr, handle))
    }
}
