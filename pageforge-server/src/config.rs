//! Server configuration, from flags or environment.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "pageforge-server", about = "Turn app briefs into deployed GitHub Pages sites")]
pub struct ServerConfig {
    /// Port to listen on (all interfaces).
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Shared secret every build request must carry.
    #[arg(long, env = "BUILD_SECRET", hide_env_values = true)]
    pub secret: String,

    /// GitHub personal access token with `repo` and `pages` scope.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// GitHub REST API base URL.
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub github_api_url: String,

    /// Anthropic API key used for code generation.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: String,

    /// Anthropic Messages API endpoint.
    #[arg(
        long,
        env = "ANTHROPIC_API_URL",
        default_value = "https://api.anthropic.com/v1/messages"
    )]
    pub anthropic_api_url: String,

    /// Claude model used for generation.
    #[arg(long, env = "ANTHROPIC_MODEL", default_value = "claude-sonnet-4-20250514")]
    pub model: String,

    /// Fixed wait after round 1 before notifying, so Pages has time to come up.
    #[arg(long, env = "PAGES_PROPAGATION_SECS", default_value_t = 10)]
    pub pages_propagation_secs: u64,

    /// Total delivery attempts for the completion callback.
    #[arg(long, env = "NOTIFY_MAX_ATTEMPTS", default_value_t = 4)]
    pub notify_max_attempts: u32,

    /// Base backoff between callback attempts; doubles each retry.
    #[arg(long, env = "NOTIFY_BASE_DELAY_MS", default_value_t = 1000)]
    pub notify_base_delay_ms: u64,

    /// Allow only one in-flight round per task id.
    #[arg(long, env = "SERIALIZE_TASKS", default_value_t = false)]
    pub serialize_tasks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            secret: String::new(),
            github_token: String::new(),
            github_api_url: "https://api.github.com".to_string(),
            anthropic_api_key: String::new(),
            anthropic_api_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            pages_propagation_secs: 10,
            notify_max_attempts: 4,
            notify_base_delay_ms: 1000,
            serialize_tasks: false,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn pages_propagation(&self) -> Duration {
        Duration::from_secs(self.pages_propagation_secs)
    }

    pub fn notify_base_delay(&self) -> Duration {
        Duration::from_millis(self.notify_base_delay_ms)
    }
}
