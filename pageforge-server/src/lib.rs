//! pageforge-server: brief in, GitHub Pages site out.
//!
//! A caller posts an app brief to `/api/build`. The server acknowledges at
//! once, then in the background:
//! - generates a single-page app with Claude
//! - publishes it to a GitHub repository and enables Pages
//! - reports the commit and site URL to the caller's evaluation endpoint

pub mod config;
pub mod error;
pub mod github;
pub mod llm;
pub mod model;
pub mod notifier;
pub mod orchestrator;
pub mod prompts;
pub mod publisher;
pub mod retry;
pub mod server;
pub mod stats;
pub mod web;
