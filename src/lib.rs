//! # multilab
//!
//! A chat-completion proxy in front of OpenRouter, plus the multi-panel
//! orchestrator that fans one prompt out to several models at once.
//!
//! The proxy runs on a from-scratch async HTTP/1.1 stack ([`server`],
//! [`router`], [`middleware`]). The panel side ([`panel`]) talks to a running
//! proxy over HTTP and keeps one persisted transcript per model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use multilab::config::ProxyConfig;
//! use multilab::llm::OpenRouterClient;
//! use multilab::proxy::{self, ChatProxy};
//! use multilab::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = std::env::var("OPENROUTER_API_KEY").ok();
//!     let chat = Arc::new(ChatProxy::new(
//!         ProxyConfig::new(key.as_deref()),
//!         Arc::new(OpenRouterClient::new()),
//!     ));
//!     let server = Server::bind("127.0.0.1:3030").await?;
//!     server.run(proxy::app(chat).into_handler()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod http;
pub mod llm;
pub mod middleware;
pub mod panel;
pub mod proxy;
pub mod router;
pub mod security;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
