use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use services::services::{
    ai_client::{AiConfig, DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL},
    embeddings::{DEFAULT_CHUNK_SIZE, DEFAULT_TOP_K},
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::Settings;

/// Skill assessment API server
#[derive(Debug, Clone, Parser)]
#[command(name = "server", version, about)]
pub struct Config {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://skill-assess.db")]
    pub database_url: String,

    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "AI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub ai_base_url: String,

    #[arg(long, env = "AI_API_KEY", hide_env_values = true)]
    pub ai_api_key: Option<String>,

    #[arg(long, env = "AI_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub ai_chat_model: String,

    #[arg(long, env = "AI_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub ai_embedding_model: String,

    /// Maximum characters per source chunk
    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Excerpts retrieved per generation prompt
    #[arg(long, env = "RETRIEVAL_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub retrieval_top_k: usize,

    #[arg(long, env = "DISPUTE_CHECK_INTERVAL_SECS", default_value_t = 60)]
    pub dispute_check_interval_secs: u64,

    /// Allowed browser origin; any origin when unset
    #[arg(long, env = "CORS_ORIGIN")]
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn ai_config(&self) -> AiConfig {
        AiConfig {
            base_url: self.ai_base_url.clone(),
            api_key: self.ai_api_key.clone().filter(|k| !k.trim().is_empty()),
            chat_model: self.ai_chat_model.clone(),
            embedding_model: self.ai_embedding_model.clone(),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            chunk_size: self.chunk_size.max(1),
            retrieval_top_k: self.retrieval_top_k,
            ai_configured: self.ai_config().api_key.is_some(),
        }
    }

    pub fn dispute_check_interval(&self) -> Duration {
        Duration::from_secs(self.dispute_check_interval_secs.max(1))
    }

    pub fn cors_layer(&self) -> anyhow::Result<CorsLayer> {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        match &self.cors_origin {
            Some(origin) => {
                let origin = HeaderValue::from_str(origin).with_context(|| format!("invalid CORS_ORIGIN: {origin}"))?;
                Ok(layer.allow_origin(origin))
            }
            None => Ok(layer.allow_origin(Any)),
        }
    }
}
