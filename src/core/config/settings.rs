//! Typed runtime settings.
//!
//! Loaded from `config.yml` merged with `secrets.yml` in the data directory;
//! either file may be absent. API keys can also come from the environment
//! (`OPENAI_API_KEY`, `OPENROUTER_API_KEY`), which wins over the files.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;
use crate::core::errors::ApiError;

fn default_port() -> u16 {
    5000
}

fn default_chunk_size() -> usize {
    500
}

fn default_top_k() -> usize {
    3
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-large".to_string()
}

fn default_completion_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_referer() -> String {
    "http://localhost:5000".to_string()
}

fn default_app_title() -> String {
    "Askbase".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Sent as the HTTP-Referer header, required by OpenRouter.
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_app_title")]
    pub app_title: String,
    /// Abort a stream when no chunk arrives within this window.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            api_key: String::new(),
            referer: default_referer(),
            app_title: default_app_title(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub completion: CompletionSettings,
    #[serde(default)]
    pub rag: RagSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            embedding: EmbeddingSettings::default(),
            completion: CompletionSettings::default(),
            rag: RagSettings::default(),
        }
    }
}

impl Settings {
    pub fn load(paths: &AppPaths) -> Result<Self, ApiError> {
        let mut settings: Settings = read_yaml(&paths.config_path)?.unwrap_or_default();

        if let Some(secrets) = read_yaml::<SecretsFile>(&paths.secrets_path)? {
            if let Some(key) = secrets.openai_api_key {
                settings.embedding.api_key = key;
            }
            if let Some(key) = secrets.openrouter_api_key {
                settings.completion.api_key = key;
            }
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings.embedding.api_key = key;
        }
        if let Ok(key) = env::var("OPENROUTER_API_KEY") {
            settings.completion.api_key = key;
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ApiError> {
        if self.rag.chunk_size == 0 {
            return Err(ApiError::BadRequest(
                "rag.chunk_size must be at least 1".to_string(),
            ));
        }
        if self.rag.top_k == 0 {
            return Err(ApiError::BadRequest(
                "rag.top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    openai_api_key: Option<String>,
    openrouter_api_key: Option<String>,
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ApiError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| ApiError::internal(format!("failed to read {}: {}", path.display(), e)))?;
    let parsed = serde_yaml::from_str(&contents)
        .map_err(|e| ApiError::internal(format!("failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(parsed))
}
