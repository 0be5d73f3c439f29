//! Client configuration types.
//!
//! The model options are fixed constants of the chat protocol; they are
//! carried as a struct so a front end can override them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Path of the streaming chat endpoint.
pub const STREAM_PATH: &str = "/api/v1/chat/stream";

/// Path of the non-streaming chat endpoint.
pub const COMPLETE_PATH: &str = "/api/v1/chat";

/// Path of the backend liveness check.
pub const HEALTH_PATH: &str = "/health";

/// Configuration for the chat client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Base URL of the inference backend (e.g., "http://127.0.0.1:8000").
    #[serde(default = "ClientConfig::default_base_url")]
    pub base_url: String,

    /// Connection establishment timeout in seconds.
    #[serde(default = "ClientConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Whole-request timeout for the liveness check, in seconds.
    #[serde(default = "ClientConfig::default_health_timeout")]
    pub health_timeout_seconds: u64,

    /// Model options sent with every turn.
    #[serde(default)]
    pub model: ModelConfig,
}

impl ClientConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:8000".to_string()
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    const fn default_health_timeout() -> u64 {
        3
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get the health check timeout as a `Duration`.
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_seconds)
    }

    /// Build a full URL for an endpoint path.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            health_timeout_seconds: Self::default_health_timeout(),
            model: ModelConfig::default(),
        }
    }
}

/// Model options transmitted as multipart fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Hugging Face model identifier.
    #[serde(default = "ModelConfig::default_model_id")]
    pub model_id: String,

    /// Load the model with 4-bit quantization.
    #[serde(default = "ModelConfig::default_quant_4bit")]
    pub quant_4bit: bool,

    /// Force CPU inference.
    #[serde(default)]
    pub use_cpu: bool,

    /// Longest image edge in pixels before downscaling.
    #[serde(default = "ModelConfig::default_max_image_edge")]
    pub max_image_edge: u32,

    /// Generation length cap.
    #[serde(default = "ModelConfig::default_max_new_tokens")]
    pub max_new_tokens: u32,
}

impl ModelConfig {
    fn default_model_id() -> String {
        "Qwen/Qwen2-VL-2B-Instruct".to_string()
    }

    const fn default_quant_4bit() -> bool {
        true
    }

    const fn default_max_image_edge() -> u32 {
        1024
    }

    const fn default_max_new_tokens() -> u32 {
        512
    }

    /// The options as `(field, value)` pairs in wire order.
    #[must_use]
    pub fn form_fields(&self) -> [(&'static str, String); 5] {
        [
            ("model_id", self.model_id.clone()),
            ("quant_4bit", self.quant_4bit.to_string()),
            ("use_cpu", self.use_cpu.to_string()),
            ("max_image_edge", self.max_image_edge.to_string()),
            ("max_new_tokens", self.max_new_tokens.to_string()),
        ]
    }

    /// Short model name for display ("Qwen2-VL-2B-Instruct").
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.model_id
            .rsplit('/')
            .next()
            .unwrap_or(&self.model_id)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: Self::default_model_id(),
            quant_4bit: Self::default_quant_4bit(),
            use_cpu: false,
            max_image_edge: Self::default_max_image_edge(),
            max_new_tokens: Self::default_max_new_tokens(),
        }
    }
}
