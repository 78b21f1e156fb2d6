//! Text-completion backend contract and its HTTP binding.
//!
//! The pipeline consumes the model through a single
//! `converse(prompt) -> text` call; everything else (provider, auth,
//! transport) lives behind this trait.

pub mod http;

pub use http::HttpModelClient;

/// The external text-completion contract.
#[allow(async_fn_in_trait)]
pub trait ModelClient: Send + Sync {
    /// Send one prompt, get the raw response text back.
    async fn converse(&self, prompt: &str) -> anyhow::Result<String>;
}
