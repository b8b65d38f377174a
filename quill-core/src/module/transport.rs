//! URL fetch collaborator

use std::collections::HashMap;

/// Fetches the text of a remote module
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, String>;
}

/// Transport that refuses every request
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn fetch(&self, url: &str) -> Result<String, String> {
        Err(format!("network access disabled, cannot fetch {}", url))
    }
}

/// Fixed URL -> text table
#[derive(Debug, Clone, Default)]
pub struct StaticTransport {
    responses: HashMap<String, String>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(url.to_string(), body.to_string());
        self
    }
}

impl Transport for StaticTransport {
    fn fetch(&self, url: &str) -> Result<String, String> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| format!("404 Not Found: {}", url))
    }
}
