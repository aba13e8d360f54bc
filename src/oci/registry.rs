use crate::constants::{DEFAULT_REGISTRY_URL, DEFAULT_TAG_PAGE_SIZE};
use crate::oci::{TagPage, TagSource};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

/// Tag source backed by the Docker Hub repositories API.
///
/// This is the public `v2/repositories/<namespace>/<repo>/tags` listing, not
/// the authenticated registry v2 `tags/list` endpoint, so no token is needed
/// for public repos. Each response carries an absolute `next` URL.
pub struct HubTagSource {
    client: Client,
    base_url: String,  // e.g., https://registry.hub.docker.com
    namespace: String, // e.g., acme
    page_size: u32,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagListResponse {
    results: Vec<TagEntry>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl HubTagSource {
    pub fn new(namespace: &str) -> Self {
        Self::with_registry(DEFAULT_REGISTRY_URL, namespace)
    }

    pub fn with_registry(registry: &str, namespace: &str) -> Self {
        let base_url = if registry.contains("://") {
            registry.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", registry.trim_end_matches('/'))
        };

        Self {
            client: Client::new(),
            base_url,
            namespace: namespace.to_string(),
            page_size: DEFAULT_TAG_PAGE_SIZE,
            token: None,
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    /// Whether `url` points under the configured registry base.
    fn is_own_url(&self, url: &str) -> bool {
        url.strip_prefix(self.base_url.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    fn first_page_url(&self, repo: &str) -> String {
        format!(
            "{}/v2/repositories/{}/{}/tags?page_size={}",
            self.base_url, self.namespace, repo, self.page_size
        )
    }
}

impl TagSource for HubTagSource {
    fn list_tags(&self, repo: &str, cursor: Option<&str>) -> Result<TagPage> {
        let url = match cursor {
            Some(next) => next.to_string(),
            None => self.first_page_url(repo),
        };
        tracing::debug!(repo, url = %url, "Fetching tag page");

        let mut rb = self.client.get(&url);
        if let Some(ref t) = self.token {
            if self.is_own_url(&url) {
                rb = rb.bearer_auth(t);
            } else {
                tracing::debug!(repo, url = %url, "Not sending registry token to foreign host");
            }
        }

        let resp = rb
            .send()
            .with_context(|| format!("request to {} failed", url))?;
        if !resp.status().is_success() {
            anyhow::bail!("Failed to list tags for {}: {}", repo, resp.status());
        }

        let body: TagListResponse = resp
            .json()
            .with_context(|| format!("malformed tag listing from {}", url))?;

        Ok(TagPage {
            tags: body.results.into_iter().map(|t| t.name).collect(),
            next: body.next.filter(|n| !n.is_empty()),
        })
    }
}
