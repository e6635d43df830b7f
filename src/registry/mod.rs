use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const REGISTRY_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
struct RegisterRequest<'a> {
    city_managed: &'a str,
    api_url: &'a str,
    enterprise_name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverResponse {
    pub found: bool,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub enterprise_name: String,
    #[serde(default)]
    pub city_name: String,
}

/// Name-to-URL lookup for participant enterprises. The service itself
/// runs elsewhere; only its `/register` and `/discover` contract
/// matters here.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, city_managed: &str, api_url: &str, enterprise_name: &str) -> Result<()>;
    async fn discover(&self, city: &str) -> Result<Option<DiscoverResponse>>;
}

/// HTTP client against the external registry, grounded on
/// `original_source/registry/registry_client/client.go`: URL-encodes the
/// city query param and uses a 5 s client timeout.
pub struct HttpRegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REGISTRY_CLIENT_TIMEOUT)
            .build()
            .expect("reqwest client with fixed timeout always builds");
        Self { base_url: base_url.into(), http }
    }
}

#[async_trait]
impl Registry for HttpRegistryClient {
    async fn register(&self, city_managed: &str, api_url: &str, enterprise_name: &str) -> Result<()> {
        let url = format!("{}/register", self.base_url);
        let body = RegisterRequest { city_managed, api_url, enterprise_name };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::RegistryLookupFailure(city_managed.to_string(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::RegistryLookupFailure(city_managed.to_string(), format!("registry returned {}", response.status())));
        }
        Ok(())
    }

    async fn discover(&self, city: &str) -> Result<Option<DiscoverResponse>> {
        let url = format!("{}/discover", self.base_url);
        // `reqwest`'s `query()` percent-encodes values itself, which is
        // the Rust-idiomatic equivalent of an explicit `url.QueryEscape`
        // call on the city name.
        let response = self
            .http
            .get(&url)
            .query(&[("city", city)])
            .send()
            .await
            .map_err(|e| Error::RegistryLookupFailure(city.to_string(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::RegistryLookupFailure(city.to_string(), format!("registry returned {}", response.status())));
        }

        let decoded: DiscoverResponse = response
            .json()
            .await
            .map_err(|e| Error::RegistryLookupFailure(city.to_string(), e.to_string()))?;

        if decoded.found {
            Ok(Some(decoded))
        } else {
            Ok(None)
        }
    }
}

/// In-memory double for tests and single-process runs — no real network
/// or broker needed to exercise the full two-phase-commit path.
#[derive(Default)]
pub struct InMemoryRegistry {
    entries: Mutex<HashMap<String, DiscoverResponse>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn register(&self, city_managed: &str, api_url: &str, enterprise_name: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("InMemoryRegistry lock poisoned");
        entries.insert(
            city_managed.to_string(),
            DiscoverResponse { found: true, api_url: api_url.to_string(), enterprise_name: enterprise_name.to_string(), city_name: city_managed.to_string() },
        );
        Ok(())
    }

    async fn discover(&self, city: &str) -> Result<Option<DiscoverResponse>> {
        let entries = self.entries.lock().expect("InMemoryRegistry lock poisoned");
        Ok(entries.get(city).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_registry_round_trips_registration() {
        let registry = InMemoryRegistry::new();
        registry.register("Ilheus", "http://ilheus.example:8080", "Ilheus Energy Co").await.unwrap();

        let found = registry.discover("Ilheus").await.unwrap().expect("should be found");
        assert_eq!(found.api_url, "http://ilheus.example:8080");

        assert!(registry.discover("Feira de Santana").await.unwrap().is_none());
    }
}
