use crate::error::{Error, Result};

/// Environment-driven configuration, matching
/// `original_source/api/api.go`'s env handling and defaults
/// (`ENTERPRISE_NAME` → "SolAtlantico", `ENTERPRISE_PORT` → "8080",
/// `CP_WORKER_IDS` → "CP001").
#[derive(Debug, Clone)]
pub struct Config {
    pub enterprise_name: String,
    pub enterprise_port: u16,
    pub owned_city: String,
    pub cp_worker_ids: Vec<String>,
    pub registry_url: String,
    pub known_cities: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let enterprise_name = std::env::var("ENTERPRISE_NAME").unwrap_or_else(|_| {
            log::warn!("ENTERPRISE_NAME not set, defaulting to 'SolAtlantico'");
            "SolAtlantico".to_string()
        });

        let enterprise_port: u16 = match std::env::var("ENTERPRISE_PORT") {
            Ok(raw) => raw.parse().map_err(|_| Error::ConfigError(format!("ENTERPRISE_PORT is not a valid port: {}", raw)))?,
            Err(_) => {
                log::warn!("ENTERPRISE_PORT not set, defaulting to 8080");
                8080
            }
        };

        let owned_city = std::env::var("OWNED_CITY").map_err(|_| Error::ConfigError("OWNED_CITY is required".to_string()))?;

        let cp_worker_ids = match std::env::var("CP_WORKER_IDS") {
            Ok(raw) if !raw.is_empty() => raw.split(',').map(|s| s.trim().to_string()).collect(),
            _ => {
                log::warn!("CP_WORKER_IDS not set, defaulting to 'CP001'");
                vec!["CP001".to_string()]
            }
        };

        let registry_url = std::env::var("REGISTRY_URL").map_err(|_| Error::ConfigError("REGISTRY_URL is required".to_string()))?;

        let known_cities = match std::env::var("KNOWN_CITIES") {
            Ok(raw) if !raw.is_empty() => raw.split(',').map(|s| s.trim().to_string()).collect(),
            _ => vec!["Salvador".to_string(), "Feira de Santana".to_string(), "Ilheus".to_string()],
        };

        Ok(Self { enterprise_name, enterprise_port, owned_city, cp_worker_ids, registry_url, known_cities })
    }

    pub fn my_api_url(&self) -> String {
        format!("http://{}:{}", self.enterprise_name, self.enterprise_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_matches_original_format() {
        let config = Config {
            enterprise_name: "SolAtlantico".to_string(),
            enterprise_port: 8080,
            owned_city: "Salvador".to_string(),
            cp_worker_ids: vec!["CP001".to_string()],
            registry_url: "http://localhost:9000".to_string(),
            known_cities: vec!["Salvador".to_string()],
        };
        assert_eq!(config.my_api_url(), "http://SolAtlantico:8080");
    }
}
