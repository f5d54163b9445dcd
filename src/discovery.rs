// Endpoint discovery over swagger-config, plus the run-wide catalog

use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::Config;
use crate::contract::parse_endpoints;
use crate::errors::{TesterError, TesterResult};
use crate::models::EndpointSpec;

/// One API group advertised by the gateway's swagger-config.
#[derive(Debug, Clone)]
pub struct ApiGroup {
    pub name: String,
    pub url: String,
}

/// Fetch the group listing from `{base}/v3/api-docs/swagger-config`.
pub async fn fetch_swagger_config(
    client: &Client,
    base_url: &str,
    timeout: Duration,
) -> TesterResult<Vec<ApiGroup>> {
    let url = format!(
        "{}/v3/api-docs/swagger-config",
        base_url.trim_end_matches('/')
    );
    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| TesterError::SwaggerConfig {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(TesterError::SwaggerConfig {
            url,
            reason: format!("status {}", status),
        });
    }
    let data: Value = response.json().await.map_err(|e| TesterError::SwaggerConfig {
        url: url.clone(),
        reason: format!("invalid JSON: {}", e),
    })?;

    let mut groups = Vec::new();
    if let Some(urls) = data.get("urls").and_then(Value::as_array) {
        for item in urls {
            groups.push(ApiGroup {
                name: item
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                url: item
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }
    info!(url = %url, groups = groups.len(), "fetched swagger-config");
    Ok(groups)
}

/// Fetch one group's contract document.
pub async fn fetch_contract(
    client: &Client,
    base_url: &str,
    doc_path: &str,
    timeout: Duration,
) -> TesterResult<Value> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), doc_path);
    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| TesterError::ContractFetch {
            url: url.clone(),
            reason: e.to_string(),
        })?;
    let status = response.status().as_u16();
    if status != 200 {
        return Err(TesterError::ContractFetch {
            url,
            reason: format!("status {}", status),
        });
    }
    response.json().await.map_err(|e| TesterError::ContractFetch {
        url,
        reason: format!("invalid JSON: {}", e),
    })
}

/// Discover every endpoint across all configured services. A failing
/// service or group logs a warning and contributes nothing; the run
/// continues with whatever was reachable.
pub async fn discover_endpoints(
    client: &Client,
    config: &Config,
) -> TesterResult<Vec<EndpointSpec>> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    let mut all = Vec::new();

    for service in config.targets()? {
        let base = service.url.trim_end_matches('/').to_string();
        if base.is_empty() {
            continue;
        }
        let groups = match fetch_swagger_config(client, &base, timeout).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(service = %service.name, error = %e, "skipping service");
                continue;
            }
        };
        for group in groups {
            let doc = match fetch_contract(client, &base, &group.url, timeout).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(group = %group.name, error = %e, "skipping group");
                    continue;
                }
            };
            let mut endpoints = parse_endpoints(&doc, &group.name);
            for endpoint in &mut endpoints {
                endpoint.service = Some(service.name.clone());
                endpoint.base_url = Some(base.clone());
            }
            info!(group = %group.name, endpoints = endpoints.len(), "parsed group");
            all.extend(endpoints);
        }
    }
    Ok(all)
}

/// Collapse duplicate `(method, path)` pairs across groups. First
/// occurrence wins, in discovery order.
pub fn dedup_endpoints(endpoints: Vec<EndpointSpec>) -> Vec<EndpointSpec> {
    let mut seen = HashSet::new();
    endpoints
        .into_iter()
        .filter(|endpoint| seen.insert(endpoint.key()))
        .collect()
}

/// Discovered-endpoint cache for one run. Discovery happens at most
/// once; every later lookup reads the same immutable list, so indices
/// handed out stay stable.
pub struct EndpointCatalog {
    cell: OnceCell<Vec<EndpointSpec>>,
}

impl EndpointCatalog {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Discover on first call; afterwards return the cached list. A
    /// failed discovery leaves the cell empty so the next call retries.
    pub async fn get_or_discover(
        &self,
        client: &Client,
        config: &Config,
    ) -> TesterResult<&[EndpointSpec]> {
        let endpoints = self
            .cell
            .get_or_try_init(|| async {
                let discovered = discover_endpoints(client, config).await?;
                Ok::<_, TesterError>(dedup_endpoints(discovered))
            })
            .await?;
        Ok(endpoints.as_slice())
    }

    /// Endpoint by catalog index, validated before any probe runs.
    pub fn select(&self, index: usize) -> TesterResult<&EndpointSpec> {
        let endpoints = self.cell.get().ok_or_else(|| {
            TesterError::InvalidSelection("endpoint catalog not yet populated".to_string())
        })?;
        endpoints.get(index).ok_or_else(|| {
            TesterError::InvalidSelection(format!(
                "endpoint index {} out of range (catalog holds {})",
                index,
                endpoints.len()
            ))
        })
    }

    pub fn is_populated(&self) -> bool {
        self.cell.initialized()
    }
}

impl Default for EndpointCatalog {
    fn default() -> Self {
        Self::new()
    }
}
