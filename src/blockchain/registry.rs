//! Contract address and ABI resolution from the local registry cache.
//!
//! Layout per network:
//! - `blockchain/contracts/<network>/_index`: `{contracts: [{name, address, ...}]}`
//! - `blockchain/contracts/<network>/<address>`: contract summary
//! - `blockchain/contracts/<network>/<address>.abi`: the ABI document

use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use serde::Serialize;
use serde_json::{json, Value};

use crate::artifacts::{keys, ArtifactStore};
use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::error::PipelineError;
use crate::tasks::JobService;

/// Upper bound on listing pages, in case the service never returns an empty page.
const MAX_PAGES: u32 = 1000;

/// A contract ready to be called.
#[derive(Debug, Clone)]
pub struct ResolvedContract {
    pub name: String,
    pub address: Address,
    pub abi: JsonAbi,
}

/// Entry of a refreshed index.
#[derive(Debug, Clone, Serialize)]
pub struct ContractSummary {
    pub network: String,
    pub address: String,
    pub name: Option<String>,
    pub events_count: Option<Value>,
}

pub struct ContractRegistry<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ArtifactStore + ?Sized> ContractRegistry<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolve `name` on `network`. An explicit address skips the index but
    /// the ABI is still loaded from the cache.
    pub fn resolve(
        &self,
        network: &str,
        name: &str,
        address_override: Option<&str>,
    ) -> BlockchainResult<ResolvedContract> {
        let address_text = match address_override.map(str::trim).filter(|a| !a.is_empty()) {
            Some(addr) => addr.to_string(),
            None => self.address_text(network, name)?,
        };
        let address = address_text
            .parse::<Address>()
            .map_err(|e| BlockchainError::Registry(format!("invalid address '{}': {}", address_text, e)))?;
        let abi = self.load_abi(network, &address_text)?;
        tracing::debug!(network, name, address = %address, "Contract resolved");
        Ok(ResolvedContract {
            name: name.to_string(),
            address,
            abi,
        })
    }

    /// Address of `name` from the index, exact name match.
    pub fn address_for(&self, network: &str, name: &str) -> BlockchainResult<Address> {
        let text = self.address_text(network, name)?;
        text.parse::<Address>()
            .map_err(|e| BlockchainError::Registry(format!("invalid address '{}': {}", text, e)))
    }

    fn address_text(&self, network: &str, name: &str) -> BlockchainResult<String> {
        let key = keys::contract_index(network)?;
        let index = self.store.read_json(&key)?.ok_or_else(|| {
            BlockchainError::Registry(format!(
                "contract index not found at '{}'; run refresh-contracts first",
                key
            ))
        })?;
        let items = index
            .get("contracts")
            .and_then(Value::as_array)
            .ok_or_else(|| BlockchainError::Registry(format!("'{}' has no 'contracts' list", key)))?;
        items
            .iter()
            .filter(|item| item.get("name").and_then(Value::as_str) == Some(name))
            .filter_map(|item| item.get("address").and_then(Value::as_str))
            .map(str::trim)
            .find(|addr| !addr.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BlockchainError::Registry(format!("contract '{}' not found in '{}'", name, key)))
    }

    /// Load the cached ABI, trying the address as given and then lowercased.
    pub fn load_abi(&self, network: &str, address: &str) -> BlockchainResult<JsonAbi> {
        let mut candidates = vec![address.to_string()];
        if address.to_ascii_lowercase() != address {
            candidates.push(address.to_ascii_lowercase());
        }
        for candidate in &candidates {
            let key = keys::contract_abi(network, candidate)?;
            if let Some(doc) = self.store.read_json(&key)? {
                return parse_abi(doc)
                    .map_err(|e| BlockchainError::Abi(format!("ABI at '{}': {}", key, e)));
            }
        }
        Err(BlockchainError::Registry(format!(
            "ABI not found at '{}'",
            keys::contract_abi(network, address)?
        )))
    }

    /// Re-populate the cache for `network` from the job service listing.
    pub async fn refresh<J: JobService + ?Sized>(
        &self,
        jobs: &J,
        network: &str,
        per_page: u32,
    ) -> Result<Vec<ContractSummary>, PipelineError> {
        let mut summaries = Vec::new();

        for page in 1..=MAX_PAGES {
            let listing = jobs.list_contracts(network, page, per_page.max(1)).await?;
            let data = match listing.get("data").and_then(Value::as_array) {
                Some(items) if !items.is_empty() => items.clone(),
                _ => break,
            };

            for item in &data {
                let Some(addr) = item.get("address").and_then(Value::as_str).filter(|a| !a.is_empty()) else {
                    continue;
                };
                let detail = jobs.get_contract(addr, true).await?;
                let abi = normalize_abi(detail.get("abi").cloned().unwrap_or(Value::Null));
                let name = detail
                    .get("name")
                    .or_else(|| item.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let events_count = detail.get("events_count").cloned();

                let summary_doc = json!({
                    "address": detail.get("address").cloned().unwrap_or_else(|| json!(addr)),
                    "name": name,
                    "network": detail.get("network").cloned().unwrap_or_else(|| json!(network)),
                    "status": detail.get("status"),
                    "tx_hash": detail.get("tx_hash"),
                    "start_block": detail.get("start_block"),
                    "last_scanned_block": detail.get("last_scanned_block"),
                    "confirmations": detail.get("confirmations"),
                    "events_count": events_count,
                    "abi": abi,
                });
                self.store.write_json(&keys::contract_summary(network, addr)?, &summary_doc)?;
                if !abi.is_null() {
                    self.store.write_json(&keys::contract_abi(network, addr)?, &abi)?;
                }

                summaries.push(ContractSummary {
                    network: network.to_string(),
                    address: addr.to_string(),
                    name,
                    events_count,
                });
            }
        }

        let index = json!({
            "ok": true,
            "network": network,
            "count": summaries.len(),
            "contracts": summaries,
        });
        self.store.write_json(&keys::contract_index(network)?, &index)?;
        tracing::info!(network, count = summaries.len(), "Contract registry refreshed");
        Ok(summaries)
    }
}

/// The service may return the ABI as a JSON string.
fn normalize_abi(abi: Value) -> Value {
    match abi {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

fn parse_abi(doc: Value) -> Result<JsonAbi, serde_json::Error> {
    let doc = match normalize_abi(doc) {
        Value::Object(mut obj) if obj.contains_key("abi") => {
            normalize_abi(obj.remove("abi").unwrap_or(Value::Null))
        }
        other => other,
    };
    serde_json::from_value(doc)
}
