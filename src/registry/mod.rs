//! Domain registry: the durable, deduplicated record of discovered domains
//!
//! The registry is the only source of resume state. Every registration is
//! checked against the in-memory set and written to storage inside one
//! critical section, so two workers racing on the same domain produce exactly
//! one row and ids are handed out without gaps or repeats.

use crate::storage::{DomainRecord, SqliteStorage, Storage, StorageResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// A domain recorded by the crawler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDomain {
    pub id: u64,
    pub domain: String,
    pub server: String,
}

impl From<DomainRecord> for DiscoveredDomain {
    fn from(record: DomainRecord) -> Self {
        Self {
            id: record.id,
            domain: record.domain,
            server: record.server,
        }
    }
}

/// Result of [`DomainRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub domain: DiscoveredDomain,
    /// True only for the call that created the record
    pub is_new: bool,
}

struct RegistryState {
    storage: SqliteStorage,
    domains: HashMap<String, DiscoveredDomain>,
    next_id: u64,
}

/// Thread-safe registry backed by the `domains` table
pub struct DomainRegistry {
    state: Mutex<RegistryState>,
    limit: Option<u64>,
}

impl DomainRegistry {
    /// Loads every stored domain and prepares to continue numbering after them
    ///
    /// `limit` caps the total number of registered domains, including the ones
    /// loaded here. `None` means unlimited.
    pub fn load(storage: SqliteStorage, limit: Option<u64>) -> StorageResult<Self> {
        let records = storage.load_domains()?;
        let next_id = records.iter().map(|r| r.id).max().map_or(1, |max| max + 1);
        let domains: HashMap<String, DiscoveredDomain> = records
            .into_iter()
            .map(|r| (r.domain.clone(), DiscoveredDomain::from(r)))
            .collect();

        tracing::info!(
            "Registry loaded {} domains (next id {})",
            domains.len(),
            next_id
        );

        Ok(Self {
            state: Mutex::new(RegistryState {
                storage,
                domains,
                next_id,
            }),
            limit,
        })
    }

    /// Registers `domain` with the server that answered for it
    ///
    /// Returns the existing record with `is_new = false` when the domain is
    /// already known. Returns `Ok(None)` when the domain is unknown but the
    /// limit has been reached; nothing is written in that case. A storage
    /// failure leaves both the table and the in-memory set unchanged.
    pub fn register(&self, domain: &str, server: &str) -> StorageResult<Option<Registration>> {
        let mut state = self.state.lock();

        if let Some(existing) = state.domains.get(domain) {
            return Ok(Some(Registration {
                domain: existing.clone(),
                is_new: false,
            }));
        }

        if self.limit.is_some_and(|limit| state.domains.len() as u64 >= limit) {
            return Ok(None);
        }

        let record = DomainRecord {
            id: state.next_id,
            domain: domain.to_string(),
            server: server.to_string(),
            discovered_at: Utc::now().to_rfc3339(),
        };
        state.storage.insert_domain(&record)?;

        let discovered = DiscoveredDomain::from(record);
        state.next_id += 1;
        state
            .domains
            .insert(discovered.domain.clone(), discovered.clone());

        Ok(Some(Registration {
            domain: discovered,
            is_new: true,
        }))
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.state.lock().domains.contains_key(domain)
    }

    pub fn len(&self) -> u64 {
        self.state.lock().domains.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().domains.is_empty()
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// True once the registry holds `limit` domains
    pub fn limit_reached(&self) -> bool {
        match self.limit {
            Some(limit) => self.len() >= limit,
            None => false,
        }
    }

    /// Names of all registered domains
    pub fn domain_names(&self) -> Vec<String> {
        self.state.lock().domains.keys().cloned().collect()
    }

    /// Snapshot of all records in id order
    pub fn domains(&self) -> Vec<DiscoveredDomain> {
        let mut domains: Vec<DiscoveredDomain> =
            self.state.lock().domains.values().cloned().collect();
        domains.sort_by_key(|d| d.id);
        domains
    }
}
