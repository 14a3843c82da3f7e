//! Account registry.
//!
//! The registry is a sequence of generations. Discovery builds a complete new
//! generation and swaps it in atomically; there is no partial merge. A scan
//! cycle works on the generation it snapshotted at cycle start, and each scan
//! task writes only its own account entry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use deltamon_core::{Account, AccountId, HealthStatus};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::error::{RegistryError, RegistryResult};

/// Account counts by health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub unreachable: usize,
}

impl HealthCounts {
    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.unreachable
    }
}

/// One discovered set of accounts.
#[derive(Debug)]
pub struct RegistryGeneration {
    generation: u64,
    created_at: DateTime<Utc>,
    order: Vec<AccountId>,
    accounts: DashMap<AccountId, Account>,
}

impl RegistryGeneration {
    fn empty() -> Self {
        Self {
            generation: 0,
            created_at: Utc::now(),
            order: Vec::new(),
            accounts: DashMap::new(),
        }
    }

    fn build(generation: u64, ids: Vec<AccountId>) -> RegistryResult<Self> {
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id) {
                return Err(RegistryError::DuplicateAccount(id.to_string()));
            }
        }

        let accounts = DashMap::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            accounts.insert(id.clone(), Account::new(id.clone(), position));
        }

        Ok(Self {
            generation,
            created_at: Utc::now(),
            order: ids,
            accounts,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Account ids in dropdown order.
    pub fn ids(&self) -> &[AccountId] {
        &self.order
    }

    pub fn get(&self, id: &AccountId) -> Option<Account> {
        self.accounts.get(id).map(|a| a.clone())
    }

    /// All accounts in dropdown order.
    pub fn accounts(&self) -> Vec<Account> {
        self.order.iter().filter_map(|id| self.get(id)).collect()
    }

    /// `(id, position)` of accounts that are not unreachable, in order.
    pub fn scannable(&self) -> Vec<(AccountId, usize)> {
        self.order
            .iter()
            .filter_map(|id| {
                let acc = self.accounts.get(id)?;
                acc.is_scannable().then(|| (id.clone(), acc.position))
            })
            .collect()
    }

    /// Mutate one account entry.
    ///
    /// Returns `None` if the account is not part of this generation.
    pub fn update<R>(&self, id: &AccountId, f: impl FnOnce(&mut Account) -> R) -> Option<R> {
        self.accounts.get_mut(id).map(|mut acc| f(acc.value_mut()))
    }

    pub fn health_counts(&self) -> HealthCounts {
        let mut counts = HealthCounts::default();
        for entry in self.accounts.iter() {
            match entry.health {
                HealthStatus::Healthy => counts.healthy += 1,
                HealthStatus::Degraded => counts.degraded += 1,
                HealthStatus::Unreachable => counts.unreachable += 1,
            }
        }
        counts
    }

    /// True if there is at least one account and none can be scanned.
    pub fn all_unreachable(&self) -> bool {
        !self.is_empty()
            && self
                .accounts
                .iter()
                .all(|a| a.health == HealthStatus::Unreachable)
    }
}

/// Registry of monitored accounts.
#[derive(Debug)]
pub struct AccountRegistry {
    current: RwLock<Arc<RegistryGeneration>>,
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountRegistry {
    /// Create an empty registry (generation 0).
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistryGeneration::empty())),
        }
    }

    /// The current generation.
    pub fn snapshot(&self) -> Arc<RegistryGeneration> {
        self.current.read().clone()
    }

    /// Replace the registry wholesale with freshly discovered accounts.
    ///
    /// Ids must be unique. On error the current generation, and the next
    /// generation number, are untouched.
    pub fn replace(&self, ids: Vec<AccountId>) -> RegistryResult<u64> {
        let mut current = self.current.write();
        let generation = current.generation + 1;
        let next = Arc::new(RegistryGeneration::build(generation, ids)?);
        let count = next.len();
        *current = next;
        drop(current);
        info!(generation, accounts = count, "Account registry replaced");
        Ok(generation)
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.snapshot().accounts()
    }
}
