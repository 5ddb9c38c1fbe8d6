use async_trait::async_trait;
use refinecore::{StorageError, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Consumable per-user credit balance, debited per phase as admission
/// control. Insufficient balance is not an error channel, just `false`.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Decrement only if the balance covers the amount. Atomic: concurrent
    /// debits for one user must serialize, never read-then-write.
    async fn debit(&self, user_id: UserId, amount: u32) -> Result<bool, StorageError>;

    async fn balance(&self, user_id: UserId) -> Result<u32, StorageError>;
}

/// In-process ledger; the conditional decrement happens under one write
/// guard.
#[derive(Default)]
pub struct MemoryLedger {
    balances: RwLock<HashMap<UserId, u32>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, user_id: UserId, amount: u32) {
        let mut balances = self.balances.write().await;
        *balances.entry(user_id).or_insert(0) += amount;
    }
}

#[async_trait]
impl CreditLedger for MemoryLedger {
    async fn debit(&self, user_id: UserId, amount: u32) -> Result<bool, StorageError> {
        let mut balances = self.balances.write().await;
        let balance = balances.entry(user_id).or_insert(0);
        if *balance >= amount {
            *balance -= amount;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn balance(&self, user_id: UserId) -> Result<u32, StorageError> {
        Ok(self.balances.read().await.get(&user_id).copied().unwrap_or(0))
    }
}
