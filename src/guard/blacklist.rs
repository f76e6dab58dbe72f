//! Banned mint / creator sets
//!
//! Reader-heavy: every detection checks both sets. Writes go through
//! mutators that update the in-memory set and the store together.

use std::collections::HashSet;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::Result;
use crate::store::{BanKind, StateStore};

pub struct Blacklist {
    store: Arc<StateStore>,
    mints: RwLock<HashSet<String>>,
    creators: RwLock<HashSet<String>>,
}

impl Blacklist {
    /// Load the persisted sets into memory
    pub fn load(store: Arc<StateStore>) -> Result<Self> {
        let mints: HashSet<String> = store.load_bans(BanKind::Mint)?.into_iter().collect();
        let creators: HashSet<String> = store.load_bans(BanKind::Creator)?.into_iter().collect();

        info!(
            mints = mints.len(),
            creators = creators.len(),
            "blacklist loaded"
        );

        Ok(Self {
            store,
            mints: RwLock::new(mints),
            creators: RwLock::new(creators),
        })
    }

    pub async fn is_banned_mint(&self, mint: &Pubkey) -> bool {
        self.mints.read().await.contains(&mint.to_string())
    }

    pub async fn is_banned_creator(&self, creator: &Pubkey) -> bool {
        self.creators.read().await.contains(&creator.to_string())
    }

    /// Ban a mint, persisting before the in-memory set is updated
    pub async fn ban_mint(&self, mint: &Pubkey, reason: Option<&str>) -> Result<()> {
        let addr = mint.to_string();
        self.store.add_ban(&addr, BanKind::Mint, reason)?;
        self.mints.write().await.insert(addr);
        Ok(())
    }

    pub async fn ban_creator(&self, creator: &Pubkey, reason: Option<&str>) -> Result<()> {
        let addr = creator.to_string();
        self.store.add_ban(&addr, BanKind::Creator, reason)?;
        self.creators.write().await.insert(addr);
        Ok(())
    }

    pub async fn counts(&self) -> (usize, usize) {
        (
            self.mints.read().await.len(),
            self.creators.read().await.len(),
        )
    }
}
