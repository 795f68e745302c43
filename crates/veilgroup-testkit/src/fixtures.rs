//! Test fixtures and helpers.
//!
//! A fixture is a registry on a hand-driven ledger clock with a
//! deterministic encryption service, plus deterministic parties.

use std::sync::Arc;

use anyhow::Context;

use veilgroup::{GroupClient, GroupId, GroupRegistry, ManualLedger, RegistryConfig, RegistryMirror};
use veilgroup_core::Keypair;
use veilgroup_fhe::LocalEncryptionService;
use veilgroup_store::{LedgerStore, MemoryLedger, SqliteLedger};

/// Ledger time every fixture starts at (2025-01-14T16:00:00Z).
pub const GENESIS_MILLIS: i64 = 1_736_870_400_000;

/// Block entropy every fixture uses.
pub const FIXTURE_ENTROPY: [u8; 32] = [0x5e; 32];

pub type TestRegistry<S = MemoryLedger> =
    GroupRegistry<S, LocalEncryptionService, Arc<ManualLedger>>;
pub type TestClient<S = MemoryLedger> = GroupClient<S, LocalEncryptionService, Arc<ManualLedger>>;

/// A registry with its clock and encryption service exposed.
pub struct TestFixture<S: LedgerStore = MemoryLedger> {
    pub env: Arc<ManualLedger>,
    pub service: Arc<LocalEncryptionService>,
    pub registry: Arc<TestRegistry<S>>,
}

impl TestFixture<MemoryLedger> {
    /// In-memory fixture.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_store(MemoryLedger::new())
    }
}

impl TestFixture<SqliteLedger> {
    /// Fixture on an in-memory SQLite database.
    pub fn sqlite() -> anyhow::Result<Self> {
        let ledger = SqliteLedger::open_memory().context("opening in-memory sqlite ledger")?;
        Self::with_store(ledger)
    }
}

impl<S: LedgerStore> TestFixture<S> {
    /// Fixture over any store. Service keys and entropy are fixed, so two
    /// fixtures driven identically produce identical ledgers.
    pub fn with_store(store: S) -> anyhow::Result<Self> {
        let env = Arc::new(ManualLedger::new(GENESIS_MILLIS, FIXTURE_ENTROPY));
        let service = Arc::new(LocalEncryptionService::from_seed([0x11; 32]));
        let registry =
            GroupRegistry::new(store, service.clone(), env.clone(), RegistryConfig::default())?;

        Ok(Self {
            env,
            service,
            registry: Arc::new(registry),
        })
    }

    /// A deterministic party.
    pub fn party(&self, seed: u8) -> TestClient<S> {
        GroupClient::new(self.registry.clone(), Keypair::from_seed(&[seed; 32]))
    }

    /// `count` distinct parties with seeds `1..=count`.
    pub fn parties(&self, count: u8) -> Vec<TestClient<S>> {
        (1..=count).map(|seed| self.party(seed)).collect()
    }

    /// Create a group owned by `creator` and join every other party to it.
    pub async fn group_with(
        &self,
        name: &str,
        creator: &TestClient<S>,
        members: &[TestClient<S>],
    ) -> anyhow::Result<GroupId> {
        let group = creator.create_group(name).await?;
        for member in members {
            member
                .join(group)
                .await
                .with_context(|| format!("joining {} to {}", member.principal(), group))?;
        }
        Ok(group)
    }

    /// A mirror caught up with the registry's event log.
    pub async fn mirror(&self) -> anyhow::Result<RegistryMirror> {
        let mut mirror = RegistryMirror::new();
        mirror.catch_up(self.registry.as_ref()).await?;
        Ok(mirror)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parties_are_distinct() {
        let fixture = TestFixture::new().unwrap();
        let parties = fixture.parties(3);

        let principals: Vec<_> = parties.iter().map(|p| p.principal()).collect();
        assert_ne!(principals[0], principals[1]);
        assert_ne!(principals[1], principals[2]);
        assert_ne!(principals[0], principals[2]);
        assert_eq!(fixture.party(1).principal(), principals[0]);
    }

    #[tokio::test]
    async fn test_group_with_members() {
        let fixture = TestFixture::new().unwrap();
        let parties = fixture.parties(4);

        let group = fixture
            .group_with("crew", &parties[0], &parties[1..])
            .await
            .unwrap();

        assert_eq!(fixture.registry.members(group).await.unwrap().len(), 4);
        let mirror = fixture.mirror().await.unwrap();
        assert_eq!(mirror.members(group).unwrap().len(), 4);
        assert_eq!(mirror.last_seq(), 4);
    }

    #[tokio::test]
    async fn test_file_backed_fixture_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let group = {
            let fixture = TestFixture::with_store(SqliteLedger::open(&path).unwrap()).unwrap();
            let parties = fixture.parties(2);
            let group = fixture
                .group_with("disk", &parties[0], &parties[1..])
                .await
                .unwrap();
            parties[1].send_text(group, "persisted").await.unwrap();
            group
        };

        let reopened = SqliteLedger::open(&path).unwrap();
        assert_eq!(reopened.group_count().await.unwrap(), 1);
        assert_eq!(reopened.message_count(group).await.unwrap(), 1);
    }
}
