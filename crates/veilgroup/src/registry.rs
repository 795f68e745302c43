//! The group registry: ledger-resident authority over groups, membership,
//! message sequences and decrypt grants.
//!
//! Every mutation runs under one lock, standing in for the ledger's total
//! order. Ciphertexts are registered with the encryption service first, the
//! whole state change is committed as a single store transaction, and only
//! then are the committed grants mirrored into the service. A mutation that
//! fails before the commit leaves both the ledger and the service's
//! authorizations untouched.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use veilgroup_core::{
    derive_hash, GroupId, GroupSecret, Handle, LedgerEvent, MessageIndex, Principal,
};
use veilgroup_fhe::{EncryptionService, ExternalInput, InputProof, ServiceError};
use veilgroup_store::{CommitReceipt, GroupRecord, LedgerStore, MessageRecord, Transaction};

use crate::config::RegistryConfig;
use crate::env::{LedgerEnv, SystemLedger};
use crate::error::{RegistryError, Result};

const SECRET_CONTEXT: &str = "veilgroup group secret v1";

/// Derive a group's shared secret from public ledger data.
///
/// Deterministic in its inputs and therefore predictable by anyone who can
/// read the ledger. The secret only hides content from parties that never
/// see the block entropy.
pub fn derive_group_secret(entropy: &[u8; 32], creator: &Principal, id: GroupId) -> GroupSecret {
    let hash = derive_hash(
        SECRET_CONTEXT,
        &[
            entropy.as_slice(),
            creator.as_bytes().as_slice(),
            id.to_be_bytes().as_slice(),
        ],
    );
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash[..8]);
    GroupSecret(u64::from_be_bytes(head))
}

/// The group registry.
///
/// Generic over the ledger store `S`, the encryption service `E` and the
/// ledger environment `L`.
pub struct GroupRegistry<S: LedgerStore, E: EncryptionService, L: LedgerEnv = SystemLedger> {
    store: Arc<S>,
    service: Arc<E>,
    env: L,
    config: RegistryConfig,

    /// Serializes mutations.
    order: Mutex<()>,

    events: broadcast::Sender<LedgerEvent>,
}

impl<S: LedgerStore, E: EncryptionService> GroupRegistry<S, E, SystemLedger> {
    /// Create a registry on wall-clock time with the default configuration.
    pub fn with_defaults(store: S, service: Arc<E>) -> Self {
        let (events, _) = broadcast::channel(RegistryConfig::default().event_capacity);
        Self {
            store: Arc::new(store),
            service,
            env: SystemLedger::new(),
            config: RegistryConfig::default(),
            order: Mutex::new(()),
            events,
        }
    }
}

impl<S: LedgerStore, E: EncryptionService, L: LedgerEnv> GroupRegistry<S, E, L> {
    /// Create a registry.
    pub fn new(store: S, service: Arc<E>, env: L, config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            store: Arc::new(store),
            service,
            env,
            config,
            order: Mutex::new(()),
            events,
        })
    }

    /// The underlying ledger store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The encryption service grants are mirrored into.
    pub fn service(&self) -> &Arc<E> {
        &self.service
    }

    /// The ledger environment.
    pub fn env(&self) -> &L {
        &self.env
    }

    /// Active configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a group with `creator` as its only member.
    ///
    /// The group secret is derived from block entropy, registered with the
    /// encryption service and granted to the creator.
    pub async fn create_group(&self, name: &str, creator: &Principal) -> Result<GroupId> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let _order = self.order.lock().await;

        let id = GroupId(self.store.group_count().await?);
        let secret = derive_group_secret(&self.env.block_entropy(), creator, id);

        let key_handle = self
            .service
            .encrypt_value(secret.to_word())
            .await
            .map_err(service_failure("encrypt_value"))?;
        let mut tx = Transaction::new();
        tx.create_group(id, name, key_handle, *creator, self.env.now_millis())
            .grant(key_handle, *creator)
            .emit(LedgerEvent::GroupCreated {
                group_id: id,
                name: name.to_string(),
                creator: *creator,
                key_handle,
            });
        self.commit(tx).await?;
        self.mirror_grants(id, &key_handle, std::slice::from_ref(creator)).await?;

        info!(group = %id, %creator, %key_handle, "group created");
        Ok(id)
    }

    /// Add `principal` to a group.
    ///
    /// The new member is granted the group key and every message already in
    /// the group.
    pub async fn join_group(&self, group_id: GroupId, principal: &Principal) -> Result<()> {
        let _order = self.order.lock().await;

        let group = self.group(group_id).await?;
        if self.store.is_member(group_id, principal).await? {
            return Err(RegistryError::AlreadyMember {
                group_id,
                principal: *principal,
            });
        }

        let mut handles = vec![group.key_handle];
        handles.extend(self.store.message_handles(group_id).await?);

        let mut tx = Transaction::new();
        tx.add_member(group_id, *principal);
        for handle in &handles {
            tx.grant(*handle, *principal);
        }
        tx.emit(LedgerEvent::MemberJoined {
            group_id,
            member: *principal,
        });
        let receipt = self.commit(tx).await?;

        for handle in &handles {
            self.mirror_grants(group_id, handle, std::slice::from_ref(principal)).await?;
        }

        info!(
            group = %group_id,
            member = %principal,
            grants_added = receipt.grants_added,
            "member joined"
        );
        Ok(())
    }

    /// Append an encrypted message to a group.
    ///
    /// The input is imported into the encryption service, which issues a
    /// registry-owned handle. That handle is granted to every current member.
    pub async fn send_message(
        &self,
        group_id: GroupId,
        sender: &Principal,
        input: &ExternalInput,
        proof: &InputProof,
    ) -> Result<MessageIndex> {
        let _order = self.order.lock().await;

        self.group(group_id).await?;
        if !self.store.is_member(group_id, sender).await? {
            return Err(RegistryError::NotMember {
                group_id,
                principal: *sender,
            });
        }

        if self.config.verify_input_proofs {
            proof
                .verify(input, sender)
                .map_err(service_failure("verify_input_proof"))?;
        }

        let content_handle = self
            .service
            .import_ciphertext(input, proof, sender)
            .await
            .map_err(service_failure("import_ciphertext"))?;

        // Member order; the sender is one of them.
        let members = self.store.members(group_id).await?;

        let count = self.store.message_count(group_id).await?;
        let index = MessageIndex(count);
        let timestamp = self.next_timestamp(group_id, count).await?;

        let record = MessageRecord {
            sender: *sender,
            content_handle,
            timestamp,
        };
        let mut tx = Transaction::new();
        tx.append_message(group_id, index, record);
        for member in &members {
            tx.grant(content_handle, *member);
        }
        tx.emit(LedgerEvent::MessageSent {
            group_id,
            index,
            sender: *sender,
            content_handle,
            timestamp,
        });
        self.commit(tx).await?;
        self.mirror_grants(group_id, &content_handle, &members).await?;

        info!(group = %group_id, %index, %sender, "message sent");
        Ok(index)
    }

    /// Replay the ledger's grants for a group into the encryption service.
    ///
    /// Covers the group key and every message handle, authorizing only pairs
    /// the ledger holds. Used to recover from
    /// [`RegistryError::GrantsNotMirrored`]. Returns the number of grants
    /// replayed.
    pub async fn resync_group(&self, group_id: GroupId) -> Result<usize> {
        let _order = self.order.lock().await;

        let group = self.group(group_id).await?;
        let members = self.store.members(group_id).await?;
        let mut handles = vec![group.key_handle];
        handles.extend(self.store.message_handles(group_id).await?);

        let mut replayed = 0;
        for handle in &handles {
            let mut granted = Vec::with_capacity(members.len());
            for member in &members {
                if self.store.is_granted(handle, member).await? {
                    granted.push(*member);
                }
            }
            self.mirror_grants(group_id, handle, &granted).await?;
            replayed += granted.len();
        }

        info!(group = %group_id, grants = replayed, "grants resynced");
        Ok(replayed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of groups ever created.
    pub async fn group_count(&self) -> Result<u64> {
        Ok(self.store.group_count().await?)
    }

    /// Summary of a group.
    pub async fn group(&self, group_id: GroupId) -> Result<GroupRecord> {
        self.store
            .get_group(group_id)
            .await?
            .ok_or(RegistryError::InvalidGroup(group_id))
    }

    /// Members of a group in join order.
    pub async fn members(&self, group_id: GroupId) -> Result<Vec<Principal>> {
        self.group(group_id).await?;
        Ok(self.store.members(group_id).await?)
    }

    /// Whether `principal` belongs to the group.
    pub async fn is_member(&self, group_id: GroupId, principal: &Principal) -> Result<bool> {
        self.group(group_id).await?;
        Ok(self.store.is_member(group_id, principal).await?)
    }

    /// Handle of the group's encrypted secret.
    pub async fn key_handle(&self, group_id: GroupId) -> Result<Handle> {
        Ok(self.group(group_id).await?.key_handle)
    }

    /// Number of messages in the group.
    pub async fn message_count(&self, group_id: GroupId) -> Result<u64> {
        self.group(group_id).await?;
        Ok(self.store.message_count(group_id).await?)
    }

    /// A message by index.
    pub async fn message(&self, group_id: GroupId, index: MessageIndex) -> Result<MessageRecord> {
        self.group(group_id).await?;
        match self.store.get_message(group_id, index).await? {
            Some(record) => Ok(record),
            None => Err(RegistryError::IndexOutOfRange {
                group_id,
                index,
                count: self.store.message_count(group_id).await?,
            }),
        }
    }

    /// Whether `principal` holds a grant on the group key.
    pub async fn can_decrypt_group_key(
        &self,
        group_id: GroupId,
        principal: &Principal,
    ) -> Result<bool> {
        let key_handle = self.key_handle(group_id).await?;
        Ok(self.store.is_granted(&key_handle, principal).await?)
    }

    /// Whether `principal` holds a grant on a message's content.
    pub async fn can_decrypt_message(
        &self,
        group_id: GroupId,
        index: MessageIndex,
        principal: &Principal,
    ) -> Result<bool> {
        let record = self.message(group_id, index).await?;
        Ok(self.store.is_granted(&record.content_handle, principal).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Receive events as they are committed.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Committed events with a sequence number greater than `after_seq`.
    pub async fn events_since(&self, after_seq: u64) -> Result<Vec<(u64, LedgerEvent)>> {
        Ok(self.store.events_since(after_seq).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy committed grants on `handle` into the encryption service.
    async fn mirror_grants(
        &self,
        group_id: GroupId,
        handle: &Handle,
        principals: &[Principal],
    ) -> Result<()> {
        for principal in principals {
            if let Err(source) = self.service.authorize(handle, principal).await {
                warn!(group = %group_id, %handle, error = %source, "grant not mirrored");
                return Err(RegistryError::GrantsNotMirrored { group_id, source });
            }
        }
        debug!(%handle, grants = principals.len(), "grants mirrored");
        Ok(())
    }

    /// Ledger time for the next message; never earlier than the previous one.
    async fn next_timestamp(&self, group_id: GroupId, count: u64) -> Result<i64> {
        let now = self.env.now_millis();
        if count == 0 {
            return Ok(now);
        }
        let last = self
            .store
            .get_message(group_id, MessageIndex(count - 1))
            .await?
            .map_or(now, |m| m.timestamp);
        Ok(now.max(last))
    }

    async fn commit(&self, tx: Transaction) -> Result<CommitReceipt> {
        let events = tx.events().to_vec();
        let receipt = self.store.commit(tx).await.map_err(|e| {
            warn!(error = %e, "ledger commit failed");
            RegistryError::Store(e)
        })?;

        for event in events {
            // No live subscriber is fine; the log has it.
            let _ = self.events.send(event);
        }
        Ok(receipt)
    }
}

fn service_failure(op: &'static str) -> impl FnOnce(ServiceError) -> RegistryError {
    move |e| {
        warn!(op, error = %e, "encryption service call failed");
        RegistryError::Service(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ManualLedger;
    use veilgroup_core::Keypair;
    use veilgroup_fhe::LocalEncryptionService;
    use veilgroup_store::MemoryLedger;

    fn registry() -> GroupRegistry<MemoryLedger, LocalEncryptionService, ManualLedger> {
        GroupRegistry::new(
            MemoryLedger::new(),
            Arc::new(LocalEncryptionService::from_seed([1; 32])),
            ManualLedger::new(1_000, [9; 32]),
            RegistryConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_secret_derivation_is_deterministic() {
        let creator = Principal::from_bytes([2; 32]);
        let a = derive_group_secret(&[5; 32], &creator, GroupId(0));
        assert_eq!(a, derive_group_secret(&[5; 32], &creator, GroupId(0)));
        assert_ne!(a, derive_group_secret(&[5; 32], &creator, GroupId(1)));
        assert_ne!(a, derive_group_secret(&[6; 32], &creator, GroupId(0)));
        assert_ne!(
            a,
            derive_group_secret(&[5; 32], &Principal::from_bytes([3; 32]), GroupId(0))
        );
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let registry = registry();
        let alice = Keypair::generate().principal();

        let err = registry.create_group("", &alice).await.unwrap_err();
        assert!(matches!(err, RegistryError::EmptyName));
        assert_eq!(registry.group_count().await.unwrap(), 0);
        assert!(registry.service().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_reads_validate_group() {
        let registry = registry();
        let p = Principal::from_bytes([1; 32]);

        assert!(matches!(
            registry.members(GroupId(0)).await,
            Err(RegistryError::InvalidGroup(GroupId(0)))
        ));
        assert!(matches!(
            registry.is_member(GroupId(0), &p).await,
            Err(RegistryError::InvalidGroup(_))
        ));
        assert!(matches!(
            registry.message_count(GroupId(0)).await,
            Err(RegistryError::InvalidGroup(_))
        ));
        assert!(matches!(
            registry.can_decrypt_group_key(GroupId(0), &p).await,
            Err(RegistryError::InvalidGroup(_))
        ));
    }

    #[tokio::test]
    async fn test_timestamps_never_go_back() {
        let registry = registry();
        let alice = Keypair::generate();
        let id = registry.create_group("alpha", &alice.principal()).await.unwrap();

        let send = |value: u64| {
            let (input, proof) = ExternalInput::encrypt(
                &veilgroup_core::ClearWord::from_u64(value),
                &registry.service().input_key(),
                &alice,
            )
            .unwrap();
            (input, proof)
        };

        let (input, proof) = send(1);
        registry
            .send_message(id, &alice.principal(), &input, &proof)
            .await
            .unwrap();

        registry.env().set_time(500);
        let (input, proof) = send(2);
        registry
            .send_message(id, &alice.principal(), &input, &proof)
            .await
            .unwrap();

        let first = registry.message(id, MessageIndex(0)).await.unwrap();
        let second = registry.message(id, MessageIndex(1)).await.unwrap();
        assert_eq!(first.timestamp, 1_000);
        assert_eq!(second.timestamp, 1_000);
    }

    #[tokio::test]
    async fn test_forged_proof_rejected_before_service() {
        let registry = registry();
        let alice = Keypair::generate();
        let mallory = Keypair::generate();
        let id = registry.create_group("alpha", &alice.principal()).await.unwrap();

        // Mallory's input, submitted under Alice's principal.
        let (input, proof) = ExternalInput::encrypt(
            &veilgroup_core::ClearWord::from_u64(7),
            &registry.service().input_key(),
            &mallory,
        )
        .unwrap();
        let err = registry
            .send_message(id, &alice.principal(), &input, &proof)
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::Service(ServiceError::InvalidProof(_))));
        assert_eq!(registry.message_count(id).await.unwrap(), 0);
        // Only the group key is held by the service.
        assert_eq!(registry.service().len().unwrap(), 1);
    }
}
