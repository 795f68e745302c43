//! Client session: one principal talking to a registry and its encryption
//! service.
//!
//! Everything that touches plaintext happens here. The registry only ever
//! sees handles.

use std::collections::HashMap;
use std::sync::Arc;

use veilgroup_core::{
    open, seal, ClearWord, CoreError, GroupId, GroupSecret, Handle, Keypair, MessageIndex,
    Principal, SealedEnvelope,
};
use veilgroup_fhe::{DecryptAuth, EncryptionService, ExternalInput, ServiceError};
use veilgroup_store::LedgerStore;

use crate::env::LedgerEnv;
use crate::error::ClientError;
use crate::registry::GroupRegistry;

/// A decrypted message.
///
/// `text` carries the envelope result on its own so one unreadable message
/// does not hide the rest of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub index: MessageIndex,
    pub sender: Principal,
    pub timestamp: i64,
    pub text: Result<String, CoreError>,
}

/// A principal's view of a registry.
pub struct GroupClient<S: LedgerStore, E: EncryptionService, L: LedgerEnv> {
    registry: Arc<GroupRegistry<S, E, L>>,
    keypair: Keypair,
}

impl<S: LedgerStore, E: EncryptionService, L: LedgerEnv> GroupClient<S, E, L> {
    pub fn new(registry: Arc<GroupRegistry<S, E, L>>, keypair: Keypair) -> Self {
        Self { registry, keypair }
    }

    pub fn principal(&self) -> Principal {
        self.keypair.principal()
    }

    pub fn registry(&self) -> &GroupRegistry<S, E, L> {
        &self.registry
    }

    /// Create a group owned by this client.
    pub async fn create_group(&self, name: &str) -> Result<GroupId, ClientError> {
        Ok(self.registry.create_group(name, &self.principal()).await?)
    }

    /// Join a group.
    pub async fn join(&self, group_id: GroupId) -> Result<(), ClientError> {
        Ok(self.registry.join_group(group_id, &self.principal()).await?)
    }

    /// Fetch and decrypt the group's shared secret.
    pub async fn group_secret(&self, group_id: GroupId) -> Result<GroupSecret, ClientError> {
        let key_handle = self.registry.key_handle(group_id).await?;
        let word = self.decrypt_one(key_handle).await?;
        Ok(GroupSecret::from_word(&word)?)
    }

    /// Seal `text` under the group secret and submit it.
    pub async fn send_text(&self, group_id: GroupId, text: &str) -> Result<MessageIndex, ClientError> {
        let secret = self.group_secret(group_id).await?;
        let envelope = seal(text, secret)?;

        let service = self.registry.service();
        let (input, proof) =
            ExternalInput::encrypt(&ClearWord::from(envelope), &service.input_key(), &self.keypair)?;

        Ok(self
            .registry
            .send_message(group_id, &self.principal(), &input, &proof)
            .await?)
    }

    /// Decrypt and open one message.
    pub async fn read_message(
        &self,
        group_id: GroupId,
        index: MessageIndex,
    ) -> Result<String, ClientError> {
        let secret = self.group_secret(group_id).await?;
        let record = self.registry.message(group_id, index).await?;
        let word = self.decrypt_one(record.content_handle).await?;
        Ok(open(&SealedEnvelope::from(word), secret)?)
    }

    /// Decrypt every message of a group in one service round trip.
    ///
    /// Registry and service failures fail the batch; envelope failures are
    /// reported per message.
    pub async fn read_messages(&self, group_id: GroupId) -> Result<Vec<DecodedMessage>, ClientError> {
        let secret = self.group_secret(group_id).await?;

        let count = self.registry.message_count(group_id).await?;
        let mut records = Vec::with_capacity(count as usize);
        for i in 0..count {
            let index = MessageIndex(i);
            records.push((index, self.registry.message(group_id, index).await?));
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let handles: Vec<Handle> = records.iter().map(|(_, r)| r.content_handle).collect();
        let words = self.decrypt(&handles).await?;

        records
            .into_iter()
            .map(|(index, record)| -> Result<DecodedMessage, ClientError> {
                let word = words
                    .get(&record.content_handle)
                    .ok_or(ServiceError::UnknownHandle(record.content_handle))?;
                Ok(DecodedMessage {
                    index,
                    sender: record.sender,
                    timestamp: record.timestamp,
                    text: open(&SealedEnvelope::from(*word), secret),
                })
            })
            .collect()
    }

    async fn decrypt(
        &self,
        handles: &[Handle],
    ) -> Result<HashMap<Handle, ClearWord>, ClientError> {
        let auth = DecryptAuth::sign(handles, &self.keypair);
        Ok(self
            .registry
            .service()
            .decrypt(handles, &self.principal(), &auth)
            .await?)
    }

    async fn decrypt_one(&self, handle: Handle) -> Result<ClearWord, ClientError> {
        let words = self.decrypt(&[handle]).await?;
        words
            .get(&handle)
            .copied()
            .ok_or_else(|| ServiceError::UnknownHandle(handle).into())
    }
}
