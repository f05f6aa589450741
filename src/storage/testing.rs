// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fault-injecting wrapper around [`LocalStore`] for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    DeliveryStatus, EmailWalletRow, IntentTransition, LocalStore, PaymentRequestRow, RecordStore,
    StorageError, StorageResult, TransferIntentRow, TransferNotificationRow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFault {
    None,
    /// Commit the row, then answer 406.
    RejectAfterCommit,
    /// Answer 406 without writing.
    RejectWithoutCommit,
}

pub struct InstrumentedStore {
    pub inner: LocalStore,
    pub mapping_inserts: AtomicUsize,
    pub insert_delay: Duration,
    pub read_delay: Duration,
    pub insert_fault: InsertFault,
    /// When set, every call fails with a backend error.
    pub unavailable: AtomicBool,
    /// When set, notification and payment-request writes fail.
    pub fail_log_writes: AtomicBool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self {
            inner: LocalStore::in_memory().unwrap(),
            mapping_inserts: AtomicUsize::new(0),
            insert_delay: Duration::ZERO,
            read_delay: Duration::ZERO,
            insert_fault: InsertFault::None,
            unavailable: AtomicBool::new(false),
            fail_log_writes: AtomicBool::new(false),
        }
    }

    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = delay;
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn with_insert_fault(mut self, fault: InsertFault) -> Self {
        self.insert_fault = fault;
        self
    }

    pub fn inserts(&self) -> usize {
        self.mapping_inserts.load(Ordering::SeqCst)
    }

    fn check(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("connection refused".to_string()));
        }
        Ok(())
    }

    fn check_log_write(&self) -> StorageResult<()> {
        self.check()?;
        if self.fail_log_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("log table unavailable".to_string()));
        }
        Ok(())
    }

    async fn read_pause(&self) {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
    }
}

#[async_trait]
impl RecordStore for InstrumentedStore {
    async fn ping(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.ping().await
    }

    async fn find_mapping_by_hash(&self, email_hash: &str) -> StorageResult<Option<EmailWalletRow>> {
        self.check()?;
        self.read_pause().await;
        self.inner.find_mapping_by_hash(email_hash).await
    }

    async fn find_mapping_by_wallet(&self, wallet: &str) -> StorageResult<Option<EmailWalletRow>> {
        self.check()?;
        self.read_pause().await;
        self.inner.find_mapping_by_wallet(wallet).await
    }

    async fn insert_mapping(&self, row: EmailWalletRow) -> StorageResult<EmailWalletRow> {
        self.check()?;
        self.mapping_inserts.fetch_add(1, Ordering::SeqCst);
        if !self.insert_delay.is_zero() {
            tokio::time::sleep(self.insert_delay).await;
        }
        match self.insert_fault {
            InsertFault::None => self.inner.insert_mapping(row).await,
            InsertFault::RejectAfterCommit => {
                self.inner.insert_mapping(row).await?;
                Err(StorageError::Rejected { status: 406 })
            }
            InsertFault::RejectWithoutCommit => Err(StorageError::Rejected { status: 406 }),
        }
    }

    async fn update_mapping_wallet(
        &self,
        email_hash: &str,
        wallet: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<EmailWalletRow>> {
        self.check()?;
        self.inner.update_mapping_wallet(email_hash, wallet, now).await
    }

    async fn deactivate_mapping(&self, email_hash: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        self.check()?;
        self.inner.deactivate_mapping(email_hash, now).await
    }

    async fn insert_intent(&self, row: TransferIntentRow) -> StorageResult<TransferIntentRow> {
        self.check()?;
        self.inner.insert_intent(row).await
    }

    async fn get_intent(&self, id: Uuid) -> StorageResult<Option<TransferIntentRow>> {
        self.check()?;
        self.inner.get_intent(id).await
    }

    async fn list_pending_intents(
        &self,
        recipient_email: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<TransferIntentRow>> {
        self.check()?;
        self.inner.list_pending_intents(recipient_email, now, limit).await
    }

    async fn list_intents_by_sender(&self, sender_wallet: &str) -> StorageResult<Vec<TransferIntentRow>> {
        self.check()?;
        self.inner.list_intents_by_sender(sender_wallet).await
    }

    async fn transition_intent(
        &self,
        id: Uuid,
        transition: IntentTransition,
    ) -> StorageResult<Option<TransferIntentRow>> {
        self.check()?;
        self.inner.transition_intent(id, transition).await
    }

    async fn insert_notification(&self, row: TransferNotificationRow) -> StorageResult<()> {
        self.check_log_write()?;
        self.inner.insert_notification(row).await
    }

    async fn list_notifications(&self, intent_id: Uuid) -> StorageResult<Vec<TransferNotificationRow>> {
        self.check()?;
        self.inner.list_notifications(intent_id).await
    }

    async fn insert_payment_request(&self, row: PaymentRequestRow) -> StorageResult<PaymentRequestRow> {
        self.check_log_write()?;
        self.inner.insert_payment_request(row).await
    }

    async fn update_payment_request_status(&self, id: Uuid, status: DeliveryStatus) -> StorageResult<()> {
        self.check()?;
        self.inner.update_payment_request_status(id, status).await
    }

    async fn get_payment_request(&self, id: Uuid) -> StorageResult<Option<PaymentRequestRow>> {
        self.check()?;
        self.inner.get_payment_request(id).await
    }

    async fn list_payment_requests_by_requester(
        &self,
        requester_wallet: &str,
    ) -> StorageResult<Vec<PaymentRequestRow>> {
        self.check()?;
        self.inner.list_payment_requests_by_requester(requester_wallet).await
    }
}
