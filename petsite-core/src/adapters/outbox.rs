//! Outbox mailer
//!
//! Records account emails in `sys_outbox` instead of delivering them. The
//! `petsite outbox` command reads them back, which is how reset and
//! verification codes reach the user on a local install.

use std::sync::Arc;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::{Error, Result};
use crate::ports::{Mailer, OutboundEmail};

pub struct OutboxMailer {
    repository: Arc<DuckDbRepository>,
}

impl OutboxMailer {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Most recent messages first
    pub fn recent(&self, limit: usize) -> Result<Vec<OutboundEmail>> {
        self.repository.list_outbox(limit)
    }
}

impl Mailer for OutboxMailer {
    fn send(&self, email: &OutboundEmail) -> Result<()> {
        self.repository
            .insert_outbox(email)
            .map_err(|e| Error::write(format!("Failed to queue email: {}", e)))?;
        tracing::debug!(message_id = %email.id, subject = %email.subject, "email queued in outbox");
        Ok(())
    }
}
