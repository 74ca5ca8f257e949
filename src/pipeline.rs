//! End-to-end archiving: normalize, apply ignore rules, write the entry.

use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::normalize::{normalize, OutgoingMessage};
use crate::rules::{evaluate, IgnoreRuleSet, SkipReason};
use crate::store::fs::{ArchiveFs, LocalFs};
use crate::store::writer::{ArchiveStore, ArchivedEntry};

/// What happened to one message.
#[derive(Debug, Clone)]
pub enum ArchiveOutcome {
    /// Archiving is switched off in the configuration.
    Disabled,
    /// An ignore rule matched; nothing was written.
    Skipped(SkipReason),
    Archived(ArchivedEntry),
}

/// Archives outgoing messages into one store.
#[derive(Debug)]
pub struct Archiver<F: ArchiveFs = LocalFs> {
    store: ArchiveStore<F>,
    rules: IgnoreRuleSet,
    enabled: bool,
    default_transport: String,
}

impl Archiver<LocalFs> {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: ArchiveStore::from_config(&config.archive),
            rules: IgnoreRuleSet::from_config(&config.ignore),
            enabled: config.archive.enabled,
            default_transport: config.archive.transport.clone(),
        }
    }
}

impl<F: ArchiveFs> Archiver<F> {
    pub fn new(store: ArchiveStore<F>, rules: IgnoreRuleSet, default_transport: &str) -> Self {
        Self {
            store,
            rules,
            enabled: true,
            default_transport: default_transport.to_string(),
        }
    }

    pub fn store(&self) -> &ArchiveStore<F> {
        &self.store
    }

    /// Archive one message.
    ///
    /// Only storage failures are errors; content problems never are.
    pub fn archive(&self, message: &OutgoingMessage) -> Result<ArchiveOutcome> {
        if !self.enabled {
            debug!("Archiving disabled");
            return Ok(ArchiveOutcome::Disabled);
        }

        let normalized = normalize(message, &self.default_transport);

        if let Some(reason) = evaluate(message, &normalized, &self.rules) {
            info!(
                message_id = normalized.message_id.as_deref().unwrap_or("-"),
                reason = %reason,
                attachments = normalized.attachment_hint,
                "Message not archived"
            );
            return Ok(ArchiveOutcome::Skipped(reason));
        }

        let entry = self.store.write(&normalized, &message.source)?;
        info!(
            archive_id = %entry.archive_id,
            path = %entry.dir.display(),
            size = entry.meta.size,
            attachments = entry.meta.attachments_count,
            "Message archived"
        );
        Ok(ArchiveOutcome::Archived(entry))
    }
}
