//! Quota ledger and admission gate
//!
//! Decisions are always derived from the append-only record store:
//! - anonymous sessions: lifetime count against `anonymous_lifetime_limit`
//! - registered users: count since 00:00 UTC against `registered_daily_limit`
//!
//! [`QuotaLedger::admit`] makes check-then-charge atomic per identity. The
//! returned [`QuotaPermit`] holds that identity's lock until it is committed
//! or dropped, so two concurrent requests for one identity can never both pass
//! the last remaining slot. Unrelated identities never contend.

mod store;
mod types;

pub use store::{LedgerError, LedgerStore, WriteMode};
pub use types::{DailyCounter, QueryKind, QueryRecord, QuotaState};

use chrono::{DateTime, NaiveTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::QuotaConfig;
use crate::identity::{Identity, UserId};
use crate::metrics;

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Start of the UTC day containing `now`
fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Result of an admission attempt
pub enum Admission {
    Granted(QuotaPermit),
    Denied(QuotaState),
}

/// Capability to charge exactly one query
///
/// Holds the identity's lock. Dropping it without [`commit`](Self::commit)
/// charges nothing.
pub struct QuotaPermit {
    identity: Identity,
    state: QuotaState,
    store: Arc<LedgerStore>,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl QuotaPermit {
    /// State observed at admission
    pub fn state(&self) -> QuotaState {
        self.state
    }

    /// Append the record and release the lock; returns the post-charge state
    pub fn commit(self, kind: QueryKind) -> Result<QuotaState, LedgerError> {
        self.commit_at(kind, Utc::now())
    }

    pub fn commit_at(self, kind: QueryKind, now: DateTime<Utc>) -> Result<QuotaState, LedgerError> {
        append_record(&self.store, &self.identity, kind, now)?;
        let used = self.state.used.saturating_add(1);
        Ok(match &self.identity {
            Identity::Anonymous(_) => QuotaState::anonymous(used, self.state.limit),
            Identity::Registered(_) => QuotaState::registered(used, self.state.limit),
        })
    }
}

impl Drop for QuotaPermit {
    fn drop(&mut self) {
        // Release first, then drop the map entry if nobody else is queued on it
        self.guard.take();
        self.locks
            .remove_if(&self.identity.key(), |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn append_record(
    store: &LedgerStore,
    identity: &Identity,
    kind: QueryKind,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let record = QueryRecord::new(identity.key(), kind, now);
    store.append(&record)?;
    metrics::LEDGER_RECORDS_TOTAL
        .with_label_values(&[identity.kind(), kind.as_str()])
        .inc();

    if let Identity::Registered(user) = identity {
        // Display cache only; a failure here must not undo the charge
        if let Err(e) = store.bump_daily_counter(user.as_str(), now.date_naive()) {
            tracing::warn!(user = %user, "Daily counter update failed: {}", e);
        }
    }

    tracing::debug!(
        identity = %identity.log_label(),
        kind = kind.as_str(),
        record = %record.id,
        "Query recorded"
    );
    Ok(())
}

/// Quota decisions over the persistent ledger
pub struct QuotaLedger {
    store: Arc<LedgerStore>,
    limits: QuotaConfig,
    locks: Arc<LockMap>,
}

impl QuotaLedger {
    pub fn new(store: LedgerStore, limits: QuotaConfig) -> Self {
        Self {
            store: Arc::new(store),
            limits,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn limits(&self) -> QuotaConfig {
        self.limits
    }

    /// Current state for `identity`
    pub fn can_query(&self, identity: &Identity) -> Result<QuotaState, LedgerError> {
        self.can_query_at(identity, Utc::now())
    }

    pub fn can_query_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<QuotaState, LedgerError> {
        let key = identity.key();
        let state = match identity {
            Identity::Anonymous(_) => {
                let used = self.store.count_since(&key, None)?;
                QuotaState::anonymous(used, self.limits.anonymous_lifetime_limit)
            }
            Identity::Registered(_) => {
                let used = self.store.count_since(&key, Some(day_start(now)))?;
                QuotaState::registered(used, self.limits.registered_daily_limit)
            }
        };
        Ok(state)
    }

    /// Append one record without a quota check
    ///
    /// Serialized with in-flight admissions for the same identity.
    pub async fn record_query(&self, identity: &Identity, kind: QueryKind) -> Result<(), LedgerError> {
        let permit = self.acquire(identity).await;
        append_record(&permit.store, identity, kind, Utc::now())
    }

    fn lock_for(&self, identity: &Identity) -> Arc<Mutex<()>> {
        self.locks
            .entry(identity.key())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Check the ledger and, if allowed, return a permit holding the identity's lock
    ///
    /// `lockout_marker` is the client's advisory flag. It never decides: the
    /// ledger is consulted regardless, and a marker the ledger contradicts is
    /// only reported.
    pub async fn admit(
        &self,
        identity: &Identity,
        lockout_marker: bool,
    ) -> Result<Admission, LedgerError> {
        let permit = self.acquire(identity).await;
        self.admit_with(permit, lockout_marker, Utc::now())
    }

    /// [`admit`](Self::admit) with an explicit clock
    pub async fn admit_at(
        &self,
        identity: &Identity,
        lockout_marker: bool,
        now: DateTime<Utc>,
    ) -> Result<Admission, LedgerError> {
        let permit = self.acquire(identity).await;
        self.admit_with(permit, lockout_marker, now)
    }

    async fn acquire(&self, identity: &Identity) -> QuotaPermit {
        let guard = self.lock_for(identity).lock_owned().await;
        QuotaPermit {
            identity: identity.clone(),
            state: QuotaState::anonymous(0, 0),
            store: self.store.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    fn admit_with(
        &self,
        mut permit: QuotaPermit,
        lockout_marker: bool,
        now: DateTime<Utc>,
    ) -> Result<Admission, LedgerError> {
        let state = self.can_query_at(&permit.identity, now)?;
        let kind = permit.identity.kind();

        if lockout_marker && state.allowed && permit.identity.is_anonymous() {
            tracing::info!(
                identity = %permit.identity.log_label(),
                "Lockout marker not backed by the ledger; ignoring"
            );
            metrics::QUOTA_DECISIONS_TOTAL
                .with_label_values(&[kind, "stale_marker"])
                .inc();
        }

        if state.allowed {
            metrics::QUOTA_DECISIONS_TOTAL
                .with_label_values(&[kind, "allowed"])
                .inc();
            permit.state = state;
            Ok(Admission::Granted(permit))
        } else {
            metrics::QUOTA_DECISIONS_TOTAL
                .with_label_values(&[kind, "denied"])
                .inc();
            tracing::info!(
                identity = %permit.identity.log_label(),
                used = state.used,
                limit = state.limit,
                locked = state.locked_permanently,
                "Quota exhausted"
            );
            Ok(Admission::Denied(state))
        }
    }

    /// Cached display counter for a registered user
    pub fn daily_counter(&self, user: &UserId) -> Result<Option<DailyCounter>, LedgerError> {
        self.store.daily_counter(user.as_str())
    }

    /// Full record history of one identity
    pub fn records(&self, identity: &Identity) -> Result<Vec<QueryRecord>, LedgerError> {
        self.store.records(&identity.key())
    }

    pub fn total_records(&self) -> u64 {
        self.store.total_records()
    }

    /// Identities currently holding or awaiting a quota lock
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        self.store.flush()
    }
}
