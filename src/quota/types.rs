//! Quota data types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a charged query was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// An orchestrated chat turn
    Chat,
    /// A deepen request on a previous reply
    Deepen,
    /// Stand-alone acknowledgement from the client
    Manual,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Deepen => "deepen",
            Self::Manual => "manual",
        }
    }
}

/// One accepted query; written once and never touched again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: Uuid,
    /// `Identity::key()` of the charged caller
    pub identity_key: String,
    pub timestamp: DateTime<Utc>,
    pub kind: QueryKind,
}

impl QueryRecord {
    pub fn new(identity_key: String, kind: QueryKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_key,
            timestamp,
            kind,
        }
    }
}

/// Quota decision derived from the ledger for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaState {
    pub used: u32,
    pub remaining: u32,
    pub limit: u32,
    /// Anonymous lifetime allowance exhausted; never reverts
    pub locked_permanently: bool,
    pub requires_registration: bool,
    pub allowed: bool,
}

impl QuotaState {
    pub fn anonymous(used: u32, limit: u32) -> Self {
        let locked = used >= limit;
        Self {
            used,
            remaining: limit.saturating_sub(used),
            limit,
            locked_permanently: locked,
            requires_registration: locked,
            allowed: !locked,
        }
    }

    pub fn registered(used_today: u32, limit: u32) -> Self {
        Self {
            used: used_today,
            remaining: limit.saturating_sub(used_today),
            limit,
            locked_permanently: false,
            requires_registration: false,
            allowed: used_today < limit,
        }
    }
}

/// Denormalized per-day counter kept for registered users
///
/// Display only. Quota decisions always count ledger records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    pub day: NaiveDate,
    pub count: u32,
}

impl DailyCounter {
    /// Advance the counter for a query made on `today`
    pub fn bump(previous: Option<Self>, today: NaiveDate) -> Self {
        match previous {
            Some(c) if c.day == today => Self {
                day: today,
                count: c.count.saturating_add(1),
            },
            _ => Self { day: today, count: 1 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_state() {
        let s = QuotaState::anonymous(0, 5);
        assert!(s.allowed);
        assert_eq!(s.remaining, 5);
        assert!(!s.requires_registration);

        let s = QuotaState::anonymous(5, 5);
        assert!(!s.allowed);
        assert_eq!(s.remaining, 0);
        assert!(s.locked_permanently);
        assert!(s.requires_registration);

        // Over-limit counts (concurrent legacy writes) still clamp
        let s = QuotaState::anonymous(7, 5);
        assert_eq!(s.remaining, 0);
        assert!(s.locked_permanently);
    }

    #[test]
    fn test_registered_state_never_requires_registration() {
        let s = QuotaState::registered(10, 10);
        assert!(!s.allowed);
        assert!(!s.requires_registration);
        assert!(!s.locked_permanently);
        assert_eq!(s.remaining, 0);
    }

    #[test]
    fn test_daily_counter_bump() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

        let c = DailyCounter::bump(None, d1);
        assert_eq!(c.count, 1);
        let c = DailyCounter::bump(Some(c), d1);
        assert_eq!(c.count, 2);
        let c = DailyCounter::bump(Some(c), d2);
        assert_eq!(c, DailyCounter { day: d2, count: 1 });
    }

    #[test]
    fn test_query_kind_serde() {
        assert_eq!(serde_json::to_string(&QueryKind::Deepen).unwrap(), "\"deepen\"");
    }
}
