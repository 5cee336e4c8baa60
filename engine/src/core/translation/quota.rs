//! Translation Quota Tracking
//!
//! Counts characters sent to the translation service per account and
//! calendar month. Characters are reserved before a request is submitted
//! and released again for batches that never reached the service.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::db::Database;
use crate::core::{CoreError, CoreResult};

/// Error types for quota operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaError {
    /// Request would push the month over the account quota
    MonthlyQuotaExceeded { used: u64, requested: u64, quota: u64 },
    /// The service itself rejected the request for quota reasons
    ProviderQuotaExceeded { requested: u64 },
}

impl std::fmt::Display for QuotaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaError::MonthlyQuotaExceeded {
                used,
                requested,
                quota,
            } => write!(
                f,
                "Request would exceed monthly quota. Used: {used}, Request: {requested}, Quota: {quota} characters"
            ),
            QuotaError::ProviderQuotaExceeded { requested } => write!(
                f,
                "Translation service quota exhausted ({requested} characters requested)"
            ),
        }
    }
}

impl std::error::Error for QuotaError {}

impl From<QuotaError> for CoreError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::MonthlyQuotaExceeded {
                used,
                requested,
                quota,
            } => CoreError::TranslationQuotaExceeded {
                used,
                requested,
                quota,
            },
            // The service does not report its counters
            QuotaError::ProviderQuotaExceeded { requested } => CoreError::TranslationQuotaExceeded {
                used: 0,
                requested,
                quota: 0,
            },
        }
    }
}

/// Summary of an account's current month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSummary {
    /// `YYYY-MM`
    pub month: String,
    pub used_characters: u64,
    /// None = unlimited
    pub monthly_quota: Option<u64>,
    pub remaining_characters: Option<u64>,
    /// Usage percentage (0-100)
    pub usage_percentage: Option<f64>,
    /// Whether approaching the quota (>= 80%)
    pub is_approaching_limit: bool,
}

/// Checks a request against a quota without touching storage
pub fn check_quota(used: u64, requested: u64, quota: Option<u64>) -> Result<(), QuotaError> {
    match quota {
        Some(quota) if used.saturating_add(requested) > quota => {
            Err(QuotaError::MonthlyQuotaExceeded {
                used,
                requested,
                quota,
            })
        }
        _ => Ok(()),
    }
}

/// Per-account monthly character counter backed by `translation_usage`
#[derive(Clone, Debug)]
pub struct QuotaTracker {
    db: Database,
    monthly_quota: Option<u64>,
}

impl QuotaTracker {
    /// `monthly_quota` of `None` disables the limit (usage is still counted)
    pub fn new(db: Database, monthly_quota: Option<u64>) -> Self {
        Self { db, monthly_quota }
    }

    pub fn monthly_quota(&self) -> Option<u64> {
        self.monthly_quota
    }

    /// Current month as `YYYY-MM` (UTC)
    pub fn current_month() -> String {
        chrono::Utc::now().format("%Y-%m").to_string()
    }

    /// Characters used by `account_id` this month
    pub fn usage(&self, account_id: &str) -> CoreResult<u64> {
        let month = Self::current_month();
        let used: Option<i64> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT characters FROM translation_usage WHERE account_id = ?1 AND month = ?2",
                [account_id, month.as_str()],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(used.unwrap_or(0).max(0) as u64)
    }

    /// Fails with `TranslationQuotaExceeded` if `requested` would not fit
    pub fn check(&self, account_id: &str, requested: u64) -> CoreResult<()> {
        let used = self.usage(account_id)?;
        check_quota(used, requested, self.monthly_quota)?;
        Ok(())
    }

    /// Atomically checks and records `characters` against this month.
    ///
    /// Returns the new monthly total.
    pub fn reserve(&self, account_id: &str, characters: u64) -> CoreResult<u64> {
        let month = Self::current_month();
        let quota = self.monthly_quota;
        let total = self.db.with_transaction(|tx| {
            let used: i64 = tx
                .query_row(
                    "SELECT characters FROM translation_usage WHERE account_id = ?1 AND month = ?2",
                    [account_id, month.as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            let used = used.max(0) as u64;
            check_quota(used, characters, quota)?;

            tx.execute(
                "INSERT INTO translation_usage (account_id, month, characters) VALUES (?1, ?2, ?3)
                 ON CONFLICT(account_id, month) DO UPDATE SET
                     characters = characters + excluded.characters",
                params![account_id, month, characters as i64],
            )?;
            Ok(used + characters)
        })?;

        tracing::debug!(account_id, characters, total, "Reserved translation characters");
        Ok(total)
    }

    /// Returns characters that were reserved but never sent
    pub fn release(&self, account_id: &str, characters: u64) -> CoreResult<()> {
        if characters == 0 {
            return Ok(());
        }
        let month = Self::current_month();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE translation_usage SET characters = MAX(characters - ?3, 0)
                 WHERE account_id = ?1 AND month = ?2",
                params![account_id, month, characters as i64],
            )?;
            Ok(())
        })
    }

    /// Reserves `characters` and returns a hold that gives back whatever
    /// was not spent when it drops
    pub fn hold(&self, account_id: &str, characters: u64) -> CoreResult<QuotaHold<'_>> {
        self.reserve(account_id, characters)?;
        Ok(QuotaHold {
            tracker: self,
            account_id: account_id.to_string(),
            outstanding: characters,
        })
    }

    pub fn summary(&self, account_id: &str) -> CoreResult<QuotaSummary> {
        let used = self.usage(account_id)?;
        let percentage = self
            .monthly_quota
            .filter(|q| *q > 0)
            .map(|q| (used as f64 / q as f64) * 100.0);

        Ok(QuotaSummary {
            month: Self::current_month(),
            used_characters: used,
            monthly_quota: self.monthly_quota,
            remaining_characters: self.monthly_quota.map(|q| q.saturating_sub(used)),
            usage_percentage: percentage,
            is_approaching_limit: percentage.map(|p| p >= 80.0).unwrap_or(false),
        })
    }
}

/// Characters reserved for a request in flight
#[derive(Debug)]
pub struct QuotaHold<'a> {
    tracker: &'a QuotaTracker,
    account_id: String,
    outstanding: u64,
}

impl QuotaHold<'_> {
    /// Marks characters as sent; they stay counted
    pub fn spend(&mut self, characters: u64) {
        self.outstanding = self.outstanding.saturating_sub(characters);
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding
    }
}

impl Drop for QuotaHold<'_> {
    fn drop(&mut self) {
        if self.outstanding == 0 {
            return;
        }
        match self.tracker.release(&self.account_id, self.outstanding) {
            Ok(()) => tracing::debug!(
                account_id = %self.account_id,
                characters = self.outstanding,
                "Released unsent translation characters"
            ),
            Err(e) => tracing::warn!(
                account_id = %self.account_id,
                error = %e,
                "Failed to release reserved characters"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_quota() {
        assert!(check_quota(0, 1_000_000, None).is_ok());
        assert!(check_quota(400, 600, Some(1000)).is_ok());
        assert_eq!(
            check_quota(400, 601, Some(1000)),
            Err(QuotaError::MonthlyQuotaExceeded {
                used: 400,
                requested: 601,
                quota: 1000
            })
        );
    }

    #[test]
    fn test_reserve_and_release() {
        let tracker = QuotaTracker::new(Database::in_memory().unwrap(), Some(1000));

        assert_eq!(tracker.reserve("acct", 600).unwrap(), 600);
        let err = tracker.reserve("acct", 500).unwrap_err();
        assert!(matches!(
            err,
            CoreError::TranslationQuotaExceeded {
                used: 600,
                requested: 500,
                quota: 1000
            }
        ));
        // A rejected reservation records nothing
        assert_eq!(tracker.usage("acct").unwrap(), 600);

        tracker.release("acct", 200).unwrap();
        assert_eq!(tracker.usage("acct").unwrap(), 400);
        tracker.release("acct", 5000).unwrap();
        assert_eq!(tracker.usage("acct").unwrap(), 0);
    }

    #[test]
    fn test_hold_returns_unspent_characters_on_drop() {
        let tracker = QuotaTracker::new(Database::in_memory().unwrap(), Some(1000));

        {
            let mut hold = tracker.hold("acct", 300).unwrap();
            assert_eq!(tracker.usage("acct").unwrap(), 300);
            hold.spend(120);
            assert_eq!(hold.outstanding(), 180);
        }
        assert_eq!(tracker.usage("acct").unwrap(), 120);

        {
            let mut hold = tracker.hold("acct", 50).unwrap();
            hold.spend(50);
        }
        assert_eq!(tracker.usage("acct").unwrap(), 170);

        // A refused hold reserves nothing and releases nothing
        assert!(tracker.hold("acct", 900).is_err());
        assert_eq!(tracker.usage("acct").unwrap(), 170);
    }

    #[test]
    fn test_accounts_are_independent() {
        let tracker = QuotaTracker::new(Database::in_memory().unwrap(), Some(100));
        tracker.reserve("a", 100).unwrap();
        tracker.reserve("b", 50).unwrap();

        assert!(tracker.check("a", 1).is_err());
        assert!(tracker.check("b", 50).is_ok());
    }

    #[test]
    fn test_summary() {
        let tracker = QuotaTracker::new(Database::in_memory().unwrap(), Some(1000));
        tracker.reserve("acct", 850).unwrap();

        let summary = tracker.summary("acct").unwrap();
        assert_eq!(summary.used_characters, 850);
        assert_eq!(summary.remaining_characters, Some(150));
        assert!(summary.is_approaching_limit);
        assert_eq!(summary.month.len(), 7);

        let unlimited = QuotaTracker::new(Database::in_memory().unwrap(), None);
        let summary = unlimited.summary("acct").unwrap();
        assert_eq!(summary.usage_percentage, None);
        assert!(!summary.is_approaching_limit);
    }

    #[test]
    fn test_provider_quota_maps_to_quota_error() {
        let err: CoreError = QuotaError::ProviderQuotaExceeded { requested: 42 }.into();
        assert!(matches!(err, CoreError::TranslationQuotaExceeded { requested: 42, .. }));
        assert!(!err.is_transient());
    }
}
