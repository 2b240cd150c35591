//! Business logic services

pub mod catalog;
pub mod loans;
pub mod users;

use std::future::Future;
use std::time::Duration;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::ledger::NewAuditRecord,
    repository::{LoanLedger, Repository},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub users: users::UsersService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let timeout = config.storage.timeout();
        Self {
            catalog: catalog::CatalogService::new(repository.clone(), timeout),
            loans: loans::LoansService::new(repository.clone(), config.loans.clone(), timeout),
            users: users::UsersService::new(repository, config.auth.clone(), timeout),
        }
    }
}

/// Run a storage call with an upper bound on its duration. Expiry is reported
/// as `StorageUnavailable`, which callers may retry.
pub(crate) async fn within<T, F>(limit: Duration, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Storage call timed out");
            Err(AppError::StorageUnavailable(format!(
                "Storage did not answer within {} ms",
                limit.as_millis()
            )))
        }
    }
}

/// Append a history-only entry. Failures are logged and swallowed: the audit
/// trail never decides state, so the primary mutation stands.
pub(crate) async fn record_audit(ledger: &dyn LoanLedger, limit: Duration, record: NewAuditRecord) {
    if let Err(e) = within(limit, ledger.append_audit(&record)).await {
        tracing::warn!(
            error = %e,
            username = %record.username,
            book_id = %record.book_id,
            status = %record.status,
            "Failed to record audit entry"
        );
    }
}
