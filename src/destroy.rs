use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::progress;
use crate::scope::Scope;

/// Summary of a destroy operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DestroySummary {
    pub destroyed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for DestroySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Destroy complete! Resources: {} destroyed",
            self.destroyed
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        write!(f, ".")
    }
}

impl Engine {
    /// Tear down everything registered under `scope`, directly or in child
    /// scopes, in reverse dependency order: children before parents, and
    /// within each scope the reverse of registration order (a later
    /// resource may consume an earlier one's output, never the other way
    /// around).
    ///
    /// Each delete is awaited before the next starts. A failed delete keeps
    /// its record, halts the affected branch — earlier-registered resources
    /// there may be dependencies of the one still standing — and the first
    /// failure is surfaced after independent sibling branches have run.
    /// Fully destroyed scopes are cleared, so destroying an already
    /// destroyed scope is an error-free no-op.
    pub async fn destroy(&self, scope: &Scope) -> Result<DestroySummary, EngineError> {
        let mut summary = DestroySummary::default();
        let first_err = self.destroy_branch(scope, &mut summary).await;

        info!(
            destroyed = summary.destroyed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Destroy finished"
        );
        match first_err {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    fn destroy_branch<'a>(
        &'a self,
        scope: &'a Scope,
        summary: &'a mut DestroySummary,
    ) -> Pin<Box<dyn Future<Output = Option<EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let mut first_err: Option<EngineError> = None;

            let children = scope.children();
            for child in children.iter().rev() {
                if let Some(err) = self.destroy_branch(child, &mut *summary).await {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }

            let resources = scope.resources();
            if first_err.is_some() {
                // Resources in a failed child branch may still bind this
                // scope's resources; leave them standing.
                for identity in resources.iter().rev() {
                    progress::skipped(identity, "dependent scope failed to destroy", scope.quiet());
                }
                summary.skipped += resources.len();
                return first_err;
            }

            for (pos, identity) in resources.iter().enumerate().rev() {
                match self.delete_one(identity, scope.quiet()).await {
                    Ok(true) => summary.destroyed += 1,
                    Ok(false) => {}
                    Err(err) => {
                        summary.failed += 1;
                        for earlier in resources[..pos].iter().rev() {
                            progress::skipped(
                                earlier,
                                &format!("{} failed to destroy", identity.address()),
                                scope.quiet(),
                            );
                        }
                        summary.skipped += pos;
                        return Some(err);
                    }
                }
            }

            scope.clear();
            None
        })
    }

    /// Tear down every stored record under a scope-chain prefix, without
    /// the program having re-declared the resources this run.
    ///
    /// With no in-run registration order to reverse, records are deleted
    /// newest first (by `created_at`) — the conservative approximation of
    /// reverse dependency order. Halts on the first failure.
    pub async fn destroy_stored(
        &self,
        scope_prefix: &[String],
        quiet: bool,
    ) -> Result<DestroySummary, EngineError> {
        let mut records = self
            .inner
            .store
            .list(scope_prefix)
            .await
            .map_err(EngineError::StateStore)?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut summary = DestroySummary::default();
        for (pos, record) in records.iter().enumerate() {
            match self.delete_one(&record.identity, quiet).await {
                Ok(true) => summary.destroyed += 1,
                Ok(false) => {}
                Err(err) => {
                    summary.failed += 1;
                    summary.skipped += records.len() - pos - 1;
                    info!(
                        destroyed = summary.destroyed,
                        skipped = summary.skipped,
                        "Destroy from state halted"
                    );
                    return Err(err);
                }
            }
        }
        Ok(summary)
    }
}
