use std::future::Future;

use tracing::warn;
use uuid::Uuid;

use crate::engine::Engine;
use crate::scope::{Scope, ScopeOptions};

/// Scope-aware test harness.
///
/// Each test gets a root scope with a unique prefix so concurrent test runs
/// never collide in the same external account or state store, and teardown
/// always runs after the body, pass or fail.

/// Install an env-filtered subscriber for test output. Safe to call from
/// every test; only the first call wins.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh `t-<hex8>` isolation prefix.
pub fn test_prefix() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("t-{}", &id[..8])
}

/// Run an async test body inside an isolated root scope, then destroy
/// everything the body created — whether or not the body succeeded.
///
/// A body error takes precedence over a destroy error in the returned
/// result; a destroy failure after a failing body is logged, not swallowed
/// silently. Resources are only leaked if the body panics, which unwinds
/// past the teardown.
pub async fn run_test<F, Fut>(engine: &Engine, name: &str, body: F) -> anyhow::Result<()>
where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let scope = Scope::root(
        name,
        ScopeOptions {
            quiet: true,
            prefix: Some(test_prefix()),
            is_test: true,
        },
    )?;

    let result = body(scope.clone()).await;
    let destroy_result = engine.destroy(&scope).await;

    if result.is_err() {
        if let Err(destroy_err) = &destroy_result {
            warn!(
                test = name,
                error = %destroy_err,
                "Teardown failed after test body error"
            );
        }
    }
    result?;
    destroy_result?;
    Ok(())
}
