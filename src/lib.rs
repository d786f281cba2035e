//! Embedded infrastructure-as-code engine.
//!
//! Desired cloud state is expressed as plain idempotent async functions
//! ("resources") composed through ordinary value passing: one resource's
//! output is awaited and consumed as another's input, and that await is the
//! entire dependency graph — there is no plan phase and no declared DAG.
//! On every run the engine decides create/update/delete per resource by
//! diffing against persisted state, applies changes in data-dependency
//! order, and tears a scope's resources down in safe reverse order on
//! request.
//!
//! ```no_run
//! # use groundwork::*;
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Serialize, Deserialize)]
//! # struct DbInput { name: String }
//! # #[derive(Serialize, Deserialize, Clone)]
//! # struct DbOutput { conn: String }
//! # struct Database;
//! # #[async_trait::async_trait]
//! # impl ResourceType for Database {
//! #     type Input = DbInput;
//! #     type Output = DbOutput;
//! #     fn kind(&self) -> &'static str { "database" }
//! #     async fn apply(&self, _: &ResourceContext, i: &DbInput) -> anyhow::Result<DbOutput> {
//! #         Ok(DbOutput { conn: i.name.clone() })
//! #     }
//! #     async fn delete(&self, _: &ResourceContext, _: &DbInput) -> anyhow::Result<()> { Ok(()) }
//! # }
//! # async fn example() -> anyhow::Result<()> {
//! let store = std::sync::Arc::new(SqliteBackend::open(".state/groundwork.db")?);
//! store.initialize().await?;
//! let engine = Engine::new(store);
//!
//! let database = engine.resource(Database);
//! let scope = Scope::root("my-app", ScopeOptions::default())?;
//!
//! let db = database.apply(&scope, "db-1", DbInput { name: "a".into() }).await?;
//! // `db.conn` is available here, and only after state is persisted;
//! // passing it into another resource's input forms a dependency edge.
//!
//! engine.destroy(&scope).await?;
//! # Ok(())
//! # }
//! ```

pub mod destroy;
pub mod engine;
pub mod error;
pub mod harness;
mod progress;
pub mod scope;
pub mod secret;
pub mod state;

pub use destroy::DestroySummary;
pub use engine::{
    Applied, ApplyOptions, Engine, LifecycleEvent, Resource, ResourceContext, ResourceType,
};
pub use error::EngineError;
pub use scope::{Scope, ScopeGuard, ScopeOptions};
pub use secret::Secret;
pub use state::{
    FileBackend, ResourceIdentity, ResourceRecord, ResourceStatus, SqliteBackend, StateBackend,
};
