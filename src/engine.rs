use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::EngineError;
use crate::progress;
use crate::scope::Scope;
use crate::state::backend::StateBackend;
use crate::state::models::{ResourceIdentity, ResourceRecord, ResourceStatus};

// ─── Lifecycle ──────────────────────────────────────────────────────────────

/// The lifecycle event a handler is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Create,
    Update,
    Delete,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleEvent::Create => "create",
            LifecycleEvent::Update => "update",
            LifecycleEvent::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// Per-call apply options, passed through to the handler unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Ask the handler to bind to an already-existing external object
    /// matching this identity instead of creating a duplicate. Only
    /// meaningful when no prior record exists; the engine does not probe
    /// anything itself.
    pub adopt: bool,
}

/// Everything a handler gets to see besides its input.
#[derive(Debug)]
pub struct ResourceContext {
    pub event: LifecycleEvent,
    pub quiet: bool,
    pub adopt: bool,
    pub identity: ResourceIdentity,
    prior_output: Option<serde_json::Value>,
}

impl ResourceContext {
    /// The last successfully applied output for this identity, decoded into
    /// the handler's output type. `None` on create. Update handlers diff
    /// against this to decide whether to no-op, patch, or replace — the
    /// engine never inspects inputs structurally.
    pub fn prior_output<O: DeserializeOwned>(&self) -> Result<Option<O>, EngineError> {
        match &self.prior_output {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| EngineError::Snapshot {
                    address: self.identity.address(),
                    source,
                }),
        }
    }

    /// The raw prior output snapshot, if any.
    pub fn prior_output_raw(&self) -> Option<&serde_json::Value> {
        self.prior_output.as_ref()
    }
}

// ─── Resource kinds ─────────────────────────────────────────────────────────

/// One resource kind: its input/output contract and lifecycle handler.
///
/// `apply` is called for create and update (the event is tagged in the
/// context) and must be idempotent: re-applied with the same input after a
/// prior success, it must converge on the same external state without
/// duplicating side effects. An update that cannot change an
/// identity-defining field in place must fail with
/// [`EngineError::ImmutableFieldChanged`] rather than silently replacing the
/// resource. `delete` must tolerate "already gone" as success.
#[async_trait]
pub trait ResourceType: Send + Sync + 'static {
    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Kind tag recorded in every identity, e.g. `"database"`.
    fn kind(&self) -> &'static str;

    /// Reject malformed input before any handler call or state access.
    fn validate(&self, _input: &Self::Input) -> Result<(), String> {
        Ok(())
    }

    /// Converge the external system on the desired state and return the
    /// resulting output.
    async fn apply(
        &self,
        ctx: &ResourceContext,
        input: &Self::Input,
    ) -> anyhow::Result<Self::Output>;

    /// Tear the external resource down. Receives the stored input snapshot;
    /// secret fields in it are redacted and must not be relied on.
    async fn delete(&self, ctx: &ResourceContext, input: &Self::Input) -> anyhow::Result<()>;
}

/// The value an apply resolves to, handed to downstream resources as input.
///
/// It is returned only after the record has been persisted, so a consumer
/// awaiting it never observes a half-applied resource — that await is also
/// the only dependency signal the engine relies on for ordering.
#[derive(Debug, Clone)]
pub struct Applied<O> {
    pub identity: ResourceIdentity,
    pub event: LifecycleEvent,
    output: O,
}

impl<O> Applied<O> {
    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }
}

impl<O> std::ops::Deref for Applied<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.output
    }
}

// ─── Type-erased delete dispatch ────────────────────────────────────────────

// Destroy walks stored records whose concrete types are long gone, so each
// registered kind contributes an erased deleter keyed by its kind tag.
#[async_trait]
pub(crate) trait ErasedDelete: Send + Sync {
    async fn delete(&self, ctx: &ResourceContext, input: &serde_json::Value)
        -> anyhow::Result<()>;
}

struct TypedDelete<T: ResourceType> {
    handler: Arc<T>,
}

#[async_trait]
impl<T: ResourceType> ErasedDelete for TypedDelete<T> {
    async fn delete(
        &self,
        ctx: &ResourceContext,
        input: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let input: T::Input = serde_json::from_value(input.clone()).with_context(|| {
            format!(
                "stored input for {} does not decode as kind '{}'",
                ctx.identity,
                self.handler.kind()
            )
        })?;
        self.handler.delete(ctx, &input).await
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────────

pub(crate) struct EngineInner {
    pub(crate) store: Arc<dyn StateBackend>,
    pub(crate) in_flight: DashMap<String, ()>,
    pub(crate) deleters: DashMap<String, Arc<dyn ErasedDelete>>,
}

/// The generic resource lifecycle driver.
///
/// Cheap to clone; all clones share the state backend, the in-flight apply
/// table, and the kind registry used for destroy dispatch.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(store: Arc<dyn StateBackend>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                in_flight: DashMap::new(),
                deleters: DashMap::new(),
            }),
        }
    }

    /// Bind a resource kind to this engine. Registers the kind for destroy
    /// dispatch and returns the callable used to declare resources.
    pub fn resource<T: ResourceType>(&self, handler: T) -> Resource<T> {
        let handler = Arc::new(handler);
        self.inner.deleters.insert(
            handler.kind().to_string(),
            Arc::new(TypedDelete {
                handler: Arc::clone(&handler),
            }),
        );
        Resource {
            engine: self.clone(),
            handler,
        }
    }

    /// Reject a second concurrent apply of the same address. The guard
    /// frees the slot when the apply settles, so sequential re-applies
    /// within one run are allowed.
    pub(crate) fn begin(&self, address: &str) -> Result<InFlightGuard<'_>, EngineError> {
        match self.inner.in_flight.entry(address.to_string()) {
            Entry::Occupied(_) => Err(EngineError::AlreadyInFlight {
                address: address.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    map: &self.inner.in_flight,
                    address: address.to_string(),
                })
            }
        }
    }

    pub(crate) async fn apply_resource<T: ResourceType>(
        &self,
        handler: &T,
        scope: &Scope,
        id: &str,
        input: T::Input,
        options: ApplyOptions,
    ) -> Result<Applied<T::Output>, EngineError> {
        let identity = scope.identity(id, handler.kind())?;
        let address = identity.address();
        let _guard = self.begin(&address)?;

        handler
            .validate(&input)
            .map_err(|reason| EngineError::Validation {
                address: address.clone(),
                reason,
            })?;

        let prior = self
            .inner
            .store
            .get(&identity)
            .await
            .map_err(EngineError::StateStore)?;

        let event = if prior.is_some() {
            LifecycleEvent::Update
        } else {
            LifecycleEvent::Create
        };
        let ctx = ResourceContext {
            event,
            quiet: scope.quiet(),
            adopt: options.adopt,
            identity: identity.clone(),
            prior_output: prior.as_ref().and_then(|r| r.output.clone()),
        };

        debug!(address = %address, event = %event, adopt = options.adopt, "Applying resource");
        progress::started(&identity, event, ctx.quiet);
        let started_at = Instant::now();
        let heartbeat = spawn_heartbeat(&identity, event, ctx.quiet);

        let outcome = handler.apply(&ctx, &input).await;
        if let Some(handle) = heartbeat {
            handle.abort();
        }

        match outcome {
            Ok(output) => {
                let now = Utc::now();
                let record = ResourceRecord {
                    identity: identity.clone(),
                    status: ResourceStatus::Applied,
                    input: snapshot(&input, &address)?,
                    output: Some(snapshot(&output, &address)?),
                    created_at: prior.as_ref().map(|p| p.created_at).unwrap_or(now),
                    updated_at: now,
                };
                self.inner
                    .store
                    .set(&record)
                    .await
                    .map_err(EngineError::StateStore)?;
                scope.register(identity.clone());

                progress::completed(&identity, event, started_at.elapsed().as_secs(), ctx.quiet);
                Ok(Applied {
                    identity,
                    event,
                    output,
                })
            }
            Err(err) => {
                progress::failed(
                    &identity,
                    event,
                    started_at.elapsed().as_secs(),
                    &format!("{:#}", err),
                    ctx.quiet,
                );
                let engine_err = match err.downcast::<EngineError>() {
                    Ok(e) => e,
                    Err(e) => EngineError::Apply {
                        address: address.clone(),
                        event,
                        source: e,
                    },
                };

                // Contract rejections leave the record exactly as the last
                // success wrote it; real apply failures are marked so the
                // next run retries with full context.
                let keep_untouched = matches!(
                    engine_err,
                    EngineError::ImmutableFieldChanged { .. } | EngineError::Validation { .. }
                );
                if !keep_untouched {
                    let now = Utc::now();
                    let record = match prior {
                        Some(p) => ResourceRecord {
                            status: ResourceStatus::Failed,
                            updated_at: now,
                            ..p
                        },
                        None => ResourceRecord {
                            identity: identity.clone(),
                            status: ResourceStatus::Failed,
                            input: serde_json::to_value(&input)
                                .unwrap_or(serde_json::Value::Null),
                            output: None,
                            created_at: now,
                            updated_at: now,
                        },
                    };
                    if let Err(store_err) = self.inner.store.set(&record).await {
                        error!(
                            address = %address,
                            error = %store_err,
                            "Failed to persist failure record"
                        );
                    }
                }

                Err(engine_err)
            }
        }
    }

    /// Invoke the registered deleter for a stored record and remove the
    /// record on success. Returns `false` when the record is already gone.
    pub(crate) async fn delete_one(
        &self,
        identity: &ResourceIdentity,
        quiet: bool,
    ) -> Result<bool, EngineError> {
        let address = identity.address();
        let _guard = self.begin(&address)?;

        let Some(record) = self
            .inner
            .store
            .get(identity)
            .await
            .map_err(EngineError::StateStore)?
        else {
            debug!(address = %address, "No stored record; delete is a no-op");
            return Ok(false);
        };

        let deleter = self
            .inner
            .deleters
            .get(&identity.kind)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::UnknownKind {
                kind: identity.kind.clone(),
                address: address.clone(),
            })?;

        let ctx = ResourceContext {
            event: LifecycleEvent::Delete,
            quiet,
            adopt: false,
            identity: identity.clone(),
            prior_output: record.output.clone(),
        };

        debug!(address = %address, "Deleting resource");
        progress::started(identity, LifecycleEvent::Delete, quiet);
        let started_at = Instant::now();
        let heartbeat = spawn_heartbeat(identity, LifecycleEvent::Delete, quiet);

        let outcome = deleter.delete(&ctx, &record.input).await;
        if let Some(handle) = heartbeat {
            handle.abort();
        }

        match outcome {
            Ok(()) => {
                // Only a completed delete may drop the record; a resource
                // that still exists externally stays tracked.
                self.inner
                    .store
                    .delete(identity)
                    .await
                    .map_err(EngineError::StateStore)?;
                progress::completed(
                    identity,
                    LifecycleEvent::Delete,
                    started_at.elapsed().as_secs(),
                    quiet,
                );
                Ok(true)
            }
            Err(err) => {
                progress::failed(
                    identity,
                    LifecycleEvent::Delete,
                    started_at.elapsed().as_secs(),
                    &format!("{:#}", err),
                    quiet,
                );
                Err(match err.downcast::<EngineError>() {
                    Ok(e) => e,
                    Err(e) => EngineError::Delete {
                        address,
                        source: e,
                    },
                })
            }
        }
    }
}

/// Frees the in-flight slot for an address when an apply settles.
pub(crate) struct InFlightGuard<'a> {
    map: &'a DashMap<String, ()>,
    address: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(&self.address);
    }
}

// ─── The resource callable ──────────────────────────────────────────────────

/// A resource kind bound to an engine: `resource.apply(&scope, "db-1",
/// input).await` is the whole user-facing lifecycle API. Dependency edges
/// between resources are formed by awaiting one resource's [`Applied`]
/// output while building another's input — there is no declared graph.
pub struct Resource<T: ResourceType> {
    engine: Engine,
    handler: Arc<T>,
}

impl<T: ResourceType> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<T: ResourceType> Resource<T> {
    pub fn kind(&self) -> &'static str {
        self.handler.kind()
    }

    /// Create or update the resource addressed by `scope` + `id`.
    pub async fn apply(
        &self,
        scope: &Scope,
        id: &str,
        input: T::Input,
    ) -> Result<Applied<T::Output>, EngineError> {
        self.apply_with(scope, id, input, ApplyOptions::default())
            .await
    }

    /// Like [`Resource::apply`] with explicit options.
    pub async fn apply_with(
        &self,
        scope: &Scope,
        id: &str,
        input: T::Input,
        options: ApplyOptions,
    ) -> Result<Applied<T::Output>, EngineError> {
        self.engine
            .apply_resource(self.handler.as_ref(), scope, id, input, options)
            .await
    }

    /// Apply with the adopt intent set: the handler should bind to a
    /// matching pre-existing external object instead of creating one.
    pub async fn adopt(
        &self,
        scope: &Scope,
        id: &str,
        input: T::Input,
    ) -> Result<Applied<T::Output>, EngineError> {
        self.apply_with(scope, id, input, ApplyOptions { adopt: true })
            .await
    }

    /// Apply against the innermost open scope (see [`Scope::enter`]), for
    /// call sites that cannot thread a scope through explicitly.
    pub async fn apply_ambient(
        &self,
        id: &str,
        input: T::Input,
    ) -> Result<Applied<T::Output>, EngineError> {
        let scope = Scope::current().ok_or(EngineError::NoCurrentScope)?;
        self.apply(&scope, id, input).await
    }
}

fn snapshot<V: Serialize>(value: &V, address: &str) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|source| EngineError::Snapshot {
        address: address.to_string(),
        source,
    })
}

/// Prints "Still creating... [10s elapsed]" every 10s for a slow handler.
/// Aborted as soon as the handler settles.
fn spawn_heartbeat(
    identity: &ResourceIdentity,
    event: LifecycleEvent,
    quiet: bool,
) -> Option<tokio::task::JoinHandle<()>> {
    if quiet {
        return None;
    }
    let identity = identity.clone();
    Some(tokio::spawn(async move {
        let started = Instant::now();
        loop {
            tokio::time::sleep(Duration::from_secs(10)).await;
            progress::still_running(&identity, event, started.elapsed().as_secs());
        }
    }))
}
