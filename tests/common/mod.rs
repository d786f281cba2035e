#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use groundwork::{
    Engine, EngineError, LifecycleEvent, ResourceContext, ResourceType, Scope, ScopeOptions,
    Secret, SqliteBackend, StateBackend,
};

/// One observed handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Apply {
        address: String,
        event: LifecycleEvent,
        adopt: bool,
    },
    Delete {
        address: String,
    },
}

/// Shared, append-only record of handler invocations across tasks.
#[derive(Debug, Default, Clone)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn record(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn apply_index(&self, address: &str) -> Option<usize> {
        self.calls()
            .iter()
            .position(|c| matches!(c, Call::Apply { address: a, .. } if a == address))
    }

    pub fn delete_order(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::Delete { address } => Some(address.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInput {
    pub name: String,
    /// Make apply fail after the handler has been invoked.
    #[serde(default)]
    pub force_error: bool,
    /// Make delete fail (read back from the stored snapshot at destroy).
    #[serde(default)]
    pub fail_delete: bool,
    #[serde(default)]
    pub token: Option<Secret<String>>,
}

impl BucketInput {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            force_error: false,
            fail_delete: false,
            token: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketOutput {
    pub name: String,
    pub arn: String,
}

/// Fake storage-bucket kind: records every invocation, treats `name` as an
/// immutable identifying field, and fails on demand via input flags.
pub struct Bucket {
    log: CallLog,
    delay: Option<Duration>,
}

impl Bucket {
    pub fn new(log: CallLog) -> Self {
        Self { log, delay: None }
    }

    pub fn with_delay(log: CallLog, delay: Duration) -> Self {
        Self {
            log,
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl ResourceType for Bucket {
    type Input = BucketInput;
    type Output = BucketOutput;

    fn kind(&self) -> &'static str {
        "bucket"
    }

    fn validate(&self, input: &BucketInput) -> Result<(), String> {
        if input.name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(())
    }

    async fn apply(
        &self,
        ctx: &ResourceContext,
        input: &BucketInput,
    ) -> anyhow::Result<BucketOutput> {
        self.log.record(Call::Apply {
            address: ctx.identity.address(),
            event: ctx.event,
            adopt: ctx.adopt,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if ctx.event == LifecycleEvent::Update {
            if let Some(prior) = ctx.prior_output::<BucketOutput>()? {
                if prior.name != input.name {
                    return Err(EngineError::immutable_field(
                        ctx.identity.address(),
                        "name",
                        format!("cannot rename '{}' to '{}'", prior.name, input.name),
                    )
                    .into());
                }
            }
        }

        if input.force_error {
            anyhow::bail!("upstream API rejected bucket '{}'", input.name);
        }

        Ok(BucketOutput {
            name: input.name.clone(),
            arn: format!("arn:bucket:{}", input.name),
        })
    }

    async fn delete(&self, ctx: &ResourceContext, input: &BucketInput) -> anyhow::Result<()> {
        self.log.record(Call::Delete {
            address: ctx.identity.address(),
        });
        if input.fail_delete {
            anyhow::bail!("bucket '{}' still has objects", input.name);
        }
        Ok(())
    }
}

/// Engine over a fresh in-memory store, plus a handle on the store for
/// direct record assertions.
pub async fn test_engine() -> (Engine, Arc<SqliteBackend>) {
    let store = Arc::new(SqliteBackend::open_memory().unwrap());
    store.initialize().await.unwrap();
    let backend: Arc<dyn StateBackend> = Arc::clone(&store) as Arc<dyn StateBackend>;
    (Engine::new(backend), store)
}

pub fn quiet_scope(name: &str) -> Scope {
    Scope::root(
        name,
        ScopeOptions {
            quiet: true,
            ..Default::default()
        },
    )
    .unwrap()
}
