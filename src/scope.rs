use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::error::EngineError;
use crate::state::models::{validate_segment, ResourceIdentity};

/// Ambient configuration a scope propagates to its descendants.
#[derive(Debug, Clone, Default)]
pub struct ScopeOptions {
    /// Suppress per-resource console progress.
    pub quiet: bool,
    /// Injected into the root segment so concurrent runs (test isolation)
    /// never collide in the same external account or state store.
    pub prefix: Option<String>,
    /// Marks scopes opened by the test harness.
    pub is_test: bool,
}

struct ScopeInner {
    name: String,
    parent: Option<Weak<ScopeInner>>,
    // Parent owns children; children hold only a weak back-reference, so
    // teardown never has to break a reference cycle.
    children: Mutex<Vec<Scope>>,
    resources: Mutex<Vec<ResourceIdentity>>,
    options: ScopeOptions,
}

/// A named, hierarchical context that gives resources their identity and
/// groups them for bulk teardown.
///
/// Scopes are cheap to clone (shared handle). The chain of scope names from
/// the root down, plus the local id at the call site, forms a resource's
/// stable address. Every successful non-delete apply registers its identity
/// with the enclosing scope, in completion order, which is what the destroy
/// orchestrator later walks in reverse.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Open a root scope. The configured prefix, if any, becomes part of
    /// the root segment: `Scope::root("app", prefix: Some("t-1a2b"))`
    /// addresses resources under `t-1a2b-app/...`.
    pub fn root(name: &str, options: ScopeOptions) -> Result<Self, EngineError> {
        validate_segment(name)?;
        let name = match &options.prefix {
            Some(prefix) => {
                validate_segment(prefix)?;
                format!("{}-{}", prefix, name)
            }
            None => name.to_string(),
        };
        Ok(Self {
            inner: Arc::new(ScopeInner {
                name,
                parent: None,
                children: Mutex::new(Vec::new()),
                resources: Mutex::new(Vec::new()),
                options,
            }),
        })
    }

    /// Open a nested scope. Options are inherited from the parent.
    pub fn child(&self, name: &str) -> Result<Self, EngineError> {
        validate_segment(name)?;
        let child = Self {
            inner: Arc::new(ScopeInner {
                name: name.to_string(),
                parent: Some(Arc::downgrade(&self.inner)),
                children: Mutex::new(Vec::new()),
                resources: Mutex::new(Vec::new()),
                options: self.inner.options.clone(),
            }),
        };
        self.inner.children.lock().unwrap().push(child.clone());
        Ok(child)
    }

    /// The chain of scope names from the root down to this scope.
    pub fn chain(&self) -> Vec<String> {
        let mut names = vec![self.inner.name.clone()];
        let mut parent = self.inner.parent.clone();
        while let Some(weak) = parent {
            match weak.upgrade() {
                Some(inner) => {
                    names.push(inner.name.clone());
                    parent = inner.parent.clone();
                }
                None => break,
            }
        }
        names.reverse();
        names
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &ScopeOptions {
        &self.inner.options
    }

    pub fn quiet(&self) -> bool {
        self.inner.options.quiet
    }

    /// The identity a resource of `kind` declared as `local_id` gets within
    /// this scope.
    pub fn identity(&self, local_id: &str, kind: &str) -> Result<ResourceIdentity, EngineError> {
        validate_segment(local_id)?;
        Ok(ResourceIdentity::new(self.chain(), local_id, kind))
    }

    /// Record an applied resource for later teardown. Registration order is
    /// preserved; re-registering the same identity is a no-op.
    pub fn register(&self, identity: ResourceIdentity) {
        let mut resources = self.inner.resources.lock().unwrap();
        if !resources.contains(&identity) {
            resources.push(identity);
        }
    }

    /// Snapshot of the identities registered this run, in creation order.
    pub fn resources(&self) -> Vec<ResourceIdentity> {
        self.inner.resources.lock().unwrap().clone()
    }

    /// Snapshot of child scopes, in creation order.
    pub fn children(&self) -> Vec<Scope> {
        self.inner.children.lock().unwrap().clone()
    }

    /// Forget registered resources and children. Called by the destroy
    /// orchestrator once a branch is fully torn down, which is what makes a
    /// repeated destroy a no-op.
    pub(crate) fn clear(&self) {
        self.inner.resources.lock().unwrap().clear();
        self.inner.children.lock().unwrap().clear();
    }

    // ─── Ambient current-scope lookup ───────────────────────────────────────
    //
    // Explicit scope passing is the primary API; this stack only backs the
    // `Scope::current()` convenience for call sites that cannot thread a
    // scope through.

    /// Make this scope the innermost open scope until the returned guard is
    /// dropped. Guards must be dropped in reverse order of creation.
    pub fn enter(&self) -> ScopeGuard {
        let weak = Arc::downgrade(&self.inner);
        CURRENT_STACK.lock().unwrap().push(weak.clone());
        ScopeGuard { scope: weak }
    }

    /// The innermost open scope, if any.
    pub fn current() -> Option<Scope> {
        let mut stack = CURRENT_STACK.lock().unwrap();
        while let Some(weak) = stack.last() {
            match weak.upgrade() {
                Some(inner) => return Some(Scope { inner }),
                None => {
                    stack.pop();
                }
            }
        }
        None
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("chain", &self.chain())
            .field("resources", &self.inner.resources.lock().unwrap().len())
            .finish()
    }
}

static CURRENT_STACK: Mutex<Vec<Weak<ScopeInner>>> = Mutex::new(Vec::new());

/// Keeps a scope on the ambient stack; dropping it pops the entry.
pub struct ScopeGuard {
    scope: Weak<ScopeInner>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let mut stack = CURRENT_STACK.lock().unwrap();
        if let Some(pos) = stack.iter().rposition(|w| Weak::ptr_eq(w, &self.scope)) {
            stack.remove(pos);
        }
    }
}
