//! Scope-keyed method registry.
//!
//! Every consumer type owns a [`ScopeId`]. Each scope has two independent
//! tables, calls and notifications, keyed by exact method name. Lookups never
//! fall back to another scope.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::handler::RpcHandler;
use crate::types::{Transport, TransportSet};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the consumer type a set of methods belongs to.
///
/// Each call to [`ScopeId::new`] yields a distinct scope, even for the same
/// label. Clones refer to the same scope.
#[derive(Clone)]
pub struct ScopeId {
    id: u64,
    label: Arc<str>,
}

impl ScopeId {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            label: Arc::from(label.as_ref()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for ScopeId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ScopeId {}

impl Hash for ScopeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({}#{})", self.label, self.id)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}

/// Which table a method lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Call,
    Notification,
}

/// A registered handler and its dispatch options.
#[derive(Clone)]
pub struct MethodEntry {
    name: String,
    handler: Arc<dyn RpcHandler>,
    transports: TransportSet,
    wants_context: bool,
}

impl MethodEntry {
    /// Entry reachable on every transport, without context.
    pub fn new<H>(name: impl Into<String>, handler: H) -> Self
    where
        H: RpcHandler + 'static,
    {
        Self::from_arc(name, Arc::new(handler))
    }

    pub fn from_arc(name: impl Into<String>, handler: Arc<dyn RpcHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            transports: TransportSet::all(),
            wants_context: false,
        }
    }

    pub fn transports(mut self, transports: TransportSet) -> Self {
        self.transports = transports;
        self
    }

    pub fn websocket(mut self, enabled: bool) -> Self {
        self.transports = self.transports.with(Transport::WebSocket, enabled);
        self
    }

    pub fn http(mut self, enabled: bool) -> Self {
        self.transports = self.transports.with(Transport::Http, enabled);
        self
    }

    /// Ask for the connection context on every invocation.
    pub fn with_context(mut self) -> Self {
        self.wants_context = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Arc<dyn RpcHandler> {
        &self.handler
    }

    pub fn transport_set(&self) -> TransportSet {
        self.transports
    }

    pub fn allows(&self, transport: Transport) -> bool {
        self.transports.contains(transport)
    }

    pub fn wants_context(&self) -> bool {
        self.wants_context
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("transports", &self.transports)
            .field("wants_context", &self.wants_context)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct ScopeTables {
    calls: HashMap<String, Arc<MethodEntry>>,
    notifications: HashMap<String, Arc<MethodEntry>>,
}

impl ScopeTables {
    fn table(&self, kind: MethodKind) -> &HashMap<String, Arc<MethodEntry>> {
        match kind {
            MethodKind::Call => &self.calls,
            MethodKind::Notification => &self.notifications,
        }
    }

    fn table_mut(&mut self, kind: MethodKind) -> &mut HashMap<String, Arc<MethodEntry>> {
        match kind {
            MethodKind::Call => &mut self.calls,
            MethodKind::Notification => &mut self.notifications,
        }
    }
}

/// Process-wide method tables, one pair per scope.
///
/// Safe to read while another thread registers; entries are handed out as
/// `Arc`s so no lock is held while a handler runs.
#[derive(Default)]
pub struct MethodRegistry {
    scopes: RwLock<HashMap<ScopeId, ScopeTables>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `entry` to the `kind` table of `scope`. An existing entry with
    /// the same name is replaced.
    pub fn register(&self, scope: &ScopeId, kind: MethodKind, entry: MethodEntry) {
        debug!(scope = %scope, ?kind, method = entry.name(), "registering method");
        let mut scopes = self.scopes.write();
        scopes
            .entry(scope.clone())
            .or_default()
            .table_mut(kind)
            .insert(entry.name.clone(), Arc::new(entry));
    }

    pub fn register_call(&self, scope: &ScopeId, entry: MethodEntry) {
        self.register(scope, MethodKind::Call, entry);
    }

    pub fn register_notification(&self, scope: &ScopeId, entry: MethodEntry) {
        self.register(scope, MethodKind::Notification, entry);
    }

    /// Exact, case-sensitive lookup within one scope.
    pub fn lookup(&self, scope: &ScopeId, kind: MethodKind, name: &str) -> Option<Arc<MethodEntry>> {
        self.scopes
            .read()
            .get(scope)
            .and_then(|tables| tables.table(kind).get(name))
            .cloned()
    }

    /// Names registered in one table, sorted.
    pub fn list(&self, scope: &ScopeId, kind: MethodKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .read()
            .get(scope)
            .map(|tables| tables.table(kind).keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Drop both tables of `scope`. Meant for resetting state between
    /// isolated test runs.
    pub fn clear(&self, scope: &ScopeId) {
        if self.scopes.write().remove(scope).is_some() {
            debug!(scope = %scope, "cleared scope");
        }
    }

    pub fn scopes(&self) -> Vec<ScopeId> {
        self.scopes.read().keys().cloned().collect()
    }

    pub fn contains_scope(&self, scope: &ScopeId) -> bool {
        self.scopes.read().contains_key(scope)
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("scopes", &self.scopes.read().len())
            .finish()
    }
}
