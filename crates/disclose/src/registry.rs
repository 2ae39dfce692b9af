//! Thread-local metadata registry.
//!
//! Associates each live traced value (by [`Handle`]) with a [`Metadata`]
//! record: the real operand, its description, and the records of every
//! intermediate value that contributed to it. The registry never keeps a
//! traced value alive; each record holds only a weak reference to its
//! wrapper, and the wrapper releases its entry when the last clone is
//! dropped.
//!
//! Records removed from the map are always dropped outside the registry
//! borrow. Dropping an operand can drop a traced value captured by a
//! function, which re-enters [`release`].

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{TraceError, TraceResult};
use crate::traced::{Operand, ProxyCell};
use crate::value::Value;

thread_local! {
    static REGISTRY: RefCell<MetadataRegistry> = RefCell::new(MetadataRegistry::new());

    /// Releases that arrived while the registry was borrowed.
    static PENDING_RELEASES: RefCell<Vec<Handle>> = const { RefCell::new(Vec::new()) };
}

// ============================================================================
// Handle
// ============================================================================

/// Identity of a traced value. Handles are never reused within a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Metadata Record
// ============================================================================

/// What the registry knows about one traced value.
pub struct Metadata {
    handle: Handle,
    operand: RefCell<Value>,
    description: Option<String>,
    components: Vec<Rc<Metadata>>,
    wrapper: Weak<ProxyCell>,
}

impl Metadata {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Borrows the real operand.
    ///
    /// # Panics
    ///
    /// Panics if the operand is being mutated through [`Metadata::update`]
    /// at the same time.
    pub fn operand(&self) -> Ref<'_, Value> {
        self.operand.borrow()
    }

    /// Returns a copy of the real operand.
    pub fn value(&self) -> Value {
        self.operand.borrow().clone()
    }

    /// Mutates the operand in place; later dump lines see the change.
    pub fn update<T>(&self, f: impl FnOnce(&mut Value) -> T) -> T {
        f(&mut self.operand.borrow_mut())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The description, or the display of the operand when none was given.
    pub fn label(&self) -> String {
        match &self.description {
            Some(description) => description.clone(),
            None => self.operand.borrow().to_string(),
        }
    }

    /// Records of the intermediate values this one was derived from.
    pub fn components(&self) -> &[Rc<Metadata>] {
        &self.components
    }

    /// The component chain followed by this record itself.
    pub fn chain(self: &Rc<Self>) -> Vec<Rc<Metadata>> {
        let mut chain = Vec::with_capacity(self.components.len() + 1);
        chain.extend(self.components.iter().cloned());
        chain.push(Rc::clone(self));
        chain
    }

    /// Renders `label = value`, or `None` if the operand is unavailable.
    pub fn dump_line(&self) -> Option<String> {
        let operand = self.operand.try_borrow().ok()?;
        let label = match &self.description {
            Some(description) => description.clone(),
            None => operand.to_string(),
        };
        Some(format!("{label} = {operand}"))
    }

    /// True if the wrapper is alive and still carries this record's handle.
    ///
    /// Handles are never reused, so today only a dead wrapper fails this.
    pub fn is_live(&self) -> bool {
        self.wrapper
            .upgrade()
            .is_some_and(|cell| cell.handle() == self.handle)
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("handle", &self.handle)
            .field("operand", &self.operand)
            .field("description", &self.description)
            .field("components", &self.components.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Map from handles to metadata records.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: HashMap<Handle, Rc<Metadata>>,
    next_handle: u64,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> Handle {
        self.next_handle += 1;
        Handle(self.next_handle)
    }

    fn insert(&mut self, metadata: Rc<Metadata>) -> Option<Rc<Metadata>> {
        self.entries.insert(metadata.handle, metadata)
    }

    fn get(&self, handle: Handle) -> Option<Rc<Metadata>> {
        self.entries.get(&handle).cloned()
    }

    fn remove(&mut self, handle: Handle) -> Option<Rc<Metadata>> {
        self.entries.remove(&handle)
    }

    fn remove_dead(&mut self) -> Vec<Rc<Metadata>> {
        let dead: Vec<Handle> = self
            .entries
            .values()
            .filter(|metadata| metadata.wrapper.strong_count() == 0)
            .map(|metadata| metadata.handle)
            .collect();
        dead.into_iter()
            .filter_map(|handle| self.entries.remove(&handle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Thread-local Access
// ============================================================================

/// Reserves a fresh handle for a wrapper about to be registered.
pub(crate) fn allocate_handle() -> Handle {
    REGISTRY.with(|registry| registry.borrow_mut().allocate())
}

/// Creates the record for `wrapper` and returns it.
///
/// A wrapper is registered once; a second registration replaces the
/// earlier record.
pub(crate) fn register(
    wrapper: &Rc<ProxyCell>,
    operand: Value,
    description: Option<String>,
    components: Vec<Rc<Metadata>>,
) -> Rc<Metadata> {
    drain_pending();

    let handle = wrapper.handle();
    let metadata = Rc::new(Metadata {
        handle,
        operand: RefCell::new(operand),
        description,
        components,
        wrapper: Rc::downgrade(wrapper),
    });

    let replaced = REGISTRY.with(|registry| registry.borrow_mut().insert(Rc::clone(&metadata)));
    trace!(
        handle = %handle,
        description = metadata.description().unwrap_or(""),
        components = metadata.components.len(),
        "registered traced value"
    );
    drop(replaced);

    metadata
}

/// Looks up the live record for `handle`.
///
/// A record whose wrapper is gone, or no longer carries `handle`, is
/// evicted and reported as [`TraceError::Untracked`].
pub fn lookup(handle: Handle) -> TraceResult<Rc<Metadata>> {
    let found = REGISTRY.with(|registry| registry.borrow().get(handle));
    match found {
        Some(metadata) if metadata.is_live() => Ok(metadata),
        Some(stale) => {
            let evicted = REGISTRY.with(|registry| registry.borrow_mut().remove(handle));
            trace!(handle = %handle, "evicted stale metadata");
            drop(evicted);
            drop(stale);
            Err(TraceError::Untracked(handle))
        }
        None => Err(TraceError::Untracked(handle)),
    }
}

/// Best-effort batch lookup; plain and untracked operands yield `None`.
pub fn lookup_many<'a, I>(operands: I) -> Vec<Option<Rc<Metadata>>>
where
    I: IntoIterator<Item = &'a Operand>,
{
    operands
        .into_iter()
        .map(|operand| match operand {
            Operand::Traced(traced) => lookup(traced.handle()).ok(),
            Operand::Plain(_) => None,
        })
        .collect()
}

/// Substitutes the real operand for every tracked value; anything else
/// passes through unchanged.
pub fn unwrap_many<'a, I>(operands: I) -> Vec<Operand>
where
    I: IntoIterator<Item = &'a Operand>,
{
    operands
        .into_iter()
        .map(|operand| match operand {
            Operand::Traced(traced) => match lookup(traced.handle()) {
                Ok(metadata) => Operand::Plain(metadata.value()),
                Err(_) => operand.clone(),
            },
            Operand::Plain(_) => operand.clone(),
        })
        .collect()
}

/// Removes the record for `handle`. Called when a wrapper is dropped.
///
/// Safe to call while the registry is borrowed or being torn down: the
/// release is queued and applied on the next registration or sweep.
pub fn release(handle: Handle) {
    let removed = REGISTRY.try_with(|registry| match registry.try_borrow_mut() {
        Ok(mut registry) => Ok(registry.remove(handle)),
        Err(_) => Err(handle),
    });

    match removed {
        Ok(Ok(metadata)) => {
            if metadata.is_some() {
                trace!(handle = %handle, "released traced value");
            }
            drop(metadata);
        }
        Ok(Err(handle)) => {
            let _ = PENDING_RELEASES.try_with(|pending| {
                if let Ok(mut pending) = pending.try_borrow_mut() {
                    pending.push(handle);
                }
            });
        }
        // Thread teardown; the registry is already gone.
        Err(_) => {}
    }
}

/// Evicts every record whose wrapper is gone. Returns how many were removed.
pub fn sweep() -> usize {
    drain_pending();
    let removed = REGISTRY.with(|registry| registry.borrow_mut().remove_dead());
    let count = removed.len();
    if count > 0 {
        trace!(count, "swept dead metadata");
    }
    drop(removed);
    count
}

/// Number of records currently held by this thread's registry.
pub fn tracked_count() -> usize {
    REGISTRY.with(|registry| registry.borrow().len())
}

fn drain_pending() {
    let handles = PENDING_RELEASES
        .try_with(|pending| pending.try_borrow_mut().map(|mut p| std::mem::take(&mut *p)))
        .ok()
        .and_then(Result::ok)
        .unwrap_or_default();
    for handle in handles {
        release(handle);
    }
}
