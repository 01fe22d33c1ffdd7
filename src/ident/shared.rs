//! Thread-safe handle around a single allocator

use std::sync::{Arc, Mutex, MutexGuard};

use super::{CurrentSource, IdSource, IdentError, IdentifierAllocator};

/// Cloneable handle that serializes every allocation through one lock.
///
/// Each `next`/`next_with_pseudonym` call takes the lock once, so the
/// counter increment and the pseudonym check are atomic with respect to
/// other handles.
#[derive(Debug, Clone, Default)]
pub struct SharedAllocator {
    inner: Arc<Mutex<IdentifierAllocator>>,
}

impl SharedAllocator {
    pub fn new(allocator: IdentifierAllocator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(allocator)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IdentifierAllocator> {
        // A panic while holding the lock cannot leave a half-applied
        // allocation behind, so a poisoned state is still consistent.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn next(&self, category: &str) -> String {
        self.lock().next(category)
    }

    pub fn next_with_pseudonym(&self, category: &str, pseudonym: &str) -> Result<String, IdentError> {
        self.lock().next_with_pseudonym(category, pseudonym)
    }

    pub fn get(&self, pseudonym: &str) -> Option<String> {
        self.lock().get(pseudonym).map(str::to_string)
    }

    pub fn count(&self) -> u32 {
        self.lock().count()
    }

    /// Copy of the current allocator state
    pub fn snapshot(&self) -> IdentifierAllocator {
        self.lock().clone()
    }

    /// Run `f` with exclusive access to the allocator
    pub fn with<R>(&self, f: impl FnOnce(&mut IdentifierAllocator) -> R) -> R {
        f(&mut self.lock())
    }
}

impl IdSource for SharedAllocator {
    fn allocate(&mut self, category: &str, pseudonym: Option<&str>) -> Result<String, IdentError> {
        self.lock().allocate(category, pseudonym)
    }

    fn reuse(&mut self, category: &str, id: &str, pseudonym: Option<&str>) -> Result<(), IdentError> {
        self.lock().reuse(category, id, pseudonym)
    }

    fn bound(&self, pseudonym: &str) -> Option<String> {
        self.lock().bound(pseudonym).map(str::to_string)
    }

    fn record_current_source(&mut self, source: CurrentSource) -> u32 {
        self.lock().record_current_source(source)
    }
}
