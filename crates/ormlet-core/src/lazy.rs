//! Lazily loaded inverse collections.

use crate::Result;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

type Loader<T> = Box<dyn FnMut() -> Result<Vec<T>> + Send>;

/// A one-to-many collection fetched on first access.
///
/// The loader runs when the list is first read and its result is cached;
/// later reads return the cached items without calling the loader again.
/// A failed load leaves the list unloaded so the next access retries.
///
/// Clones share the same cache and loader.
pub struct LazyList<T> {
    inner: Arc<LazyInner<T>>,
}

struct LazyInner<T> {
    items: OnceLock<Vec<T>>,
    loader: Mutex<Option<Loader<T>>>,
}

impl<T> LazyList<T> {
    /// Create a list backed by `loader`.
    pub fn new<F>(loader: F) -> Self
    where
        F: FnMut() -> Result<Vec<T>> + Send + 'static,
    {
        Self {
            inner: Arc::new(LazyInner {
                items: OnceLock::new(),
                loader: Mutex::new(Some(Box::new(loader))),
            }),
        }
    }

    /// Create an already-loaded list.
    pub fn loaded(items: Vec<T>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(items);
        Self {
            inner: Arc::new(LazyInner {
                items: cell,
                loader: Mutex::new(None),
            }),
        }
    }

    /// Create an empty, loaded list.
    pub fn empty() -> Self {
        Self::loaded(Vec::new())
    }

    /// Whether the items have been fetched.
    pub fn is_loaded(&self) -> bool {
        self.inner.items.get().is_some()
    }

    /// The cached items, without triggering a load.
    pub fn loaded_items(&self) -> Option<&[T]> {
        self.inner.items.get().map(Vec::as_slice)
    }

    /// Fetch the items if needed and return them.
    pub fn force(&self) -> Result<&[T]> {
        if let Some(items) = self.inner.items.get() {
            return Ok(items);
        }

        let mut loader = self
            .inner
            .loader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Another handle may have loaded while we waited for the lock.
        if let Some(items) = self.inner.items.get() {
            return Ok(items);
        }

        let items = match loader.as_mut() {
            Some(load) => load()?,
            None => Vec::new(),
        };
        tracing::trace!(count = items.len(), "Lazy collection loaded");
        *loader = None;
        Ok(self.inner.items.get_or_init(|| items))
    }

    pub fn len(&self) -> Result<usize> {
        self.force().map(<[T]>::len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.force().map(<[T]>::is_empty)
    }

    pub fn get(&self, index: usize) -> Result<Option<&T>> {
        self.force().map(|items| items.get(index))
    }

    /// Iterate over the items, loading them first if needed.
    pub fn iter(&self) -> Result<std::slice::Iter<'_, T>> {
        self.force().map(<[T]>::iter)
    }

    /// Copy the items out, loading them first if needed.
    pub fn to_vec(&self) -> Result<Vec<T>>
    where
        T: Clone,
    {
        self.force().map(<[T]>::to_vec)
    }
}

impl<T> Clone for LazyList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for LazyList<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loaded_items() {
            Some(items) => f.debug_tuple("LazyList").field(&items).finish(),
            None => f.write_str("LazyList(<not loaded>)"),
        }
    }
}

/// Two lists are equal when both are loaded with equal items, or both share a cache.
impl<T: PartialEq> PartialEq for LazyList<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || {
            match (self.loaded_items(), other.loaded_items()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
    }
}

impl<T> From<Vec<T>> for LazyList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::loaded(items)
    }
}
