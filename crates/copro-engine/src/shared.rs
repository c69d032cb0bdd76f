//! Thread-safe handle that applies multi-step mutations all-or-nothing.

use std::sync::{Arc, RwLock};

use tracing::debug;

use copro_domain::Book;

use crate::CoreError;

/// Cloneable handle to a book shared between concurrent operators.
#[derive(Debug, Clone)]
pub struct SharedBook {
    inner: Arc<RwLock<Book>>,
}

impl SharedBook {
    pub fn new(book: Book) -> Self {
        Self {
            inner: Arc::new(RwLock::new(book)),
        }
    }

    /// Runs `f` against the current state without allowing writes.
    pub fn read<T>(&self, f: impl FnOnce(&Book) -> T) -> Result<T, CoreError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| CoreError::Consistency("shared book lock poisoned".into()))?;
        Ok(f(&*guard))
    }

    pub fn snapshot(&self) -> Result<Book, CoreError> {
        self.read(Book::clone)
    }

    /// Applies `f` to a working copy under the write lock and commits it only
    /// when `f` succeeds. Writers are serialized; a failure leaves the book as it was.
    pub fn transact<T>(
        &self,
        f: impl FnOnce(&mut Book) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| CoreError::Consistency("shared book lock poisoned".into()))?;
        let mut working = guard.clone();
        match f(&mut working) {
            Ok(value) => {
                *guard = working;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}
