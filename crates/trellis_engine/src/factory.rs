//! Fact identity allocation.
//!
//! Each working memory owns one [`FactHandleFactory`]. Values are issued in
//! strictly increasing order and never reused, so a retracted handle can
//! always be told apart from a live one.

use trellis_foundation::{Error, FactHandle, Result};

use crate::persistence::FactHandleCheckpoint;

/// Issues fact handles for one working memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactHandleFactory {
    id: u32,
    counter: u64,
}

impl FactHandleFactory {
    /// Creates a fresh factory. Nothing has been issued yet.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self { id, counter: 0 }
    }

    /// Recreates a factory from a persisted `(id, counter)` pair.
    ///
    /// The next value issued is `counter + 1`, exactly as if the factory had
    /// never stopped.
    ///
    /// # Errors
    /// Returns [`ErrorKind::InvalidCheckpoint`](trellis_foundation::ErrorKind)
    /// if either value is negative or the id does not fit a factory id.
    pub fn recover(id: i64, counter: i64) -> Result<Self> {
        let invalid = || Error::invalid_checkpoint(id, counter);
        let factory_id = u32::try_from(id).map_err(|_| invalid())?;
        let issued = u64::try_from(counter).map_err(|_| invalid())?;
        Ok(Self {
            id: factory_id,
            counter: issued,
        })
    }

    /// Recreates a factory from a checkpoint.
    ///
    /// # Errors
    /// Same as [`FactHandleFactory::recover`].
    pub fn from_checkpoint(checkpoint: &FactHandleCheckpoint) -> Result<Self> {
        Self::recover(checkpoint.id, checkpoint.counter)
    }

    /// Returns the factory id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the last value issued (0 if none).
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Issues the next value.
    pub fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    /// Issues the next handle.
    pub fn new_handle(&mut self) -> FactHandle {
        let id = self.next();
        FactHandle::new(self.id, id)
    }

    /// Returns true if `handle` was issued by this factory.
    #[must_use]
    pub fn owns(&self, handle: FactHandle) -> bool {
        handle.factory == self.id && handle.id >= 1 && handle.id <= self.counter
    }

    /// Returns the state needed to recover this factory later.
    #[must_use]
    pub fn checkpoint(&self) -> FactHandleCheckpoint {
        FactHandleCheckpoint {
            id: i64::from(self.id),
            counter: i64::try_from(self.counter).unwrap_or(i64::MAX),
        }
    }
}
