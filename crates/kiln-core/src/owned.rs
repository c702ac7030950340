//! Scoped ownership of native-owned objects
//!
//! Generation 7 objects carry an explicit destructor; generation 8+
//! objects are released by ordinary ownership. [`NativeOwned`] hides the
//! split behind one guard type: acquisition is scoped, release runs on
//! every exit path, and the active strategy comes from the descriptor.
//! The guard does no double-release bookkeeping; holding the object in
//! exactly one guard is the caller's contract.

use std::ops::{Deref, DerefMut};

use crate::capability::OwnershipModel;

/// A native object that may require an explicit destruction call.
///
/// `destroy` is invoked at most once, by [`NativeOwned`], and only under
/// [`OwnershipModel::ExplicitDestroy`]. Implementations release whatever
/// native-side resources the object holds; the Rust-side drop still runs
/// afterwards either way.
pub trait NativeObject {
    fn destroy(&mut self);
}

/// Scoped guard over a native-owned object.
///
/// Dropping the guard releases the object via the path the ownership
/// model requires. There is no way to take the object back out; the
/// native side is free to keep interior pointers until release.
#[derive(Debug)]
pub struct NativeOwned<T: NativeObject> {
    inner: T,
    ownership: OwnershipModel,
}

impl<T: NativeObject> NativeOwned<T> {
    /// Take ownership of `inner`, releasing it per `ownership` on drop.
    pub fn new(inner: T, ownership: OwnershipModel) -> Self {
        Self { inner, ownership }
    }

    /// The ownership model this guard applies.
    pub fn ownership(&self) -> OwnershipModel {
        self.ownership
    }
}

impl<T: NativeObject> Deref for NativeOwned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: NativeObject> DerefMut for NativeOwned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: NativeObject> Drop for NativeOwned<T> {
    fn drop(&mut self) {
        if self.ownership == OwnershipModel::ExplicitDestroy {
            self.inner.destroy();
        }
    }
}
