//! # Worker-Local Resource Handle
//!
//! [`Confined`] is how an async action reaches the resource. It is `!Send` on purpose:
//! the compiler, not a runtime check, keeps it on the worker thread.

use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to the resource, usable only on the actor's worker thread.
///
/// Access is scoped: [`Confined::with`] lends `&mut R` for the duration of a closure, so
/// a borrow can never be held across an `.await` and interleaved work items always find
/// the resource free.
pub struct Confined<R> {
    cell: Rc<RefCell<R>>,
}

impl<R> Clone for Confined<R> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<R> Confined<R> {
    pub(crate) fn new(resource: R) -> Self {
        Self {
            cell: Rc::new(RefCell::new(resource)),
        }
    }

    /// Runs `f` with exclusive access to the resource.
    ///
    /// # Panics
    /// Panics if called re-entrantly from inside another `with` on the same handle.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut resource = self.cell.borrow_mut();
        f(&mut resource)
    }

    /// Unwraps the resource once every other handle is gone.
    pub(crate) fn into_inner(self) -> Result<R, Self> {
        Rc::try_unwrap(self.cell)
            .map(RefCell::into_inner)
            .map_err(|cell| Self { cell })
    }
}
