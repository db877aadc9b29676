use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::Provider;

/// A temporary indirection cell installed by generated initialization code to
/// break a dependency cycle between two provider fields.
///
/// The cell is created empty, handed out wherever the real provider is
/// needed before it exists, and fixed up exactly once via [`set_delegate`]
/// when the real provider has been constructed. Both the moment of fix-up
/// and its one-shot nature are deliberate: initialization code runs eagerly
/// in one pass, and a cycle must be broken by exactly one indirection.
pub struct DelegateProvider<T> {
    delegate: Mutex<Option<Arc<dyn Provider<T>>>>,
}

impl<T: 'static> DelegateProvider<T> {
    pub fn new() -> Self {
        Self {
            delegate: Mutex::new(None),
        }
    }

    /// Installs the real provider.
    ///
    /// # Panics
    ///
    /// Panics if a delegate was already installed. Generated code fixes a
    /// placeholder up exactly once, so a second call is a generator bug.
    pub fn set_delegate(&self, delegate: Arc<dyn Provider<T>>) {
        let mut slot = self.delegate.lock();
        assert!(
            slot.is_none(),
            "a delegate provider can only be fixed up once"
        );
        *slot = Some(delegate);
    }
}

impl<T: Send + Sync + 'static> Provider<T> for DelegateProvider<T> {
    fn get(&self) -> T {
        let slot = self.delegate.lock();
        match slot.as_ref() {
            Some(delegate) => delegate.get(),
            None => panic!("a delegate provider was used before it was fixed up"),
        }
    }
}

/// Fixes up a placeholder previously stored in a provider field.
///
/// Generated code stores placeholders behind `Arc<dyn Provider<T>>`, the
/// same shape as every other provider field, so the fix-up statement goes
/// through this function rather than through the concrete cell type.
///
/// # Panics
///
/// Panics if `provider` is not a [`DelegateProvider`], which would mean the
/// generator emitted a fix-up for a field it never delegated.
pub fn set_delegate<T: 'static>(provider: &Arc<dyn Provider<T>>, delegate: Arc<dyn Provider<T>>) {
    let cell = (provider.as_ref() as &dyn Any).downcast_ref::<DelegateProvider<T>>();
    match cell {
        Some(cell) => cell.set_delegate(delegate),
        None => unreachable!("set_delegate should target a delegate placeholder"),
    }
}
