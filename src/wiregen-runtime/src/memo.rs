use std::sync::Arc;

use parking_lot::Mutex;

use crate::Provider;

/// The caching decorator for strongly-scoped bindings.
///
/// The wrapped provider is consulted at most once; every later request is
/// served from the memoized value. The re-check after construction keeps the
/// first stored value authoritative if the wrapped provider was reached
/// again while the value was being produced.
pub struct DoubleCheck<T> {
    provider: Arc<dyn Provider<T>>,
    value: Mutex<Option<T>>,
}

impl<T> DoubleCheck<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn provider(delegate: Arc<dyn Provider<T>>) -> Arc<dyn Provider<T>> {
        Arc::new(Self {
            provider: delegate,
            value: Mutex::new(None),
        })
    }
}

impl<T> Provider<T> for DoubleCheck<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        if let Some(value) = self.value.lock().as_ref() {
            return value.clone();
        }
        let created = self.provider.get();
        let mut slot = self.value.lock();
        match slot.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *slot = Some(created.clone());
                created
            }
        }
    }
}

/// The caching decorator for reusably-scoped bindings.
///
/// Memoizes like [`DoubleCheck`] but without the strict at-most-once
/// guarantee: concurrent first requests may each construct a value, and any
/// of them may be the one that sticks.
pub struct SingleCheck<T> {
    provider: Arc<dyn Provider<T>>,
    value: Mutex<Option<T>>,
}

impl<T> SingleCheck<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn provider(delegate: Arc<dyn Provider<T>>) -> Arc<dyn Provider<T>> {
        Arc::new(Self {
            provider: delegate,
            value: Mutex::new(None),
        })
    }
}

impl<T> Provider<T> for SingleCheck<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        if let Some(value) = self.value.lock().as_ref() {
            return value.clone();
        }
        let created = self.provider.get();
        *self.value.lock() = Some(created.clone());
        created
    }
}
