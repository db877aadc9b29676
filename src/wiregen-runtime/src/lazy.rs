use std::sync::Arc;

use parking_lot::Mutex;

use crate::Provider;

/// A memoizing handle over a provider, constructed eagerly but evaluated on
/// first use.
pub struct Lazy<T> {
    provider: Arc<dyn Provider<T>>,
    value: Mutex<Option<T>>,
}

impl<T> Lazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(provider: Arc<dyn Provider<T>>) -> Self {
        Self {
            provider,
            value: Mutex::new(None),
        }
    }

    pub fn get(&self) -> T {
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

/// A provider of fresh [`Lazy`] handles over one underlying provider.
///
/// Each request yields an independent handle with its own memoization, so
/// two call sites asking for a lazy value do not observe each other's
/// initialization.
pub struct ProviderOfLazy<T> {
    provider: Arc<dyn Provider<T>>,
}

impl<T> ProviderOfLazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(provider: Arc<dyn Provider<T>>) -> Self {
        Self { provider }
    }
}

impl<T> Provider<Lazy<T>> for ProviderOfLazy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> Lazy<T> {
        Lazy::new(Arc::clone(&self.provider))
    }
}
