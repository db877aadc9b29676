use crate::Provider;

/// A provider backed by an already-constructed value, cloned per request.
///
/// Generated components use this for values that exist before the component
/// does: bound instances, the component itself and component dependencies.
pub struct InstanceProvider<T> {
    instance: T,
}

impl<T: Clone> InstanceProvider<T> {
    pub fn new(instance: T) -> Self {
        Self { instance }
    }
}

impl<T> Provider<T> for InstanceProvider<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn get(&self) -> T {
        self.instance.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_provider_clones_the_instance() {
        let provider = InstanceProvider::new(42i32);
        assert_eq!(provider.get(), 42);
        assert_eq!(provider.get(), 42);
    }
}
