//! ExecutorRegistry: params type name -> type-erased executor.

use std::collections::HashMap;
use std::sync::Arc;

use super::executor::{DynExecutor, PerpetualTaskExecutor, TypedExecutor};
use super::params::TaskParamsKind;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("executor for params type '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn DynExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: TaskParamsKind, E: PerpetualTaskExecutor<T> + 'static>(
        &mut self,
        executor: E,
    ) -> Result<(), RegistryError> {
        let params_type = T::TYPE.to_string();
        if self.executors.contains_key(&params_type) {
            return Err(RegistryError::AlreadyRegistered(params_type));
        }
        self.executors
            .insert(params_type, Arc::new(TypedExecutor::<T, E>::new(executor)));
        Ok(())
    }

    pub fn get(&self, params_type: &str) -> Option<Arc<dyn DynExecutor>> {
        self.executors.get(params_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{NoopPing, Sleeper};
    use super::*;
    use crate::typed::params::fixtures::{PingParams, SleepParams};

    #[test]
    fn register_and_get() {
        let mut registry = ExecutorRegistry::new();
        registry.register::<PingParams, _>(NoopPing).unwrap();

        let executor = registry.get(PingParams::TYPE).unwrap();
        assert_eq!(executor.params_type(), "PING");
        assert!(registry.get(SleepParams::TYPE).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = ExecutorRegistry::new();
        registry.register::<PingParams, _>(NoopPing).unwrap();
        let result = registry.register::<PingParams, _>(NoopPing);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(t)) if t == "PING"));
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = ExecutorRegistry::new();
        registry.register::<SleepParams, _>(Sleeper).unwrap();
        registry.register::<PingParams, _>(NoopPing).unwrap();
        assert_eq!(registry.registered_types(), vec!["PING", "SLEEP"]);
    }
}
