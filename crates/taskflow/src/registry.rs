//! Operation Registry (C1): name -> callable lookup with parameter-default
//! introspection.
//!
//! Unlike the teacher's workflow registry (which loads compiled `.so`
//! packages by content hash), this is a plain in-memory name→implementation
//! map — operations are Rust values registered at startup, not dynamically
//! loaded code.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OperationError;

/// A named asynchronous callable of signature `(**named_params) -> mapping`
/// (spec §4.1).
#[async_trait]
pub trait Operation: Send + Sync {
    /// Invokes the operation with its fully-resolved parameter mapping.
    async fn invoke(
        &self,
        params: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, OperationError>;

    /// The operation's full parameter set with defaults (`null` when a
    /// parameter has no default), used to fill in any name absent from a
    /// task's `independent_params` at init time.
    fn default_parameters(&self) -> HashMap<String, Value>;
}

/// A static mapping from operation name to implementation.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, operation: Arc<dyn Operation>) {
        self.operations.insert(name.into(), operation);
    }

    /// Registers the demonstration operations shipped in
    /// [`crate::operations`] — see `SPEC_FULL.md`'s Supplemented Features.
    pub fn register_builtins(&mut self) {
        use crate::operations::{Identity, SleepFor, Uppercase, WriteFile};
        self.register("identity", Arc::new(Identity));
        self.register("sleep_for", Arc::new(SleepFor));
        self.register("uppercase", Arc::new(Uppercase));
        self.register("write_file", Arc::new(WriteFile));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    /// `default_parameters(name)` query from spec §4.1.
    pub fn default_parameters(&self, name: &str) -> Option<HashMap<String, Value>> {
        self.operations.get(name).map(|op| op.default_parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let mut registry = OperationRegistry::new();
        registry.register_builtins();
        assert!(registry.contains("identity"));
        assert!(registry.contains("sleep_for"));
        assert!(registry.contains("uppercase"));
        assert!(registry.contains("write_file"));
        assert!(!registry.contains("fetch_api_data"));
    }

    #[test]
    fn unknown_operation_has_no_defaults() {
        let registry = OperationRegistry::new();
        assert!(registry.default_parameters("nope").is_none());
    }
}
