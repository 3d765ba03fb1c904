//! The static table of remote function declarations.
//!
//! A code definition registers every function it may call once, at startup.
//! Sessions share the finished table read-only.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SpecError;
use crate::function::{FunctionId, RemoteFunctionSpec};

/// Registry of [`RemoteFunctionSpec`]s, keyed by name and by id.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    /// Specs keyed by name.
    by_name: HashMap<String, Arc<RemoteFunctionSpec>>,
    /// Names keyed by function id, for worker-side dispatch.
    by_id: HashMap<FunctionId, String>,
}

impl FunctionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::DuplicateFunction`] if the name, or its id, is
    /// already present.
    pub fn register(&mut self, spec: RemoteFunctionSpec) -> Result<(), SpecError> {
        if self.by_name.contains_key(spec.name()) || self.by_id.contains_key(&spec.id()) {
            return Err(SpecError::DuplicateFunction(spec.name().to_string()));
        }
        self.by_id.insert(spec.id(), spec.name().to_string());
        self.by_name
            .insert(spec.name().to_string(), Arc::new(spec));
        Ok(())
    }

    /// Register several functions.
    ///
    /// # Errors
    ///
    /// Stops at the first [`SpecError::DuplicateFunction`].
    pub fn register_all(
        &mut self,
        specs: impl IntoIterator<Item = RemoteFunctionSpec>,
    ) -> Result<(), SpecError> {
        for spec in specs {
            self.register(spec)?;
        }
        Ok(())
    }

    /// Look up a function by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<RemoteFunctionSpec>> {
        self.by_name.get(name)
    }

    /// Look up a function by id.
    #[must_use]
    pub fn get_by_id(&self, id: FunctionId) -> Option<&Arc<RemoteFunctionSpec>> {
        self.by_id.get(&id).and_then(|name| self.by_name.get(name))
    }

    /// Look up a function by name, failing if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::UnknownFunction`] if no such function exists.
    pub fn require(&self, name: &str) -> Result<&Arc<RemoteFunctionSpec>, SpecError> {
        self.get(name)
            .ok_or_else(|| SpecError::UnknownFunction(name.to_string()))
    }

    /// Returns `true` if the table declares `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the number of declared functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if no function is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All declared function names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
