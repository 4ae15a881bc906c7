use std::collections::HashMap;
use std::sync::Arc;

use forgeloop_core::ModelBackend;

/// Model backends looked up by alias, e.g. a separate backend for `think`.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
    default: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default: None,
        }
    }

    /// Register a backend. The first one registered becomes the default.
    pub fn register(&mut self, alias: impl Into<String>, backend: Arc<dyn ModelBackend>) {
        let alias = alias.into();
        if self.default.is_none() {
            self.default = Some(alias.clone());
        }
        self.backends.insert(alias, backend);
    }

    pub fn set_default(&mut self, alias: &str) -> bool {
        if self.backends.contains_key(alias) {
            self.default = Some(alias.to_string());
            true
        } else {
            false
        }
    }

    pub fn get(&self, alias: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(alias).cloned()
    }

    pub fn default_backend(&self) -> Option<Arc<dyn ModelBackend>> {
        self.default.as_deref().and_then(|alias| self.get(alias))
    }

    /// The named backend, falling back to the default when `alias` is
    /// `None` or unknown.
    pub fn resolve(&self, alias: Option<&str>) -> Option<Arc<dyn ModelBackend>> {
        alias
            .and_then(|a| self.get(a))
            .or_else(|| self.default_backend())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedBackend;

    #[test]
    fn test_registry_resolution() {
        let mut registry = BackendRegistry::new();
        registry.register("main", Arc::new(ScriptedBackend::new("main")));
        registry.register("deep", Arc::new(ScriptedBackend::new("deep")));

        assert_eq!(registry.resolve(Some("deep")).unwrap().name(), "deep");
        assert_eq!(registry.resolve(Some("missing")).unwrap().name(), "main");
        assert_eq!(registry.resolve(None).unwrap().name(), "main");
        assert!(registry.set_default("deep"));
        assert!(!registry.set_default("nope"));
        assert_eq!(registry.resolve(None).unwrap().name(), "deep");
        assert_eq!(registry.list(), vec!["deep", "main"]);
    }
}
