//! Platform name -> settlement route, built once at startup

use super::ChainAdapter;
use crate::error::{BridgeError, BridgeResult};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub enum Route<'a> {
    Native,
    Foreign(&'a Arc<dyn ChainAdapter>),
}

impl Route<'_> {
    pub fn is_native(&self) -> bool {
        matches!(self, Route::Native)
    }
}

pub struct AdapterRegistry {
    native: String,
    adapters: BTreeMap<String, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new(native: impl Into<String>) -> Self {
        Self {
            native: native.into(),
            adapters: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) -> BridgeResult<()> {
        let name = adapter.platform().to_string();
        if name == self.native {
            return Err(BridgeError::Config(format!(
                "Adapter {} collides with the native platform",
                name
            )));
        }
        if self.adapters.contains_key(&name) {
            return Err(BridgeError::Config(format!("Duplicate platform {}", name)));
        }
        info!("Registered {} adapter at {}", name, adapter.local_address());
        self.adapters.insert(name, adapter);
        Ok(())
    }

    pub fn route(&self, platform: &str) -> BridgeResult<Route<'_>> {
        if platform == self.native {
            return Ok(Route::Native);
        }
        self.adapters
            .get(platform)
            .map(Route::Foreign)
            .ok_or_else(|| BridgeError::UnknownPlatform(platform.to_string()))
    }

    pub fn adapter(&self, platform: &str) -> BridgeResult<&Arc<dyn ChainAdapter>> {
        self.adapters
            .get(platform)
            .ok_or_else(|| BridgeError::UnknownPlatform(platform.to_string()))
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn ChainAdapter>> {
        self.adapters.values()
    }

    pub fn native(&self) -> &str {
        &self.native
    }

    pub fn platforms(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}
