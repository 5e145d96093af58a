//! Hook-point registry with a one-way commit.
//!
//! Every capability, single-cast or multi-cast, is stored as one ordered
//! chain. Single-cast consumers read the last instance, multi-cast consumers
//! walk the chain (forward for filters, backward for validators).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info};

use super::settings::ApiSettings;
use crate::error::{ApiError, ApiResult};

/// Marker for capability trait objects that can be registered as hook points.
///
/// Implemented for `dyn ModelHandler`, `dyn QueryExecutor` and the other
/// capability traits in [`crate::hooks`].
pub trait Capability: Send + Sync + 'static {
    /// Human-readable capability name used in diagnostics.
    const NAME: &'static str;
}

struct HookChain {
    capability: &'static str,
    instances: Vec<Box<dyn Any + Send + Sync>>,
}

/// Hook-point registry under construction.
///
/// Mutations are rejected with [`ApiError::ConfigurationFrozen`] once
/// [`commit`](Self::commit) has been called. Contexts only accept the
/// [`SharedConfiguration`] produced by [`into_shared`](Self::into_shared).
#[derive(Default)]
pub struct ApiConfiguration {
    chains: HashMap<TypeId, HookChain>,
    settings: ApiSettings,
    committed: bool,
}

impl ApiConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from explicit settings instead of the defaults.
    pub fn with_settings(settings: ApiSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Append `instance` to the chain of capability `C`.
    pub fn add_hook_point<C>(&mut self, instance: Arc<C>) -> ApiResult<&mut Self>
    where
        C: Capability + ?Sized,
    {
        self.ensure_mutable::<C>()?;
        let chain = self.chain_mut::<C>();
        chain.instances.push(Box::new(instance));
        debug!(capability = C::NAME, len = chain.instances.len(), "hook point added");
        Ok(self)
    }

    /// Replace the whole chain of capability `C` with `instance`.
    pub fn set_hook_point<C>(&mut self, instance: Arc<C>) -> ApiResult<&mut Self>
    where
        C: Capability + ?Sized,
    {
        self.ensure_mutable::<C>()?;
        let chain = self.chain_mut::<C>();
        chain.instances.clear();
        chain.instances.push(Box::new(instance));
        debug!(capability = C::NAME, "hook point replaced");
        Ok(self)
    }

    /// Most recently registered instance of capability `C`.
    pub fn get_hook_point<C>(&self) -> Option<Arc<C>>
    where
        C: Capability + ?Sized,
    {
        self.chains
            .get(&TypeId::of::<C>())
            .and_then(|chain| chain.instances.last())
            .and_then(|instance| instance.downcast_ref::<Arc<C>>())
            .cloned()
    }

    /// All instances of capability `C` in registration order.
    pub fn get_hook_points<C>(&self) -> Vec<Arc<C>>
    where
        C: Capability + ?Sized,
    {
        self.chains
            .get(&TypeId::of::<C>())
            .map(|chain| {
                chain
                    .instances
                    .iter()
                    .filter_map(|instance| instance.downcast_ref::<Arc<C>>())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Freeze the registry. Calling it again is a no-op.
    pub fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;
        info!(
            event = "registry.committed",
            capabilities = self.chains.len(),
            hook_points = self.chains.values().map(|c| c.instances.len()).sum::<usize>(),
        );
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Commit and hand out the read-only handle shared by request contexts.
    pub fn into_shared(mut self) -> SharedConfiguration {
        self.commit();
        SharedConfiguration(Arc::new(self))
    }

    fn ensure_mutable<C>(&self) -> ApiResult<()>
    where
        C: Capability + ?Sized,
    {
        if self.committed {
            return Err(ApiError::ConfigurationFrozen {
                capability: C::NAME,
            });
        }
        Ok(())
    }

    fn chain_mut<C>(&mut self) -> &mut HookChain
    where
        C: Capability + ?Sized,
    {
        self.chains.entry(TypeId::of::<C>()).or_insert_with(|| HookChain {
            capability: C::NAME,
            instances: Vec::new(),
        })
    }
}

impl fmt::Debug for ApiConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chains: Vec<(&str, usize)> = self
            .chains
            .values()
            .map(|c| (c.capability, c.instances.len()))
            .collect();
        chains.sort_unstable();
        f.debug_struct("ApiConfiguration")
            .field("chains", &chains)
            .field("settings", &self.settings)
            .field("committed", &self.committed)
            .finish()
    }
}

/// Committed, immutable configuration shared across request contexts.
///
/// Cloning is a reference-count bump. Only read operations are reachable
/// through the handle.
#[derive(Debug, Clone)]
pub struct SharedConfiguration(Arc<ApiConfiguration>);

impl Deref for SharedConfiguration {
    type Target = ApiConfiguration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
