use super::{Integration, IntegrationContext, steps, tasks, weather};
use crate::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

const LOG_TARGET: &str = "  registry";

/// Builds an integration for one user.
pub type Constructor = Arc<dyn Fn(&IntegrationContext, &str) -> Result<Box<dyn Integration>, Error> + Send + Sync>;

/// Maps metric names to integration constructors.
///
/// Every [`get`](Self::get) builds a fresh instance, so credentials are resolved again on
/// each call.
#[derive(Clone)]
pub struct Registry {
    context: Arc<IntegrationContext>,
    constructors: BTreeMap<String, Constructor>,
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("context", &self.context)
            .field("metrics", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new(context: IntegrationContext) -> Self {
        Self {
            context: Arc::new(context),
            constructors: BTreeMap::new(),
        }
    }

    /// A registry with the built-in `steps`, `weather` and `tasks` metrics.
    #[must_use]
    pub fn with_defaults(context: IntegrationContext) -> Self {
        let mut registry = Self::new(context);
        registry.register(steps::METRIC, |ctx, user_id| Ok(Box::new(steps::StepsIntegration::new(ctx, user_id)?)));
        registry.register(weather::METRIC, |ctx, user_id| Ok(Box::new(weather::WeatherIntegration::new(ctx, user_id)?)));
        registry.register(tasks::METRIC, |ctx, user_id| Ok(Box::new(tasks::TasksIntegration::new(ctx, user_id)?)));
        registry
    }

    /// Register (or replace) the constructor for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&IntegrationContext, &str) -> Result<Box<dyn Integration>, Error> + Send + Sync + 'static,
    {
        let name = name.into();
        log::debug!(target: LOG_TARGET, "Registering metric '{name}'");
        if self.constructors.insert(name.clone(), Arc::new(constructor)).is_some() {
            log::warn!(target: LOG_TARGET, "Replaced existing integration for metric '{name}'");
        }
    }

    /// Build the integration for `metric` bound to `user_id`.
    pub fn get(&self, metric: &str, user_id: &str) -> Result<Box<dyn Integration>, Error> {
        let constructor = self
            .constructors
            .get(metric)
            .ok_or_else(|| Error::UnknownMetric(metric.to_string()))?;
        constructor(&self.context, user_id)
    }

    /// Registered metric names, in sorted order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, metric: &str) -> bool {
        self.constructors.contains_key(metric)
    }

    #[must_use]
    pub fn context(&self) -> &IntegrationContext {
        &self.context
    }
}
