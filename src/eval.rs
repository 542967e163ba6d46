use serde_json::Value;

use crate::{features::FeatureDefinition, strategy::StrategyRegistry, Context, Result};

impl FeatureDefinition {
    /// Evaluate the feature against `context`.
    ///
    /// Strategies run in declaration order and the first one returning `true` wins. Strategies
    /// missing from `registry` are skipped.
    pub fn eval(
        &self,
        registry: &StrategyRegistry,
        context: &Context,
        args: &[Value],
    ) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }

        if self.strategies.is_empty() {
            return Ok(true);
        }

        for config in &self.strategies {
            let Some(strategy) = registry.resolve(&config.name)? else {
                log::debug!(target: "unleash",
                            feature:display = self.name,
                            strategy:display = config.name;
                            "skipping unknown strategy");
                continue;
            };

            if strategy.is_enabled(&config.parameters, context, args) {
                log::trace!(target: "unleash",
                            feature:display = self.name,
                            strategy:display = config.name;
                            "strategy enabled feature");
                return Ok(true);
            }
        }

        Ok(false)
    }
}
