//! Schema + resolver table keyed by step.

use std::collections::BTreeMap;

use lupus_protocol::{RejectReason, StepId};

use crate::{
    NIGHT_STEPS, ResolveInput, Resolver, RulesError, StepOutcome, StepSchema, standard_resolver,
    standard_schema,
};

/// Every step a room plays must have both a schema and a resolver here.
///
/// ```rust
/// use lupus_protocol::RoleId;
/// use lupus_rules::{StepRegistry, night_plan};
///
/// let plan = night_plan(&[RoleId::Wolf, RoleId::Seer, RoleId::Villager]);
/// StepRegistry::standard().validate(&plan).unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    schemas: BTreeMap<StepId, StepSchema>,
    resolvers: BTreeMap<StepId, Resolver>,
}

impl StepRegistry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in schema and resolver for every night step.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for step in NIGHT_STEPS {
            registry.register(standard_schema(step), standard_resolver(step));
        }
        registry
    }

    /// Registers (or replaces) a step's schema and resolver.
    pub fn register(&mut self, schema: StepSchema, resolver: Resolver) -> &mut Self {
        let step = schema.step;
        self.schemas.insert(step, schema);
        self.resolvers.insert(step, resolver);
        self
    }

    pub fn register_schema(&mut self, schema: StepSchema) -> &mut Self {
        self.schemas.insert(schema.step, schema);
        self
    }

    pub fn register_resolver(&mut self, step: StepId, resolver: Resolver) -> &mut Self {
        self.resolvers.insert(step, resolver);
        self
    }

    pub fn schema(&self, step: StepId) -> Option<&StepSchema> {
        self.schemas.get(&step)
    }

    pub fn resolver(&self, step: StepId) -> Option<Resolver> {
        self.resolvers.get(&step).copied()
    }

    /// Checks that every step of `plan` is fully configured.
    pub fn validate(&self, plan: &[StepId]) -> Result<(), RulesError> {
        for step in plan {
            if !self.schemas.contains_key(step) {
                return Err(RulesError::MissingSchema(*step));
            }
            if !self.resolvers.contains_key(step) {
                return Err(RulesError::MissingResolver(*step));
            }
        }
        tracing::debug!(steps = plan.len(), "step registry validated");
        Ok(())
    }

    /// Runs the resolver for `input.step`.
    ///
    /// A step missing from the registry resolves to nothing; rooms only
    /// play validated plans, so this does not happen in practice.
    pub fn resolve(&self, input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
        match self.resolver(input.step) {
            Some(resolver) => resolver(input),
            None => {
                tracing::warn!(step = %input.step, "no resolver registered");
                Ok(StepOutcome::default())
            }
        }
    }
}
