use lupus_protocol::StepId;

/// Configuration errors in the step registry.
///
/// These are programmer errors: a room refuses to start with an
/// incomplete registry instead of failing halfway through a night.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesError {
    #[error("night step {0} has no schema")]
    MissingSchema(StepId),

    #[error("night step {0} has no resolver")]
    MissingResolver(StepId),
}
