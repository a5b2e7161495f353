//! Night rules for Lupus.
//!
//! - [`NIGHT_STEPS`] / [`night_plan`]: the order in which roles wake.
//! - [`StepSchema`]: who may act in a step and on whom.
//! - [`Resolver`]s: the pure effect of an accepted action.
//! - [`StepRegistry`]: schema + resolver per step, validated up front.
//! - [`calculate_deaths`]: folds the night's actions into the dead seats.
//!
//! Nothing here performs I/O or keeps state between calls; the Host's room
//! owns the night and calls into these functions.

mod actions;
mod death;
mod error;
mod registry;
mod resolve;
mod steps;

pub use actions::{ActionRecord, NightActions, RoleSeatMap, SwapPair, Table, WitchAction};
pub use death::calculate_deaths;
pub use error::RulesError;
pub use registry::StepRegistry;
pub use resolve::{
    ResolveInput, Resolver, StepOutcome, confirm_status, standard_resolver, tally_wolf_votes,
    witch_context,
};
pub use steps::{
    ActionKind, Constraints, NIGHT_STEPS, StepSchema, night_plan, standard_schema, step_actor,
};
