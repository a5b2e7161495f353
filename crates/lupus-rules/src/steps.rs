//! The night sequence and the schema of each step.

use lupus_protocol::{RejectReason, RoleId, Seat, StepId};

use crate::Table;

/// Every night step, in the order they are played.
pub const NIGHT_STEPS: [StepId; 13] = [
    StepId::MagicianSwap,
    StepId::CelebrityDream,
    StepId::NightmareBlock,
    StepId::GuardProtect,
    StepId::WolfKill,
    StepId::WolfQueenCharm,
    StepId::WitchAction,
    StepId::SeerCheck,
    StepId::PsychicCheck,
    StepId::GargoyleCheck,
    StepId::WolfRobotLearn,
    StepId::HunterConfirm,
    StepId::DarkWolfKingConfirm,
];

/// The role that acts during `step`. For the wolf kill this is the pack as
/// a whole, represented by [`RoleId::Wolf`].
pub fn step_actor(step: StepId) -> RoleId {
    match step {
        StepId::MagicianSwap => RoleId::Magician,
        StepId::CelebrityDream => RoleId::Celebrity,
        StepId::NightmareBlock => RoleId::Nightmare,
        StepId::GuardProtect => RoleId::Guard,
        StepId::WolfKill => RoleId::Wolf,
        StepId::WolfQueenCharm => RoleId::WolfQueen,
        StepId::WitchAction => RoleId::Witch,
        StepId::SeerCheck => RoleId::Seer,
        StepId::PsychicCheck => RoleId::Psychic,
        StepId::GargoyleCheck => RoleId::Gargoyle,
        StepId::WolfRobotLearn => RoleId::WolfRobot,
        StepId::HunterConfirm => RoleId::Hunter,
        StepId::DarkWolfKingConfirm => RoleId::DarkWolfKing,
    }
}

/// The steps a template plays, in [`NIGHT_STEPS`] order.
///
/// The wolf kill runs whenever any pack wolf is in the template; every
/// other step needs its own role.
pub fn night_plan(template: &[RoleId]) -> Vec<StepId> {
    NIGHT_STEPS
        .into_iter()
        .filter(|step| match step {
            StepId::WolfKill => template.iter().any(|r| r.votes_with_wolves()),
            other => template.contains(&step_actor(*other)),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Schemas
// ---------------------------------------------------------------------------

/// How a step's input is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// One target seat.
    ChooseSeat,
    /// A target plus `ActionExtra::SwapWith`.
    SwapPair,
    /// Every pack wolf submits a `WOLF_VOTE`.
    WolfVote,
    /// A target plus `ActionExtra::Potion`.
    Potion,
    /// No target; the actor just acknowledges their status.
    Confirm,
}

/// Target rules for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    /// Targets must be alive.
    pub alive: bool,
    pub allow_self: bool,
    /// `target: None` is accepted.
    pub allow_skip: bool,
}

/// Who acts in a step, on whom, and what they are told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSchema {
    pub step: StepId,
    pub actor: RoleId,
    pub kind: ActionKind,
    pub constraints: Constraints,
    /// The actor receives a private result and must acknowledge it.
    pub reveals: bool,
    /// Text shown to the actor.
    pub prompt: &'static str,
}

impl StepSchema {
    /// Checks a target against the step's constraints.
    ///
    /// `None` is a skip. Confirm steps take no target at all.
    pub fn check_target(
        &self,
        actor_seat: Seat,
        target: Option<Seat>,
        table: &Table,
    ) -> Result<(), RejectReason> {
        let Some(target) = target else {
            return if self.constraints.allow_skip || self.kind == ActionKind::Confirm {
                Ok(())
            } else {
                Err(RejectReason::SkipNotAllowed)
            };
        };
        if self.kind == ActionKind::Confirm || !table.contains(target) {
            return Err(RejectReason::InvalidTarget);
        }
        if target == actor_seat && !self.constraints.allow_self {
            return Err(RejectReason::SelfTargetNotAllowed);
        }
        if self.constraints.alive && !table.is_alive(target) {
            return Err(RejectReason::TargetNotAlive);
        }
        Ok(())
    }
}

fn schema(
    step: StepId,
    kind: ActionKind,
    allow_self: bool,
    allow_skip: bool,
    reveals: bool,
    prompt: &'static str,
) -> StepSchema {
    StepSchema {
        step,
        actor: step_actor(step),
        kind,
        constraints: Constraints {
            alive: true,
            allow_self,
            allow_skip,
        },
        reveals,
        prompt,
    }
}

/// The built-in schema for `step`.
pub fn standard_schema(step: StepId) -> StepSchema {
    use ActionKind::*;
    match step {
        StepId::MagicianSwap => schema(step, SwapPair, true, true, false, "Choose two seats to swap"),
        StepId::CelebrityDream => schema(step, ChooseSeat, false, false, false, "Choose who dreams tonight"),
        StepId::NightmareBlock => schema(step, ChooseSeat, false, true, false, "Choose a seat to terrify"),
        StepId::GuardProtect => schema(step, ChooseSeat, true, true, false, "Choose a seat to guard"),
        StepId::WolfKill => schema(step, WolfVote, true, false, false, "Wolves, choose your victim"),
        StepId::WolfQueenCharm => schema(step, ChooseSeat, false, true, false, "Choose a seat to charm"),
        StepId::WitchAction => schema(step, Potion, false, true, false, "Use a potion or pass"),
        StepId::SeerCheck => schema(step, ChooseSeat, false, false, true, "Choose a seat to check"),
        StepId::PsychicCheck => schema(step, ChooseSeat, false, false, true, "Choose a seat to read"),
        StepId::GargoyleCheck => schema(step, ChooseSeat, false, false, true, "Choose a seat to inspect"),
        StepId::WolfRobotLearn => schema(step, ChooseSeat, false, false, true, "Choose a seat to learn from"),
        StepId::HunterConfirm => schema(step, Confirm, false, false, false, "See whether you can shoot"),
        StepId::DarkWolfKingConfirm => schema(step, Confirm, false, false, false, "See whether you can shoot"),
    }
}
