//! Per-step resolvers.
//!
//! A resolver runs once the step's schema has accepted the input. It is a
//! pure function: it reads the table and tonight's actions so far and
//! returns the effect to record plus, for check steps, the private result
//! for the actor. It may still refuse input the schema cannot judge on its
//! own (a witch saving someone the wolves did not kill).

use std::collections::BTreeMap;

use lupus_protocol::{
    ActionExtra, ConfirmInfo, Potion, PrivatePayload, RejectReason, RoleId, RoleResult, Seat,
    SeerResult, StepId, WitchInfo,
};

use crate::{ActionRecord, NightActions, SwapPair, Table};

/// Everything a resolver may look at.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    pub step: StepId,
    pub actor_seat: Seat,
    pub target: Option<Seat>,
    pub extra: Option<ActionExtra>,
    pub table: &'a Table,
    pub actions: &'a NightActions,
    /// Wolf votes, voter → target. Only read by the wolf kill.
    pub wolf_votes: &'a BTreeMap<Seat, Seat>,
}

/// The effect of a resolved step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub record: Option<ActionRecord>,
    /// Private result for the actor.
    pub reveal: Option<PrivatePayload>,
}

impl StepOutcome {
    fn record(record: ActionRecord) -> Self {
        Self {
            record: Some(record),
            reveal: None,
        }
    }

    fn nothing() -> Self {
        Self::default()
    }
}

/// A step's resolver.
pub type Resolver = fn(&ResolveInput<'_>) -> Result<StepOutcome, RejectReason>;

/// The built-in resolver for `step`.
pub fn standard_resolver(step: StepId) -> Resolver {
    match step {
        StepId::MagicianSwap => resolve_magician_swap,
        StepId::CelebrityDream => resolve_dream,
        StepId::NightmareBlock => resolve_block,
        StepId::GuardProtect => resolve_protect,
        StepId::WolfKill => resolve_wolf_kill,
        StepId::WolfQueenCharm => resolve_charm,
        StepId::WitchAction => resolve_witch,
        StepId::SeerCheck => resolve_seer,
        StepId::PsychicCheck => resolve_psychic,
        StepId::GargoyleCheck => resolve_gargoyle,
        StepId::WolfRobotLearn => resolve_wolf_robot,
        StepId::HunterConfirm | StepId::DarkWolfKingConfirm => resolve_confirm,
    }
}

/// Records `target` if there is one; a skip records nothing.
fn single(input: &ResolveInput<'_>, record: fn(Seat) -> ActionRecord) -> StepOutcome {
    match input.target {
        Some(target) => StepOutcome::record(record(target)),
        None => StepOutcome::nothing(),
    }
}

fn resolve_dream(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    Ok(single(input, ActionRecord::Dream))
}

fn resolve_block(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    Ok(single(input, ActionRecord::Block))
}

fn resolve_protect(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    Ok(single(input, ActionRecord::Protect))
}

fn resolve_charm(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    Ok(single(input, ActionRecord::Charm))
}

fn resolve_confirm(_input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    Ok(StepOutcome::nothing())
}

fn resolve_magician_swap(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    let Some(first) = input.target else {
        return Ok(StepOutcome::nothing());
    };
    let second = match input.extra {
        Some(ActionExtra::SwapWith { second }) => second,
        _ => return Err(RejectReason::MissingExtra),
    };
    if second == first || !input.table.is_alive(second) {
        return Err(RejectReason::InvalidTarget);
    }
    Ok(StepOutcome::record(ActionRecord::Swap(SwapPair { first, second })))
}

/// Plurality of the pack's votes. A tie kills nobody.
pub fn tally_wolf_votes(votes: &BTreeMap<Seat, Seat>) -> Option<Seat> {
    let mut counts: BTreeMap<Seat, usize> = BTreeMap::new();
    for target in votes.values() {
        *counts.entry(*target).or_default() += 1;
    }
    let top = counts.values().copied().max()?;
    let mut leaders = counts.into_iter().filter(|(_, n)| *n == top);
    let (seat, _) = leaders.next()?;
    match leaders.next() {
        Some(_) => None,
        None => Some(seat),
    }
}

fn resolve_wolf_kill(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    Ok(match tally_wolf_votes(input.wolf_votes) {
        Some(victim) => StepOutcome::record(ActionRecord::Kill(victim)),
        None => {
            tracing::debug!(votes = input.wolf_votes.len(), "wolf vote tied, no kill");
            StepOutcome::nothing()
        }
    })
}

/// What the witch is told when her turn starts.
pub fn witch_context(actions: &NightActions, witch_seat: Seat) -> WitchInfo {
    let killed_seat = actions.wolf_kill;
    WitchInfo {
        killed_seat,
        can_save: killed_seat.is_some_and(|k| k != witch_seat),
    }
}

fn resolve_witch(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    let Some(target) = input.target else {
        return Ok(StepOutcome::nothing());
    };
    match input.extra {
        Some(ActionExtra::Potion {
            potion: Potion::Save,
        }) => {
            let ctx = witch_context(input.actions, input.actor_seat);
            if !ctx.can_save || ctx.killed_seat != Some(target) {
                return Err(RejectReason::InvalidTarget);
            }
            Ok(StepOutcome::record(ActionRecord::Save(target)))
        }
        Some(ActionExtra::Potion {
            potion: Potion::Poison,
        }) => Ok(StepOutcome::record(ActionRecord::Poison(target))),
        _ => Err(RejectReason::MissingExtra),
    }
}

fn resolve_seer(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    let target = input.target.ok_or(RejectReason::SkipNotAllowed)?;
    let role = input.table.role_of(target).ok_or(RejectReason::InvalidTarget)?;
    Ok(StepOutcome {
        record: Some(ActionRecord::SeerCheck(target)),
        reveal: Some(PrivatePayload::SeerReveal(SeerResult {
            target,
            alignment: role.alignment(),
        })),
    })
}

fn resolve_psychic(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    reveal_role(input, PrivatePayload::PsychicReveal)
}

fn resolve_gargoyle(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    reveal_role(input, PrivatePayload::GargoyleReveal)
}

fn resolve_wolf_robot(input: &ResolveInput<'_>) -> Result<StepOutcome, RejectReason> {
    reveal_role(input, PrivatePayload::WolfRobotReveal)
}

fn reveal_role(
    input: &ResolveInput<'_>,
    wrap: fn(RoleResult) -> PrivatePayload,
) -> Result<StepOutcome, RejectReason> {
    let target = input.target.ok_or(RejectReason::SkipNotAllowed)?;
    let role = input.table.role_of(target).ok_or(RejectReason::InvalidTarget)?;
    Ok(StepOutcome {
        record: None,
        reveal: Some(wrap(RoleResult { target, role })),
    })
}

/// Whether a hunter-like role may shoot: not if the witch poisoned them.
pub fn confirm_status(role: RoleId, seat: Seat, actions: &NightActions) -> ConfirmInfo {
    ConfirmInfo {
        role,
        can_shoot: actions.witch.poison != Some(seat),
    }
}
