//! What happened tonight, and who sits where.

use std::collections::{BTreeMap, BTreeSet};

use lupus_protocol::{RoleId, Seat};
use serde::{Deserialize, Serialize};

/// The magician's pick: the fates of `first` and `second` are exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPair {
    pub first: Seat,
    pub second: Seat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitchAction {
    pub save: Option<Seat>,
    pub poison: Option<Seat>,
}

/// A single effect produced by a resolved step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionRecord {
    Swap(SwapPair),
    Dream(Seat),
    Block(Seat),
    Protect(Seat),
    Kill(Seat),
    Charm(Seat),
    Save(Seat),
    Poison(Seat),
    SeerCheck(Seat),
}

/// Everything submitted during one night. Built step by step, cleared when
/// the night ends or the game restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NightActions {
    pub wolf_kill: Option<Seat>,
    pub guard_protect: Option<Seat>,
    pub witch: WitchAction,
    pub wolf_queen_charm: Option<Seat>,
    pub celebrity_dream: Option<Seat>,
    pub magician_swap: Option<SwapPair>,
    pub seer_check: Option<Seat>,
    pub nightmare_block: Option<Seat>,
}

impl NightActions {
    pub fn apply(&mut self, record: ActionRecord) {
        match record {
            ActionRecord::Swap(pair) => self.magician_swap = Some(pair),
            ActionRecord::Dream(seat) => self.celebrity_dream = Some(seat),
            ActionRecord::Block(seat) => self.nightmare_block = Some(seat),
            ActionRecord::Protect(seat) => self.guard_protect = Some(seat),
            ActionRecord::Kill(seat) => self.wolf_kill = Some(seat),
            ActionRecord::Charm(seat) => self.wolf_queen_charm = Some(seat),
            ActionRecord::Save(seat) => self.witch.save = Some(seat),
            ActionRecord::Poison(seat) => self.witch.poison = Some(seat),
            ActionRecord::SeerCheck(seat) => self.seer_check = Some(seat),
        }
    }

    /// The nightmare's target may only skip tonight.
    pub fn is_blocked(&self, seat: Seat) -> bool {
        self.nightmare_block == Some(seat)
    }
}

/// Seats of the roles the death calculation cares about. `None` when the
/// role is not in play.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSeatMap {
    pub witcher: Option<Seat>,
    pub wolf_queen: Option<Seat>,
    pub celebrity: Option<Seat>,
    pub spirit_knight: Option<Seat>,
    pub seer: Option<Seat>,
    pub witch: Option<Seat>,
}

/// The dealt table: every seat's role plus who is already dead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    roles: BTreeMap<Seat, RoleId>,
    dead: BTreeSet<Seat>,
}

impl Table {
    pub fn new(roles: BTreeMap<Seat, RoleId>) -> Self {
        Self {
            roles,
            dead: BTreeSet::new(),
        }
    }

    pub fn with_dead(mut self, dead: impl IntoIterator<Item = Seat>) -> Self {
        self.dead.extend(dead);
        self
    }

    pub fn role_of(&self, seat: Seat) -> Option<RoleId> {
        self.roles.get(&seat).copied()
    }

    pub fn contains(&self, seat: Seat) -> bool {
        self.roles.contains_key(&seat)
    }

    pub fn is_alive(&self, seat: Seat) -> bool {
        self.contains(seat) && !self.dead.contains(&seat)
    }

    /// First seat holding `role`, in seat order.
    pub fn seat_of(&self, role: RoleId) -> Option<Seat> {
        self.roles
            .iter()
            .find_map(|(seat, r)| (*r == role).then_some(*seat))
    }

    /// Living seats whose role wakes with the wolf pack.
    pub fn wolf_pack(&self) -> Vec<Seat> {
        self.roles
            .iter()
            .filter(|(seat, role)| role.votes_with_wolves() && self.is_alive(**seat))
            .map(|(seat, _)| *seat)
            .collect()
    }

    pub fn role_seat_map(&self) -> RoleSeatMap {
        RoleSeatMap {
            witcher: self.seat_of(RoleId::Witcher),
            wolf_queen: self.seat_of(RoleId::WolfQueen),
            celebrity: self.seat_of(RoleId::Celebrity),
            spirit_knight: self.seat_of(RoleId::SpiritKnight),
            seer: self.seat_of(RoleId::Seer),
            witch: self.seat_of(RoleId::Witch),
        }
    }
}
