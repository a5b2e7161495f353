//! Who dies tonight.
//!
//! ```text
//!  1. wolf kill    dies unless exactly one of guard / antidote covers it;
//!                  a dreamed seat and the spirit knight never die to wolves
//!  2. poison       kills, except the witcher and the dreamed seat; a poisoned
//!                  spirit knight survives and the witch dies instead
//!  3. reflection   a seer who checked the spirit knight dies
//!  4. swap         the magician's two seats exchange fates
//!  5. links        a dead wolf queen takes her charmed seat along, a dead
//!                  celebrity takes the dreamer along
//! ```

use std::collections::BTreeSet;

use lupus_protocol::Seat;

use crate::{NightActions, RoleSeatMap};

/// Computes the night's deaths, sorted by seat.
pub fn calculate_deaths(actions: &NightActions, seats: &RoleSeatMap) -> Vec<Seat> {
    let mut dead = BTreeSet::new();
    let dreamed = actions.celebrity_dream;

    // 1. Wolf kill. Guard and antidote on the same seat cancel out.
    if let Some(victim) = actions.wolf_kill {
        let guarded = actions.guard_protect == Some(victim);
        let saved = actions.witch.save == Some(victim);
        let immune = dreamed == Some(victim) || seats.spirit_knight == Some(victim);
        if guarded == saved && !immune {
            dead.insert(victim);
        }
    }

    // 2. Poison.
    if let Some(target) = actions.witch.poison {
        if seats.spirit_knight == Some(target) {
            if let Some(witch) = seats.witch {
                dead.insert(witch);
            }
        } else if seats.witcher != Some(target) && dreamed != Some(target) {
            dead.insert(target);
        }
    }

    // 3. Reflection onto the seer.
    if let (Some(seer), Some(knight)) = (seats.seer, seats.spirit_knight) {
        if actions.seer_check == Some(knight) {
            dead.insert(seer);
        }
    }

    // 4. Swap.
    if let Some(swap) = actions.magician_swap {
        let first_dead = dead.remove(&swap.first);
        let second_dead = dead.remove(&swap.second);
        if first_dead {
            dead.insert(swap.second);
        }
        if second_dead {
            dead.insert(swap.first);
        }
    }

    // 5. Links.
    if let (Some(queen), Some(charmed)) = (seats.wolf_queen, actions.wolf_queen_charm) {
        if dead.contains(&queen) {
            dead.insert(charmed);
        }
    }
    if let (Some(celebrity), Some(dreamer)) = (seats.celebrity, dreamed) {
        if dead.contains(&celebrity) {
            dead.insert(dreamer);
        }
    }

    dead.into_iter().collect()
}
