//! Death composition scenarios from the table's rulebook.

use std::collections::BTreeMap;

use lupus_protocol::{RoleId, Seat};
use lupus_rules::{NightActions, RoleSeatMap, SwapPair, Table, WitchAction, calculate_deaths};

fn seats(pairs: &[(u32, RoleId)]) -> RoleSeatMap {
    Table::new(pairs.iter().map(|(s, r)| (Seat(*s), *r)).collect::<BTreeMap<_, _>>())
        .role_seat_map()
}

#[test]
fn test_guard_alone_saves_the_wolf_victim() {
    let actions = NightActions {
        wolf_kill: Some(Seat(3)),
        guard_protect: Some(Seat(3)),
        ..Default::default()
    };
    assert!(calculate_deaths(&actions, &RoleSeatMap::default()).is_empty());
}

#[test]
fn test_guard_and_antidote_on_same_seat_kill() {
    let actions = NightActions {
        wolf_kill: Some(Seat(3)),
        guard_protect: Some(Seat(3)),
        witch: WitchAction {
            save: Some(Seat(3)),
            poison: None,
        },
        ..Default::default()
    };
    assert_eq!(calculate_deaths(&actions, &RoleSeatMap::default()), vec![Seat(3)]);
}

#[test]
fn test_witcher_survives_poison() {
    let map = seats(&[(4, RoleId::Witcher), (1, RoleId::Witch)]);
    let actions = NightActions {
        witch: WitchAction {
            save: None,
            poison: Some(Seat(4)),
        },
        ..Default::default()
    };
    assert!(calculate_deaths(&actions, &map).is_empty());
}

#[test]
fn test_dead_wolf_queen_takes_charmed_seat() {
    let map = seats(&[(0, RoleId::WolfQueen), (1, RoleId::Witch)]);
    let actions = NightActions {
        wolf_queen_charm: Some(Seat(5)),
        witch: WitchAction {
            save: None,
            poison: Some(Seat(0)),
        },
        ..Default::default()
    };
    assert_eq!(calculate_deaths(&actions, &map), vec![Seat(0), Seat(5)]);
}

#[test]
fn test_living_wolf_queen_keeps_charmed_seat_alive() {
    let map = seats(&[(0, RoleId::WolfQueen)]);
    let actions = NightActions {
        wolf_queen_charm: Some(Seat(5)),
        ..Default::default()
    };
    assert!(calculate_deaths(&actions, &map).is_empty());
}

#[test]
fn test_magician_swap_exchanges_fates() {
    let actions = NightActions {
        wolf_kill: Some(Seat(2)),
        magician_swap: Some(SwapPair {
            first: Seat(2),
            second: Seat(7),
        }),
        ..Default::default()
    };
    assert_eq!(calculate_deaths(&actions, &RoleSeatMap::default()), vec![Seat(7)]);
}

#[test]
fn test_deaths_are_sorted_and_unique() {
    let map = seats(&[(8, RoleId::Celebrity)]);
    let actions = NightActions {
        wolf_kill: Some(Seat(8)),
        celebrity_dream: Some(Seat(1)),
        witch: WitchAction {
            save: None,
            poison: Some(Seat(5)),
        },
        ..Default::default()
    };
    assert_eq!(calculate_deaths(&actions, &map), vec![Seat(1), Seat(5), Seat(8)]);
}
