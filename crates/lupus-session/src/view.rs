//! What a participant privately knows.

use std::collections::BTreeMap;

use lupus_protocol::{ConfirmInfo, PrivatePayload, Rejection, RoleCard, RoleId, WitchInfo};

/// Private information addressed to this participant.
///
/// Built from private messages only. A `STATE_UPDATE` touches it just once
/// per deal, when a restart voids what the previous deal sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivateView {
    pub role_card: Option<RoleCard>,
    /// Check results, by the role that made the check.
    pub reveals: BTreeMap<RoleId, PrivatePayload>,
    pub witch_context: Option<WitchInfo>,
    pub confirm_status: Option<ConfirmInfo>,
    pub last_rejection: Option<Rejection>,
}

impl PrivateView {
    pub fn role(&self) -> Option<RoleId> {
        self.role_card.as_ref().map(|card| card.role)
    }

    pub(crate) fn apply(&mut self, payload: &PrivatePayload) {
        match payload {
            PrivatePayload::RoleCard(card) => self.role_card = Some(card.clone()),
            PrivatePayload::WitchContext(ctx) => self.witch_context = Some(*ctx),
            PrivatePayload::ConfirmStatus(info) => self.confirm_status = Some(*info),
            PrivatePayload::ActionRejected(rejection) => self.last_rejection = Some(*rejection),
            reveal => {
                if let Some(role) = reveal.reveal_role() {
                    self.reveals.insert(role, reveal.clone());
                }
            }
        }
    }
}
