//! Collects the output of one room operation and puts it in wire order.

use lupus_protocol::{HostBroadcast, HostEnvelope, PrivateMessage, PrivatePayload, Uid};

/// Output of one operation, before revision stamping.
///
/// ```text
/// events → STATE_UPDATE (if anything visible changed) → replies → privates
/// ```
#[derive(Debug, Default)]
pub(crate) struct Batch {
    events: Vec<HostBroadcast>,
    changed: bool,
    replies: Vec<HostBroadcast>,
    privates: Vec<(Uid, PrivatePayload)>,
}

impl Batch {
    /// A public event such as `ROLE_TURN` or `PLAYER_JOINED`.
    pub(crate) fn event(&mut self, event: HostBroadcast) {
        self.events.push(event);
    }

    /// Marks the public projection as changed.
    pub(crate) fn touch(&mut self) {
        self.changed = true;
    }

    /// A public reply addressed by field (`SEAT_ACTION_ACK`, ...).
    pub(crate) fn reply(&mut self, reply: HostBroadcast) {
        self.replies.push(reply);
    }

    pub(crate) fn private(&mut self, to: &Uid, payload: PrivatePayload) {
        self.privates.push((to.clone(), payload));
    }

    pub(crate) fn changed(&self) -> bool {
        self.changed
    }

    /// Assembles the envelopes. `state_update` is present exactly when the
    /// projection changed; privates are stamped with `revision`, the
    /// revision current after that update.
    pub(crate) fn into_envelopes(
        self,
        state_update: Option<HostBroadcast>,
        revision: u64,
    ) -> Vec<HostEnvelope> {
        let mut out: Vec<HostEnvelope> = self.events.into_iter().map(HostEnvelope::Public).collect();
        out.extend(state_update.map(HostEnvelope::Public));
        out.extend(self.replies.into_iter().map(HostEnvelope::Public));
        out.extend(self.privates.into_iter().map(|(to_uid, payload)| {
            HostEnvelope::Private(PrivateMessage {
                to_uid,
                revision,
                payload,
            })
        }));
        out
    }
}

#[cfg(test)]
mod tests {
    use lupus_protocol::{RejectReason, Rejection, Seat};

    use super::*;

    #[test]
    fn test_envelopes_follow_wire_order() {
        let mut batch = Batch::default();
        batch.private(
            &Uid::new("p1"),
            PrivatePayload::ActionRejected(Rejection {
                step: None,
                reason: RejectReason::NotYourTurn,
            }),
        );
        batch.reply(HostBroadcast::GameRestarted);
        batch.event(HostBroadcast::PlayerLeft { seat: Seat(1) });
        batch.touch();
        assert!(batch.changed());

        let out = batch.into_envelopes(Some(HostBroadcast::NightEnd { deaths: vec![] }), 4);
        let kinds: Vec<&str> = out
            .iter()
            .map(|e| match e {
                HostEnvelope::Public(b) => b.kind(),
                HostEnvelope::Private(p) => p.payload.kind(),
            })
            .collect();
        assert_eq!(kinds, ["PLAYER_LEFT", "NIGHT_END", "GAME_RESTARTED", "ACTION_REJECTED"]);
        assert!(matches!(&out[3], HostEnvelope::Private(p) if p.revision == 4));
    }
}
