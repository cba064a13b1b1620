//! Targeted forwarding of WebRTC signaling payloads
//!
//! Offers, answers and ICE candidates are handed to exactly one addressed
//! connection. Nothing is stored, retried or buffered: a message for a
//! target that is not connected is dropped without telling the sender.

use crate::relay::Envelope;
use log::debug;
use shared::{ConnectionId, ServerEvent, SignalEnvelope};

/// Builds the delivery for `signal`, or `None` when the target is gone
///
/// `from` is always the relaying connection, whatever the client claimed.
pub fn forward<F>(signal: SignalEnvelope, from: ConnectionId, is_connected: F) -> Option<Envelope>
where
    F: Fn(&ConnectionId) -> bool,
{
    let SignalEnvelope {
        kind,
        target,
        payload,
    } = signal;

    let to = match target.parse::<ConnectionId>() {
        Ok(id) if is_connected(&id) => id,
        _ => {
            debug!(
                "Dropping {} from {}: target {} not connected",
                kind.event_name(),
                from,
                target
            );
            return None;
        }
    };

    Some(Envelope {
        to,
        event: ServerEvent::signal(kind, payload, from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::SignalKind;
    use std::collections::HashSet;

    fn signal(kind: SignalKind, target: &str) -> SignalEnvelope {
        SignalEnvelope {
            kind,
            target: target.to_string(),
            payload: json!({"sdp": "v=0"}),
        }
    }

    #[test]
    fn test_forward_to_connected_target() {
        let from = ConnectionId::new();
        let target = ConnectionId::new();
        let connected: HashSet<ConnectionId> = [from, target].into_iter().collect();

        let envelope = forward(
            signal(SignalKind::Answer, &target.to_string()),
            from,
            |id| connected.contains(id),
        )
        .unwrap();

        assert_eq!(envelope.to, target);
        assert_eq!(
            envelope.event,
            ServerEvent::WebrtcAnswer {
                answer: json!({"sdp": "v=0"}),
                from,
            }
        );
    }

    #[test]
    fn test_drop_when_target_missing() {
        let from = ConnectionId::new();
        let gone = ConnectionId::new();

        let result = forward(signal(SignalKind::Offer, &gone.to_string()), from, |_| false);
        assert!(result.is_none());
    }

    #[test]
    fn test_drop_when_target_unparseable() {
        let from = ConnectionId::new();
        let result = forward(signal(SignalKind::IceCandidate, "peer-42"), from, |_| true);
        assert!(result.is_none());
    }
}
