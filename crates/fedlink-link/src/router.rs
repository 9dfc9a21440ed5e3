//! Fans outbound events out to connected peers by data type.

use crate::stats::Offer;
use crate::supervisor::{RouteTable, Supervisor};
use crate::wire::{encode_frame, Frame};
use fedlink_types::DataType;
use serde::{Deserialize, Serialize};
use std::sync::PoisonError;

/// An event offered for federation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub data_type: DataType,
    /// Opaque to the router; forwarded as-is.
    pub payload: serde_json::Value,
}

/// How many peer queues took an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Peers whose queue accepted the event.
    pub queued: usize,
    /// Peers that should have received it but could not take it; each is
    /// counted as a failed message for that peer.
    pub rejected: usize,
}

/// Routes events to every connected peer whose push list names the event's
/// data type.
///
/// `publish` never blocks and never fails: a full queue drops the new event
/// for that peer and counts it as failed.
#[derive(Clone)]
pub struct Router {
    routes: RouteTable,
    max_frame_bytes: usize,
}

impl Router {
    pub fn new(supervisor: &Supervisor) -> Self {
        Self {
            routes: supervisor.routes(),
            max_frame_bytes: supervisor.settings().max_frame_bytes,
        }
    }

    pub fn publish(&self, event: OutboundEvent) -> PublishReport {
        let data_type = event.data_type;
        let frame = encode_frame(
            &Frame::Event {
                data_type,
                payload: event.payload,
            },
            self.max_frame_bytes,
        );

        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                // Unsendable to anyone: charge it to every peer that would
                // have taken it.
                let mut report = PublishReport::default();
                for shared in routes.values() {
                    if shared.accepts(data_type) && shared.is_connected() {
                        shared.record_failed(1);
                        report.rejected += 1;
                    }
                }
                tracing::warn!(%data_type, rejected = report.rejected, "dropping unencodable event: {e}");
                return report;
            }
        };

        let mut report = PublishReport::default();
        for (peer_id, shared) in routes.iter() {
            match shared.offer(data_type, &frame) {
                Offer::Queued => report.queued += 1,
                Offer::Rejected => {
                    report.rejected += 1;
                    tracing::warn!(peer_id, %data_type, "outbound queue full, dropping event");
                }
                Offer::NotRouted => {}
            }
        }
        report
    }
}
