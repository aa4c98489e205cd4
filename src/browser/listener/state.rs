//! Network capture state machine.
//!
//! Per request id, phases only move forward:
//!
//! ```text
//! sent ─► (extra-info)* ─► response ─► (extra-info)* ─► finished ─► [body] ─► caught
//!   │
//!   ├──────────────────────────────────────────────► failed ─────────────────► caught
//!   └─► redirected ─► sent (same id, hop recorded in the packet)
//! ```
//!
//! The filter is evaluated at `sent`; unmatched requests are never tracked,
//! and later hops of a tracked chain are kept whatever their URL. One id
//! yields at most one packet. Extra-info events may arrive before the phase they belong to;
//! they are stashed and merged when it appears. This type does no I/O: the
//! listener performs the body fetch and reports back with
//! [`ListenerState::complete_body`].

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::identifiers::NetworkId;
use crate::protocol::{Headers, ParsedEvent, ResponseInfo};

use super::filter::ListenOptions;
use super::packet::{FailInfo, Packet, RedirectHop, RequestData, ResponseData};

/// Upper bound on stashed extra-info entries.
const STASH_LIMIT: usize = 512;

// ============================================================================
// Types
// ============================================================================

/// Extra-info that arrived ahead of its phase.
#[derive(Debug, Default)]
struct Stash {
    request_headers: Option<Headers>,
    response_headers: Option<Headers>,
}

/// A finished request whose body should be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BodyRequest {
    pub(crate) request_id: NetworkId,
    /// Capture generation at finish time; stale completions are dropped.
    pub(crate) generation: u64,
}

// ============================================================================
// ListenerState
// ============================================================================

#[derive(Debug)]
pub(crate) struct ListenerState {
    options: ListenOptions,
    /// Sent, not yet finished or failed.
    tracked: FxHashMap<NetworkId, Packet>,
    /// Finished, body fetch outstanding.
    awaiting_body: FxHashMap<NetworkId, Packet>,
    stash: FxHashMap<NetworkId, Stash>,
    /// Terminal packets in completion order.
    caught: VecDeque<Packet>,
    paused: bool,
    generation: u64,
}

impl ListenerState {
    pub(crate) fn new(options: ListenOptions) -> Self {
        Self {
            options,
            tracked: FxHashMap::default(),
            awaiting_body: FxHashMap::default(),
            stash: FxHashMap::default(),
            caught: VecDeque::new(),
            paused: false,
            generation: 0,
        }
    }

    /// Replaces the filter and drops everything captured so far.
    pub(crate) fn reset(&mut self, options: ListenOptions) {
        self.options = options;
        self.paused = false;
        self.clear();
    }

    /// Drops all packets, tracked or caught.
    pub(crate) fn clear(&mut self) {
        self.tracked.clear();
        self.awaiting_body.clear();
        self.stash.clear();
        self.caught.clear();
        self.generation += 1;
    }

    pub(crate) fn pause(&mut self, clear: bool) {
        self.paused = true;
        if clear {
            self.caught.clear();
        }
    }

    pub(crate) fn resume(&mut self) {
        self.paused = false;
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused
    }

    /// Requests sent but not yet finished or failed.
    pub(crate) fn in_flight(&self) -> usize {
        self.tracked.len()
    }

    pub(crate) fn caught_len(&self) -> usize {
        self.caught.len()
    }

    /// Removes and returns up to `n` caught packets, oldest first.
    pub(crate) fn take(&mut self, n: usize) -> Vec<Packet> {
        let n = n.min(self.caught.len());
        self.caught.drain(..n).collect()
    }

    /// Copies the caught packets without consuming them.
    pub(crate) fn snapshot(&self) -> Vec<Packet> {
        self.caught.iter().cloned().collect()
    }

    /// Advances the machine by one event.
    ///
    /// Returns a body request when a tracked request finished and bodies
    /// are enabled.
    pub(crate) fn apply(&mut self, event: ParsedEvent) -> Option<BodyRequest> {
        match event {
            ParsedEvent::RequestWillBeSent {
                request_id,
                url,
                method,
                headers,
                post_data,
                has_post_data,
                resource_type,
                frame_id,
                redirect_response,
            } => {
                let redirects = match redirect_response {
                    Some(redirect) => self.close_hop(&request_id, redirect),
                    None => None,
                };

                if redirects.is_none()
                    && (self.paused || !self.options.matches(&url, &method, &resource_type))
                {
                    self.stash.remove(&request_id);
                    return None;
                }

                let extra_headers = self
                    .stash
                    .get_mut(&request_id)
                    .and_then(|stash| stash.request_headers.take());

                let request = RequestData {
                    url,
                    method,
                    headers,
                    extra_headers,
                    post_data,
                    has_post_data,
                    resource_type,
                    frame_id,
                };
                let mut packet = Packet::new(request_id.clone(), request);
                packet.redirects = redirects.unwrap_or_default();
                self.tracked.insert(request_id, packet);
                None
            }

            ParsedEvent::RequestWillBeSentExtraInfo {
                request_id,
                headers,
            } => {
                match self.tracked.get_mut(&request_id) {
                    Some(packet) if packet.request.extra_headers.is_none() => {
                        packet.request.extra_headers = Some(headers);
                    }
                    _ => {
                        if let Some(stash) = self.stash_entry(request_id) {
                            stash.request_headers = Some(headers);
                        }
                    }
                }
                None
            }

            ParsedEvent::ResponseReceived {
                request_id,
                response,
                ..
            } => {
                if let Some(packet) = self.tracked.get_mut(&request_id) {
                    let mut data = ResponseData::from_info(response);
                    data.extra_headers = self
                        .stash
                        .get_mut(&request_id)
                        .and_then(|stash| stash.response_headers.take());
                    packet.response = Some(data);
                }
                None
            }

            ParsedEvent::ResponseReceivedExtraInfo {
                request_id,
                headers,
                ..
            } => {
                if let Some(response) = self
                    .tracked
                    .get_mut(&request_id)
                    .and_then(|packet| packet.response.as_mut())
                {
                    response.extra_headers = Some(headers);
                } else if let Some(stash) = self.stash_entry(request_id) {
                    stash.response_headers = Some(headers);
                }
                None
            }

            ParsedEvent::LoadingFinished {
                request_id,
                encoded_data_length,
            } => {
                let mut packet = self.tracked.remove(&request_id)?;
                self.stash.remove(&request_id);
                packet.encoded_data_length = Some(encoded_data_length);

                if self.options.fetch_body && packet.response.is_some() {
                    self.awaiting_body.insert(request_id.clone(), packet);
                    return Some(BodyRequest {
                        request_id,
                        generation: self.generation,
                    });
                }

                self.caught.push_back(packet);
                None
            }

            ParsedEvent::LoadingFailed {
                request_id,
                error_text,
                canceled,
                blocked_reason,
            } => {
                let mut packet = self.tracked.remove(&request_id)?;
                self.stash.remove(&request_id);
                packet.fail_info = Some(FailInfo {
                    error_text,
                    canceled,
                    blocked_reason,
                });
                self.caught.push_back(packet);
                None
            }

            _ => None,
        }
    }

    /// Records the outcome of a body fetch and releases the packet.
    ///
    /// `body` is `(raw, base64_encoded)`; `None` means the fetch failed and
    /// the packet is released without a body.
    pub(crate) fn complete_body(
        &mut self,
        request_id: &NetworkId,
        generation: u64,
        body: Option<(String, bool)>,
    ) {
        if generation != self.generation {
            return;
        }
        let Some(mut packet) = self.awaiting_body.remove(request_id) else {
            return;
        };

        if let Some((raw, base64_encoded)) = body
            && let Some(response) = packet.response.as_mut()
        {
            response.set_body(raw, base64_encoded);
        }
        self.caught.push_back(packet);
    }

    /// Ends the tracked hop of `request_id` with its redirect response.
    ///
    /// Returns the chain so far, or `None` if the id is not tracked.
    fn close_hop(
        &mut self,
        request_id: &NetworkId,
        redirect: ResponseInfo,
    ) -> Option<Vec<RedirectHop>> {
        let previous = self.tracked.remove(request_id)?;

        let mut response = ResponseData::from_info(redirect);
        response.extra_headers = self
            .stash
            .get_mut(request_id)
            .and_then(|stash| stash.response_headers.take());

        let mut redirects = previous.redirects;
        redirects.push(RedirectHop {
            request: previous.request,
            response,
        });
        Some(redirects)
    }

    fn stash_entry(&mut self, request_id: NetworkId) -> Option<&mut Stash> {
        if self.stash.len() >= STASH_LIMIT && !self.stash.contains_key(&request_id) {
            return None;
        }
        Some(self.stash.entry(request_id).or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================
