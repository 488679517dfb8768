//! Deciding when a response that spans several packets is complete.
//!
//! The wire format has no "last fragment" flag, so each server family
//! signals the end of a response its own way. A [`CompletionRule`] captures
//! one such convention; the client feeds it every response fragment of the
//! pending request and stops reading once it reports [`Progress::Done`].

use super::packet::Packet;
use crate::errors::FrameError;
use bytes::{Bytes, BytesMut};
use std::{fmt::Debug, time::Duration};

/// Raw bytes Squad appends after the trailing packet of a probed response.
/// They are not a well formed packet and must be skipped explicitly.
pub const SQUAD_END_MARKER: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Outcome of feeding one fragment to a [`CompletionRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep reading.
    NeedMore,
    /// The response is complete.
    Done,
    /// The response is complete once these raw bytes have been consumed
    /// from the stream.
    DoneAfterMarker(&'static [u8]),
}

/// The fragments recieved so far for the pending request.
#[derive(Debug)]
pub struct ReassemblyState {
    request_id: i32,
    probe_id: Option<i32>,
    fragments: Vec<Bytes>,
    probe_echoes: usize,
}

impl ReassemblyState {
    /// Start reassembling the response to `request_id`. `probe_id` is the id
    /// of the empty probe command sent after it, if the rule asked for one.
    #[must_use]
    pub fn new(request_id: i32, probe_id: Option<i32>) -> Self {
        Self {
            request_id,
            probe_id,
            fragments: Vec::new(),
            probe_echoes: 0,
        }
    }

    /// ID of the command being answered.
    #[must_use]
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    /// ID of the probe command, if one was sent.
    #[must_use]
    pub fn probe_id(&self) -> Option<i32> {
        self.probe_id
    }

    /// Number of fragments accepted so far.
    #[must_use]
    pub fn fragments_received(&self) -> usize {
        self.fragments.len()
    }

    /// Number of packets carrying the probe id seen so far.
    #[must_use]
    pub fn probe_echoes(&self) -> usize {
        self.probe_echoes
    }

    /// Accept a fragment of the response body. Empty fragments are kept.
    pub fn push(&mut self, body: Bytes) {
        self.fragments.push(body);
    }

    /// Record a packet carrying the probe id.
    pub fn record_probe_echo(&mut self) {
        self.probe_echoes += 1;
    }

    /// Reject anything that does not carry the request id.
    ///
    /// # Errors
    /// Returns [`FrameError::RequestIdMismatch`] if `packet` belongs to another request.
    pub fn check_request_id(&self, packet: &Packet) -> Result<(), FrameError> {
        if packet.id == self.request_id {
            Ok(())
        } else {
            Err(FrameError::RequestIdMismatch {
                expected: Some(self.request_id),
                got: packet.id,
            })
        }
    }

    /// Concatenate all fragments in arrival order.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        let len = self.fragments.iter().map(Bytes::len).sum();
        let mut body = BytesMut::with_capacity(len);

        for fragment in self.fragments {
            body.extend_from_slice(&fragment);
        }

        body.freeze()
    }
}

/// A convention for recognising the end of a response.
pub trait CompletionRule: Debug + Send + Sync {
    /// Whether an empty `SERVERDATA_RESPONSE_VALUE` probe should be sent right
    /// after each command. Its echo marks the end of the real response.
    fn sends_probe(&self) -> bool {
        false
    }

    /// How long the stream must stay silent for the response to be complete,
    /// given what was recieved so far. `None` means silence is never enough.
    fn quiet_window(&self, _state: &ReassemblyState) -> Option<Duration> {
        None
    }

    /// Feed one response packet.
    ///
    /// # Errors
    /// Returns a [`FrameError`] if the packet is not part of this response.
    fn on_fragment(&self, state: &mut ReassemblyState, packet: Packet) -> Result<Progress, FrameError>;
}

/// What follows the echo of the probe command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailer {
    /// Nothing, the echo ends the response.
    None,
    /// One more packet carrying the probe id (SRCDS sends `00 01 00 00`).
    Packet,
    /// One more packet carrying the probe id, then raw marker bytes.
    PacketAndMarker(&'static [u8]),
}

/// Completion by probe: the server answers commands in order, so once the
/// echo of an empty probe command arrives everything before it was the
/// response.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSentinel {
    trailer: Trailer,
}

impl ProbeSentinel {
    /// Rule for servers that follow the probe echo with `trailer`.
    #[must_use]
    pub fn new(trailer: Trailer) -> Self {
        Self { trailer }
    }

    /// Rule for the Squad server.
    #[must_use]
    pub fn squad() -> Self {
        Self::new(Trailer::PacketAndMarker(SQUAD_END_MARKER))
    }
}

impl Default for ProbeSentinel {
    fn default() -> Self {
        Self::new(Trailer::None)
    }
}

impl CompletionRule for ProbeSentinel {
    fn sends_probe(&self) -> bool {
        true
    }

    fn on_fragment(&self, state: &mut ReassemblyState, packet: Packet) -> Result<Progress, FrameError> {
        if state.probe_id() != Some(packet.id) {
            if state.probe_echoes() > 0 {
                // nothing but the trailer may follow the echo
                return Err(FrameError::RequestIdMismatch {
                    expected: state.probe_id(),
                    got: packet.id,
                });
            }

            state.check_request_id(&packet)?;
            state.push(packet.body);
            return Ok(Progress::NeedMore);
        }

        state.record_probe_echo();
        let trailer_seen = state.probe_echoes() > 1;

        Ok(match self.trailer {
            Trailer::None => Progress::Done,
            Trailer::Packet if trailer_seen => Progress::Done,
            Trailer::PacketAndMarker(marker) if trailer_seen => Progress::DoneAfterMarker(marker),
            _ => Progress::NeedMore,
        })
    }
}

/// Completion on the first fragment, for servers that never split responses
/// and do not answer probes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleFragment;

impl CompletionRule for SingleFragment {
    fn on_fragment(&self, state: &mut ReassemblyState, packet: Packet) -> Result<Progress, FrameError> {
        state.check_request_id(&packet)?;
        state.push(packet.body);

        Ok(Progress::Done)
    }
}

/// Completion by silence: once at least one fragment arrived, the response
/// is over when no further bytes arrive within the window.
#[derive(Debug, Clone, Copy)]
pub struct GraceWindow {
    window: Duration,
}

impl GraceWindow {
    /// Rule completing after `window` of silence.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window }
    }
}

impl CompletionRule for GraceWindow {
    fn quiet_window(&self, state: &ReassemblyState) -> Option<Duration> {
        (state.fragments_received() > 0).then_some(self.window)
    }

    fn on_fragment(&self, state: &mut ReassemblyState, packet: Packet) -> Result<Progress, FrameError> {
        state.check_request_id(&packet)?;
        state.push(packet.body);

        Ok(Progress::NeedMore)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CompletionRule, GraceWindow, ProbeSentinel, Progress, ReassemblyState, SingleFragment,
        Trailer, SQUAD_END_MARKER,
    };
    use crate::{
        errors::FrameError,
        rcon::packet::{Packet, PacketType},
    };
    use std::time::Duration;

    fn response(id: i32, body: &'static str) -> Packet {
        Packet::new(id, PacketType::ResponseValue, body)
    }

    fn feed(rule: &dyn CompletionRule, state: &mut ReassemblyState, packets: Vec<Packet>) -> Vec<Progress> {
        packets
            .into_iter()
            .map(|packet| rule.on_fragment(state, packet).unwrap())
            .collect()
    }

    #[test]
    fn test_probe_sentinel_baseline() {
        let rule = ProbeSentinel::default();
        let mut state = ReassemblyState::new(9, Some(10));

        let progress = feed(
            &rule,
            &mut state,
            vec![response(9, "Map"), response(9, ""), response(9, "List: A,B,C"), response(10, "")],
        );

        assert_eq!(
            progress,
            vec![Progress::NeedMore, Progress::NeedMore, Progress::NeedMore, Progress::Done]
        );
        assert_eq!(&state.into_body()[..], b"MapList: A,B,C");
    }

    #[test]
    fn test_probe_sentinel_with_trailer_packet() {
        let rule = ProbeSentinel::new(Trailer::Packet);
        let mut state = ReassemblyState::new(1, Some(2));

        let progress = feed(
            &rule,
            &mut state,
            vec![response(1, "ok"), response(2, ""), Packet::new(2, PacketType::ResponseValue, vec![0u8, 1, 0, 0])],
        );

        assert_eq!(progress, vec![Progress::NeedMore, Progress::NeedMore, Progress::Done]);
        assert_eq!(&state.into_body()[..], b"ok");
    }

    #[test]
    fn test_probe_sentinel_squad() {
        let rule = ProbeSentinel::squad();
        let mut state = ReassemblyState::new(1, Some(2));

        let progress = feed(&rule, &mut state, vec![response(1, "ok"), response(2, ""), response(2, "")]);

        assert_eq!(
            progress,
            vec![
                Progress::NeedMore,
                Progress::NeedMore,
                Progress::DoneAfterMarker(SQUAD_END_MARKER)
            ]
        );
    }

    #[test]
    fn test_probe_sentinel_rejects_response_after_echo() {
        let rule = ProbeSentinel::squad();
        let mut state = ReassemblyState::new(1, Some(2));
        rule.on_fragment(&mut state, response(2, "")).unwrap();

        let result = rule.on_fragment(&mut state, response(1, "late"));
        assert_eq!(
            result,
            Err(FrameError::RequestIdMismatch {
                expected: Some(2),
                got: 1
            })
        );
    }

    #[test]
    fn test_foreign_id_is_rejected() {
        let rule = GraceWindow::new(Duration::from_millis(100));
        let mut state = ReassemblyState::new(9, None);

        let result = rule.on_fragment(&mut state, response(8, "stale"));
        assert_eq!(
            result,
            Err(FrameError::RequestIdMismatch {
                expected: Some(9),
                got: 8
            })
        );
    }

    #[test]
    fn test_grace_window_needs_a_fragment_first() {
        let rule = GraceWindow::new(Duration::from_millis(100));
        let mut state = ReassemblyState::new(9, None);
        assert_eq!(rule.quiet_window(&state), None);

        // an empty fragment is content, not completion
        assert_eq!(rule.on_fragment(&mut state, response(9, "")), Ok(Progress::NeedMore));
        assert_eq!(rule.quiet_window(&state), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_single_fragment() {
        let mut state = ReassemblyState::new(3, None);
        assert_eq!(SingleFragment.on_fragment(&mut state, response(3, "pong")), Ok(Progress::Done));
        assert!(!SingleFragment.sends_probe());
        assert_eq!(&state.into_body()[..], b"pong");
    }

    #[test]
    fn test_same_fragments_same_body() {
        let rule = GraceWindow::new(Duration::from_millis(100));
        let bodies = || vec![response(9, "Map"), response(9, "List: A,B,C")];

        let mut first = ReassemblyState::new(9, None);
        feed(&rule, &mut first, bodies());
        let mut second = ReassemblyState::new(9, None);
        feed(&rule, &mut second, bodies());

        assert_eq!(first.into_body(), second.into_body());
    }
}
