//! Per-connection session multiplexing.
//!
//! One TCP connection may interleave many logical AAA sessions
//! (single-connect mode). The multiplexer owns the map from session id to
//! pending continuation state and enforces the sequence-number discipline:
//! client packets are odd-numbered, a new session opens at 1, and a
//! continuation must arrive exactly one past the last server reply.
//!
//! The map is owned by its connection task; no locking is involved.

use std::collections::HashMap;
use std::time::Instant;

use crate::error::SequenceError;
use crate::handlers::Handler;

/// The state parked for a session awaiting its next client packet.
pub struct SessionState {
    /// The sequence number of the last reply the server sent on this session.
    pub last_server_sequence_number: u8,

    /// The continuation to invoke on the session's next packet.
    pub handler: Box<dyn Handler>,

    /// When the session's first packet arrived, for duration accounting.
    pub started_at: Instant,
}

/// Where an inbound packet should be dispatched.
pub enum SessionDispatch {
    /// A previously-unseen session; the connection's root handler applies.
    New {
        /// The session's start instant, to be carried into any parked state.
        started_at: Instant,
    },

    /// A parked session; its stored continuation applies.
    Continuation(SessionState),
}

/// The per-connection map of in-flight sessions.
#[derive(Default)]
pub struct SessionMultiplexer {
    sessions: HashMap<u32, SessionState>,
}

impl SessionMultiplexer {
    /// Creates an empty multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently awaiting a continuation.
    pub fn pending(&self) -> usize {
        self.sessions.len()
    }

    /// Validates an inbound packet's sequence number against the session
    /// state and removes the session from the map for dispatch.
    ///
    /// On success the caller dispatches and then either
    /// [`park`s](Self::park) the session again or retires it. Any error here
    /// means the peer cannot be trusted; the connection closes without reply,
    /// and removal doubles as session teardown.
    pub fn take(
        &mut self,
        session_id: u32,
        client_sequence_number: u8,
    ) -> Result<SessionDispatch, SequenceError> {
        if client_sequence_number % 2 == 0 {
            return Err(SequenceError::EvenSequenceNumber(client_sequence_number));
        }

        match self.sessions.remove(&session_id) {
            Some(state) => {
                let expected = state
                    .last_server_sequence_number
                    .checked_add(1)
                    .ok_or(SequenceError::Overflow)?;

                if client_sequence_number == expected {
                    Ok(SessionDispatch::Continuation(state))
                } else {
                    Err(SequenceError::OutOfOrder {
                        expected,
                        actual: client_sequence_number,
                    })
                }
            }

            None => {
                if client_sequence_number == 1 {
                    Ok(SessionDispatch::New {
                        started_at: Instant::now(),
                    })
                } else {
                    Err(SequenceError::UnknownSession(client_sequence_number))
                }
            }
        }
    }

    /// Stores a session awaiting its next client packet.
    pub fn park(&mut self, session_id: u32, state: SessionState) {
        self.sessions.insert(session_id, state);
    }

    /// Removes and returns all parked sessions, for teardown when the
    /// connection closes.
    pub fn drain(&mut self) -> impl Iterator<Item = (u32, SessionState)> + '_ {
        self.sessions.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::context::Request;
    use crate::error::HandlerError;
    use crate::response::Response;

    struct NullHandler;

    impl Handler for NullHandler {
        fn handle(
            &self,
            _response: &mut Response<'_>,
            _request: &Request<'_>,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn parked(last_server_sequence_number: u8) -> SessionState {
        SessionState {
            last_server_sequence_number,
            handler: Box::new(NullHandler),
            started_at: Instant::now(),
        }
    }

    #[test]
    fn even_client_sequence_rejected() {
        let mut multiplexer = SessionMultiplexer::new();
        assert_eq!(
            multiplexer.take(1, 2).err(),
            Some(SequenceError::EvenSequenceNumber(2))
        );
    }

    #[test]
    fn new_session_must_open_at_one() {
        let mut multiplexer = SessionMultiplexer::new();

        assert!(matches!(
            multiplexer.take(9, 1),
            Ok(SessionDispatch::New { .. })
        ));
        assert_eq!(
            multiplexer.take(9, 3).err(),
            Some(SequenceError::UnknownSession(3))
        );
    }

    #[test]
    fn continuation_must_follow_last_reply() {
        let mut multiplexer = SessionMultiplexer::new();

        multiplexer.park(7, parked(2));
        assert!(matches!(
            multiplexer.take(7, 3),
            Ok(SessionDispatch::Continuation(_))
        ));

        // the take above removed the session; 5 now looks like a late packet
        // for an unknown session
        assert_eq!(
            multiplexer.take(7, 5).err(),
            Some(SequenceError::UnknownSession(5))
        );
    }

    #[test]
    fn out_of_order_continuation_rejected() {
        let mut multiplexer = SessionMultiplexer::new();

        multiplexer.park(7, parked(2));
        assert_eq!(
            multiplexer.take(7, 5).err(),
            Some(SequenceError::OutOfOrder {
                expected: 3,
                actual: 5
            })
        );
        // the violating session was torn down by the failed take
        assert_eq!(multiplexer.pending(), 0);
    }

    #[test]
    fn sessions_are_independent() {
        let mut multiplexer = SessionMultiplexer::new();

        multiplexer.park(1, parked(2));
        multiplexer.park(2, parked(4));

        assert!(matches!(
            multiplexer.take(2, 5),
            Ok(SessionDispatch::Continuation(state)) if state.last_server_sequence_number == 4
        ));
        assert_eq!(multiplexer.pending(), 1);
    }

    #[test]
    fn sequence_space_exhaustion() {
        let mut multiplexer = SessionMultiplexer::new();

        multiplexer.park(1, parked(u8::MAX));
        assert_eq!(multiplexer.take(1, 1).err(), Some(SequenceError::Overflow));
    }
}
