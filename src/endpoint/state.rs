use std::io;

use crate::DisconnectCause;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Connecting,
    Connected,
    Closed(DisconnectCause),
}

impl State {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Events which may change the lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    HelloReceived,
    GoodbyeReceived,
    Disconnect,
    IdleTimeout,
    RetransmitExhausted,
    SocketError(io::ErrorKind),
}

/// Side effects requested by a transition, to be applied in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    NotifyConnect,
    SendGoodbye,
    DiscardBuffers,
    NotifyDisconnect(DisconnectCause),
}

fn close(cause: DisconnectCause) -> (State, Vec<Action>) {
    (
        State::Closed(cause),
        vec![Action::DiscardBuffers, Action::NotifyDisconnect(cause)],
    )
}

pub fn transition(state: State, input: Input) -> (State, Vec<Action>) {
    match (state, input) {
        // Closed is terminal
        (State::Closed(_), _) => (state, Vec::new()),

        (State::Connecting, Input::HelloReceived) => {
            (State::Connected, vec![Action::NotifyConnect])
        }
        // A retransmitted Hello after the handshake
        (State::Connected, Input::HelloReceived) => (state, Vec::new()),

        (_, Input::Disconnect) => {
            let (state, mut actions) = close(DisconnectCause::Local);
            actions.insert(0, Action::SendGoodbye);
            (state, actions)
        }
        (_, Input::GoodbyeReceived) => close(DisconnectCause::PeerClosed),
        (_, Input::IdleTimeout) => close(DisconnectCause::Timeout),
        (_, Input::RetransmitExhausted) => close(DisconnectCause::RetransmitExhausted),
        (_, Input::SocketError(kind)) => close(DisconnectCause::Socket(kind)),
    }
}

/// A flag which may be raised only once.
#[derive(Debug, Default)]
pub struct Latch {
    fired: bool,
}

impl Latch {
    /// Returns true the first time it is called, and false thereafter.
    pub fn fire(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    #[cfg(test)]
    pub fn has_fired(&self) -> bool {
        self.fired
    }
}
