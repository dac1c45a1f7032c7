//! Cooperative hook a host implements to pump its own event loop while
//! [`crate::Transport::recv`] is blocked waiting for socket data.

use std::net::TcpStream;

/// Outcome of one round of host-side polling during a blocked receive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep waiting for socket data.
    Continue,
    /// The user asked to disconnect; `recv` should return immediately.
    UserQuit,
}

pub trait UiPoll: Send {
    /// Called repeatedly while a receive is blocked; `stream` is provided so
    /// a host that wants finer control could inspect socket readiness itself,
    /// though the default transport loop already handles that.
    fn on_idle(&mut self, stream: &TcpStream) -> PollOutcome;
}

/// A hook that never asks to quit; used when no GUI is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverQuit;

impl UiPoll for NeverQuit {
    fn on_idle(&mut self, _stream: &TcpStream) -> PollOutcome {
        PollOutcome::Continue
    }
}
