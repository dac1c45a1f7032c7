//! Hook for the external CredSSP implementation `IsoFramer` hands control to
//! when [`crate::IsoFramer::connect`] concludes with
//! [`rdp_pdu::nego::NegoOutcome::CredsspHandoff`].
//!
//! `IsoFramer` never calls this trait itself (see DESIGN.md): it has no way
//! to tell a CredSSP failure apart from one that should retry plain RDP, so
//! driving the handshake and deciding what to do if it fails is left
//! entirely to the host.

/// Performs CredSSP (TLS already established by `tls_upgrade`) and returns
/// whether the server authenticated successfully.
pub trait CredsspHandoff: Send {
    fn perform(&mut self, server_name: &str, tls_public_key: &[u8]) -> bool;
}
