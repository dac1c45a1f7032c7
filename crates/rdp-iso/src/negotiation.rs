//! Connection-time security-protocol negotiation (MS-RDPBCGR 1.3.1.1).
//!
//! Re-expressed as an explicit loop over a retry-permitting set of failure
//! reasons rather than the label-and-jump shape of the original: only
//! `SSL_NOT_ALLOWED_BY_SERVER` and `SSL_CERT_NOT_ON_SERVER` permit falling
//! back to plain RDP and trying again.

use rdp_pdu::nego::{
    Cookie, FailureCode, NegoOutcome, ConnectionConfirm, ConnectionRequest, RequestFlags, ResponseFlags,
    SecurityProtocol,
};

/// What the caller asked for, and what external capabilities are available.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    pub username: String,
    /// Negotiation (`RDP_NEG_REQ`) is only sent when the client claims support
    /// for the RDP version that carries it.
    pub negotiation_enabled: bool,
    pub credssp_available: bool,
    pub smartcard_sso_requested: bool,
    pub smartcard_context_present: bool,
}

impl NegotiationConfig {
    #[must_use]
    pub fn initial_desired_protocols(&self) -> SecurityProtocol {
        if !self.negotiation_enabled {
            return SecurityProtocol::RDP;
        }
        let mut desired = SecurityProtocol::SSL;
        if self.credssp_available && (!self.smartcard_sso_requested || self.smartcard_context_present) {
            desired |= SecurityProtocol::HYBRID;
        }
        desired
    }
}

/// Whether a connection request should be built this round.
#[must_use]
pub fn build_request(config: &NegotiationConfig, desired_protocols: SecurityProtocol) -> ConnectionRequest {
    ConnectionRequest {
        cookie: Some(Cookie(config.username.clone())),
        flags: RequestFlags::empty(),
        protocol: desired_protocols,
    }
}

/// Exactly the two reasons MS-RDPBCGR permits a plain-RDP retry for.
#[must_use]
pub fn retry_allowed(code: FailureCode) -> bool {
    matches!(code, FailureCode::SSL_NOT_ALLOWED_BY_SERVER | FailureCode::SSL_CERT_NOT_ON_SERVER)
}

/// One interpreted step of the state machine: what the caller should do in
/// response to a `ConnectionConfirm`.
#[derive(Debug)]
pub enum Step {
    /// Negotiation concluded; `outcome` tells the caller what to do next
    /// (nothing more, upgrade to TLS, or hand off to external CredSSP).
    Concluded {
        outcome: NegoOutcome,
        extended_client_data_supported: bool,
    },
    /// Server refused with a retry-eligible reason; reconnect and resend
    /// with `SecurityProtocol::RDP`.
    RetryWithPlainRdp,
    /// Server refused with a fatal reason.
    Fatal(FailureCode),
}

#[must_use]
pub fn interpret(confirm: &ConnectionConfirm) -> Step {
    match confirm {
        ConnectionConfirm::Failure { code } => {
            if retry_allowed(*code) {
                Step::RetryWithPlainRdp
            } else {
                Step::Fatal(*code)
            }
        }
        ConnectionConfirm::Response { flags, .. } => {
            let extended_client_data_supported = flags.contains(ResponseFlags::EXTENDED_CLIENT_DATA_SUPPORTED);
            match confirm.outcome() {
                Ok(outcome) => Step::Concluded {
                    outcome,
                    extended_client_data_supported,
                },
                // Protocol combination this core does not support (e.g. HYBRID_EX
                // alone): treated the same as any other unrecoverable response.
                Err(_) => Step::Fatal(FailureCode::INCONSISTENT_FLAGS),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(credssp: bool) -> NegotiationConfig {
        NegotiationConfig {
            username: "user".to_owned(),
            negotiation_enabled: true,
            credssp_available: credssp,
            smartcard_sso_requested: false,
            smartcard_context_present: false,
        }
    }

    #[test]
    fn desired_protocols_include_hybrid_when_credssp_available() {
        let desired = config(true).initial_desired_protocols();
        assert!(desired.contains(SecurityProtocol::SSL));
        assert!(desired.contains(SecurityProtocol::HYBRID));
    }

    #[test]
    fn desired_protocols_are_ssl_only_without_credssp() {
        let desired = config(false).initial_desired_protocols();
        assert!(desired.contains(SecurityProtocol::SSL));
        assert!(!desired.contains(SecurityProtocol::HYBRID));
    }

    #[test]
    fn smartcard_sso_without_context_drops_hybrid() {
        let mut cfg = config(true);
        cfg.smartcard_sso_requested = true;
        assert!(!cfg.initial_desired_protocols().contains(SecurityProtocol::HYBRID));
    }

    #[test]
    fn only_two_failure_reasons_permit_retry() {
        assert!(retry_allowed(FailureCode::SSL_NOT_ALLOWED_BY_SERVER));
        assert!(retry_allowed(FailureCode::SSL_CERT_NOT_ON_SERVER));
        assert!(!retry_allowed(FailureCode::HYBRID_REQUIRED_BY_SERVER));
        assert!(!retry_allowed(FailureCode::SSL_REQUIRED_BY_SERVER));
    }

    #[test]
    fn response_with_ssl_concludes_with_tls_upgrade() {
        let confirm = ConnectionConfirm::Response {
            flags: ResponseFlags::empty(),
            protocol: SecurityProtocol::SSL,
        };
        assert!(matches!(
            interpret(&confirm),
            Step::Concluded {
                outcome: NegoOutcome::TlsUpgrade,
                ..
            }
        ));
    }

    #[test]
    fn retry_eligible_failure_requests_plain_rdp_retry() {
        let confirm = ConnectionConfirm::Failure {
            code: FailureCode::SSL_CERT_NOT_ON_SERVER,
        };
        assert!(matches!(interpret(&confirm), Step::RetryWithPlainRdp));
    }

    #[test]
    fn other_failure_is_fatal() {
        let confirm = ConnectionConfirm::Failure {
            code: FailureCode::HYBRID_REQUIRED_BY_SERVER,
        };
        assert!(matches!(interpret(&confirm), Step::Fatal(FailureCode::HYBRID_REQUIRED_BY_SERVER)));
    }
}
