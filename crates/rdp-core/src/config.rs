/// Process-wide client configuration, built once at startup and shared
/// read-only by the transport, ISO negotiation and DVC layers.
///
/// One owned value instead of free-standing global booleans, constructed
/// with [`ClientConfig::new`] and the `with_*` builder methods.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub rdp_version: RdpVersion,
    pub encryption: bool,
    pub encryption_initial: bool,
    pub use_password_as_pin: bool,
    pub smartcard: SmartcardIdentity,
    pub num_monitors: u32,
    pub server_port: u16,
    pub read_buffer_min: usize,
}

/// The client's claimed protocol version; only `V5` and later send
/// `RDP_NEG_REQ` during connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdpVersion {
    V4,
    V5,
}

#[derive(Debug, Clone, Default)]
pub struct SmartcardIdentity {
    pub csp_name: String,
    pub reader_name: String,
    pub card_name: String,
    pub container_name: String,
}

const DEFAULT_SERVER_PORT: u16 = 3389;
const DEFAULT_READ_BUFFER_MIN: usize = 16 * 1024;

impl ClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rdp_version: RdpVersion::V5,
            encryption: false,
            encryption_initial: false,
            use_password_as_pin: false,
            smartcard: SmartcardIdentity::default(),
            num_monitors: 1,
            server_port: DEFAULT_SERVER_PORT,
            read_buffer_min: DEFAULT_READ_BUFFER_MIN,
        }
    }

    #[must_use]
    pub fn with_rdp_version(mut self, version: RdpVersion) -> Self {
        self.rdp_version = version;
        self
    }

    #[must_use]
    pub fn with_encryption(mut self, encryption: bool, initial: bool) -> Self {
        self.encryption = encryption;
        self.encryption_initial = initial;
        self
    }

    #[must_use]
    pub fn with_use_password_as_pin(mut self, use_password_as_pin: bool) -> Self {
        self.use_password_as_pin = use_password_as_pin;
        self
    }

    #[must_use]
    pub fn with_smartcard(mut self, smartcard: SmartcardIdentity) -> Self {
        self.smartcard = smartcard;
        self
    }

    #[must_use]
    pub fn with_num_monitors(mut self, num_monitors: u32) -> Self {
        self.num_monitors = num_monitors;
        self
    }

    #[must_use]
    pub fn with_server_port(mut self, server_port: u16) -> Self {
        self.server_port = server_port;
        self
    }

    #[must_use]
    pub fn with_read_buffer_min(mut self, read_buffer_min: usize) -> Self {
        self.read_buffer_min = read_buffer_min;
        self
    }

    /// Whether `RDP_NEG_REQ`/`RDP_NEG_RSP` negotiation is sent at all.
    #[must_use]
    pub fn negotiation_enabled(&self) -> bool {
        self.rdp_version >= RdpVersion::V5
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialOrd for RdpVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RdpVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(v: &RdpVersion) -> u8 {
            match v {
                RdpVersion::V4 => 4,
                RdpVersion::V5 => 5,
            }
        }
        rank(self).cmp(&rank(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_startup_values() {
        let config = ClientConfig::new();
        assert_eq!(config.server_port, 3389);
        assert_eq!(config.read_buffer_min, 16 * 1024);
        assert!(config.negotiation_enabled());
    }

    #[test]
    fn v4_disables_negotiation() {
        let config = ClientConfig::new().with_rdp_version(RdpVersion::V4);
        assert!(!config.negotiation_enabled());
    }

    #[test]
    fn builder_methods_compose() {
        let config = ClientConfig::new()
            .with_server_port(3390)
            .with_num_monitors(2)
            .with_use_password_as_pin(true);
        assert_eq!(config.server_port, 3390);
        assert_eq!(config.num_monitors, 2);
        assert!(config.use_password_as_pin);
    }
}
