use std::net::Ipv4Addr;
use std::time::Duration;

/// Default TCP port of the HEOS command interface
pub const DEFAULT_PORT: u16 = 1255;

/// SSDP search target identifying HEOS devices
pub const HEOS_SEARCH_TARGET: &str = "urn:schemas-denon-com:device:ACT-Denon:1";

/// Settings for the command connection
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// TCP port of the command interface
    pub port: u16,
    /// Upper bound on establishing the TCP connection
    pub connect_timeout: Duration,
    /// Upper bound on waiting for the reply to one command
    pub request_timeout: Duration,
    /// Maximum number of bytes requested from the socket per read
    pub read_chunk_size: usize,
    /// Largest incomplete message kept buffered before giving up on the stream
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            read_chunk_size: 64 * 1024,
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Settings for SSDP discovery
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How long to wait for the first response
    pub timeout: Duration,
    /// Multicast hop count
    pub multicast_ttl: u32,
    /// Local interface to send from; any interface when unset
    pub bind_address: Option<Ipv4Addr>,
    /// Value of the `ST` header in the probe
    pub search_target: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            multicast_ttl: 2,
            bind_address: None,
            search_target: HEOS_SEARCH_TARGET.to_string(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_bind_address(mut self, addr: Ipv4Addr) -> Self {
        self.bind_address = Some(addr);
        self
    }
}
