//! SSDP discovery of HEOS devices
//!
//! Sends one `M-SEARCH` probe to the SSDP multicast group and resolves the
//! first device whose response carries the requested search target. The socket lives only for the duration of the
//! call and is released on every exit path.

use crate::config::DiscoveryConfig;
use crate::error::{HeosError, Result};
use crate::types::DeviceAddress;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use url::Url;

/// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// SSDP port
pub const SSDP_PORT: u16 = 1900;

const MAX_DATAGRAM: usize = 2048;

/// Discover the first HEOS device on the network
///
/// Returns the device's address on the default command port.
///
/// # Example
///
/// ```no_run
/// use heos::{discover, DiscoveryConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let address = discover(&DiscoveryConfig::default()).await?;
///     println!("Found HEOS device at {}", address);
///     Ok(())
/// }
/// ```
pub async fn discover(config: &DiscoveryConfig) -> Result<DeviceAddress> {
    let socket = create_socket(config)?;
    let request = build_search_request(&config.search_target);
    let target = SocketAddr::new(IpAddr::V4(SSDP_MULTICAST_ADDR), SSDP_PORT);

    tracing::info!("Sending SSDP search for {}", config.search_target);
    socket
        .send_to(request.as_bytes(), target)
        .await
        .map_err(|e| HeosError::Discovery(format!("Failed to send M-SEARCH: {}", e)))?;

    await_response(&socket, &config.search_target, config.timeout).await
}

/// Wait for the first response matching `search_target`, ignoring others
async fn await_response(
    socket: &UdpSocket,
    search_target: &str,
    wait: Duration,
) -> Result<DeviceAddress> {
    let deadline = Instant::now() + wait;
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (size, src) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                return Err(HeosError::Discovery(format!(
                    "Failed to receive SSDP response: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(HeosError::Discovery(format!(
                    "No SSDP response within {:?}",
                    wait
                )));
            }
        };

        let data = &buf[..size];
        tracing::debug!("SSDP response from {}: {}", src, String::from_utf8_lossy(data));

        if !matches_search_target(data, search_target) {
            tracing::debug!("Ignoring SSDP response from {} for another search target", src);
            continue;
        }

        let address = parse_response(data)?;
        tracing::info!("Discovered HEOS device at {}", address);
        return Ok(address);
    }
}

/// Build the `M-SEARCH` probe
pub fn build_search_request(search_target: &str) -> String {
    [
        "M-SEARCH * HTTP/1.1".to_string(),
        format!("ST: {}", search_target),
        "MX: 3".to_string(),
        "MAN: \"ssdp:discover\"".to_string(),
        format!("HOST: {}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT),
        String::new(),
        String::new(),
    ]
    .join("\r\n")
}

fn create_socket(config: &DiscoveryConfig) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| HeosError::Discovery(format!("Failed to create UDP socket: {}", e)))?;

    if let Err(e) = socket.set_reuse_address(true) {
        tracing::warn!("Failed to set SO_REUSEADDR: {}", e);
    }

    if let Err(e) = socket.set_multicast_ttl_v4(config.multicast_ttl) {
        tracing::warn!("Failed to set multicast TTL: {}", e);
    }

    let bind_addr = match config.bind_address {
        Some(iface) => {
            if let Err(e) = socket.set_multicast_if_v4(&iface) {
                tracing::warn!("Failed to select multicast interface {}: {}", iface, e);
            }
            SocketAddr::new(IpAddr::V4(iface), SSDP_PORT)
        }
        None => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
    };

    socket
        .set_nonblocking(true)
        .map_err(|e| HeosError::Discovery(format!("Failed to configure UDP socket: {}", e)))?;

    socket
        .bind(&bind_addr.into())
        .map_err(|e| HeosError::Discovery(format!("Failed to bind {}: {}", bind_addr, e)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
        .map_err(|e| HeosError::Discovery(format!("Failed to register UDP socket: {}", e)))
}

/// Parse `Key: Value` header lines, lowercasing the keys
pub(crate) fn parse_headers(response: &str) -> HashMap<String, String> {
    response
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Whether a response datagram answers `search_target`
pub(crate) fn matches_search_target(data: &[u8], search_target: &str) -> bool {
    let Ok(text) = std::str::from_utf8(data) else {
        return false;
    };
    parse_headers(text)
        .get("st")
        .is_some_and(|st| st.eq_ignore_ascii_case(search_target))
}

/// Extract the device address from an SSDP response datagram
pub(crate) fn parse_response(data: &[u8]) -> Result<DeviceAddress> {
    let text = std::str::from_utf8(data)
        .map_err(|_| HeosError::Discovery("SSDP response is not valid UTF-8".to_string()))?;

    let headers = parse_headers(text);
    let location = headers
        .get("location")
        .ok_or_else(|| HeosError::Discovery("SSDP response has no location header".to_string()))?;

    let url = Url::parse(location)
        .map_err(|e| HeosError::Discovery(format!("Invalid location {:?}: {}", location, e)))?;

    let host = url
        .host_str()
        .ok_or_else(|| HeosError::Discovery(format!("Location {:?} has no host", location)))?;

    Ok(DeviceAddress::new(host))
}
