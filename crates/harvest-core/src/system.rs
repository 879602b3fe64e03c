use std::{io, net::IpAddr, sync::OnceLock, time::Instant};

use harvest_model::ClientIdentity;
use tokio::net::TcpStream;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize agent start time.
pub fn init_uptime() {
    START_TIME.get_or_init(Instant::now);
}

/// Get agent uptime in seconds.
pub fn uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_secs()
}

/// Agent version reported to the control plane.
#[inline]
pub fn agent_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Host name, or an empty string when it cannot be read.
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default()
}

/// Open a TCP connection to `host:port` and return the local address used.
///
/// Doubles as the startup connectivity check.
pub async fn probe_local_address(host: &str, port: u16) -> io::Result<IpAddr> {
    let stream = TcpStream::connect((host, port)).await?;
    Ok(stream.local_addr()?.ip())
}

/// Identity sent once at startup.
pub fn client_identity(address: IpAddr) -> ClientIdentity {
    ClientIdentity {
        address: address.to_string(),
        hostname: host_name(),
        version: agent_version().to_string(),
    }
}
