use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Wait until `addr` (`host:port`) accepts a TCP connection, or `timeout`
/// elapses. Returns whether the link came up.
///
/// A timeout is not fatal: the caller carries on with dispatch expected to
/// fail until connectivity returns.
pub fn wait_for_link(addr: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        // Resolve every round; DNS is typically down along with the link.
        let reachable = addr
            .to_socket_addrs()
            .map(|mut addrs| addrs.any(|a| TcpStream::connect_timeout(&a, POLL_INTERVAL).is_ok()))
            .unwrap_or(false);
        if reachable {
            info!(addr, "network link up");
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(addr, timeout_secs = timeout.as_secs_f32(), "network link not up; continuing without it");
            return false;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_link_up() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(wait_for_link(&addr, Duration::from_secs(2)));
    }

    #[test]
    fn test_link_timeout_is_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let started = Instant::now();
        assert!(!wait_for_link(&addr, Duration::from_millis(300)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_unresolvable_address() {
        assert!(!wait_for_link("not a host", Duration::ZERO));
    }
}
