//! Shared networking constants and helpers used by server and client.

/// Default interface the subscriber WebSocket server binds to.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default TCP port for subscriber WebSocket connections.
pub const DEFAULT_PORT: u16 = 5999;
/// Process exit code used when the operator types `quit` on the console.
pub const QUIT_EXIT_CODE: i32 = 0;

/// Helper to format a host with a port like "host:port".
pub fn addr(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}

/// Helper to build a `ws://` URL for a host and port.
pub fn ws_url(host: &str, port: u16) -> String {
    format!("ws://{}", addr(host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_formats() {
        assert_eq!(addr(DEFAULT_HOST, DEFAULT_PORT), "0.0.0.0:5999");
        assert_eq!(ws_url("127.0.0.1", DEFAULT_PORT), "ws://127.0.0.1:5999");
    }
}
