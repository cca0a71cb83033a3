use std::net::SocketAddr;

/// Errors surfaced to the operator while configuring or running the relay.
///
/// Per-connection transport failures never show up here: they are logged
/// and end only the connection they happened on.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to bind {endpoint} endpoint on {addr}")]
    Bind {
        endpoint: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{endpoint} server failed")]
    Serve {
        endpoint: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl From<figment::Error> for RelayError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
