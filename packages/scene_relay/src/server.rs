//! Binds the three relay endpoints and serves them together.

use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::RelayState;
use crate::config::RelayConfig;
use crate::connection::Population;
use crate::error::RelayError;
use crate::ingress::ingress_routes;
use crate::listener::listener_routes;

struct Endpoint {
    name: &'static str,
    listener: TcpListener,
    addr: SocketAddr,
}

async fn bind_endpoint(name: &'static str, addr: SocketAddr) -> Result<Endpoint, RelayError> {
    let bind_err = |source| RelayError::Bind {
        endpoint: name,
        addr,
        source,
    };
    let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
    let addr = listener.local_addr().map_err(bind_err)?;
    Ok(Endpoint {
        name,
        listener,
        addr,
    })
}

/// A relay whose listeners are all bound but not yet serving.
pub struct RelayServer {
    state: RelayState,
    http: Endpoint,
    producer: Endpoint,
    consumer: Endpoint,
}

impl RelayServer {
    /// Bind every endpoint or none: on the first failure the listeners bound
    /// so far are dropped and the error is returned.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let http = bind_endpoint("http", config.http_addr).await?;
        let producer = bind_endpoint("producer", config.producer_addr).await?;
        let consumer = bind_endpoint("consumer", config.consumer_addr).await?;

        Ok(Self {
            state: RelayState::new(config),
            http,
            producer,
            consumer,
        })
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http.addr
    }

    pub fn producer_addr(&self) -> SocketAddr {
        self.producer.addr
    }

    pub fn consumer_addr(&self) -> SocketAddr {
        self.consumer.addr
    }

    /// Serve all endpoints until `shutdown` resolves or one of them fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            shutdown.await;
            trigger.cancel();
        });

        let http_app = ingress_routes(self.state.clone());
        let producer_app = listener_routes(self.state.clone(), Population::Producer);
        let consumer_app = listener_routes(self.state.clone(), Population::Consumer);

        info!("REST: http://{}/log", self.http.addr);
        info!("td WS: ws://{}", self.producer.addr);
        info!("browser WS: ws://{}", self.consumer.addr);

        let result = tokio::try_join!(
            run(self.http, http_app, cancel.clone()),
            run(self.producer, producer_app, cancel.clone()),
            run(self.consumer, consumer_app, cancel.clone()),
        );
        // Stop the remaining servers if one of them failed.
        cancel.cancel();
        result.map(|_| ())
    }
}

async fn run(
    endpoint: Endpoint,
    app: axum::Router,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    let name = endpoint.name;
    axum::serve(
        endpoint.listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await
    .map_err(|source| RelayError::Serve {
        endpoint: name,
        source,
    })?;
    info!(endpoint = name, "server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_reports_actual_ports() {
        let server = RelayServer::bind(RelayConfig::ephemeral()).await.unwrap();
        assert_ne!(server.http_addr().port(), 0);
        assert_ne!(server.producer_addr().port(), 0);
        assert_ne!(server.consumer_addr().port(), 0);
        assert_ne!(server.producer_addr(), server.consumer_addr());
    }

    #[tokio::test]
    async fn bind_fails_when_port_taken() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RelayConfig {
            consumer_addr: taken.local_addr().unwrap(),
            ..RelayConfig::ephemeral()
        };

        let err = RelayServer::bind(config).await.err().unwrap();
        match err {
            RelayError::Bind { endpoint, addr, .. } => {
                assert_eq!(endpoint, "consumer");
                assert_eq!(addr, taken.local_addr().unwrap());
            }
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let server = RelayServer::bind(RelayConfig::ephemeral()).await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.serve(async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
