/// Live server connections
///
/// A `Connection` owns one TCP stream split into a buffered reader and a
/// buffered writer. Requests and replies are strictly paired: every command
/// written is answered by exactly one reply before the next one goes out.
use super::Endpoint;
use crate::error::{ProtocolError, ShardwireError, ShardwireResult};
use crate::pool::ResourceFactory;
use crate::protocol::{Reply, RespReader, RespWriter, DEFAULT_BUFFER_SIZE};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Transport options for new connections
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

pub struct Connection {
    endpoint: Endpoint,
    reader: RespReader<OwnedReadHalf>,
    writer: RespWriter<OwnedWriteHalf>,
    broken: bool,
}

impl Connection {
    /// Open a connection and authenticate if the endpoint carries a credential.
    pub async fn connect(endpoint: &Endpoint, options: &ConnectOptions) -> ShardwireResult<Self> {
        debug!("Connecting to {}", endpoint);

        let stream = match timeout(options.connect_timeout, TcpStream::connect(endpoint.address())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ShardwireError::from(e).with_endpoint(endpoint, "connect")),
            Err(_) => {
                return Err(ShardwireError::timeout(format!(
                    "connect after {}ms",
                    options.connect_timeout.as_millis()
                ))
                .with_endpoint(endpoint, "connect"))
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on {}: {}", endpoint, e);
        }

        let (read_half, write_half) = stream.into_split();
        let mut connection = Connection {
            endpoint: endpoint.clone(),
            reader: RespReader::with_capacity(options.buffer_size, read_half),
            writer: RespWriter::with_capacity(options.buffer_size, write_half),
            broken: false,
        };

        if let Some(password) = endpoint.password() {
            let reply = connection.exec(&["AUTH", password]).await?;
            if !reply.is_status("OK") {
                return Err(ShardwireError::from(ProtocolError::UnexpectedReply {
                    command: "AUTH".to_string(),
                    reply: reply.to_string(),
                })
                .with_endpoint(endpoint, "authenticate"));
            }
        }

        debug!("Connected to {}", endpoint);
        Ok(connection)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Set once a transport or framing error has been seen. A broken
    /// connection must not be reused.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Frame a command and flush it to the server.
    pub async fn send<A: AsRef<[u8]>>(&mut self, args: &[A]) -> ShardwireResult<()> {
        let result: ShardwireResult<()> = async {
            self.writer.write_bulk_array(args).await?;
            self.writer.flush().await
        }
        .await;
        self.check(result, args)
    }

    /// Read the reply to the oldest outstanding command.
    pub async fn read_reply(&mut self) -> ShardwireResult<Reply> {
        let result = self.reader.read_reply().await;
        self.check(result, &["read reply"])
    }

    /// Send one command and read its reply. Error replies are returned as
    /// `Reply::Error`, not as `Err`.
    pub async fn exec<A: AsRef<[u8]>>(&mut self, args: &[A]) -> ShardwireResult<Reply> {
        self.send(args).await?;
        self.read_reply().await
    }

    /// PING round trip
    pub async fn ping(&mut self) -> bool {
        match self.exec(&["PING"]).await {
            Ok(reply) => reply.is_status("PONG"),
            Err(e) => {
                debug!("PING failed: {}", e);
                false
            }
        }
    }

    /// Shut down the write side; the server sees end of stream.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.get_mut().shutdown().await {
            debug!("Error closing connection to {}: {}", self.endpoint, e);
        }
    }

    fn check<T, A: AsRef<[u8]>>(&mut self, result: ShardwireResult<T>, args: &[A]) -> ShardwireResult<T> {
        result.map_err(|e| {
            if e.is_connection_error() {
                self.broken = true;
            }
            let operation = args
                .first()
                .map(|a| String::from_utf8_lossy(a.as_ref()).into_owned())
                .unwrap_or_default();
            e.with_endpoint(&self.endpoint, operation)
        })
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("broken", &self.broken)
            .finish()
    }
}

/// Creates, validates and destroys connections to one endpoint
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    endpoint: Endpoint,
    options: ConnectOptions,
}

impl ConnectionFactory {
    pub fn new(endpoint: Endpoint, options: ConnectOptions) -> Self {
        Self { endpoint, options }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl ResourceFactory for ConnectionFactory {
    type Resource = Connection;

    async fn create(&self) -> ShardwireResult<Connection> {
        Connection::connect(&self.endpoint, &self.options).await
    }

    async fn validate(&self, connection: &mut Connection) -> bool {
        !connection.is_broken() && connection.ping().await
    }

    async fn destroy(&self, connection: Connection) {
        connection.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unreachable_endpoint, MockServer};
    use bytes::Bytes;

    #[tokio::test]
    async fn test_exec_round_trip() {
        let server = MockServer::start().await;
        let mut connection = Connection::connect(&server.endpoint(), &ConnectOptions::default())
            .await
            .unwrap();

        assert!(connection.exec(&["SET", "k", "v"]).await.unwrap().is_status("OK"));
        assert_eq!(
            connection.exec(&["GET", "k"]).await.unwrap(),
            Reply::Bulk(Bytes::from("v"))
        );
        assert!(connection.ping().await);
        assert!(!connection.is_broken());
    }

    #[tokio::test]
    async fn test_error_reply_is_not_fatal() {
        let server = MockServer::start().await;
        let mut connection = Connection::connect(&server.endpoint(), &ConnectOptions::default())
            .await
            .unwrap();

        let reply = connection.exec(&["NOSUCHCOMMAND"]).await.unwrap();
        assert!(reply.is_error());
        assert!(!connection.is_broken());
    }

    #[tokio::test]
    async fn test_connect_refused_names_endpoint() {
        let endpoint = unreachable_endpoint().await;
        let err = Connection::connect(&endpoint, &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains(&endpoint.to_string()));
    }

    #[tokio::test]
    async fn test_server_close_marks_broken() {
        let server = MockServer::start().await;
        let mut connection = Connection::connect(&server.endpoint(), &ConnectOptions::default())
            .await
            .unwrap();

        server.stop().await;
        let err = connection.exec(&["PING"]).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(connection.is_broken());
    }

    #[tokio::test]
    async fn test_authentication() {
        let server = MockServer::with_password("s3cret").await;

        let good = server.endpoint().with_password("s3cret");
        let mut connection = Connection::connect(&good, &ConnectOptions::default()).await.unwrap();
        assert!(connection.ping().await);

        let bad = server.endpoint().with_password("wrong");
        let err = Connection::connect(&bad, &ConnectOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("authenticate"));
    }

    #[tokio::test]
    async fn test_factory_validation() {
        let server = MockServer::start().await;
        let factory = ConnectionFactory::new(server.endpoint(), ConnectOptions::default());

        let mut connection = factory.create().await.unwrap();
        assert!(factory.validate(&mut connection).await);

        server.stop().await;
        assert!(!factory.validate(&mut connection).await);
        factory.destroy(connection).await;
    }
}
