/// Command dispatch: key → router → pool → wire → release
use crate::cluster::Redirect;
use crate::core::Endpoint;
use crate::error::{ProtocolError, ShardwireError, ShardwireResult};
use crate::pool::ConnectionPools;
use crate::protocol::Reply;
use crate::routing::KeyRouter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_MAX_REDIRECTS: usize = 5;

pub struct Dispatcher {
    router: Arc<dyn KeyRouter>,
    pools: Arc<ConnectionPools>,
    max_wait: Duration,
    max_redirects: usize,
}

impl Dispatcher {
    pub fn new(router: Arc<dyn KeyRouter>, pools: Arc<ConnectionPools>) -> Self {
        let max_wait = pools.default_wait();
        Self {
            router,
            pools,
            max_wait,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// How long to wait for a pooled connection
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn router(&self) -> &Arc<dyn KeyRouter> {
        &self.router
    }

    /// Run `args` on the endpoint serving `key`, following MOVED and ASK
    /// redirects.
    pub async fn execute<A: AsRef<[u8]>>(&self, key: &[u8], args: &[A]) -> ShardwireResult<Reply> {
        let mut endpoint = self.router.resolve(key)?;
        let mut asking = false;

        for _ in 0..=self.max_redirects {
            let reply = self.exec_on(&endpoint, args, asking).await?;
            let redirect = match Redirect::from_reply(&reply)? {
                Some(redirect) => redirect,
                None => return Ok(reply),
            };

            debug!("{} redirected to {:?}", endpoint, redirect);
            self.router.on_redirect(&redirect);
            asking = redirect.requires_asking();
            endpoint = redirect.endpoint().clone();
        }

        Err(ShardwireError::routing(format!(
            "too many redirects for key '{}'",
            String::from_utf8_lossy(key)
        )))
    }

    /// Run `args` on every endpoint the router knows.
    pub async fn broadcast<A: AsRef<[u8]>>(&self, args: &[A]) -> Vec<(Endpoint, ShardwireResult<Reply>)> {
        let mut replies = Vec::new();
        for endpoint in self.router.resolve_all() {
            let reply = self.exec_on(&endpoint, args, false).await;
            if let Err(e) = &reply {
                warn!("Broadcast to {} failed: {}", endpoint, e);
            }
            replies.push((endpoint, reply));
        }
        replies
    }

    async fn exec_on<A: AsRef<[u8]>>(&self, endpoint: &Endpoint, args: &[A], asking: bool) -> ShardwireResult<Reply> {
        let mut connection = self.pools.get(endpoint, self.max_wait).await?;

        let result: ShardwireResult<Reply> = async {
            if asking {
                let reply = connection.exec(&["ASKING"]).await?;
                if !reply.is_status("OK") {
                    return Err(ProtocolError::UnexpectedReply {
                        command: "ASKING".to_string(),
                        reply: reply.to_string(),
                    }
                    .into());
                }
            }
            connection.exec(args).await
        }
        .await;

        self.pools.recycle(connection);
        result
    }
}
