use super::client::{IndexClient, Namespace};
use super::protocol::*;
use crate::catalog::types::RecordId;
use crate::error::IndexError;

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

/// Connection settings for a Sonic server.
#[derive(Debug, Clone)]
pub struct SonicOptions {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Upper bound on simultaneously open channels per mode.
    pub pool_size: usize,
    pub connect_timeout: Duration,
}

impl SonicOptions {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One authenticated Sonic channel. Commands on a channel are strictly sequential.
struct Channel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    buffer: usize,
}

impl Channel {
    /// Connects and authenticates. The whole handshake shares `connect_timeout`.
    async fn open(options: &SonicOptions, mode: ChannelMode) -> Result<Self, IndexError> {
        let addr = options.addr();
        tokio::time::timeout(
            options.connect_timeout,
            Self::handshake(&addr, &options.password, mode),
        )
        .await
        .map_err(|_| {
            IndexError::Unavailable(format!(
                "{} handshake with {} timed out",
                mode.as_str(),
                addr
            ))
        })?
    }

    async fn handshake(addr: &str, password: &str, mode: ChannelMode) -> Result<Self, IndexError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| IndexError::Unavailable(format!("connect to {}: {}", addr, e)))?;

        let (read_half, write_half) = stream.into_split();
        let mut channel = Channel {
            reader: BufReader::new(read_half),
            writer: write_half,
            buffer: DEFAULT_BUFFER_SIZE,
        };

        match channel.read_reply().await? {
            Reply::Connected(banner) => tracing::debug!("Sonic greeting: {}", banner),
            other => return Err(unexpected("CONNECTED", &other)),
        }

        channel.send(&start_command(mode, password)).await?;
        match channel.read_reply().await? {
            Reply::Started { buffer } => channel.buffer = buffer,
            Reply::Err(reason) => {
                return Err(IndexError::Unavailable(format!(
                    "{} channel refused: {}",
                    mode.as_str(),
                    reason
                )));
            }
            other => return Err(unexpected("STARTED", &other)),
        }

        tracing::debug!(
            "Opened Sonic {} channel to {} (buffer {} bytes)",
            mode.as_str(),
            addr,
            channel.buffer
        );
        Ok(channel)
    }

    async fn send(&mut self, line: &str) -> Result<(), IndexError> {
        let mut frame = String::with_capacity(line.len() + 1);
        frame.push_str(line);
        frame.push('\n');
        self.writer
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| IndexError::Unavailable(format!("write failed: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| IndexError::Unavailable(format!("flush failed: {}", e)))
    }

    async fn read_reply(&mut self) -> Result<Reply, IndexError> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| IndexError::Unavailable(format!("read failed: {}", e)))?;
        if read == 0 {
            return Err(IndexError::Unavailable(
                "connection closed by server".to_string(),
            ));
        }
        parse_reply(&line)
    }

    /// Bytes already buffered behind a complete reply mean the channel is out of step.
    fn ensure_drained(&self) -> Result<(), IndexError> {
        if self.reader.buffer().is_empty() {
            Ok(())
        } else {
            Err(IndexError::Unavailable(
                "unsolicited data after reply".to_string(),
            ))
        }
    }

    /// Sends a command and returns its direct reply. `ERR` becomes `Rejected`.
    async fn request(&mut self, command: &str) -> Result<Reply, IndexError> {
        self.send(command).await?;
        let reply = self.read_reply().await?;
        self.ensure_drained()?;
        match reply {
            Reply::Err(reason) => Err(IndexError::Rejected(reason)),
            reply => Ok(reply),
        }
    }

    /// Runs a search command answered with `PENDING <marker>` and a later `EVENT`.
    async fn request_event(&mut self, command: &str, kind: &str) -> Result<Vec<String>, IndexError> {
        self.send(command).await?;
        let marker = match self.read_reply().await? {
            Reply::Pending(marker) => marker,
            Reply::Err(reason) => {
                self.ensure_drained()?;
                return Err(IndexError::Rejected(reason));
            }
            other => return Err(unexpected("PENDING", &other)),
        };

        loop {
            match self.read_reply().await? {
                Reply::Event {
                    kind: event_kind,
                    marker: event_marker,
                    items,
                } if event_kind == kind && event_marker == marker => {
                    self.ensure_drained()?;
                    return Ok(items);
                }
                Reply::Event { marker: other, .. } => {
                    tracing::debug!("Skipping event for foreign marker {}", other);
                }
                Reply::Err(reason) => {
                    self.ensure_drained()?;
                    return Err(IndexError::Rejected(reason));
                }
                other => return Err(unexpected("EVENT", &other)),
            }
        }
    }

    async fn quit(mut self) {
        if self.send(QUIT).await.is_ok() {
            match self.read_reply().await {
                Ok(Reply::Ended(reason)) => tracing::debug!("Sonic channel ended: {}", reason),
                Ok(other) => tracing::debug!("Unexpected reply to QUIT: {:?}", other),
                Err(e) => tracing::debug!("QUIT not acknowledged: {}", e),
            }
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> IndexError {
    IndexError::Unavailable(format!("protocol violation: expected {}, got {:?}", expected, got))
}

/// Channels of a single mode, opened on demand and reused across requests.
struct ChannelPool {
    mode: ChannelMode,
    options: SonicOptions,
    idle: Mutex<Vec<Channel>>,
    permits: Semaphore,
}

/// A channel checked out of the pool for exactly one command.
struct Lease<'a> {
    pool: &'a ChannelPool,
    channel: Channel,
    _permit: SemaphorePermit<'a>,
}

impl ChannelPool {
    fn new(mode: ChannelMode, options: SonicOptions) -> Self {
        let size = options.pool_size.max(1);
        Self {
            mode,
            options,
            idle: Mutex::new(Vec::new()),
            permits: Semaphore::new(size),
        }
    }

    async fn checkout(&self) -> Result<Lease<'_>, IndexError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| IndexError::Unavailable("index client closed".to_string()))?;

        let reused = self.idle.lock().await.pop();
        let channel = match reused {
            Some(channel) => channel,
            None => Channel::open(&self.options, self.mode).await?,
        };

        Ok(Lease {
            pool: self,
            channel,
            _permit: permit,
        })
    }

    /// Stops handing out channels and says goodbye on the idle ones.
    async fn shutdown(&self) {
        self.permits.close();
        let channels: Vec<Channel> = self.idle.lock().await.drain(..).collect();
        let count = channels.len();
        for channel in channels {
            channel.quit().await;
        }
        tracing::info!("Closed {} Sonic {} channel(s)", count, self.mode.as_str());
    }
}

impl Lease<'_> {
    /// Returns the channel to the pool unless the command left it in an unknown state.
    ///
    /// A channel finishing after [`ChannelPool::shutdown`] is quit instead.
    async fn finish<T>(self, result: &Result<T, IndexError>) {
        let Lease { pool, channel, .. } = self;
        match result {
            Ok(_) | Err(IndexError::Rejected(_)) | Err(IndexError::NotFound(_)) => {
                let mut idle = pool.idle.lock().await;
                if !pool.permits.is_closed() {
                    idle.push(channel);
                    return;
                }
                drop(idle);
                channel.quit().await;
            }
            Err(IndexError::Unavailable(reason)) => {
                tracing::debug!("Dropping Sonic {} channel: {}", pool.mode.as_str(), reason);
            }
        }
    }
}

/// [`IndexClient`] backed by a Sonic server, with one channel pool per mode.
pub struct SonicClient {
    search: ChannelPool,
    ingest: ChannelPool,
}

impl SonicClient {
    /// Opens and authenticates one channel per mode so bad settings surface at startup.
    pub async fn connect(options: SonicOptions) -> Result<Self, IndexError> {
        let client = Self {
            search: ChannelPool::new(ChannelMode::Search, options.clone()),
            ingest: ChannelPool::new(ChannelMode::Ingest, options.clone()),
        };

        for pool in [&client.search, &client.ingest] {
            let mut lease = pool.checkout().await?;
            let result = match lease.channel.request(PING).await {
                Ok(Reply::Pong) => Ok(()),
                Ok(other) => Err(unexpected("PONG", &other)),
                Err(e) => Err(e),
            };
            lease.finish(&result).await;
            result?;
        }

        tracing::info!(
            "Connected to Sonic at {} (pool size {})",
            options.addr(),
            options.pool_size.max(1)
        );
        Ok(client)
    }
}

#[async_trait]
impl IndexClient for SonicClient {
    async fn ingest(&self, ns: &Namespace, id: &RecordId, text: &str) -> Result<(), IndexError> {
        check_object(id.as_str())?;
        let mut lease = self.ingest.checkout().await?;
        let budget = push_text_budget(ns, id.as_str(), lease.channel.buffer);
        let chunks = split_text(text, budget);

        let result = if chunks.is_empty() {
            Err(IndexError::Rejected("no text to index".to_string()))
        } else {
            let mut outcome = Ok(());
            for chunk in &chunks {
                match lease.channel.request(&push_command(ns, id.as_str(), chunk)).await {
                    Ok(Reply::Ok) => {}
                    Ok(other) => {
                        outcome = Err(unexpected("OK", &other));
                        break;
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            outcome
        };

        if chunks.len() > 1 {
            tracing::debug!("Pushed {} in {} chunks", id, chunks.len());
        }
        lease.finish(&result).await;
        result
    }

    async fn query(
        &self,
        ns: &Namespace,
        text: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RecordId>, IndexError> {
        let mut lease = self.search.checkout().await?;
        let result: Result<Vec<RecordId>, IndexError> = lease
            .channel
            .request_event(&query_command(ns, text, limit, offset), "QUERY")
            .await
            .map(|ids| ids.into_iter().map(RecordId).collect());
        lease.finish(&result).await;
        result
    }

    async fn suggest(
        &self,
        ns: &Namespace,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>, IndexError> {
        let mut lease = self.search.checkout().await?;
        let result = lease
            .channel
            .request_event(&suggest_command(ns, prefix, limit), "SUGGEST")
            .await;
        lease.finish(&result).await;
        result
    }

    async fn count(&self, ns: &Namespace, id: &RecordId) -> Result<u64, IndexError> {
        check_object(id.as_str())?;
        let mut lease = self.ingest.checkout().await?;
        let result = match lease.channel.request(&count_command(ns, id.as_str())).await {
            Ok(Reply::Result(n)) => Ok(n),
            Ok(other) => Err(unexpected("RESULT", &other)),
            Err(e) => Err(e),
        };
        lease.finish(&result).await;
        result
    }

    async fn remove(&self, ns: &Namespace, id: &RecordId) -> Result<(), IndexError> {
        check_object(id.as_str())?;
        let mut lease = self.ingest.checkout().await?;
        let result = match lease
            .channel
            .request(&flush_object_command(ns, id.as_str()))
            .await
        {
            Ok(Reply::Result(0)) => Err(IndexError::NotFound(id.0.clone())),
            Ok(Reply::Result(_)) => Ok(()),
            Ok(other) => Err(unexpected("RESULT", &other)),
            Err(e) => Err(e),
        };
        lease.finish(&result).await;
        result
    }

    async fn close(&self) -> Result<(), IndexError> {
        self.search.shutdown().await;
        self.ingest.shutdown().await;
        Ok(())
    }
}
