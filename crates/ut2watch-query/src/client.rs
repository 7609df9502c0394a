//! Query client trait and its UDP implementation.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, trace};

use ut2watch_state::ServerDetails;

use crate::codec::{self, Section};
use crate::error::{QueryError, QueryResult};
use crate::options::QueryOptions;

/// Boxed future returned by [`QueryClient::query`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes one request/response cycle against a resolved query address.
///
/// Implementations must bound themselves by `opts.timeout`; the engine does
/// not interrupt a running query.
pub trait QueryClient: Send + Sync {
    fn query(&self, addr: SocketAddr, opts: QueryOptions)
    -> BoxFuture<'_, QueryResult<ServerDetails>>;
}

const RECV_BUFFER: usize = 4096;

/// How long to wait for the first datagram of an optional section.
///
/// Some servers send nothing at all for an empty player list.
const SECTION_WAIT: Duration = Duration::from_millis(500);

/// Quiet period that ends a multi-datagram section.
const LINGER: Duration = Duration::from_millis(50);

/// UT2004 query client over UDP.
#[derive(Debug, Clone)]
pub struct UdpQueryClient {
    bind_ip: IpAddr,
}

impl UdpQueryClient {
    /// Create a client that sends from `bind` (an IP, e.g. `"0.0.0.0"`).
    pub fn new(bind: &str) -> QueryResult<Self> {
        let bind_ip = bind
            .trim()
            .parse::<IpAddr>()
            .map_err(|e| QueryError::InvalidBind(format!("{bind}: {e}")))?;
        Ok(Self { bind_ip })
    }

    /// Query `addr` (the server's query port), bounded by `opts.timeout`.
    pub async fn query_details(
        &self,
        addr: SocketAddr,
        opts: QueryOptions,
    ) -> QueryResult<ServerDetails> {
        match tokio::time::timeout(opts.timeout, self.exchange(addr, opts)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%addr, timeout = ?opts.timeout, "query timed out");
                Err(QueryError::Timeout(opts.timeout))
            }
        }
    }

    async fn exchange(&self, addr: SocketAddr, opts: QueryOptions) -> QueryResult<ServerDetails> {
        // A connected socket per query: the kernel drops datagrams from other
        // peers and concurrent queries never see each other's replies.
        let socket = UdpSocket::bind(self.local_addr_for(addr)).await?;
        socket.connect(addr).await?;
        let mut buf = vec![0u8; RECV_BUFFER];

        socket.send(&codec::encode_request(Section::Info)).await?;
        let payload = recv_section(&socket, &mut buf, Section::Info).await?;
        let info = codec::decode_info(&payload)?;

        let mut details = ServerDetails {
            info,
            ..Default::default()
        };

        if opts.rules {
            for payload in collect_section(&socket, &mut buf, Section::Rules).await? {
                details.rules.extend(codec::decode_rules(&payload)?);
            }
        }

        if opts.players {
            for payload in collect_section(&socket, &mut buf, Section::Players).await? {
                details.players.extend(codec::decode_players(&payload)?);
            }
        }

        trace!(
            %addr,
            name = %details.info.server_name,
            rules = details.rules.len(),
            players = details.players.len(),
            "query complete"
        );
        Ok(details)
    }

    /// Local bind address in the same family as `remote`.
    fn local_addr_for(&self, remote: SocketAddr) -> SocketAddr {
        let ip = match (self.bind_ip, remote) {
            (IpAddr::V4(_), SocketAddr::V6(_)) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            (IpAddr::V6(_), SocketAddr::V4(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            (ip, _) => ip,
        };
        SocketAddr::new(ip, 0)
    }
}

impl QueryClient for UdpQueryClient {
    fn query(
        &self,
        addr: SocketAddr,
        opts: QueryOptions,
    ) -> BoxFuture<'_, QueryResult<ServerDetails>> {
        Box::pin(self.query_details(addr, opts))
    }
}

/// Wait for the next datagram of `section`, skipping late replies to
/// earlier sections.
async fn recv_section(socket: &UdpSocket, buf: &mut [u8], section: Section) -> QueryResult<Vec<u8>> {
    loop {
        let n = socket.recv(buf).await?;
        let (got, payload) = codec::split_response(&buf[..n])?;
        if got == section {
            return Ok(payload.to_vec());
        }
        trace!(expected = ?section, ?got, "skipping datagram for another section");
    }
}

/// Request an optional section and gather every datagram the server sends.
///
/// No reply at all yields an empty list rather than an error.
async fn collect_section(
    socket: &UdpSocket,
    buf: &mut [u8],
    section: Section,
) -> QueryResult<Vec<Vec<u8>>> {
    socket.send(&codec::encode_request(section)).await?;

    let mut payloads = Vec::new();
    let mut wait = SECTION_WAIT;
    while let Ok(result) = tokio::time::timeout(wait, recv_section(socket, buf, section)).await {
        payloads.push(result?);
        wait = LINGER;
    }
    Ok(payloads)
}
