use std::{
    io::{self, Read},
    net::{IpAddr, SocketAddr},
    sync::{Arc, PoisonError},
};

use socket2::{SockAddr, Socket, Type};
use tokio::{io::unix::AsyncFd, sync::Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::Network;
use crate::error::{Error, Result};

type Descriptor = Arc<AsyncFd<Socket>>;

/// The raw ICMP socket shared by all probes and the receive loop.
///
/// Sends are serialized through `write_lock`; reads have a single consumer.
/// Cancelling `closed` makes every later send and every pending or later
/// read fail. [`IcmpSocket::close`] also drops the descriptor, which is
/// closed once the operations still holding it have returned.
#[derive(Debug)]
pub(crate) struct IcmpSocket {
    fd: std::sync::Mutex<Option<Descriptor>>,
    write_lock: Mutex<()>,
    closed: CancellationToken,
}

impl IcmpSocket {
    /// Opens a raw socket for `network`, bound to `bind_address` unless it is empty.
    ///
    /// Needs a running tokio runtime to register with its reactor.
    pub(crate) fn bind(
        network: Network,
        bind_address: &str,
        closed: CancellationToken,
    ) -> Result<Self> {
        let local = match bind_address {
            "" => None,
            address => Some(parse_bind_address(address, network)?),
        };
        let socket = Socket::new(network.domain(), Type::RAW, Some(network.protocol()))
            .map_err(Error::Socket)?;
        socket.set_nonblocking(true).map_err(Error::Socket)?;
        if let Some(address) = local {
            socket
                .bind(&SockAddr::from(SocketAddr::new(address, 0)))
                .map_err(Error::Socket)?;
        }
        let fd = AsyncFd::new(socket).map_err(Error::Socket)?;
        Ok(Self {
            fd: std::sync::Mutex::new(Some(Arc::new(fd))),
            write_lock: Mutex::new(()),
            closed,
        })
    }

    pub(crate) async fn send_to(&self, packet: &[u8], destination: IpAddr) -> io::Result<()> {
        let address = SockAddr::from(SocketAddr::new(destination, 0));
        let _guard = self.write_lock.lock().await;
        let fd = self.descriptor()?;
        loop {
            let mut ready = fd.writable().await?;
            match ready.try_io(|inner| inner.get_ref().send_to(packet, &address)) {
                Ok(result) => return result.map(|_| ()),
                Err(_would_block) => continue,
            }
        }
    }

    pub(crate) async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let fd = self.descriptor()?;
        tokio::select! {
            result = recv_ready(&fd, buf) => result,
            _ = self.closed.cancelled() => Err(closed_error()),
        }
    }

    /// Fails every later operation and releases the descriptor.
    pub(crate) fn close(&self) {
        self.closed.cancel();
        let released = self
            .fd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(released);
    }

    fn descriptor(&self) -> io::Result<Descriptor> {
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }
        self.fd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(closed_error)
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> Option<std::sync::Weak<AsyncFd<Socket>>> {
        self.fd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::downgrade)
    }
}

async fn recv_ready(fd: &AsyncFd<Socket>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut ready = fd.readable().await?;
        match ready.try_io(|inner| {
            let mut socket: &Socket = inner.get_ref();
            socket.read(buf)
        }) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

/// Read errors after which the receive loop keeps reading.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is closed")
}

fn parse_bind_address(bind_address: &str, network: Network) -> Result<IpAddr> {
    let address: IpAddr = bind_address
        .parse()
        .map_err(|_| Error::InvalidBindAddress(bind_address.into()))?;
    match (network, address) {
        (Network::Ipv4, IpAddr::V4(_)) | (Network::Ipv6, IpAddr::V6(_)) => Ok(address),
        _ => Err(Error::InvalidBindAddress(bind_address.into())),
    }
}
