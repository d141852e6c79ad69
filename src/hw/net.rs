//! Peer socket and asset download glue over embassy-net.
//!
//! The TCP work is async and runs in [`peer_task`] on the
//! high-priority executor; the event loop sees only [`PeerPort`],
//! which moves bytes through lock-free pipes and never waits.
//!
//! Asset downloads are the one blocking call in the system. They run
//! under a hard timeout, and the network stack keeps making progress
//! during the wait because its runner lives on the interrupt executor.

use crate::cache::AssetSource;
use crate::config::{ASSET_PORT, DOWNLOAD_TIMEOUT_MS, IMAGE_BYTES, MAX_FRAME_LEN, PEER_PORT};
use crate::error::Error;
use crate::link::PeerSocket;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_futures::block_on;
use embassy_futures::select::{select3, Either3};
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};
use heapless::Vec;

/// Inbound byte buffer between the socket task and the event loop.
const RX_PIPE_LEN: usize = 2_048;

/// Outbound frames queued for the socket task.
const TX_QUEUE_DEPTH: usize = 4;

pub struct NetShared {
    rx: Pipe<CriticalSectionRawMutex, RX_PIPE_LEN>,
    tx: Channel<CriticalSectionRawMutex, Vec<u8, MAX_FRAME_LEN>, TX_QUEUE_DEPTH>,
    close: Signal<CriticalSectionRawMutex, ()>,
    connected: AtomicBool,
    connect: AtomicBool,
}

impl NetShared {
    pub const fn new() -> Self {
        Self {
            rx: Pipe::new(),
            tx: Channel::new(),
            close: Signal::new(),
            connected: AtomicBool::new(false),
            connect: AtomicBool::new(false),
        }
    }
}

/// The event loop's synchronous view of the peer connection.
pub struct PeerPort {
    shared: &'static NetShared,
}

impl PeerPort {
    pub fn new(shared: &'static NetShared) -> Self {
        Self { shared }
    }
}

impl PeerSocket for PeerPort {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    fn start_connect(&mut self) {
        self.shared.connect.store(true, Ordering::Relaxed);
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let frame: Vec<u8, MAX_FRAME_LEN> =
            Vec::from_slice(data).map_err(|_| Error::BufferOverflow)?;
        self.shared
            .tx
            .try_send(frame)
            .map_err(|_| Error::BufferOverflow)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.shared.rx.try_read(buf) {
            Ok(n) => Ok(n),
            Err(_) => Ok(0),
        }
    }

    fn close(&mut self) {
        self.shared.close.signal(());
    }
}

/// Owns the peer TCP socket. Waits for a connect request, then shuttles
/// bytes both ways until the connection dies or the loop closes it.
#[embassy_executor::task]
pub async fn peer_task(stack: Stack<'static>, shared: &'static NetShared, peer_ip: [u8; 4]) {
    let mut rx_buf = [0u8; 2_048];
    let mut tx_buf = [0u8; 1_024];
    let endpoint = IpEndpoint::new(
        IpAddress::v4(peer_ip[0], peer_ip[1], peer_ip[2], peer_ip[3]),
        PEER_PORT,
    );

    loop {
        if !shared.connect.swap(false, Ordering::Relaxed) {
            Timer::after(Duration::from_millis(50)).await;
            continue;
        }

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(Duration::from_secs(30)));

        if let Err(e) = socket.connect(endpoint).await {
            defmt::warn!("peer: connect failed: {:?}", e);
            continue;
        }
        defmt::info!("peer: connected");
        shared.close.reset();
        shared.connected.store(true, Ordering::Relaxed);

        shuttle(&mut socket, shared).await;

        shared.connected.store(false, Ordering::Relaxed);
        socket.close();
        defmt::info!("peer: closed");
    }
}

async fn shuttle(socket: &mut TcpSocket<'_>, shared: &NetShared) {
    let mut chunk = [0u8; 256];
    loop {
        match select3(
            socket.read(&mut chunk),
            shared.tx.receive(),
            shared.close.wait(),
        )
        .await
        {
            Either3::First(Ok(0)) => return,
            Either3::First(Ok(n)) => {
                // Backpressure: slow frame processing stalls the socket
                // here instead of dropping bytes.
                shared.rx.write_all(&chunk[..n]).await;
            }
            Either3::First(Err(e)) => {
                defmt::warn!("peer: read error: {:?}", e);
                return;
            }
            Either3::Second(frame) => {
                if let Err(e) = socket.write_all(&frame).await {
                    defmt::warn!("peer: write error: {:?}", e);
                    return;
                }
            }
            Either3::Third(()) => return,
        }
    }
}

/// Fetch-by-name client for the companion asset port.
pub struct TcpAssetSource {
    stack: Stack<'static>,
    peer_ip: [u8; 4],
    rx_buf: [u8; 2_048],
    tx_buf: [u8; 512],
}

impl TcpAssetSource {
    pub fn new(stack: Stack<'static>, peer_ip: [u8; 4]) -> Self {
        Self {
            stack,
            peer_ip,
            rx_buf: [0; 2_048],
            tx_buf: [0; 512],
        }
    }

    async fn fetch(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, Error> {
        let endpoint = IpEndpoint::new(
            IpAddress::v4(
                self.peer_ip[0],
                self.peer_ip[1],
                self.peer_ip[2],
                self.peer_ip[3],
            ),
            ASSET_PORT,
        );

        let mut socket = TcpSocket::new(self.stack, &mut self.rx_buf, &mut self.tx_buf);
        socket
            .connect(endpoint)
            .await
            .map_err(|_| Error::DownloadFailed)?;

        socket
            .write_all(name.as_bytes())
            .await
            .map_err(|_| Error::DownloadFailed)?;
        socket
            .write_all(b"\n")
            .await
            .map_err(|_| Error::DownloadFailed)?;

        // Read until the fixed image size or the peer closes early.
        let mut total = 0;
        while total < buf.len().min(IMAGE_BYTES) {
            match socket.read(&mut buf[total..]).await {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(_) => return Err(Error::DownloadFailed),
            }
        }
        socket.close();
        Ok(total)
    }
}

impl AssetSource for TcpAssetSource {
    /// Bounded blocking download. The busy-wait is safe here because
    /// the net runner executes at interrupt priority and keeps the
    /// socket moving underneath it.
    fn download(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, Error> {
        defmt::info!("asset: downloading {}", name);
        block_on(with_timeout(
            Duration::from_millis(DOWNLOAD_TIMEOUT_MS),
            self.fetch(name, buf),
        ))
        .map_err(|_| Error::Timeout)?
    }
}
