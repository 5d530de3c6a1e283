use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::ipc::error::ChannelError;
use crate::kernel::constants::MAX_FRAME_LEN;

type ChannelResult<T> = std::result::Result<T, ChannelError>;

const READ_CHUNK: usize = 8 * 1024;

/// Shared "banished" flag. Once set it stays set; every retry loop holding a
/// clone gives up at its next poll.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn banish(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_banished(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Non-blocking, message-oriented endpoint.
///
/// None of these calls wait: `try_flush` and `try_recv` report "not yet" and the
/// caller decides whether to poll again (see [`send_with_retry`] / [`recv_with_retry`]).
pub trait Channel: Send {
    /// Encode `message` and append it to the outgoing buffer
    fn queue<T: Serialize + ?Sized>(&mut self, message: &T) -> ChannelResult<()>;

    /// Push buffered bytes to the peer. `Ok(true)` once everything is written.
    fn try_flush(&mut self) -> ChannelResult<bool>;

    /// Next complete message if one has arrived
    fn try_recv<T: DeserializeOwned>(&mut self) -> ChannelResult<Option<T>>;
}

/// Send `message`, retrying every `poll_interval` until written or `cancel` is set
pub async fn send_with_retry<C, T>(
    channel: &mut C,
    message: &T,
    cancel: &CancellationFlag,
    poll_interval: Duration,
) -> ChannelResult<()>
where
    C: Channel,
    T: Serialize + Sync + ?Sized,
{
    channel.queue(message)?;
    loop {
        if cancel.is_banished() {
            return Err(ChannelError::cancelled("send"));
        }
        if channel.try_flush()? {
            return Ok(());
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Receive one message, retrying every `poll_interval` until it arrives or `cancel` is set
pub async fn recv_with_retry<C, T>(channel: &mut C, cancel: &CancellationFlag, poll_interval: Duration) -> ChannelResult<T>
where
    C: Channel,
    T: DeserializeOwned,
{
    loop {
        if cancel.is_banished() {
            return Err(ChannelError::cancelled("recv"));
        }
        if let Some(message) = channel.try_recv()? {
            return Ok(message);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// `u32` little-endian payload length followed by the JSON payload
pub fn encode_frame<T: Serialize + ?Sized>(message: &T) -> ChannelResult<Vec<u8>> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(ChannelError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN as usize,
        });
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    WriteBytesExt::write_u32::<LittleEndian>(&mut frame, payload.len() as u32)?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Split one complete frame off the front of `buf`, if present
pub fn take_frame(buf: &mut Vec<u8>) -> ChannelResult<Option<Vec<u8>>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = ReadBytesExt::read_u32::<LittleEndian>(&mut &buf[..4])? as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(ChannelError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN as usize,
        });
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }
    let payload = buf[4..4 + len].to_vec();
    buf.drain(..4 + len);
    Ok(Some(payload))
}

fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> ChannelResult<T> {
    serde_json::from_slice(payload).map_err(|e| {
        if e.is_data() {
            ChannelError::UnexpectedMessage {
                expected: std::any::type_name::<T>().to_string(),
                actual: String::from_utf8_lossy(payload).into_owned(),
            }
        } else {
            ChannelError::Codec(e)
        }
    })
}

/// [`Channel`] over a TCP stream using `try_read` / `try_write`
#[derive(Debug)]
pub struct FramedChannel {
    stream: TcpStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    write_pos: usize,
}

impl FramedChannel {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
            write_pos: 0,
        }
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> ChannelResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn has_pending_send(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }
}

impl Channel for FramedChannel {
    fn queue<T: Serialize + ?Sized>(&mut self, message: &T) -> ChannelResult<()> {
        let frame = encode_frame(message)?;
        self.write_buf.extend_from_slice(&frame);
        Ok(())
    }

    fn try_flush(&mut self) -> ChannelResult<bool> {
        while self.has_pending_send() {
            match self.stream.try_write(&self.write_buf[self.write_pos..]) {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(n) => self.write_pos += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect(&e) => return Err(ChannelError::Closed),
                Err(e) => return Err(e.into()),
            }
        }
        self.write_buf.clear();
        self.write_pos = 0;
        Ok(true)
    }

    fn try_recv<T: DeserializeOwned>(&mut self) -> ChannelResult<Option<T>> {
        loop {
            if let Some(payload) = take_frame(&mut self.read_buf)? {
                return decode_payload(&payload).map(Some);
            }
            let mut chunk = [0u8; READ_CHUNK];
            match self.stream.try_read(&mut chunk) {
                Ok(0) => return Err(ChannelError::Closed),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect(&e) => return Err(ChannelError::Closed),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}
