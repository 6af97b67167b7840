use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;
use std::time::Duration;
use nix::sys::socket::{setsockopt, sockopt};
use tracing::{info, warn};

/// Where datagrams come from: a bound UDP socket, or a file of
/// back-to-back fixed-size PDUs being replayed.
pub(crate) enum PacketReader {
    Socket(UdpSocket),
    File(BufReader<File>),
}

pub(crate) enum ReadOutcome {
    /// One datagram of `len` bytes is in the buffer
    Datagram { len: usize, sender: Option<SocketAddr> },
    /// Nothing arrived within the poll interval
    Idle,
    /// The replay file is exhausted
    Finished,
}

impl PacketReader {
    pub(crate) fn bind(
        addr: SocketAddr,
        poll_interval: Duration,
        receive_buffer: Option<usize>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(poll_interval))?;
        if let Some(size) = receive_buffer {
            if let Err(e) = setsockopt(&socket, sockopt::RcvBuf, &size) {
                warn!("Unable to set receive buffer of {addr} to {size}: {e}");
            }
        }
        Ok(Self::Socket(socket))
    }

    pub(crate) fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::File(BufReader::new(File::open(path)?)))
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Socket(socket) => socket.local_addr().ok(),
            Self::File(_) => None,
        }
    }

    /// Reads the next datagram into `buf`. A socket read returns one
    /// datagram per call; a file read fills the whole buffer, and a short
    /// final read ends the replay.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        match self {
            Self::Socket(socket) => match socket.recv_from(buf) {
                Ok((len, sender)) => Ok(ReadOutcome::Datagram {
                    len,
                    sender: Some(sender),
                }),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) =>
                {
                    Ok(ReadOutcome::Idle)
                }
                Err(e) => Err(e),
            },
            Self::File(reader) => {
                let mut filled = 0;
                while filled < buf.len() {
                    match reader.read(&mut buf[filled..]) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                if filled == buf.len() {
                    Ok(ReadOutcome::Datagram {
                        len: filled,
                        sender: None,
                    })
                } else {
                    if filled > 0 {
                        info!("Short read; read {} of {} expected", filled, buf.len());
                    }
                    Ok(ReadOutcome::Finished)
                }
            }
        }
    }
}
