//! TCP connection to a collector.

use std::{
    io,
    net::{Shutdown, SocketAddr, TcpStream},
    time::Duration,
};

use crate::codec::RecordWriter;

/// Open connection carrying framed records.
pub struct Connection {
    peer: SocketAddr,
    writer: RecordWriter<TcpStream>,
}

impl Connection {
    /// Connect with a timeout and configure the socket for record writes.
    pub fn open(
        peer: SocketAddr,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&peer, connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(write_timeout))?;
        Ok(Self {
            peer,
            writer: RecordWriter::new(stream),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Write one framed record in full.
    pub fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_frame(frame).map(|_| ())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Write);
    }
}
