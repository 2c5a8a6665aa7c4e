use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte link to a meter.
///
/// Only the probe blocks; the polling path uses [`Transport::read_nonblocking`]
/// and [`Transport::bytes_available`] so that a single thread can drive it.
pub trait Transport {
    /// Write `bytes`, giving up after `timeout`. Returns the number of bytes written.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Read until `buf` is full or `timeout` elapses. Returns the number of bytes read,
    /// which is less than `buf.len()` only on timeout.
    fn read_blocking(&mut self, buf: &mut [u8], timeout: Duration)
        -> Result<usize, TransportError>;

    /// Read whatever is immediately available, up to `buf.len()`. Returns 0 when
    /// nothing is pending.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Number of inbound bytes waiting to be read. Used as the readiness signal.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    /// Throw away everything already received. Returns the number of bytes dropped.
    fn discard_input(&mut self) -> Result<usize, TransportError> {
        let mut scratch = [0u8; 64];
        let mut dropped = 0;
        loop {
            let n = self.read_nonblocking(&mut scratch)?;
            if n == 0 {
                return Ok(dropped);
            }
            dropped += n;
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).write(bytes, timeout)
    }

    fn read_blocking(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        (**self).read_blocking(buf, timeout)
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read_nonblocking(buf)
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        (**self).bytes_available()
    }

    fn discard_input(&mut self) -> Result<usize, TransportError> {
        (**self).discard_input()
    }
}

/// [`Transport`] over a `serialport` device.
#[derive(Debug)]
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    /// UM meters talk 9600 8N1 over their Bluetooth SPP or USB bridge.
    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    /// Open `port` and drop any stale bytes.
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let serial = serialport::new(port, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(10))
            .open()?;

        let mut transport = Self::from_port(serial);
        transport.flush()?;
        Ok(transport)
    }

    pub fn from_port(serial: Box<dyn SerialPort>) -> Self {
        let timeout = serial.timeout();
        Self { serial, timeout }
    }

    pub fn name(&self) -> Option<String> {
        self.serial.name()
    }

    /// Discard everything in the input and output buffers.
    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.serial.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if self.timeout != timeout {
            self.serial.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        self.set_timeout(timeout)?;
        // No flush: the poll path must not wait for the UART to drain.
        self.serial.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn read_blocking(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let start = Instant::now();
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            self.set_timeout(remaining)?;
            match self.serial.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(filled)
    }

    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let pending = self.bytes_available()?;
        if pending == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = pending.min(buf.len());
        match self.serial.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        Ok(self.serial.bytes_to_read()? as usize)
    }

    fn discard_input(&mut self) -> Result<usize, TransportError> {
        let pending = self.bytes_available()?;
        self.serial.clear(serialport::ClearBuffer::Input)?;
        Ok(pending)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{Transport, TransportError};
    use std::collections::VecDeque;
    use std::io::ErrorKind;
    use std::time::Duration;

    /// Scripted transport: inbound bytes are queued as chunks, each
    /// `read_nonblocking` call hands out at most one chunk.
    ///
    /// `late` chunks model bytes that trickle in after a blocking read gave
    /// up: one of them lands in `inbound` every time `read_blocking` comes
    /// back short.
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        pub inbound: VecDeque<Vec<u8>>,
        pub written: Vec<Vec<u8>>,
        pub fail_writes: bool,
        pub fail_reads: bool,
        /// Scripted replies: each successful write moves the next reply to `inbound`.
        pub replies: VecDeque<Vec<u8>>,
        pub late: VecDeque<Vec<u8>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn push(&mut self, bytes: &[u8]) {
            self.inbound.push_back(bytes.to_vec());
        }

        pub(crate) fn push_bytewise(&mut self, bytes: &[u8]) {
            for b in bytes {
                self.inbound.push_back(vec![*b]);
            }
        }

        pub(crate) fn reply_with(&mut self, bytes: &[u8]) {
            self.replies.push_back(bytes.to_vec());
        }

        pub(crate) fn arrive_late(&mut self, bytes: &[u8]) {
            self.late.push_back(bytes.to_vec());
        }

        fn io_error() -> TransportError {
            TransportError::Io(std::io::Error::new(ErrorKind::BrokenPipe, "link down"))
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
            if self.fail_writes {
                return Err(Self::io_error());
            }
            self.written.push(bytes.to_vec());
            if let Some(reply) = self.replies.pop_front() {
                self.inbound.push_back(reply);
            }
            Ok(bytes.len())
        }

        fn read_blocking(
            &mut self,
            buf: &mut [u8],
            _timeout: Duration,
        ) -> Result<usize, TransportError> {
            if self.fail_reads {
                return Err(Self::io_error());
            }
            let mut filled = 0;
            while filled < buf.len() {
                let Some(n) = self.take(&mut buf[filled..]) else {
                    break;
                };
                filled += n;
            }
            if filled < buf.len() {
                if let Some(chunk) = self.late.pop_front() {
                    self.inbound.push_back(chunk);
                }
            }
            Ok(filled)
        }

        fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            if self.fail_reads {
                return Err(Self::io_error());
            }
            Ok(self.take(buf).unwrap_or(0))
        }

        fn bytes_available(&mut self) -> Result<usize, TransportError> {
            Ok(self.inbound.iter().map(Vec::len).sum())
        }
    }

    impl MockTransport {
        fn take(&mut self, buf: &mut [u8]) -> Option<usize> {
            let chunk = self.inbound.front_mut()?;
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            chunk.drain(..n);
            if chunk.is_empty() {
                self.inbound.pop_front();
            }
            Some(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::Transport;
    use std::time::Duration;

    #[test]
    fn test_mock_nonblocking_reads_one_chunk_at_a_time() {
        let mut transport = MockTransport::new();
        transport.push(&[1, 2, 3]);
        transport.push(&[4]);

        let mut buf = [0u8; 8];
        assert_eq!(transport.bytes_available().unwrap(), 4);
        assert_eq!(transport.read_nonblocking(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(transport.read_nonblocking(&mut buf[..0]).unwrap(), 0);
        assert_eq!(transport.read_nonblocking(&mut buf).unwrap(), 1);
        assert_eq!(transport.read_nonblocking(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_mock_blocking_read_stops_short_when_drained() {
        let mut transport = MockTransport::new();
        transport.push(&[1, 2]);
        transport.push(&[3]);

        let mut buf = [0u8; 5];
        let n = transport
            .read_blocking(&mut buf, Duration::from_millis(1))
            .unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_late_chunk_lands_after_short_blocking_read() {
        let mut transport = MockTransport::new();
        transport.push(&[1, 2]);
        transport.arrive_late(&[3, 4]);

        let mut buf = [0u8; 4];
        let n = transport
            .read_blocking(&mut buf, Duration::from_millis(1))
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(transport.bytes_available().unwrap(), 2);
    }

    #[test]
    fn test_discard_input_drains_every_chunk() {
        let mut transport = MockTransport::new();
        transport.push(&[0u8; 100]);
        transport.push_bytewise(&[1, 2, 3]);

        assert_eq!(transport.discard_input().unwrap(), 103);
        assert_eq!(transport.bytes_available().unwrap(), 0);
        assert_eq!(transport.discard_input().unwrap(), 0);
    }

    #[test]
    fn test_discard_input_propagates_read_errors() {
        let mut transport = MockTransport::new();
        transport.push(&[1]);
        transport.fail_reads = true;
        assert!(transport.discard_input().is_err());
    }

    #[test]
    fn test_boxed_transport_forwards() {
        let mut transport: Box<dyn Transport> = Box::new(MockTransport::new());
        assert_eq!(transport.write(&[0xf0], Duration::from_millis(1)).unwrap(), 1);
        assert_eq!(transport.bytes_available().unwrap(), 0);
    }
}
