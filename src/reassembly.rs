use crate::profile::DeviceProfile;
use crate::transport::Transport;

/// Rebuilds fixed-length poll responses from an unframed byte stream.
///
/// Bytes are accumulated into a buffer sized to the profile's frame. Whenever
/// the buffer holds exactly as many bytes as the start marker, they are
/// compared against it; on mismatch the oldest byte is dropped and the rest
/// slide down by one. A full buffer is checked against the end marker and
/// either handed on or discarded. The buffer never holds more than one frame.
#[derive(Debug)]
pub struct FrameAssembler {
    profile: &'static DeviceProfile,
    buf: Box<[u8]>,
    cursor: usize,
    resyncs: u64,
    rejected: u64,
}

impl FrameAssembler {
    pub fn new(profile: &'static DeviceProfile) -> Self {
        Self {
            profile,
            buf: vec![0u8; profile.poll_len].into_boxed_slice(),
            cursor: 0,
            resyncs: 0,
            rejected: 0,
        }
    }

    /// Bytes of the current frame accumulated so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes dropped while hunting for a start marker.
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// Complete frames discarded for a bad end marker.
    pub fn rejected_frames(&self) -> u64 {
        self.rejected
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Drain everything `transport` has pending without blocking.
    ///
    /// `on_frame` is called once for every complete frame that passes the
    /// marker checks. Returns the number of such frames.
    pub fn on_bytes_available<T, F>(&mut self, transport: &mut T, mut on_frame: F) -> usize
    where
        T: Transport + ?Sized,
        F: FnMut(&[u8]),
    {
        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("on_bytes_available"), 0));

        let poll_len = self.profile.poll_len;
        let mut completed = 0;

        loop {
            let n = match transport.read_nonblocking(&mut self.buf[self.cursor..poll_len]) {
                Ok(n) => n,
                Err(e) => {
                    log::error!("Failed to read poll data: {}", e);
                    break;
                }
            };
            if n == 0 {
                break;
            }
            if self.absorb(n, &mut on_frame) {
                completed += 1;
            }
        }

        completed
    }

    /// Push `bytes` through the assembler as if they had just been read.
    pub fn feed<F>(&mut self, mut bytes: &[u8], mut on_frame: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let mut completed = 0;

        while !bytes.is_empty() {
            let n = (self.profile.poll_len - self.cursor).min(bytes.len());
            self.buf[self.cursor..self.cursor + n].copy_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            if self.absorb(n, &mut on_frame) {
                completed += 1;
            }
        }

        completed
    }

    /// Account for `n` fresh bytes sitting at `buf[cursor..cursor + n]`.
    fn absorb<F>(&mut self, n: usize, on_frame: &mut F) -> bool
    where
        F: FnMut(&[u8]),
    {
        let mut end = self.cursor + n;

        while self.cursor < end {
            self.cursor += 1;

            if let Some(start) = self.profile.poll_start {
                if self.cursor == start.len() && self.buf[..start.len()] != *start {
                    log::warn!(
                        "Illegal poll header, skipping 1 byte (0x{:02x})",
                        self.buf[0]
                    );
                    self.buf.copy_within(1..end, 0);
                    self.cursor -= 1;
                    end -= 1;
                    self.resyncs += 1;
                }
            }
        }

        if self.cursor < self.profile.poll_len {
            return false;
        }

        self.cursor = 0;
        if self.profile.end_marker_matches(&self.buf[..]) {
            on_frame(&self.buf[..]);
            true
        } else {
            log::warn!("Skipping packet with illegal end marker");
            self.rejected += 1;
            false
        }
    }
}
