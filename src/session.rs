use crate::decode::{decode_into, SampleSink};
use crate::limits::AcquisitionLimits;
use crate::probe::WRITE_TIMEOUT;
use crate::profile::{DeviceProfile, POLL_REQUEST};
use crate::reassembly::FrameAssembler;
use crate::transport::Transport;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub resyncs: u64,
    pub polls_sent: u64,
    pub poll_failures: u64,
}

/// Steady-state acquisition from one probed meter.
///
/// Everything happens inside [`PollSession::tick`], which the owner calls on
/// every readiness notification and periodically in between. A poll request
/// goes out whenever the profile's poll period has elapsed since the last one,
/// whether or not a response arrived; stray or overlapping responses are
/// absorbed by the frame resync.
///
/// The acquisition limits are started with the `now` of the first tick and
/// only ever see the caller's clock.
pub struct PollSession<T, S, L> {
    transport: T,
    sink: S,
    limits: L,
    profile: &'static DeviceProfile,
    assembler: FrameAssembler,
    cmd_sent_at: Option<Instant>,
    started: bool,
    stopped: bool,
    stats: SessionStats,
}

impl<T, S, L> PollSession<T, S, L>
where
    T: Transport,
    S: SampleSink,
    L: AcquisitionLimits,
{
    pub fn new(transport: T, profile: &'static DeviceProfile, sink: S, limits: L) -> Self {
        log::debug!("Starting acquisition from {}", profile);

        Self {
            transport,
            sink,
            limits,
            profile,
            assembler: FrameAssembler::new(profile),
            cmd_sent_at: None,
            started: false,
            stopped: false,
            stats: SessionStats::default(),
        }
    }

    /// Advance the poll cycle.
    ///
    /// `bytes_available` tells whether the transport signalled inbound data.
    /// Never fails: I/O faults are logged and retried on a later tick.
    pub fn tick(&mut self, bytes_available: bool, now: Instant) -> TickStatus {
        if self.stopped {
            return TickStatus::Stopped;
        }

        if !self.started {
            self.limits.acquisition_started(now);
            self.started = true;
        }

        if bytes_available {
            self.receive(now);
        }

        if self.limits.limit_reached(now) {
            self.stop();
            return TickStatus::Stopped;
        }

        let poll_period = Duration::from_millis(u64::from(self.profile.poll_period));
        let due = self
            .cmd_sent_at
            .map_or(true, |sent| now.saturating_duration_since(sent) > poll_period);
        if due && !self.poll(now) {
            log::debug!("Poll request will be retried on the next tick");
        }

        TickStatus::Running
    }

    /// Send a single poll request. Returns whether it went out.
    ///
    /// A failed write leaves `cmd_sent_at` untouched, so the request stays due.
    fn poll(&mut self, now: Instant) -> bool {
        if let Err(e) = self.transport.write(&[POLL_REQUEST], WRITE_TIMEOUT) {
            log::error!("Unable to send poll request: {}", e);
            self.stats.poll_failures += 1;
            return false;
        }

        log::trace!("Poll request sent");
        self.cmd_sent_at = Some(now);
        self.stats.polls_sent += 1;
        true
    }

    fn receive(&mut self, now: Instant) {
        let Self {
            transport,
            sink,
            limits,
            profile,
            assembler,
            stats,
            ..
        } = self;

        assembler.on_bytes_available(transport, |frame| {
            // Frames queued behind the one that hit the limit are dropped.
            if limits.limit_reached(now) {
                return;
            }
            match decode_into(frame, *profile, &mut *sink) {
                Ok(()) => {
                    stats.frames_decoded += 1;
                    limits.record_samples_read(1);
                }
                Err(e) => {
                    log::error!("{}", e);
                    stats.frames_rejected += 1;
                }
            }
        });
    }

    /// End the acquisition. Any partial frame is discarded and the sink is
    /// told exactly once, however often this is called.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.assembler.reset();
        log::debug!(
            "Acquisition stopped after {} frames",
            self.stats.frames_decoded
        );
        self.sink.end_acquisition();
    }

    /// Drive the session from the calling thread until it stops.
    ///
    /// Readiness is sampled from [`Transport::bytes_available`] every
    /// `interval`. `cancel` is checked at the top of each iteration and stops
    /// the session when it returns true.
    pub fn run<C>(&mut self, interval: Duration, mut cancel: C)
    where
        C: FnMut() -> bool,
    {
        loop {
            if cancel() {
                self.stop();
                break;
            }

            let available = match self.transport.bytes_available() {
                Ok(n) => n > 0,
                Err(e) => {
                    log::error!("Failed to query pending input: {}", e);
                    false
                }
            };

            if self.tick(available, Instant::now()) == TickStatus::Stopped {
                break;
            }
            thread::sleep(interval);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_rejected: self.stats.frames_rejected + self.assembler.rejected_frames(),
            resyncs: self.assembler.resync_count(),
            ..self.stats
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn limits(&self) -> &L {
        &self.limits
    }

    pub fn into_parts(self) -> (T, S, L) {
        (self.transport, self.sink, self.limits)
    }
}
