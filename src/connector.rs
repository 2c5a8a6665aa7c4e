use crate::decode::SampleSink;
use crate::limits::{AcquisitionLimits, SoftwareLimits};
use crate::probe::{probe, ProbeError};
use crate::profile::{DeviceProfile, ProfileError, ProfileRegistry};
use crate::session::PollSession;
use crate::transport::{SerialTransport, Transport, TransportError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Invalid device profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("No meter found. Please connect a meter or specify the port manually")]
    DeviceNotFound,
}

/// Settings for connecting to a meter and running an acquisition.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    port: Option<String>,
    baud_rate: u32,
    limit_samples: Option<u64>,
    limit_time: Option<Duration>,
    tick_interval: Duration,
}

impl AcquisitionConfig {
    pub fn new() -> Self {
        Self {
            port: None,
            baud_rate: SerialTransport::DEFAULT_BAUD_RATE,
            limit_samples: None,
            limit_time: None,
            tick_interval: Duration::from_millis(10),
        }
    }

    /// Use this serial port instead of scanning all of them.
    pub fn port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Stop after this many frames.
    pub fn limit_samples(mut self, samples: u64) -> Self {
        self.limit_samples = Some(samples);
        self
    }

    /// Stop after this much wall-clock time.
    pub fn limit_time(mut self, time: Duration) -> Self {
        self.limit_time = Some(time);
        self
    }

    /// How often the blocking run loop samples the port.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn get_port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn get_tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn limits(&self) -> SoftwareLimits {
        let mut limits = SoftwareLimits::new();
        if let Some(samples) = self.limit_samples {
            limits = limits.samples(samples);
        }
        if let Some(time) = self.limit_time {
            limits = limits.time(time);
        }
        limits
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A probed meter, ready to start polling.
#[derive(Debug)]
pub struct Meter<T = SerialTransport> {
    transport: T,
    profile: &'static DeviceProfile,
}

impl<T: Transport> Meter<T> {
    /// Probe `transport` against `registry`.
    pub fn probe(mut transport: T, registry: &ProfileRegistry) -> Result<Self, ProbeError> {
        let profile = probe(&mut transport, registry)?;
        Ok(Self { transport, profile })
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn model_name(&self) -> &'static str {
        self.profile.model_name
    }

    /// Hand the meter over to a poll session.
    pub fn start<S, L>(self, sink: S, limits: L) -> PollSession<T, S, L>
    where
        S: SampleSink,
        L: AcquisitionLimits,
    {
        PollSession::new(self.transport, self.profile, sink, limits)
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

pub struct MeterConnector;

impl MeterConnector {
    /// Connect to the meter named by `config`, or to the first port that
    /// answers the probe when no port is given.
    #[tracing::instrument(level = "debug", skip_all, fields(port = ?config.get_port()))]
    pub fn connect(config: &AcquisitionConfig) -> Result<Meter, ConnectorError> {
        let registry = ProfileRegistry::builtin()?;

        if let Some(port) = config.get_port() {
            log::debug!("Connecting to meter on port {}", port);
            let transport = SerialTransport::open(port, config.get_baud_rate())?;
            let meter = Meter::probe(transport, &registry)?;
            log::info!("Found {} on {}", meter.model_name(), port);
            return Ok(meter);
        }

        Self::get_working_serial(&registry, config.get_baud_rate())
    }

    /// Names of all serial ports on the system.
    pub fn available_ports() -> Result<Vec<String>, ConnectorError> {
        let ports = serialport::available_ports().map_err(TransportError::from)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn get_working_serial(
        registry: &ProfileRegistry,
        baud_rate: u32,
    ) -> Result<Meter, ConnectorError> {
        for port in Self::available_ports()? {
            log::debug!("Trying {}", port);
            let transport = match SerialTransport::open(&port, baud_rate) {
                Ok(transport) => transport,
                Err(e) => {
                    log::debug!("Cannot open {}: {}", port, e);
                    continue;
                }
            };

            match Meter::probe(transport, registry) {
                Ok(meter) => {
                    log::info!("Found {} on {}", meter.model_name(), port);
                    return Ok(meter);
                }
                Err(e) => log::debug!("No meter on {}: {}", port, e),
            }
        }

        Err(ConnectorError::DeviceNotFound)
    }
}
