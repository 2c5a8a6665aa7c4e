//! # RDTech UM RS
//!
//! A Rust driver core for RDTech UM series USB power meters (UM24C, UM25C, UM34C).
//!
//! The meters answer a single poll byte with a fixed-length binary frame. This
//! library identifies the attached meter, keeps a steady poll cycle going over
//! an unreliable serial link, rebuilds frames from arbitrarily sized reads,
//! resynchronizes on corrupted or misaligned data and decodes every frame into
//! physical measurements.
//!
//! ## Features
//!
//! - **Probing**: identifies the meter model from its response frame
//! - **Frame reassembly**: tolerates partial reads, dropped bytes and noise
//! - **Declarative profiles**: channel offsets, widths and scales as static data
//! - **Single-threaded polling**: a tick-driven scheduler with sample and time limits
//! - **DataFrame output**: records acquisitions into a `polars` `DataFrame`
//!
//! ## Examples
//!
//! ### Connecting and Polling
//!
//! ```rust,no_run
//! use rdtech_um_rs::{AcquisitionConfig, DataFrameRecorder, MeterConnector};
//!
//! let config = AcquisitionConfig::new()
//!     .port("/dev/rfcomm0")
//!     .limit_samples(10);
//!
//! let meter = MeterConnector::connect(&config)?;
//! let recorder = DataFrameRecorder::new(meter.profile());
//! let mut session = meter.start(recorder, config.limits());
//! session.run(config.get_tick_interval(), || false);
//!
//! let (_, recorder, _) = session.into_parts();
//! println!("{}", recorder.to_dataframe()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Decoding a Frame
//!
//! ```rust
//! use rdtech_um_rs::{decode, UM24C};
//!
//! let mut frame = vec![0u8; UM24C.poll_len];
//! frame[..2].copy_from_slice(&[0x09, 0x63]);
//! frame[2..4].copy_from_slice(&500u16.to_be_bytes());
//! frame[0x80..].copy_from_slice(&[0xff, 0xf1]);
//!
//! let samples = decode(&frame, &UM24C).unwrap();
//! assert_eq!(samples[0].channel.name, "V");
//! assert!((samples[0].value - 5.0).abs() < 1e-6);
//! ```
//!
//! ### Driving the Poll Cycle Yourself
//!
//! ```rust,no_run
//! use rdtech_um_rs::{probe, PollSession, ProfileRegistry, SerialTransport, SoftwareLimits, TickStatus};
//! use rdtech_um_rs::{AnalogSample, SampleSink};
//! use std::time::Instant;
//!
//! struct Printer;
//!
//! impl SampleSink for Printer {
//!     fn send(&mut self, sample: &AnalogSample) {
//!         println!("{} = {} {}", sample.channel.name, sample.value, sample.unit().symbol());
//!     }
//! }
//!
//! let registry = ProfileRegistry::builtin()?;
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", SerialTransport::DEFAULT_BAUD_RATE)?;
//! let profile = probe(&mut transport, &registry)?;
//!
//! let mut session = PollSession::new(transport, profile, Printer, SoftwareLimits::new().samples(5));
//! // Call `tick` from your own event loop whenever the port becomes readable.
//! while session.tick(true, Instant::now()) == TickStatus::Running {}
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod connector;
pub mod decode;
pub mod limits;
pub mod probe;
pub mod profile;
pub mod reassembly;
pub mod recorder;
pub mod session;
pub mod transport;

// Re-export the main types for convenience
pub use profile::{
    ChannelDescriptor, DataType, DeviceProfile, ProfileError, ProfileRegistry, Quantity, Unit,
    POLL_REQUEST, UM24C, UM25C, UM34C,
};

pub use transport::{SerialTransport, Transport, TransportError};

pub use probe::{probe, probe_profile, ProbeError};

pub use reassembly::FrameAssembler;

pub use decode::{decode, decode_into, read_raw, AnalogSample, FrameError, SampleSink};

pub use limits::{AcquisitionLimits, SoftwareLimits};

pub use session::{PollSession, SessionStats, TickStatus};

pub use connector::{AcquisitionConfig, ConnectorError, Meter, MeterConnector};

pub use recorder::DataFrameRecorder;
