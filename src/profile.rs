use std::fmt;

/// Byte sent to the meter both for the initial probe and for every poll.
pub const POLL_REQUEST: u8 = 0xf0;

/// Frame length shared by every UM series meter.
pub const UM_POLL_LEN: usize = 0x82;

const UM_POLL_END: &[u8] = &[0xff, 0xf1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
}

impl DataType {
    /// Width of the encoded field in bytes.
    pub const fn width(self) -> usize {
        match self {
            DataType::UInt8 => 1,
            DataType::UInt16 => 2,
            DataType::UInt32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Voltage,
    Current,
    Temperature,
    Energy,
}

impl Quantity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantity::Voltage => "voltage",
            Quantity::Current => "current",
            Quantity::Temperature => "temperature",
            Quantity::Energy => "energy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
    Ampere,
    Celsius,
    WattHour,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::Celsius => "°C",
            Unit::WattHour => "Wh",
        }
    }
}

/// One measurement field at a fixed position of the poll response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelDescriptor {
    pub name: &'static str,
    pub offset: usize,
    pub data_type: DataType,
    pub scale: f32,
    pub digits: u8,
    pub quantity: Quantity,
    pub unit: Unit,
}

impl ChannelDescriptor {
    /// Byte range covered by this channel inside a frame.
    pub const fn span(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.data_type.width()
    }
}

/// Static description of one meter model's wire frame.
#[derive(Debug, PartialEq)]
pub struct DeviceProfile {
    pub model_name: &'static str,
    /// Minimum spacing between poll requests, in ms.
    pub poll_period: u32,
    /// Timeout for the blocking probe read, in ms.
    pub timeout: u32,
    pub poll_len: usize,
    pub poll_start: Option<&'static [u8]>,
    pub poll_end: Option<&'static [u8]>,
    pub channels: &'static [ChannelDescriptor],
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Profile {model} has a zero frame length")]
    ZeroLength { model: &'static str },

    #[error("Profile {model} has a zero poll period")]
    ZeroPollPeriod { model: &'static str },

    #[error("Profile {model} declares an empty marker")]
    EmptyMarker { model: &'static str },

    #[error("Profile {model}: start and end markers do not fit in a {poll_len} byte frame")]
    MarkersTooLong { model: &'static str, poll_len: usize },

    #[error("Profile {model} defines no channels")]
    NoChannels { model: &'static str },

    #[error("Profile {model}: channel {channel} lies outside the {poll_len} byte frame")]
    ChannelOutOfBounds {
        model: &'static str,
        channel: &'static str,
        poll_len: usize,
    },
}

impl DeviceProfile {
    pub fn poll_start_len(&self) -> usize {
        self.poll_start.map_or(0, <[u8]>::len)
    }

    pub fn poll_end_len(&self) -> usize {
        self.poll_end.map_or(0, <[u8]>::len)
    }

    /// Channels in the order the host exposes them.
    pub fn channels(&self) -> impl ExactSizeIterator<Item = &'static ChannelDescriptor> {
        let channels: &'static [ChannelDescriptor] = self.channels;
        channels.iter()
    }

    /// True when `frame` carries this profile's start and end markers.
    pub fn matches_markers(&self, frame: &[u8]) -> bool {
        if frame.len() != self.poll_len {
            return false;
        }
        self.start_marker_matches(frame) && self.end_marker_matches(frame)
    }

    pub(crate) fn start_marker_matches(&self, frame: &[u8]) -> bool {
        match self.poll_start {
            Some(start) => frame.starts_with(start),
            None => true,
        }
    }

    pub(crate) fn end_marker_matches(&self, frame: &[u8]) -> bool {
        match self.poll_end {
            Some(end) => frame.ends_with(end),
            None => true,
        }
    }

    /// Check the frame shape invariants. Run once when a registry is built;
    /// the polling path assumes they hold.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let model = self.model_name;
        if self.poll_len == 0 {
            return Err(ProfileError::ZeroLength { model });
        }
        if self.poll_period == 0 {
            return Err(ProfileError::ZeroPollPeriod { model });
        }
        if self.poll_start.is_some_and(<[u8]>::is_empty) || self.poll_end.is_some_and(<[u8]>::is_empty)
        {
            return Err(ProfileError::EmptyMarker { model });
        }
        if self.poll_start_len() + self.poll_end_len() > self.poll_len {
            return Err(ProfileError::MarkersTooLong {
                model,
                poll_len: self.poll_len,
            });
        }
        if self.channels.is_empty() {
            return Err(ProfileError::NoChannels { model });
        }
        if let Some(channel) = self.channels.iter().find(|c| c.span().end > self.poll_len) {
            return Err(ProfileError::ChannelOutOfBounds {
                model,
                channel: channel.name,
                poll_len: self.poll_len,
            });
        }
        Ok(())
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} byte frame, {} channels)",
            self.model_name,
            self.poll_len,
            self.channels.len()
        )
    }
}

const fn channel(
    name: &'static str,
    offset: usize,
    data_type: DataType,
    scale: f32,
    digits: u8,
    quantity: Quantity,
    unit: Unit,
) -> ChannelDescriptor {
    ChannelDescriptor {
        name,
        offset,
        data_type,
        scale,
        digits,
        quantity,
        unit,
    }
}

static UM24C_CHANNELS: [ChannelDescriptor; 6] = [
    channel("V", 0x02, DataType::UInt16, 0.01, 2, Quantity::Voltage, Unit::Volt),
    channel("I", 0x04, DataType::UInt16, 0.001, 3, Quantity::Current, Unit::Ampere),
    channel("D+", 0x60, DataType::UInt16, 0.01, 2, Quantity::Voltage, Unit::Volt),
    channel("D-", 0x62, DataType::UInt16, 0.01, 2, Quantity::Voltage, Unit::Volt),
    channel("Temp", 0x0a, DataType::UInt16, 1.0, 0, Quantity::Temperature, Unit::Celsius),
    // Threshold-based recording, reported by the meter in mWh
    channel("Energy", 0x6a, DataType::UInt32, 0.001, 3, Quantity::Energy, Unit::WattHour),
];

static UM25C_CHANNELS: [ChannelDescriptor; 6] = [
    channel("V", 0x02, DataType::UInt16, 0.001, 3, Quantity::Voltage, Unit::Volt),
    channel("I", 0x04, DataType::UInt16, 0.0001, 4, Quantity::Current, Unit::Ampere),
    channel("D+", 0x60, DataType::UInt16, 0.01, 2, Quantity::Voltage, Unit::Volt),
    channel("D-", 0x62, DataType::UInt16, 0.01, 2, Quantity::Voltage, Unit::Volt),
    channel("Temp", 0x0a, DataType::UInt16, 1.0, 0, Quantity::Temperature, Unit::Celsius),
    channel("Energy", 0x6a, DataType::UInt32, 0.001, 3, Quantity::Energy, Unit::WattHour),
];

pub static UM24C: DeviceProfile = DeviceProfile {
    model_name: "UM24C",
    poll_period: 100,
    timeout: 1000,
    poll_len: UM_POLL_LEN,
    poll_start: Some(&[0x09, 0x63]),
    poll_end: Some(UM_POLL_END),
    channels: &UM24C_CHANNELS,
};

pub static UM25C: DeviceProfile = DeviceProfile {
    model_name: "UM25C",
    poll_period: 100,
    timeout: 1000,
    poll_len: UM_POLL_LEN,
    poll_start: Some(&[0x09, 0xc9]),
    poll_end: Some(UM_POLL_END),
    channels: &UM25C_CHANNELS,
};

pub static UM34C: DeviceProfile = DeviceProfile {
    model_name: "UM34C",
    poll_period: 100,
    timeout: 1000,
    poll_len: UM_POLL_LEN,
    poll_start: Some(&[0x0d, 0x4c]),
    poll_end: Some(UM_POLL_END),
    channels: &UM24C_CHANNELS,
};

/// Immutable set of profiles a probe may select from.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<&'static DeviceProfile>,
}

impl ProfileRegistry {
    /// Build a registry, validating every profile.
    pub fn new(profiles: Vec<&'static DeviceProfile>) -> Result<Self, ProfileError> {
        for profile in &profiles {
            profile.validate()?;
        }
        Ok(Self { profiles })
    }

    /// The meters supported out of the box.
    pub fn builtin() -> Result<Self, ProfileError> {
        Self::new(vec![&UM24C, &UM25C, &UM34C])
    }

    /// Probe candidates, in the order they are tried.
    pub fn candidates(&self) -> impl Iterator<Item = &'static DeviceProfile> + '_ {
        self.profiles.iter().copied()
    }

    pub fn lookup(&self, model_name: &str) -> Option<&'static DeviceProfile> {
        self.candidates()
            .find(|p| p.model_name.eq_ignore_ascii_case(model_name))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
