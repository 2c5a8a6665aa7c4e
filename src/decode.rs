use crate::profile::{ChannelDescriptor, DataType, DeviceProfile, Quantity, Unit};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Unexpected poll packet length: expected {expected} but got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// One decoded channel value, ready for the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogSample {
    /// Position of the channel in the profile, which is also the host's channel order.
    pub channel_index: usize,
    pub channel: &'static ChannelDescriptor,
    pub raw: u32,
    pub value: f32,
}

impl AnalogSample {
    pub fn quantity(&self) -> Quantity {
        self.channel.quantity
    }

    pub fn unit(&self) -> Unit {
        self.channel.unit
    }

    pub fn digits(&self) -> u8 {
        self.channel.digits
    }
}

/// Receiver of decoded samples.
pub trait SampleSink {
    /// Called once per channel, in profile order, for every complete frame.
    fn send(&mut self, sample: &AnalogSample);

    /// Called after all channels of a frame were sent.
    fn frame_done(&mut self) {}

    /// Called exactly once when the acquisition stops.
    fn end_acquisition(&mut self) {}
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn send(&mut self, sample: &AnalogSample) {
        (**self).send(sample);
    }

    fn frame_done(&mut self) {
        (**self).frame_done();
    }

    fn end_acquisition(&mut self) {
        (**self).end_acquisition();
    }
}

/// Read the raw big-endian field of `channel` from `frame`.
///
/// Returns `None` only when the channel lies outside the frame, which a
/// validated profile rules out.
pub fn read_raw(frame: &[u8], channel: &ChannelDescriptor) -> Option<u32> {
    let bytes = frame.get(channel.span())?;
    let raw = match channel.data_type {
        DataType::UInt8 => u32::from(bytes[0]),
        DataType::UInt16 => u32::from(u16::from_be_bytes([bytes[0], bytes[1]])),
        DataType::UInt32 => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    };
    Some(raw)
}

fn decode_channel(frame: &[u8], index: usize, channel: &'static ChannelDescriptor) -> AnalogSample {
    let raw = read_raw(frame, channel).unwrap_or_else(|| {
        log::error!(
            "{}: field at offset {} ({:?}) lies outside the frame",
            channel.name,
            channel.offset,
            channel.data_type
        );
        0
    });

    AnalogSample {
        channel_index: index,
        channel,
        raw,
        value: raw as f32 * channel.scale,
    }
}

/// Decode every channel of `profile` from a complete frame.
pub fn decode(frame: &[u8], profile: &DeviceProfile) -> Result<Vec<AnalogSample>, FrameError> {
    let mut samples = Vec::with_capacity(profile.channels.len());
    decode_each(frame, profile, |sample| samples.push(*sample))?;
    Ok(samples)
}

/// Decode `frame` and hand each sample to `sink`, then mark the frame done.
pub fn decode_into<S: SampleSink + ?Sized>(
    frame: &[u8],
    profile: &DeviceProfile,
    sink: &mut S,
) -> Result<(), FrameError> {
    decode_each(frame, profile, |sample| sink.send(sample))?;
    sink.frame_done();
    Ok(())
}

fn decode_each(
    frame: &[u8],
    profile: &DeviceProfile,
    mut emit: impl FnMut(&AnalogSample),
) -> Result<(), FrameError> {
    log::trace!("Received poll packet (len: {})", frame.len());
    if frame.len() != profile.poll_len {
        return Err(FrameError::LengthMismatch {
            expected: profile.poll_len,
            actual: frame.len(),
        });
    }

    for (index, channel) in profile.channels().enumerate() {
        emit(&decode_channel(frame, index, channel));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::profile::tests::TEST_PROFILE;
    use crate::profile::UM24C;

    /// Collects every sample and counts lifecycle callbacks.
    #[derive(Debug, Default)]
    pub(crate) struct CollectingSink {
        pub samples: Vec<AnalogSample>,
        pub frames: usize,
        pub ended: usize,
    }

    impl CollectingSink {
        pub(crate) fn values(&self) -> Vec<f32> {
            self.samples.iter().map(|s| s.value).collect()
        }
    }

    impl SampleSink for CollectingSink {
        fn send(&mut self, sample: &AnalogSample) {
            self.samples.push(*sample);
        }

        fn frame_done(&mut self) {
            self.frames += 1;
        }

        fn end_acquisition(&mut self) {
            self.ended += 1;
        }
    }

    fn um24c_frame() -> Vec<u8> {
        let mut frame = vec![0u8; UM24C.poll_len];
        frame[..2].copy_from_slice(&[0x09, 0x63]);
        frame[0x02..0x04].copy_from_slice(&513u16.to_be_bytes()); // 5.13 V
        frame[0x04..0x06].copy_from_slice(&1234u16.to_be_bytes()); // 1.234 A
        frame[0x0a..0x0c].copy_from_slice(&31u16.to_be_bytes());
        frame[0x60..0x62].copy_from_slice(&60u16.to_be_bytes());
        frame[0x62..0x64].copy_from_slice(&270u16.to_be_bytes());
        frame[0x6a..0x6e].copy_from_slice(&123_456u32.to_be_bytes());
        frame[0x80..].copy_from_slice(&[0xff, 0xf1]);
        frame
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {} but got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_decode_small_frame() {
        let samples = decode(&[0xaa, 0xbb, 0x00, 0x64, 0xee, 0xff], &TEST_PROFILE).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].raw, 100);
        assert_close(samples[0].value, 10.0);
        assert_eq!(samples[0].digits(), 1);
    }

    #[test]
    fn test_decode_um24c_channels_in_order() {
        let samples = decode(&um24c_frame(), &UM24C).unwrap();
        let names: Vec<_> = samples.iter().map(|s| s.channel.name).collect();
        assert_eq!(names, ["V", "I", "D+", "D-", "Temp", "Energy"]);

        assert_close(samples[0].value, 5.13);
        assert_close(samples[1].value, 1.234);
        assert_close(samples[2].value, 0.60);
        assert_close(samples[3].value, 2.70);
        assert_close(samples[4].value, 31.0);
        assert_eq!(samples[4].unit(), Unit::Celsius);
        assert_close(samples[5].value, 123.456);
        assert_eq!(samples[5].quantity(), Quantity::Energy);
        assert!(samples.iter().enumerate().all(|(i, s)| s.channel_index == i));
    }

    #[test]
    fn test_raw_fields_reencode_to_frame_bytes() {
        let frame = um24c_frame();
        let mut rebuilt = frame.clone();
        for channel in UM24C.channels() {
            rebuilt[channel.span()].fill(0);
        }

        for sample in decode(&frame, &UM24C).unwrap() {
            let width = sample.channel.data_type.width();
            let bytes = sample.raw.to_be_bytes();
            rebuilt[sample.channel.span()].copy_from_slice(&bytes[4 - width..]);
        }
        assert_eq!(rebuilt, frame);
    }

    #[test]
    fn test_read_raw_widths() {
        let frame = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut channel = UM24C.channels[0];
        channel.offset = 1;
        channel.data_type = DataType::UInt8;
        assert_eq!(read_raw(&frame, &channel), Some(0x02));
        channel.data_type = DataType::UInt16;
        assert_eq!(read_raw(&frame, &channel), Some(0x0203));
        channel.data_type = DataType::UInt32;
        assert_eq!(read_raw(&frame, &channel), Some(0x0203_0405));
        channel.offset = 2;
        assert_eq!(read_raw(&frame, &channel), None);
    }

    #[test]
    fn test_field_outside_frame_decodes_as_zero() {
        static CHANNELS: [ChannelDescriptor; 1] = [ChannelDescriptor {
            name: "X",
            offset: 5,
            data_type: DataType::UInt16,
            scale: 1.0,
            digits: 0,
            quantity: Quantity::Voltage,
            unit: Unit::Volt,
        }];
        static CORRUPT: DeviceProfile = DeviceProfile {
            model_name: "CORRUPT",
            poll_period: 100,
            timeout: 50,
            poll_len: 6,
            poll_start: None,
            poll_end: None,
            channels: &CHANNELS,
        };

        assert!(CORRUPT.validate().is_err());
        let samples = decode(&[1, 2, 3, 4, 5, 6], &CORRUPT).unwrap();
        assert_eq!(samples[0].raw, 0);
        assert_eq!(samples[0].value, 0.0);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            decode(&[0xaa, 0xbb, 0x00, 0x64, 0xee], &TEST_PROFILE),
            Err(FrameError::LengthMismatch {
                expected: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn test_decode_into_sink() {
        let mut sink = CollectingSink::default();
        decode_into(&[0xaa, 0xbb, 0x01, 0x00, 0xee, 0xff], &TEST_PROFILE, &mut sink).unwrap();
        assert_eq!(sink.frames, 1);
        assert_eq!(sink.samples.len(), 1);
        assert_close(sink.values()[0], 25.6);
    }
}
