use crate::profile::{DeviceProfile, ProfileRegistry, POLL_REQUEST};
use crate::transport::{Transport, TransportError};
use std::time::Duration;

pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to read probe response for {model}: expected {expected} bytes but got {actual}")]
    ShortRead {
        model: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Probe response contains illegal start marker for {model}")]
    StartMarkerMismatch { model: &'static str },

    #[error("Probe response contains illegal end marker for {model}")]
    EndMarkerMismatch { model: &'static str },

    #[error("No supported meter answered the probe")]
    NotFound,
}

impl ProbeError {
    /// Whether the error only rules out the profile that was tried.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            ProbeError::ShortRead { .. }
                | ProbeError::StartMarkerMismatch { .. }
                | ProbeError::EndMarkerMismatch { .. }
        )
    }
}

/// Send one probe request and check the response against `profile`.
///
/// Input already pending before the request is discarded, so a response that
/// straggled in after an earlier timeout cannot shift this one.
pub fn probe_profile<T: Transport + ?Sized>(
    transport: &mut T,
    profile: &'static DeviceProfile,
) -> Result<&'static DeviceProfile, ProbeError> {
    let model = profile.model_name;

    match transport.discard_input() {
        Ok(0) => {}
        Ok(n) => log::debug!("Discarded {} stale bytes before probing {}", n, model),
        Err(e) => {
            log::error!("Unable to discard pending input: {}", e);
            return Err(e.into());
        }
    }

    if let Err(e) = transport.write(&[POLL_REQUEST], WRITE_TIMEOUT) {
        log::error!("Unable to send probe request: {}", e);
        return Err(e.into());
    }

    let mut buf = vec![0u8; profile.poll_len];
    let timeout = Duration::from_millis(u64::from(profile.timeout));
    let len = match transport.read_blocking(&mut buf, timeout) {
        Ok(len) => len,
        Err(e) => {
            log::error!("Failed to read probe response: {}", e);
            return Err(e.into());
        }
    };

    if len != profile.poll_len {
        log::debug!("Short probe response for {}: {} of {} bytes", model, len, profile.poll_len);
        return Err(ProbeError::ShortRead {
            model,
            expected: profile.poll_len,
            actual: len,
        });
    }

    if !profile.start_marker_matches(&buf) {
        log::trace!("Probe response contains illegal start marker for {}", model);
        return Err(ProbeError::StartMarkerMismatch { model });
    }

    if !profile.end_marker_matches(&buf) {
        log::trace!("Probe response contains illegal end marker for {}", model);
        return Err(ProbeError::EndMarkerMismatch { model });
    }

    log::debug!("Probe matched {}", profile);
    Ok(profile)
}

/// Identify the attached meter by trying each registry candidate in turn.
///
/// Transport faults end the probe immediately. A short or mismatching response
/// only rules out the current candidate. The probe never retries a candidate;
/// that policy belongs to the caller.
#[tracing::instrument(level = "debug", skip_all, fields(candidates = registry.len()))]
pub fn probe<T: Transport + ?Sized>(
    transport: &mut T,
    registry: &ProfileRegistry,
) -> Result<&'static DeviceProfile, ProbeError> {
    for candidate in registry.candidates() {
        match probe_profile(transport, candidate) {
            Ok(profile) => return Ok(profile),
            Err(e) if e.is_mismatch() => {
                log::debug!("Candidate {} rejected: {}", candidate.model_name, e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(ProbeError::NotFound)
}
