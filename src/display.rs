//! The USB bulk-OUT transport for the Push 2 display.
//!
//! Owns the device handle, reconfigures itself (rate-limited) when the pipe is gone, and
//! retains the last prepared frame so callers can redisplay without re-encoding. Every write
//! is bounded by a timeout; nothing in here blocks indefinitely or panics when the hardware
//! is absent.

use std::time::{Duration, Instant};

use rusb::{Context, DeviceHandle, Direction, TransferType, UsbContext};

use crate::pixel::{PreparedFrame, FRAME_HEADER};
use crate::util::RateLimiter;
use crate::Error;

const VENDOR_ID: u16 = 0x2982;
const PRODUCT_ID: u16 = 0x1967;

enum State {
    Unconfigured,
    Configured(Connection),
    /// The device was found but endpoint/interface setup or the trial write failed. Treated
    /// like `Unconfigured` for retry purposes; kept separate for diagnostics.
    Failed,
}

struct Connection {
    handle: DeviceHandle<Context>,
    endpoint: u8,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.handle.release_interface(0);
    }
}

/// What happened to a frame handed to [`DisplayTransport::send`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SendOutcome {
    Sent,
    /// No configured pipe and (re)configuration didn't happen or didn't succeed
    Dropped,
    /// The pipe was configured but the write failed; the transport is unconfigured again and
    /// the caller should announce the disconnect
    Disconnected,
}

pub(crate) struct DisplayTransport {
    state: State,
    limiter: RateLimiter,
    timeout: Duration,
    last_frame: Option<PreparedFrame>,
}

impl DisplayTransport {
    pub fn new(reconnect_interval: Duration, timeout: Duration) -> Self {
        Self {
            state: State::Unconfigured,
            limiter: RateLimiter::new(reconnect_interval),
            timeout,
            last_frame: None,
        }
    }

    pub fn configured(&self) -> bool {
        matches!(self.state, State::Configured(_))
    }

    /// Enumerates USB devices, claims the display interface, picks the bulk-OUT endpoint and
    /// verifies the pipe with a trial black frame.
    pub fn configure(&mut self) -> Result<(), Error> {
        self.state = State::Unconfigured;

        let context = Context::new()?;
        let device = context
            .devices()?
            .iter()
            .find(|device| {
                device.device_descriptor().map_or(false, |descriptor| {
                    descriptor.vendor_id() == VENDOR_ID && descriptor.product_id() == PRODUCT_ID
                })
            })
            .ok_or(Error::DeviceNotFound)?;

        let mut handle = match device.open() {
            Ok(handle) => handle,
            Err(e) => {
                self.state = State::Failed;
                return Err(e.into());
            }
        };
        // On Linux the kernel may hold the interface; not fatal if unsupported elsewhere
        let _ = handle.set_auto_detach_kernel_driver(true);

        if handle.claim_interface(0).is_err() {
            self.state = State::Failed;
            return Err(Error::DeviceConfigurationError);
        }

        let endpoint = match Self::find_bulk_out_endpoint(&handle) {
            Some(endpoint) => endpoint,
            None => {
                self.state = State::Failed;
                return Err(Error::DeviceConfigurationError);
            }
        };

        let mut connection = Connection { handle, endpoint };
        // Trial write so a dead pipe is discovered here and not on the first real frame
        if Self::write_frame(&mut connection, &PreparedFrame::black(), self.timeout).is_err() {
            self.state = State::Failed;
            return Err(Error::TransportError);
        }

        log::info!("display configured, bulk-OUT endpoint 0x{:02x}", endpoint);
        self.state = State::Configured(connection);
        self.limiter.reset();
        Ok(())
    }

    fn find_bulk_out_endpoint(handle: &DeviceHandle<Context>) -> Option<u8> {
        let config = handle.device().active_config_descriptor().ok()?;
        let interface = config.interfaces().next()?;
        for descriptor in interface.descriptors() {
            for endpoint in descriptor.endpoint_descriptors() {
                if endpoint.direction() == Direction::Out
                    && endpoint.transfer_type() == TransferType::Bulk
                {
                    return Some(endpoint.address());
                }
            }
        }
        None
    }

    /// Sends a prepared frame, reconfiguring first (rate-limited) when the pipe is down. The
    /// frame is retained for [`redisplay`](Self::redisplay) regardless of the outcome.
    pub fn send(&mut self, frame: &PreparedFrame) -> SendOutcome {
        self.last_frame = Some(frame.clone());
        self.send_current(frame)
    }

    /// Resends the previously sent frame. No-op when no frame was ever sent.
    pub fn redisplay(&mut self) -> SendOutcome {
        match self.last_frame.take() {
            Some(frame) => {
                let outcome = self.send_current(&frame);
                self.last_frame = Some(frame);
                outcome
            }
            None => SendOutcome::Dropped,
        }
    }

    fn send_current(&mut self, frame: &PreparedFrame) -> SendOutcome {
        if !self.configured() {
            if !self.limiter.check(Instant::now()) {
                return SendOutcome::Dropped;
            }
            if let Err(e) = self.configure() {
                log::debug!("display (re)configuration failed: {}", e);
                return SendOutcome::Dropped;
            }
        }

        let connection = match &mut self.state {
            State::Configured(connection) => connection,
            _ => return SendOutcome::Dropped,
        };

        match Self::write_frame(connection, frame, self.timeout) {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                log::warn!("display write failed, marking unconfigured: {}", e);
                self.state = State::Unconfigured;
                SendOutcome::Disconnected
            }
        }
    }

    fn write_frame(
        connection: &mut Connection,
        frame: &PreparedFrame,
        timeout: Duration,
    ) -> Result<(), Error> {
        connection
            .handle
            .write_bulk(connection.endpoint, &FRAME_HEADER, timeout)?;
        connection
            .handle
            .write_bulk(connection.endpoint, frame.bytes(), timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redisplay_without_a_frame_is_a_no_op() {
        let mut display = DisplayTransport::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(display.redisplay(), SendOutcome::Dropped);
    }

    #[test]
    fn send_without_hardware_is_dropped_and_rate_limited() {
        let mut display = DisplayTransport::new(Duration::from_secs(60), Duration::from_secs(1));
        let frame = PreparedFrame::black();
        // First call actually probes (and fails without a device), second is rate-limited;
        // neither may panic or block
        assert_eq!(display.send(&frame), SendOutcome::Dropped);
        assert_eq!(display.send(&frame), SendOutcome::Dropped);
        assert!(!display.configured());
    }
}
