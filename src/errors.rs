/// The error type for everything that can go wrong when talking to a Push 2.
///
/// Recoverable transport conditions (device unplugged, transient write failure) are generally
/// absorbed by the library and surfaced as [`MidiDisconnected`](crate::Event::MidiDisconnected) /
/// [`DisplayDisconnected`](crate::Event::DisplayDisconnected) events instead of being returned
/// from steady-state calls. The variants below show up either during explicit connection attempts
/// or for outright programmer errors (wrong frame shape, bad palette arguments).
#[derive(Debug)]
pub enum Error {
    /// Enumeration found no matching USB or MIDI device
    DeviceNotFound,
    /// The device was found but endpoint/interface setup failed
    DeviceConfigurationError,
    /// A write failed after the transport had been configured. Triggers a disconnect transition,
    /// not a fatal condition
    TransportError,
    /// The caller supplied a pixel buffer that is not exactly 960x160
    InvalidFrameDimensions { expected: usize, got: usize },
    /// Out-of-range palette index, missing color values, or a duplicate color name without
    /// the override flag
    InvalidPaletteArguments(String),
    InputConnectError(midir::ConnectError<midir::MidiInput>),
    OutputConnectError(midir::ConnectError<midir::MidiOutput>),
    InitError(midir::InitError),
    PortInfoError(midir::PortInfoError),
    SendError(midir::SendError),
    UsbError(rusb::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceNotFound => f.write_str("no Push 2 device found"),
            Self::DeviceConfigurationError => {
                f.write_str("Push 2 found but endpoint/interface setup failed")
            }
            Self::TransportError => f.write_str("write to the device failed"),
            Self::InvalidFrameDimensions { expected, got } => write!(
                f,
                "pixel buffer has {} elements but the display needs exactly {}",
                got, expected
            ),
            Self::InvalidPaletteArguments(explanation) => {
                write!(f, "invalid palette arguments: {}", explanation)
            }
            Self::InputConnectError(_) => f.write_str("connecting to MIDI input port failed"),
            Self::OutputConnectError(_) => f.write_str("connecting to MIDI output port failed"),
            Self::InitError(_) => f.write_str("MIDI context initialization failed"),
            Self::PortInfoError(_) => f.write_str("MIDI port retrieval failed"),
            Self::SendError(_) => f.write_str("sending MIDI message failed"),
            Self::UsbError(_) => f.write_str("USB operation failed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InputConnectError(e) => Some(e),
            Self::OutputConnectError(e) => Some(e),
            Self::InitError(e) => Some(e),
            Self::PortInfoError(e) => Some(e),
            Self::SendError(e) => Some(e),
            Self::UsbError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Self::InputConnectError(e)
    }
}

impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Self::OutputConnectError(e)
    }
}

impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Self::InitError(e)
    }
}

impl From<midir::PortInfoError> for Error {
    fn from(e: midir::PortInfoError) -> Self {
        Self::PortInfoError(e)
    }
}

impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Self::SendError(e)
    }
}

impl From<rusb::Error> for Error {
    fn from(e: rusb::Error) -> Self {
        Self::UsbError(e)
    }
}
