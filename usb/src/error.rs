use std::fmt::{Display, Formatter};

/// A raw return code from the USB backend.
///
/// For the libusb backend these are the `LIBUSB_ERROR_*` numbers, so a code
/// reported by the OS can always be recovered from a [`UsbError`] and compared
/// against libusb's own documentation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);
    pub const IO: StatusCode = StatusCode(-1);
    pub const INVALID_PARAM: StatusCode = StatusCode(-2);
    pub const ACCESS: StatusCode = StatusCode(-3);
    pub const NO_DEVICE: StatusCode = StatusCode(-4);
    pub const NOT_FOUND: StatusCode = StatusCode(-5);
    pub const BUSY: StatusCode = StatusCode(-6);
    pub const TIMEOUT: StatusCode = StatusCode(-7);
    pub const OVERFLOW: StatusCode = StatusCode(-8);
    pub const PIPE: StatusCode = StatusCode(-9);
    pub const INTERRUPTED: StatusCode = StatusCode(-10);
    pub const NO_MEM: StatusCode = StatusCode(-11);
    pub const NOT_SUPPORTED: StatusCode = StatusCode(-12);
    pub const OTHER: StatusCode = StatusCode(-99);

    /// Not a libusb code: reported when a handle is used (or closed) without a
    /// matching successful open.
    pub const NOT_OPEN: StatusCode = StatusCode(-100);

    pub fn name(&self) -> &'static str {
        match *self {
            StatusCode::SUCCESS => "SUCCESS",
            StatusCode::IO => "IO",
            StatusCode::INVALID_PARAM => "INVALID_PARAM",
            StatusCode::ACCESS => "ACCESS",
            StatusCode::NO_DEVICE => "NO_DEVICE",
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::BUSY => "BUSY",
            StatusCode::TIMEOUT => "TIMEOUT",
            StatusCode::OVERFLOW => "OVERFLOW",
            StatusCode::PIPE => "PIPE",
            StatusCode::INTERRUPTED => "INTERRUPTED",
            StatusCode::NO_MEM => "NO_MEM",
            StatusCode::NOT_SUPPORTED => "NOT_SUPPORTED",
            StatusCode::NOT_OPEN => "NOT_OPEN",
            _ => "OTHER",
        }
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl std::error::Error for StatusCode {}

impl From<rusb::Error> for StatusCode {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Io => StatusCode::IO,
            rusb::Error::InvalidParam => StatusCode::INVALID_PARAM,
            rusb::Error::Access => StatusCode::ACCESS,
            rusb::Error::NoDevice => StatusCode::NO_DEVICE,
            rusb::Error::NotFound => StatusCode::NOT_FOUND,
            rusb::Error::Busy => StatusCode::BUSY,
            rusb::Error::Timeout => StatusCode::TIMEOUT,
            rusb::Error::Overflow => StatusCode::OVERFLOW,
            rusb::Error::Pipe => StatusCode::PIPE,
            rusb::Error::Interrupted => StatusCode::INTERRUPTED,
            rusb::Error::NoMem => StatusCode::NO_MEM,
            rusb::Error::NotSupported => StatusCode::NOT_SUPPORTED,
            rusb::Error::BadDescriptor | rusb::Error::Other => StatusCode::OTHER,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferFailure {
    /// The device answered with a STALL handshake.
    Stall,
    Timeout,
    PipeError,
    Disconnected,
    Other,
}

impl From<StatusCode> for TransferFailure {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::PIPE => TransferFailure::Stall,
            StatusCode::TIMEOUT => TransferFailure::Timeout,
            StatusCode::IO | StatusCode::OVERFLOW | StatusCode::INTERRUPTED => {
                TransferFailure::PipeError
            }
            StatusCode::NO_DEVICE => TransferFailure::Disconnected,
            _ => TransferFailure::Other,
        }
    }
}

impl Display for TransferFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TransferFailure::Stall => "stall",
            TransferFailure::Timeout => "timeout",
            TransferFailure::PipeError => "pipe error",
            TransferFailure::Disconnected => "device disconnected",
            TransferFailure::Other => "other",
        };
        write!(f, "{}", text)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DescriptorFault {
    /// The device has no active configuration.
    Unconfigured,
    /// The device does not have the requested descriptor.
    NotPresent,
    Unreadable,
    Malformed,
}

impl Display for DescriptorFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DescriptorFault::Unconfigured => "device is not configured",
            DescriptorFault::NotPresent => "no such descriptor",
            DescriptorFault::Unreadable => "read failed",
            DescriptorFault::Malformed => "malformed descriptor",
        };
        write!(f, "{}", text)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UsbError {
    #[error("The handle is not open")]
    NotOpen,

    #[error("Unable to obtain the low-level USB interface: {0}")]
    HandshakeFailed(StatusCode),

    #[error("USB request failed ({failure}): {status}")]
    TransferFailed {
        failure: TransferFailure,
        status: StatusCode,
    },

    #[error("Descriptor unavailable ({reason}): {status}")]
    DescriptorUnavailable {
        reason: DescriptorFault,
        status: StatusCode,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl UsbError {
    pub const DOMAIN: &'static str = "usbdetective.usb.status";

    /// The backend code this error was built from.
    pub fn status(&self) -> StatusCode {
        match self {
            UsbError::NotOpen => StatusCode::NOT_OPEN,
            UsbError::HandshakeFailed(status) => *status,
            UsbError::TransferFailed { status, .. } => *status,
            UsbError::DescriptorUnavailable { status, .. } => *status,
            UsbError::InvalidArgument(_) => StatusCode::INVALID_PARAM,
        }
    }

    pub fn domain(&self) -> &'static str {
        Self::DOMAIN
    }

    pub(crate) fn malformed() -> Self {
        UsbError::DescriptorUnavailable {
            reason: DescriptorFault::Malformed,
            status: StatusCode::OTHER,
        }
    }

    /// Re-files a failure from a descriptor read under `DescriptorUnavailable`.
    ///
    /// A stall means the device refused the request, which is how devices
    /// report a descriptor they don't have.
    pub(crate) fn into_descriptor_error(self) -> Self {
        match self {
            UsbError::TransferFailed {
                failure: TransferFailure::Stall,
                status,
            } => UsbError::DescriptorUnavailable {
                reason: DescriptorFault::NotPresent,
                status,
            },
            UsbError::TransferFailed { status, .. } => UsbError::DescriptorUnavailable {
                reason: DescriptorFault::Unreadable,
                status,
            },
            other => other,
        }
    }
}

impl From<StatusCode> for UsbError {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_OPEN => UsbError::NotOpen,
            StatusCode::INVALID_PARAM => {
                UsbError::InvalidArgument("rejected by the USB backend")
            }
            status => UsbError::TransferFailed {
                failure: TransferFailure::from(status),
                status,
            },
        }
    }
}

impl From<rusb::Error> for UsbError {
    fn from(error: rusb::Error) -> Self {
        UsbError::from(StatusCode::from(error))
    }
}
