// Control transfer plumbing for the default pipe (endpoint 0). Field names on SetupPacket
// follow USB 2.0 section 9.3 to match the standard request tables.

pub use rusb::{request_type, Direction, Recipient, RequestType};

// Direction bit of bmRequestType (USB 2.0 table 9-2)
pub const DEVICE_TO_HOST: u8 = 0x80;

// Standard requests (USB 2.0 table 9-4)
pub const GET_STATUS: u8 = 0;
pub const GET_DESCRIPTOR: u8 = 6;

// Descriptor types (USB 2.0 table 9-5)
pub const DEVICE_DESCRIPTOR: u8 = 1;
pub const CONFIGURATION_DESCRIPTOR: u8 = 2;
pub const STRING_DESCRIPTOR: u8 = 3;
pub const INTERFACE_DESCRIPTOR: u8 = 4;
pub const ENDPOINT_DESCRIPTOR: u8 = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(non_snake_case)] // These names are from USB 2.0 table 9-2
pub struct SetupPacket {
    pub bmRequestType: u8,
    pub bRequest: u8,
    pub wValue: u16,
    pub wIndex: u16,
    pub wLength: u16,
}

impl SetupPacket {
    pub fn direction(&self) -> Direction {
        if self.bmRequestType & DEVICE_TO_HOST != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// A standard GET_DESCRIPTOR request.
    pub fn get_descriptor(descriptor_type: u8, index: u8, language: u16, length: u16) -> Self {
        Self {
            bmRequestType: request_type(Direction::In, RequestType::Standard, Recipient::Device),
            bRequest: GET_DESCRIPTOR,
            wValue: (descriptor_type as u16) << 8 | index as u16,
            wIndex: language,
            wLength: length,
        }
    }
}

/// The optional data stage following a SETUP packet.
pub enum DataPhase<'a> {
    In(&'a mut [u8]),
    Out(&'a [u8]),
    None,
}

#[allow(clippy::len_without_is_empty)]
impl DataPhase<'_> {
    pub fn is_in(&self) -> bool {
        matches!(self, DataPhase::In(_))
    }

    pub fn is_out(&self) -> bool {
        matches!(self, DataPhase::Out(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DataPhase::None)
    }

    pub fn len(&self) -> usize {
        match self {
            DataPhase::In(buf) => buf.len(),
            DataPhase::Out(buf) => buf.len(),
            DataPhase::None => 0,
        }
    }

    /// Runs `f` over the receive buffer, if this is an IN stage.
    pub fn in_with<F: FnOnce(&mut [u8])>(&mut self, f: F) {
        if let DataPhase::In(buf) = self {
            f(buf)
        }
    }
}

/// A control transfer on the default pipe.
///
/// `length` is both an input and an output: it gives the number of bytes to
/// send or receive (at most `data.len()`), and after a successful
/// [`DeviceHandle::device_request`](crate::DeviceHandle::device_request) it
/// holds the number of bytes actually transferred.
#[derive(Debug)]
pub struct ControlRequest<'a> {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: &'a mut [u8],
    pub length: u16,
}

impl<'a> ControlRequest<'a> {
    /// A device-to-host request filling as much of `data` as the device sends.
    ///
    /// `wLength` is 16 bits, so at most the first 65535 bytes of `data` are used.
    pub fn read(request_type: u8, request: u8, value: u16, index: u16, data: &'a mut [u8]) -> Self {
        let length = data.len().min(u16::MAX as usize) as u16;
        Self {
            request_type: request_type | DEVICE_TO_HOST,
            request,
            value,
            index,
            data,
            length,
        }
    }

    /// A host-to-device request sending all of `data`, up to the same 65535
    /// byte cap as [`ControlRequest::read`].
    pub fn write(request_type: u8, request: u8, value: u16, index: u16, data: &'a mut [u8]) -> Self {
        let length = data.len().min(u16::MAX as usize) as u16;
        Self {
            request_type: request_type & !DEVICE_TO_HOST,
            request,
            value,
            index,
            data,
            length,
        }
    }

    pub fn setup(&self) -> SetupPacket {
        SetupPacket {
            bmRequestType: self.request_type,
            bRequest: self.request,
            wValue: self.value,
            wIndex: self.index,
            wLength: self.length,
        }
    }

    pub fn direction(&self) -> Direction {
        self.setup().direction()
    }

    /// The bytes received (or sent) by the last completed transfer.
    pub fn transferred(&self) -> &[u8] {
        let length = (self.length as usize).min(self.data.len());
        &self.data[..length]
    }
}
