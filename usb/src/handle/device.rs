use crate::backend::{DeviceInterface, InterfaceIterator, ServiceToken, UsbBackend};
use crate::descriptors::{ConfigurationDescriptor, DeviceDescriptor, DEVICE_DESCRIPTOR_LENGTH};
use crate::error::{DescriptorFault, StatusCode, UsbError};
use crate::request::{ControlRequest, DataPhase, Direction, SetupPacket, DEVICE_DESCRIPTOR, STRING_DESCRIPTOR};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};
use std::time::Duration;

const LANGUAGE_US_ENGLISH: u16 = 0x0409;

/// Owns one low-level device object and mediates everything done with it.
pub struct DeviceHandle<D: DeviceInterface> {
    device: D,
    open: bool,
    timeout: Duration,
    language: Option<u16>,
    configuration: Vec<u8>,
}

impl<D: DeviceInterface> DeviceHandle<D> {
    /// Performs the backend handshake for `service`. The device is not opened.
    pub fn from_service<B>(backend: &B, service: ServiceToken) -> Result<Self, UsbError>
    where
        B: UsbBackend<Device = D>,
    {
        match backend.create_device_interface(service) {
            Ok(device) => Ok(Self::from_device(device)),
            Err(status) => {
                debug!("Handshake with {} failed: {}", service, status);
                Err(UsbError::HandshakeFailed(status))
            }
        }
    }

    /// Adopts an already obtained low-level device object.
    pub fn from_device(device: D) -> Self {
        Self {
            device,
            open: false,
            timeout: Duration::from_secs(1),
            language: None,
            configuration: Vec::new(),
        }
    }

    pub fn service(&self) -> ServiceToken {
        self.device.service()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Overrides the LANGID used for string lookups.
    pub fn set_language(&mut self, language: u16) {
        self.language = Some(language);
    }

    pub fn open(&mut self) -> Result<(), UsbError> {
        let result = self.device.open();
        debug!("Open {}: {:?}", self.device.service(), result);
        result?;
        self.open = true;
        Ok(())
    }

    /// Closes the device. The backend is asked even if the handle isn't open,
    /// and whatever it reports is returned.
    pub fn close(&mut self) -> Result<(), UsbError> {
        let result = self.device.close();
        debug!("Close {}: {:?}", self.device.service(), result);
        self.open = false;
        self.configuration.clear();
        result?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), UsbError> {
        if self.open {
            Ok(())
        } else {
            Err(UsbError::NotOpen)
        }
    }

    /// The current configuration descriptor, with everything that follows it.
    pub fn configuration_descriptor(&mut self) -> Result<ConfigurationDescriptor<'_>, UsbError> {
        self.ensure_open()?;
        self.configuration = match self.device.configuration_descriptor() {
            Ok(bytes) => bytes,
            Err(StatusCode::NOT_OPEN) => return Err(UsbError::NotOpen),
            Err(status) => {
                let reason = match status {
                    StatusCode::NOT_FOUND => DescriptorFault::Unconfigured,
                    _ => DescriptorFault::Unreadable,
                };
                return Err(UsbError::DescriptorUnavailable { reason, status });
            }
        };
        ConfigurationDescriptor::new(&self.configuration)
    }

    pub fn interface_iterator(&mut self) -> Result<InterfaceIterator, UsbError> {
        self.ensure_open()?;
        Ok(self.device.interface_iterator()?)
    }

    /// Performs a control transfer on the default pipe.
    ///
    /// On success `request.length` holds the number of bytes actually
    /// transferred, which is never more than was asked for.
    pub fn device_request(&mut self, request: &mut ControlRequest<'_>) -> Result<(), UsbError> {
        self.ensure_open()?;

        let requested = request.length as usize;
        if requested > request.data.len() {
            return Err(UsbError::InvalidArgument(
                "request length exceeds the data buffer",
            ));
        }

        let setup = request.setup();
        let data = match (requested, setup.direction()) {
            (0, _) => DataPhase::None,
            (_, Direction::In) => DataPhase::In(&mut request.data[..requested]),
            (_, Direction::Out) => DataPhase::Out(&request.data[..requested]),
        };

        let transferred = self.device.control_transfer(setup, data, self.timeout);
        debug!("Control transfer {:?}: {:?}", setup, transferred);

        let transferred = transferred?;
        if transferred > requested {
            return Err(UsbError::from(StatusCode::OVERFLOW));
        }
        request.length = transferred as u16;
        Ok(())
    }

    /// Fixed-shape control transfer which can't report the transferred length.
    #[deprecated(note = "use `device_request`, which reports the transferred length")]
    pub fn device_request_raw(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
        data: &mut [u8],
    ) -> Result<(), UsbError> {
        let mut request = ControlRequest {
            request_type,
            request,
            value,
            index,
            data,
            length,
        };
        self.device_request(&mut request)
    }

    fn get_descriptor(
        &mut self,
        descriptor_type: u8,
        index: u8,
        language: u16,
        buf: &mut [u8],
    ) -> Result<usize, UsbError> {
        let setup = SetupPacket::get_descriptor(descriptor_type, index, language, buf.len() as u16);
        let mut request = ControlRequest {
            request_type: setup.bmRequestType,
            request: setup.bRequest,
            value: setup.wValue,
            index: setup.wIndex,
            data: buf,
            length: setup.wLength,
        };
        self.device_request(&mut request)
            .map_err(UsbError::into_descriptor_error)?;
        Ok(request.length as usize)
    }

    /// Reads a string descriptor in two steps, first its length, then the rest.
    fn read_string_descriptor(&mut self, index: u8, language: u16) -> Result<Vec<u8>, UsbError> {
        let mut header = [0; 2];
        let read = self.get_descriptor(STRING_DESCRIPTOR, index, language, &mut header)?;
        if read < 2 || header[1] != STRING_DESCRIPTOR || header[0] < 2 {
            return Err(UsbError::malformed());
        }

        let length = header[0] as usize;
        let mut buf = vec![0; length];
        let read = self.get_descriptor(STRING_DESCRIPTOR, index, language, &mut buf)?;
        if read != length || buf[0] as usize != length || buf[1] != STRING_DESCRIPTOR {
            return Err(UsbError::malformed());
        }
        if length % 2 != 0 {
            return Err(UsbError::malformed());
        }
        buf.drain(..2);
        Ok(buf)
    }

    /// The LANGIDs the device supports, from string descriptor zero.
    pub fn languages(&mut self) -> Result<Vec<u16>, UsbError> {
        self.ensure_open()?;
        let table = self.read_string_descriptor(0, 0)?;
        Ok(table.chunks_exact(2).map(LittleEndian::read_u16).collect())
    }

    fn language(&mut self) -> Result<u16, UsbError> {
        if let Some(language) = self.language {
            return Ok(language);
        }
        let language = self
            .languages()?
            .first()
            .copied()
            .unwrap_or(LANGUAGE_US_ENGLISH);
        self.language = Some(language);
        Ok(language)
    }

    /// Reads and decodes the string descriptor at `index`.
    pub fn string_descriptor(&mut self, index: u8) -> Result<String, UsbError> {
        if index == 0 {
            return Err(UsbError::InvalidArgument(
                "string index 0 is the language table",
            ));
        }
        self.ensure_open()?;

        let language = self.language()?;
        let payload = self.read_string_descriptor(index, language)?;
        let units: Vec<u16> = payload.chunks_exact(2).map(LittleEndian::read_u16).collect();
        String::from_utf16(&units).map_err(|_| {
            warn!("String descriptor {} on {} is not valid UTF-16", index, self.service());
            UsbError::malformed()
        })
    }

    pub fn device_descriptor(&mut self) -> Result<DeviceDescriptor, UsbError> {
        self.ensure_open()?;
        let mut buf = [0; DEVICE_DESCRIPTOR_LENGTH];
        let read = self.get_descriptor(DEVICE_DESCRIPTOR, 0, 0, &mut buf)?;
        DeviceDescriptor::parse(&buf[..read])
    }
}

impl<D: DeviceInterface> Drop for DeviceHandle<D> {
    fn drop(&mut self) {
        if self.open {
            if let Err(error) = self.close() {
                warn!("Unable to close {} on release: {}", self.service(), error);
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/device_handle.rs"]
mod tests;
