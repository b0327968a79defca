use crate::backend::{
    DeviceInterface, InterfaceInterface, InterfaceIterator, InterfaceService, ServiceToken,
    UsbBackend,
};
use crate::error::StatusCode;
use crate::request::{DataPhase, Direction, SetupPacket, CONFIGURATION_DESCRIPTOR};
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use rusb::{Device, DeviceHandle, GlobalContext, UsbContext};
use std::time::Duration;

const CONFIGURATION_HEADER_LENGTH: usize = 9;

/// The libusb backend, via rusb.
pub struct LibUsb<T: UsbContext = GlobalContext> {
    context: T,
    timeout: Duration,
}

impl LibUsb<GlobalContext> {
    pub fn new() -> Self {
        Self::with_context(GlobalContext::default())
    }
}

impl Default for LibUsb<GlobalContext> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: UsbContext> LibUsb<T> {
    pub fn with_context(context: T) -> Self {
        Self {
            context,
            timeout: Duration::from_secs(1),
        }
    }

    /// Timeout used by the backend for the descriptor reads it performs itself.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Every device currently attached.
    pub fn services(&self) -> Result<Vec<ServiceToken>, StatusCode> {
        let devices = self.context.devices()?;
        Ok(devices
            .iter()
            .map(|device| ServiceToken {
                bus_number: device.bus_number(),
                address: device.address(),
            })
            .collect())
    }

    fn find_device(&self, service: ServiceToken) -> Result<Device<T>, StatusCode> {
        let devices = self.context.devices()?;
        for device in devices.iter() {
            if device.bus_number() == service.bus_number && device.address() == service.address {
                return Ok(device);
            }
        }
        debug!("No device found at {}", service);
        Err(StatusCode::NO_DEVICE)
    }
}

impl<T: UsbContext> UsbBackend for LibUsb<T> {
    type Device = LibUsbDevice<T>;
    type Interface = LibUsbInterface<T>;

    fn create_device_interface(&self, service: ServiceToken) -> Result<Self::Device, StatusCode> {
        let device = self.find_device(service)?;

        // libusb answers this from its enumeration cache, so a failure here means the
        // device can't be described at all, not that it stopped responding.
        device.device_descriptor()?;

        Ok(LibUsbDevice {
            device,
            service,
            handle: None,
            timeout: self.timeout,
        })
    }

    fn create_interface_interface(
        &self,
        service: InterfaceService,
    ) -> Result<Self::Interface, StatusCode> {
        let device = self.find_device(service.device)?;
        let config = device.active_config_descriptor()?;
        if !config
            .interfaces()
            .any(|interface| interface.number() == service.interface_number)
        {
            debug!("{} is not part of the active configuration", service);
            return Err(StatusCode::NOT_FOUND);
        }

        Ok(LibUsbInterface {
            device,
            service,
            handle: None,
        })
    }
}

pub struct LibUsbDevice<T: UsbContext> {
    device: Device<T>,
    service: ServiceToken,
    handle: Option<DeviceHandle<T>>,
    timeout: Duration,
}

impl<T: UsbContext> LibUsbDevice<T> {
    fn handle(&self) -> Result<&DeviceHandle<T>, StatusCode> {
        self.handle.as_ref().ok_or(StatusCode::NOT_OPEN)
    }

    fn read_configuration(&self, index: u8, buf: &mut [u8]) -> Result<usize, StatusCode> {
        let setup = SetupPacket::get_descriptor(CONFIGURATION_DESCRIPTOR, index, 0, buf.len() as u16);
        let read = self.handle()?.read_control(
            setup.bmRequestType,
            setup.bRequest,
            setup.wValue,
            setup.wIndex,
            buf,
            self.timeout,
        )?;
        Ok(read)
    }
}

impl<T: UsbContext> DeviceInterface for LibUsbDevice<T> {
    fn service(&self) -> ServiceToken {
        self.service
    }

    fn open(&mut self) -> Result<(), StatusCode> {
        // A second open gets a second libusb handle, the first is dropped (and closed).
        self.handle = Some(self.device.open()?);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StatusCode> {
        match self.handle.take() {
            Some(handle) => {
                drop(handle);
                Ok(())
            }
            None => Err(StatusCode::NOT_OPEN),
        }
    }

    fn configuration_descriptor(&mut self) -> Result<Vec<u8>, StatusCode> {
        let active = self.handle()?.active_configuration()?;
        if active == 0 {
            return Err(StatusCode::NOT_FOUND);
        }

        // GET_DESCRIPTOR wants an index, not the bConfigurationValue we have..
        let descriptor = self.device.device_descriptor()?;
        let mut found = None;
        for index in 0..descriptor.num_configurations() {
            if self.device.config_descriptor(index)?.number() == active {
                found = Some(index);
                break;
            }
        }
        let index = found.ok_or(StatusCode::NOT_FOUND)?;

        let mut header = [0; CONFIGURATION_HEADER_LENGTH];
        let read = self.read_configuration(index, &mut header)?;
        if read < CONFIGURATION_HEADER_LENGTH {
            return Ok(header[..read].to_vec());
        }

        let total_length = LittleEndian::read_u16(&header[2..4]) as usize;
        if total_length <= CONFIGURATION_HEADER_LENGTH {
            return Ok(header.to_vec());
        }

        let mut buf = vec![0; total_length];
        let read = self.read_configuration(index, &mut buf)?;
        buf.truncate(read);
        Ok(buf)
    }

    fn interface_iterator(&mut self) -> Result<InterfaceIterator, StatusCode> {
        self.handle()?;
        let config = self.device.active_config_descriptor()?;
        Ok(InterfaceIterator::new(
            self.service,
            config.interfaces().map(|interface| interface.number()),
        ))
    }

    fn control_transfer<'a>(
        &mut self,
        setup: SetupPacket,
        data: DataPhase<'a>,
        timeout: Duration,
    ) -> Result<usize, StatusCode> {
        let handle = self.handle()?;
        let transferred = match ControlStage::new(&setup, data) {
            ControlStage::Read(buf) => handle.read_control(
                setup.bmRequestType,
                setup.bRequest,
                setup.wValue,
                setup.wIndex,
                buf,
                timeout,
            )?,
            ControlStage::Write(buf) => handle.write_control(
                setup.bmRequestType,
                setup.bRequest,
                setup.wValue,
                setup.wIndex,
                buf,
                timeout,
            )?,
        };
        Ok(transferred)
    }
}

/// The libusb call carrying a control transfer. rusb picks the call by the
/// direction bit of `bmRequestType`, and rejects a mismatch, so a transfer with
/// no data stage still needs the call matching its direction.
#[derive(Debug)]
enum ControlStage<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

impl<'a> ControlStage<'a> {
    fn new(setup: &SetupPacket, data: DataPhase<'a>) -> Self {
        match data {
            DataPhase::In(buf) => ControlStage::Read(buf),
            DataPhase::Out(buf) => ControlStage::Write(buf),
            DataPhase::None => match setup.direction() {
                Direction::In => ControlStage::Read(&mut []),
                Direction::Out => ControlStage::Write(&[]),
            },
        }
    }
}

pub struct LibUsbInterface<T: UsbContext> {
    device: Device<T>,
    service: InterfaceService,
    handle: Option<DeviceHandle<T>>,
}

impl<T: UsbContext> InterfaceInterface for LibUsbInterface<T> {
    fn service(&self) -> InterfaceService {
        self.service
    }

    fn open(&mut self) -> Result<(), StatusCode> {
        // Claiming needs a libusb handle of our own, so the interface doesn't depend on the
        // device session which produced it.
        let mut handle = self.device.open()?;
        if let Err(error) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", error);
        }
        handle.claim_interface(self.service.interface_number)?;
        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StatusCode> {
        match self.handle.take() {
            Some(mut handle) => {
                handle.release_interface(self.service.interface_number)?;
                Ok(())
            }
            None => Err(StatusCode::NOT_OPEN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(request_type: u8, length: u16) -> SetupPacket {
        SetupPacket {
            bmRequestType: request_type,
            bRequest: 1,
            wValue: 0,
            wIndex: 0,
            wLength: length,
        }
    }

    #[test]
    fn zero_length_in_request_is_a_read() {
        let stage = ControlStage::new(&setup(0xC0, 0), DataPhase::None);
        assert!(matches!(stage, ControlStage::Read(buf) if buf.is_empty()));
    }

    #[test]
    fn zero_length_out_request_is_a_write() {
        let stage = ControlStage::new(&setup(0x40, 0), DataPhase::None);
        assert!(matches!(stage, ControlStage::Write(buf) if buf.is_empty()));
    }

    #[test]
    fn data_stage_is_passed_through() {
        let mut buf = [0u8; 4];
        let stage = ControlStage::new(&setup(0xC0, 4), DataPhase::In(&mut buf));
        assert!(matches!(stage, ControlStage::Read(buf) if buf.len() == 4));

        let stage = ControlStage::new(&setup(0x40, 3), DataPhase::Out(&[1, 2, 3]));
        assert!(matches!(stage, ControlStage::Write(&[1, 2, 3])));
    }
}
