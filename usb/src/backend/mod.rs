// The backend is the only part of this crate which talks to the platform USB stack. Everything
// above it (the handles, the descriptor decoding, the device model) only sees these traits, so
// it can be driven by a mock in tests, and ported to another stack without change.

use crate::error::StatusCode;
use crate::request::{DataPhase, SetupPacket};
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub mod libusb;

/// Identifies one device as reported by the platform's enumeration facility.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceToken {
    pub bus_number: u8,
    pub address: u8,
}

impl Display for ServiceToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "bus {:03} address {:03}", self.bus_number, self.address)
    }
}

/// Identifies one interface of a device. Only produced by an [`InterfaceIterator`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InterfaceService {
    pub device: ServiceToken,
    pub interface_number: u8,
}

impl Display for InterfaceService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} interface {}", self.device, self.interface_number)
    }
}

/// The interfaces of a device's current configuration.
#[derive(Debug)]
pub struct InterfaceIterator {
    services: std::vec::IntoIter<InterfaceService>,
}

impl InterfaceIterator {
    /// Builds an iterator for `device` over the given interface numbers,
    /// keeping the first occurrence of each.
    pub fn new(device: ServiceToken, interface_numbers: impl IntoIterator<Item = u8>) -> Self {
        let mut services: Vec<InterfaceService> = Vec::new();
        for interface_number in interface_numbers {
            if !services
                .iter()
                .any(|service| service.interface_number == interface_number)
            {
                services.push(InterfaceService {
                    device,
                    interface_number,
                });
            }
        }
        Self {
            services: services.into_iter(),
        }
    }
}

impl Iterator for InterfaceIterator {
    type Item = InterfaceService;

    fn next(&mut self) -> Option<Self::Item> {
        self.services.next()
    }
}

/// Obtains low-level device and interface objects from service tokens.
pub trait UsbBackend {
    type Device: DeviceInterface;
    type Interface: InterfaceInterface;

    fn create_device_interface(&self, service: ServiceToken) -> Result<Self::Device, StatusCode>;

    fn create_interface_interface(
        &self,
        service: InterfaceService,
    ) -> Result<Self::Interface, StatusCode>;
}

/// A low-level device object.
///
/// Implementations forward every call to the platform and report its status
/// unchanged; in particular `open` is not deduplicated, and `close` without a
/// matching `open` reports [`StatusCode::NOT_OPEN`].
pub trait DeviceInterface {
    fn service(&self) -> ServiceToken;

    fn open(&mut self) -> Result<(), StatusCode>;

    fn close(&mut self) -> Result<(), StatusCode>;

    /// The raw bytes of the current configuration descriptor, including all
    /// interface, endpoint and class-specific descriptors that follow it.
    fn configuration_descriptor(&mut self) -> Result<Vec<u8>, StatusCode>;

    fn interface_iterator(&mut self) -> Result<InterfaceIterator, StatusCode>;

    /// Performs a control transfer on endpoint 0 and returns the number of
    /// bytes moved in the data stage.
    fn control_transfer<'a>(
        &mut self,
        setup: SetupPacket,
        data: DataPhase<'a>,
        timeout: Duration,
    ) -> Result<usize, StatusCode>;
}

/// A low-level interface object; opening it claims the interface.
pub trait InterfaceInterface {
    fn service(&self) -> InterfaceService;

    fn open(&mut self) -> Result<(), StatusCode>;

    fn close(&mut self) -> Result<(), StatusCode>;
}
