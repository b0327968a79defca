// This file wraps the handles into a 'Plain Old Rust Struct' view of a device: its descriptors,
// strings, interfaces and endpoints, read once up front so callers don't need to poll USB.

use crate::backend::{DeviceInterface, ServiceToken, UsbBackend};
use crate::descriptors::{Configuration, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor};
use crate::error::UsbError;
use crate::handle::{DeviceHandle, InterfaceHandle};
use log::{info, warn};
use std::fmt::{Display, Formatter};

pub struct UsbDevice<B: UsbBackend> {
    handle: DeviceHandle<B::Device>,
    descriptor: DeviceDescriptor,
    configuration: Configuration,
}

impl<B: UsbBackend> UsbDevice<B> {
    pub fn new(backend: &B, service: ServiceToken) -> Result<Self, UsbError> {
        let handle = DeviceHandle::from_service(backend, service)?;
        Self::from_handle(handle)
    }

    /// Reads the device's descriptors through `handle`. A closed handle is
    /// opened for the duration of the read, and closed again afterwards.
    pub fn from_handle(mut handle: DeviceHandle<B::Device>) -> Result<Self, UsbError> {
        let was_open = handle.is_open();
        if !was_open {
            handle.open()?;
        }

        let result = read_descriptors(&mut handle);

        if !was_open {
            if let Err(error) = handle.close() {
                warn!("Unable to close {} after probing: {}", handle.service(), error);
            }
        }

        let (descriptor, configuration) = result?;
        info!(
            "Found {:04x}:{:04x} at {}",
            descriptor.vendor_id,
            descriptor.product_id,
            handle.service()
        );

        Ok(Self {
            handle,
            descriptor,
            configuration,
        })
    }

    pub fn service(&self) -> ServiceToken {
        self.handle.service()
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn handle(&mut self) -> &mut DeviceHandle<B::Device> {
        &mut self.handle
    }

    pub fn open(&mut self) -> Result<(), UsbError> {
        self.handle.open()
    }

    /// Closes the device; closing a device which isn't open is not an error here.
    pub fn close(&mut self) -> Result<(), UsbError> {
        ignore_not_open(self.handle.close())
    }

    /// Builds a [`UsbInterface`] for each interface of the current configuration.
    ///
    /// Interfaces whose handshake fails, or which have no descriptor, are
    /// skipped.
    pub fn list_interfaces(&mut self, backend: &B) -> Result<Vec<UsbInterface<B>>, UsbError> {
        let was_open = self.handle.is_open();
        if !was_open {
            self.handle.open()?;
        }
        let iterator = self.handle.interface_iterator();
        if !was_open {
            if let Err(error) = self.handle.close() {
                warn!("Unable to close {} after listing: {}", self.service(), error);
            }
        }

        let mut interfaces = Vec::new();
        for service in iterator? {
            let descriptor = self
                .configuration
                .interfaces
                .iter()
                .find(|descriptor| descriptor.interface_number == service.interface_number);

            let Some(descriptor) = descriptor else {
                warn!("No descriptor for {}, skipping", service);
                continue;
            };

            match InterfaceHandle::from_service(backend, service) {
                Ok(handle) => interfaces.push(UsbInterface {
                    descriptor: descriptor.clone(),
                    handle,
                }),
                Err(error) => warn!("Skipping {}: {}", service, error),
            }
        }
        Ok(interfaces)
    }
}

impl<B: UsbBackend> Display for UsbDevice<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let service = self.service();
        write!(
            f,
            "UsbDevice {{ bus={:03}, address={:03}, vendorID=0x{:04x}, productID=0x{:04x} }}",
            service.bus_number, service.address, self.descriptor.vendor_id, self.descriptor.product_id
        )
    }
}

pub struct UsbInterface<B: UsbBackend> {
    descriptor: InterfaceDescriptor,
    handle: InterfaceHandle<B::Interface>,
}

impl<B: UsbBackend> UsbInterface<B> {
    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.descriptor.endpoints
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    pub fn open(&mut self) -> Result<(), UsbError> {
        self.handle.open()
    }

    pub fn close(&mut self) -> Result<(), UsbError> {
        ignore_not_open(self.handle.close())
    }
}

fn ignore_not_open(result: Result<(), UsbError>) -> Result<(), UsbError> {
    match result {
        Err(UsbError::NotOpen) => Ok(()),
        other => other,
    }
}

fn optional_string<D: DeviceInterface>(
    handle: &mut DeviceHandle<D>,
    index: u8,
) -> Option<String> {
    if index == 0 {
        return None;
    }
    match handle.string_descriptor(index) {
        Ok(string) => Some(string),
        Err(error) => {
            warn!("Unable to read string {} from {}: {}", index, handle.service(), error);
            None
        }
    }
}

fn read_descriptors<D: DeviceInterface>(
    handle: &mut DeviceHandle<D>,
) -> Result<(DeviceDescriptor, Configuration), UsbError> {
    let mut descriptor = handle.device_descriptor()?;
    descriptor.manufacturer = optional_string(handle, descriptor.manufacturer_index);
    descriptor.product = optional_string(handle, descriptor.product_index);
    descriptor.serial_number = optional_string(handle, descriptor.serial_number_index);

    let mut configuration = handle.configuration_descriptor()?.parse()?;
    configuration.configuration = optional_string(handle, configuration.configuration_index);
    for interface in configuration.interfaces.iter_mut() {
        interface.interface = optional_string(handle, interface.interface_index);
    }

    Ok((descriptor, configuration))
}

#[cfg(test)]
#[path = "tests/usb_device.rs"]
mod tests;
