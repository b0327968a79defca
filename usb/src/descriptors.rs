// Decoded forms of the standard USB descriptors (USB 2.0 section 9.6). All multi-byte fields
// are little-endian on the wire.

use crate::error::UsbError;
use crate::request::{CONFIGURATION_DESCRIPTOR, DEVICE_DESCRIPTOR, ENDPOINT_DESCRIPTOR, INTERFACE_DESCRIPTOR};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;

pub const DEVICE_DESCRIPTOR_LENGTH: usize = 18;
pub const CONFIGURATION_DESCRIPTOR_LENGTH: usize = 9;
pub const INTERFACE_DESCRIPTOR_LENGTH: usize = 9;
pub const ENDPOINT_DESCRIPTOR_LENGTH: usize = 7;

/// A read-only view over the raw bytes of the current configuration.
///
/// The view borrows from the handle that produced it, so it can't be held
/// across anything which might change the configuration.
#[derive(Copy, Clone, Debug)]
pub struct ConfigurationDescriptor<'a> {
    bytes: &'a [u8],
}

impl<'a> ConfigurationDescriptor<'a> {
    /// Checks the header and wraps `bytes`.
    pub fn new(bytes: &'a [u8]) -> Result<Self, UsbError> {
        if bytes.len() < CONFIGURATION_DESCRIPTOR_LENGTH
            || (bytes[0] as usize) < CONFIGURATION_DESCRIPTOR_LENGTH
            || bytes[1] != CONFIGURATION_DESCRIPTOR
        {
            return Err(UsbError::malformed());
        }
        if LittleEndian::read_u16(&bytes[2..4]) as usize != bytes.len() {
            return Err(UsbError::malformed());
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn total_length(&self) -> u16 {
        LittleEndian::read_u16(&self.bytes[2..4])
    }

    pub fn num_interfaces(&self) -> u8 {
        self.bytes[4]
    }

    pub fn configuration_value(&self) -> u8 {
        self.bytes[5]
    }

    pub fn configuration_string_index(&self) -> u8 {
        self.bytes[6]
    }

    pub fn attributes(&self) -> u8 {
        self.bytes[7]
    }

    /// In units of 2mA.
    pub fn max_power(&self) -> u8 {
        self.bytes[8]
    }

    pub fn self_powered(&self) -> bool {
        self.attributes() & 0x40 != 0
    }

    pub fn remote_wakeup(&self) -> bool {
        self.attributes() & 0x20 != 0
    }

    pub fn parse(&self) -> Result<Configuration, UsbError> {
        Configuration::parse(self.bytes)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub usb_version: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version: u16,
    pub manufacturer_index: u8,
    pub product_index: u8,
    pub serial_number_index: u8,
    pub num_configurations: u8,

    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl DeviceDescriptor {
    pub fn parse(bytes: &[u8]) -> Result<Self, UsbError> {
        if bytes.len() < DEVICE_DESCRIPTOR_LENGTH
            || (bytes[0] as usize) < DEVICE_DESCRIPTOR_LENGTH
            || bytes[1] != DEVICE_DESCRIPTOR
        {
            return Err(UsbError::malformed());
        }

        Ok(Self {
            usb_version: LittleEndian::read_u16(&bytes[2..4]),
            device_class: bytes[4],
            device_subclass: bytes[5],
            device_protocol: bytes[6],
            max_packet_size: bytes[7],
            vendor_id: LittleEndian::read_u16(&bytes[8..10]),
            product_id: LittleEndian::read_u16(&bytes[10..12]),
            device_version: LittleEndian::read_u16(&bytes[12..14]),
            manufacturer_index: bytes[14],
            product_index: bytes[15],
            serial_number_index: bytes[16],
            num_configurations: bytes[17],
            ..Default::default()
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    pub total_length: u16,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_index: u8,
    pub attributes: u8,
    pub max_power: u8,

    pub configuration: Option<String>,
    pub interfaces: Vec<InterfaceDescriptor>,

    /// Descriptors between the configuration and its first interface, by type.
    pub extra: BTreeMap<u8, Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_index: u8,

    pub interface: Option<String>,
    pub endpoints: Vec<EndpointDescriptor>,

    /// Class-specific descriptors following the interface, by type.
    pub extra: BTreeMap<u8, Vec<u8>>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointDirection {
    Out,
    In,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl EndpointDescriptor {
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub fn direction(&self) -> EndpointDirection {
        match self.address >> 7 {
            0 => EndpointDirection::Out,
            _ => EndpointDirection::In,
        }
    }

    pub fn transfer_type(&self) -> TransferType {
        match self.attributes & 0x03 {
            0b00 => TransferType::Control,
            0b01 => TransferType::Isochronous,
            0b10 => TransferType::Bulk,
            _ => TransferType::Interrupt,
        }
    }
}

impl Configuration {
    /// Decodes a full configuration descriptor set, as returned by
    /// GET_DESCRIPTOR(CONFIGURATION) for `wTotalLength` bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, UsbError> {
        let header_length = bytes.first().copied().unwrap_or(0) as usize;
        if bytes.len() < CONFIGURATION_DESCRIPTOR_LENGTH
            || header_length < CONFIGURATION_DESCRIPTOR_LENGTH
            || header_length > bytes.len()
            || bytes[1] != CONFIGURATION_DESCRIPTOR
        {
            return Err(UsbError::malformed());
        }

        let mut configuration = Configuration {
            total_length: LittleEndian::read_u16(&bytes[2..4]),
            num_interfaces: bytes[4],
            configuration_value: bytes[5],
            configuration_index: bytes[6],
            attributes: bytes[7],
            max_power: bytes[8],
            ..Default::default()
        };

        // A longer header is allowed; only its first nine bytes are known
        let mut index = header_length;
        while index < bytes.len() {
            let descriptor = next_descriptor(bytes, index)?;
            index += descriptor.len();

            match descriptor[1] {
                INTERFACE_DESCRIPTOR => {
                    let interface = parse_interface(descriptor)?;
                    configuration.interfaces.push(interface);
                }
                ENDPOINT_DESCRIPTOR => {
                    let endpoint = parse_endpoint(descriptor)?;
                    let interface = configuration
                        .interfaces
                        .last_mut()
                        .ok_or_else(UsbError::malformed)?;
                    if interface.endpoints.len() >= interface.num_endpoints as usize {
                        return Err(UsbError::malformed());
                    }
                    interface.endpoints.push(endpoint);
                }
                descriptor_type => {
                    let extra = match configuration.interfaces.last_mut() {
                        Some(interface) => &mut interface.extra,
                        None => &mut configuration.extra,
                    };
                    extra
                        .entry(descriptor_type)
                        .or_default()
                        .extend_from_slice(descriptor);
                }
            }
        }

        if configuration
            .interfaces
            .iter()
            .any(|interface| interface.endpoints.len() != interface.num_endpoints as usize)
        {
            return Err(UsbError::malformed());
        }

        Ok(configuration)
    }
}

fn next_descriptor(bytes: &[u8], index: usize) -> Result<&[u8], UsbError> {
    if bytes.len() < index + 2 {
        return Err(UsbError::malformed());
    }
    let length = bytes[index] as usize;
    if length < 2 || bytes.len() < index + length {
        return Err(UsbError::malformed());
    }
    Ok(&bytes[index..index + length])
}

fn parse_interface(d: &[u8]) -> Result<InterfaceDescriptor, UsbError> {
    if d.len() != INTERFACE_DESCRIPTOR_LENGTH {
        return Err(UsbError::malformed());
    }
    Ok(InterfaceDescriptor {
        interface_number: d[2],
        alternate_setting: d[3],
        num_endpoints: d[4],
        interface_class: d[5],
        interface_subclass: d[6],
        interface_protocol: d[7],
        interface_index: d[8],
        ..Default::default()
    })
}

fn parse_endpoint(d: &[u8]) -> Result<EndpointDescriptor, UsbError> {
    // Audio class endpoints carry two extra bytes (bRefresh, bSynchAddress)
    if d.len() < ENDPOINT_DESCRIPTOR_LENGTH {
        return Err(UsbError::malformed());
    }
    Ok(EndpointDescriptor {
        address: d[2],
        attributes: d[3],
        max_packet_size: LittleEndian::read_u16(&d[4..6]),
        interval: d[6],
    })
}

#[cfg(test)]
#[path = "tests/descriptors.rs"]
mod tests;
