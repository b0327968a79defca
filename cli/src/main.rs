use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, warn};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use usbdetective_usb::backend::libusb::LibUsbDevice;
use usbdetective_usb::descriptors::{Configuration, DeviceDescriptor, InterfaceDescriptor};
use usbdetective_usb::request::DEVICE_TO_HOST;
use usbdetective_usb::rusb::GlobalContext;
use usbdetective_usb::{ControlRequest, DeviceHandle, LibUsb, ServiceToken, UsbDevice};

use crate::cli::{Cli, Command, DeviceAddress, LevelFilter};
use crate::settings::Settings;

mod cli;
mod settings;

type Handle = DeviceHandle<LibUsbDevice<GlobalContext>>;

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    CombinedLogger::init(vec![TermLogger::new(
        match args.log_level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        },
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .context("Could not configure the logger")?;

    let mut settings = Settings::read(&args.config)?;
    if let Some(timeout_ms) = args.timeout_ms {
        settings.timeout_ms = timeout_ms;
    }
    debug!("Settings: {:?}", settings);

    let mut backend = LibUsb::new();
    backend.set_timeout(settings.timeout());

    let inspector = Inspector { backend, settings };
    match args.command {
        Command::List => inspector.list(),
        Command::Show { device } => inspector.show(device),
        Command::Strings { device, index } => inspector.strings(device, index),
        Command::Request {
            device,
            request_type,
            request,
            value,
            index,
            length,
            data,
        } => inspector.request(device, request_type, request, value, index, length, data),
        Command::Interfaces { device, claim } => inspector.interfaces(device, claim),
    }
}

struct Inspector {
    backend: LibUsb,
    settings: Settings,
}

impl Inspector {
    fn handle(&self, service: ServiceToken) -> Result<Handle> {
        let mut handle = DeviceHandle::from_service(&self.backend, service)
            .with_context(|| format!("Unable to reach the device at {}", service))?;
        handle.set_timeout(self.settings.timeout());
        if let Some(language) = self.settings.language {
            handle.set_language(language);
        }
        Ok(handle)
    }

    fn probe(&self, service: ServiceToken) -> Result<UsbDevice<LibUsb>> {
        let handle = self.handle(service)?;
        UsbDevice::from_handle(handle)
            .with_context(|| format!("Unable to read the descriptors of {}", service))
    }

    fn list(&self) -> Result<()> {
        let services = self
            .backend
            .services()
            .context("Unable to enumerate USB devices")?;

        for service in services {
            match self.probe(service) {
                Ok(device) => {
                    let descriptor = device.descriptor();
                    println!(
                        "Bus {:03} Device {:03}: ID {:04x}:{:04x} {}",
                        service.bus_number,
                        service.address,
                        descriptor.vendor_id,
                        descriptor.product_id,
                        descriptor.product.as_deref().unwrap_or("")
                    );
                }
                Err(error) => {
                    warn!("{:#}", error);
                    println!(
                        "Bus {:03} Device {:03}: (unavailable)",
                        service.bus_number, service.address
                    );
                }
            }
        }
        Ok(())
    }

    fn show(&self, address: DeviceAddress) -> Result<()> {
        let service = token(address);
        let (descriptor, configuration) = if self.settings.show_strings {
            let device = self.probe(service)?;
            println!("{}", device);
            (device.descriptor().clone(), device.configuration().clone())
        } else {
            // Same descriptors, without touching any string
            let mut handle = self.handle(service)?;
            handle.open()?;
            let descriptor = handle.device_descriptor()?;
            let configuration = handle.configuration_descriptor()?.parse()?;
            handle.close()?;
            (descriptor, configuration)
        };

        print_device(&descriptor);
        print_configuration(&configuration);
        Ok(())
    }

    fn strings(&self, address: DeviceAddress, index: Option<u8>) -> Result<()> {
        let service = token(address);
        let mut handle = self.handle(service)?;
        handle.open()?;

        let languages = handle.languages().context("Unable to read the language table")?;
        let languages: Vec<String> = languages.iter().map(|l| format!("0x{:04x}", l)).collect();
        println!("Languages: {}", languages.join(", "));

        let indices = match index {
            Some(index) => vec![index],
            None => {
                let descriptor = handle.device_descriptor()?;
                let configuration = handle.configuration_descriptor()?.parse()?;
                string_indices(&descriptor, &configuration)
            }
        };

        for index in indices {
            match handle.string_descriptor(index) {
                Ok(string) => println!("{:3}: {}", index, string),
                Err(error) => println!("{:3}: <{}>", index, error),
            }
        }

        handle.close()?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn request(
        &self,
        address: DeviceAddress,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: Option<u16>,
        data: Option<String>,
    ) -> Result<()> {
        let service = token(address);
        let device_to_host = request_type & DEVICE_TO_HOST != 0;
        let mut buf = request_buffer(device_to_host, length, data.as_deref())?;

        let mut handle = self.handle(service)?;
        handle.open()?;

        let mut control = if device_to_host {
            ControlRequest::read(request_type, request, value, index, &mut buf)
        } else {
            ControlRequest::write(request_type, request, value, index, &mut buf)
        };
        let result = handle.device_request(&mut control);
        if let Err(error) = &result {
            println!("Failed: {} ({}: {})", error, error.domain(), error.status().0);
        } else {
            println!("Transferred {} bytes", control.length);
            if device_to_host {
                print_hex(control.transferred());
            }
        }
        drop(control);

        handle.close()?;
        result.context("Control transfer failed")?;
        Ok(())
    }

    fn interfaces(&self, address: DeviceAddress, claim: bool) -> Result<()> {
        let service = token(address);
        let mut device = self.probe(service)?;
        let mut interfaces = device
            .list_interfaces(&self.backend)
            .context("Unable to list interfaces")?;

        for interface in interfaces.iter_mut() {
            print_interface(interface.descriptor());
            if claim {
                match interface.open() {
                    Ok(()) => {
                        println!("    claimed");
                        interface.close()?;
                        println!("    released");
                    }
                    Err(error) => println!("    unable to claim: {}", error),
                }
            }
        }
        Ok(())
    }
}

fn token(address: DeviceAddress) -> ServiceToken {
    ServiceToken {
        bus_number: address.bus,
        address: address.address,
    }
}

fn string_indices(descriptor: &DeviceDescriptor, configuration: &Configuration) -> Vec<u8> {
    let mut indices = vec![
        descriptor.manufacturer_index,
        descriptor.product_index,
        descriptor.serial_number_index,
        configuration.configuration_index,
    ];
    indices.extend(configuration.interfaces.iter().map(|i| i.interface_index));
    indices.retain(|index| *index != 0);
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// The data stage buffer for a request: `length` zeroes to receive into, or the
/// bytes to send.
fn request_buffer(device_to_host: bool, length: Option<u16>, data: Option<&str>) -> Result<Vec<u8>> {
    if device_to_host {
        if data.is_some() {
            bail!("--data can only be used with host to device requests");
        }
        return Ok(vec![0; length.unwrap_or(0) as usize]);
    }

    let data = match data {
        Some(data) => parse_hex(data)?,
        None => Vec::new(),
    };
    if data.len() > u16::MAX as usize {
        bail!("A control transfer can send at most {} bytes", u16::MAX);
    }
    if let Some(length) = length {
        if length as usize != data.len() {
            bail!(
                "--length {} does not match the {} bytes of --data",
                length,
                data.len()
            );
        }
    }
    Ok(data)
}

fn parse_hex(data: &str) -> Result<Vec<u8>> {
    let data: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let data = data.strip_prefix("0x").unwrap_or(&data);
    if data.len() % 2 != 0 {
        bail!("Hex data must have an even number of digits");
    }
    (0..data.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&data[i..i + 2], 16)
                .with_context(|| format!("Invalid hex byte '{}'", &data[i..i + 2]))
        })
        .collect()
}

fn print_hex(data: &[u8]) {
    for (row, chunk) in data.chunks(16).enumerate() {
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:04x}: {}", row * 16, bytes.join(" "));
    }
}

fn print_device(descriptor: &DeviceDescriptor) {
    println!(
        "USB version: {:x}.{:02x}",
        descriptor.usb_version >> 8,
        descriptor.usb_version & 0xFF
    );
    println!(
        "Class: 0x{:02x}, subclass 0x{:02x}, protocol 0x{:02x}",
        descriptor.device_class, descriptor.device_subclass, descriptor.device_protocol
    );
    println!("Max packet size: {}", descriptor.max_packet_size);
    println!(
        "ID: {:04x}:{:04x}, release {:x}.{:02x}",
        descriptor.vendor_id,
        descriptor.product_id,
        descriptor.device_version >> 8,
        descriptor.device_version & 0xFF
    );
    print_string("Manufacturer", descriptor.manufacturer_index, descriptor.manufacturer.as_deref());
    print_string("Product", descriptor.product_index, descriptor.product.as_deref());
    print_string("Serial", descriptor.serial_number_index, descriptor.serial_number.as_deref());
    println!("Configurations: {}", descriptor.num_configurations);
}

fn print_configuration(configuration: &Configuration) {
    println!(
        "Configuration {}: {} interfaces, {} bytes, {}mA{}{}",
        configuration.configuration_value,
        configuration.num_interfaces,
        configuration.total_length,
        configuration.max_power as u32 * 2,
        if configuration.attributes & 0x40 != 0 { ", self powered" } else { "" },
        if configuration.attributes & 0x20 != 0 { ", remote wakeup" } else { "" },
    );
    if let Some(name) = &configuration.configuration {
        println!("  Name: {}", name);
    }
    for (descriptor_type, bytes) in &configuration.extra {
        println!("  Extra descriptor 0x{:02x}: {} bytes", descriptor_type, bytes.len());
    }
    for interface in &configuration.interfaces {
        print_interface(interface);
    }
}

fn print_interface(interface: &InterfaceDescriptor) {
    println!(
        "  Interface {} alt {}: class 0x{:02x}, subclass 0x{:02x}, protocol 0x{:02x}{}",
        interface.interface_number,
        interface.alternate_setting,
        interface.interface_class,
        interface.interface_subclass,
        interface.interface_protocol,
        interface
            .interface
            .as_ref()
            .map(|name| format!(" ({})", name))
            .unwrap_or_default()
    );
    for (descriptor_type, bytes) in &interface.extra {
        println!("    Extra descriptor 0x{:02x}: {} bytes", descriptor_type, bytes.len());
    }
    for endpoint in &interface.endpoints {
        println!(
            "    Endpoint 0x{:02x}: {:?} {:?}, max packet {}, interval {}",
            endpoint.address,
            endpoint.direction(),
            endpoint.transfer_type(),
            endpoint.max_packet_size,
            endpoint.interval
        );
    }
}

fn print_string(label: &str, index: u8, value: Option<&str>) {
    match (index, value) {
        (0, _) => {}
        (_, Some(value)) => println!("{}: {}", label, value),
        (index, None) => println!("{}: <string {} unavailable>", label, index),
    }
}
