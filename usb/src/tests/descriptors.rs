use super::*;
use crate::error::{DescriptorFault, StatusCode};

// A composite device: an association descriptor, one HID interface with an interrupt
// endpoint, and a second interface with two alternate settings.
#[rustfmt::skip]
const COMPOSITE: &[u8] = &[
    9, 2, 74, 0, 2, 1, 0, 0xA0, 50,
    8, 0x0B, 0, 2, 1, 2, 0, 0,
    9, 4, 0, 0, 1, 3, 1, 1, 4,
    9, 0x21, 0x11, 0x01, 0, 1, 0x22, 63, 0,
    7, 5, 0x81, 3, 8, 0, 10,
    9, 4, 1, 0, 0, 0x0A, 0, 0, 0,
    9, 4, 1, 1, 2, 0x0A, 0, 0, 0,
    7, 5, 0x02, 2, 0x00, 0x02, 0,
    7, 5, 0x83, 2, 0x00, 0x02, 0,
];

#[rustfmt::skip]
const DEVICE: &[u8] = &[
    18, 1, 0x00, 0x02, 0xEF, 0x02, 0x01, 64,
    0x34, 0x12, 0x78, 0x56, 0x00, 0x01,
    1, 2, 3, 1,
];

fn is_malformed(result: Result<Configuration, UsbError>) -> bool {
    result
        == Err(UsbError::DescriptorUnavailable {
            reason: DescriptorFault::Malformed,
            status: StatusCode::OTHER,
        })
}

#[test]
fn parses_composite_configuration() {
    let configuration = Configuration::parse(COMPOSITE).unwrap();
    assert_eq!(configuration.total_length, 74);
    assert_eq!(configuration.num_interfaces, 2);
    assert_eq!(configuration.configuration_value, 1);
    assert_eq!(configuration.max_power, 50);
    assert_eq!(configuration.interfaces.len(), 3);
    assert_eq!(configuration.extra.keys().copied().collect::<Vec<_>>(), vec![0x0B]);

    let hid = &configuration.interfaces[0];
    assert_eq!(hid.interface_class, 3);
    assert_eq!(hid.interface_index, 4);
    assert_eq!(hid.extra.get(&0x21).map(Vec::len), Some(9));
    assert_eq!(hid.endpoints.len(), 1);
    assert_eq!(hid.endpoints[0].direction(), EndpointDirection::In);
    assert_eq!(hid.endpoints[0].transfer_type(), TransferType::Interrupt);
    assert_eq!(hid.endpoints[0].number(), 1);
    assert_eq!(hid.endpoints[0].interval, 10);

    let idle = &configuration.interfaces[1];
    assert_eq!((idle.interface_number, idle.alternate_setting), (1, 0));
    assert!(idle.endpoints.is_empty());

    let active = &configuration.interfaces[2];
    assert_eq!((active.interface_number, active.alternate_setting), (1, 1));
    assert_eq!(active.endpoints[0].direction(), EndpointDirection::Out);
    assert_eq!(active.endpoints[1].direction(), EndpointDirection::In);
    assert_eq!(active.endpoints[1].transfer_type(), TransferType::Bulk);
    assert_eq!(active.endpoints[1].max_packet_size, 512);
}

#[test]
fn view_reads_header() {
    let view = ConfigurationDescriptor::new(COMPOSITE).unwrap();
    assert_eq!(view.total_length(), 74);
    assert_eq!(view.num_interfaces(), 2);
    assert_eq!(view.configuration_value(), 1);
    assert_eq!(view.configuration_string_index(), 0);
    assert!(!view.self_powered());
    assert!(view.remote_wakeup());
    assert_eq!(view.as_bytes().len(), 74);
    assert_eq!(view.parse().unwrap().interfaces.len(), 3);
}

#[test]
fn view_rejects_length_mismatch() {
    assert!(ConfigurationDescriptor::new(&COMPOSITE[..60]).is_err());
    assert!(ConfigurationDescriptor::new(&COMPOSITE[..5]).is_err());

    let mut wrong_type = COMPOSITE.to_vec();
    wrong_type[1] = 1;
    assert!(ConfigurationDescriptor::new(&wrong_type).is_err());
}

#[test]
fn truncated_descriptor_is_malformed() {
    assert!(is_malformed(Configuration::parse(&COMPOSITE[..73])));
}

#[test]
fn endpoint_count_must_match() {
    let mut bytes = COMPOSITE.to_vec();
    bytes[17 + 4] = 2;
    assert!(is_malformed(Configuration::parse(&bytes)));

    let mut bytes = COMPOSITE.to_vec();
    bytes[17 + 4] = 0;
    assert!(is_malformed(Configuration::parse(&bytes)));
}

#[test]
fn endpoint_outside_interface_is_malformed() {
    #[rustfmt::skip]
    let bytes = [
        9, 2, 16, 0, 0, 1, 0, 0x80, 50,
        7, 5, 0x81, 3, 8, 0, 10,
    ];
    assert!(is_malformed(Configuration::parse(&bytes)));
}

#[test]
fn zero_length_descriptor_is_malformed() {
    let bytes = [9, 2, 11, 0, 0, 1, 0, 0x80, 50, 0, 0];
    assert!(is_malformed(Configuration::parse(&bytes)));
}

#[test]
fn header_only_configuration() {
    let bytes = [9, 2, 9, 0, 0, 1, 0, 0x80, 50];
    let configuration = Configuration::parse(&bytes).unwrap();
    assert!(configuration.interfaces.is_empty());
    assert!(configuration.extra.is_empty());
}

#[test]
fn longer_configuration_header_is_skipped() {
    #[rustfmt::skip]
    let bytes = [
        10, 2, 26, 0, 1, 1, 0, 0x80, 50, 0xEE,
        9, 4, 0, 0, 1, 0xFF, 0, 0, 0,
        7, 5, 0x81, 2, 64, 0, 0,
    ];
    let view = ConfigurationDescriptor::new(&bytes).unwrap();
    let configuration = view.parse().unwrap();
    assert_eq!(configuration.total_length, 26);
    assert_eq!(configuration.interfaces.len(), 1);
    assert_eq!(configuration.interfaces[0].endpoints.len(), 1);
    assert!(configuration.extra.is_empty());
}

#[test]
fn short_configuration_header_is_malformed() {
    let bytes = [8, 2, 9, 0, 0, 1, 0, 0x80, 50];
    assert!(ConfigurationDescriptor::new(&bytes).is_err());
    assert!(is_malformed(Configuration::parse(&bytes)));
}

#[test]
fn parses_device_descriptor() {
    let descriptor = DeviceDescriptor::parse(DEVICE).unwrap();
    assert_eq!(descriptor.usb_version, 0x0200);
    assert_eq!(descriptor.device_class, 0xEF);
    assert_eq!(descriptor.max_packet_size, 64);
    assert_eq!(descriptor.vendor_id, 0x1234);
    assert_eq!(descriptor.product_id, 0x5678);
    assert_eq!(descriptor.device_version, 0x0100);
    assert_eq!(
        (
            descriptor.manufacturer_index,
            descriptor.product_index,
            descriptor.serial_number_index
        ),
        (1, 2, 3)
    );
    assert_eq!(descriptor.num_configurations, 1);
    assert_eq!(descriptor.product, None);
}

#[test]
fn short_device_descriptor_is_malformed() {
    assert!(DeviceDescriptor::parse(&DEVICE[..8]).is_err());
}
