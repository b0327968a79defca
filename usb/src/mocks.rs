use crate::backend::{
    DeviceInterface, InterfaceInterface, InterfaceIterator, InterfaceService, ServiceToken,
    UsbBackend,
};
use crate::error::StatusCode;
use crate::request::{DataPhase, SetupPacket, DEVICE_DESCRIPTOR, STRING_DESCRIPTOR};
use mockall::mock;
use std::time::Duration;

mock! {
    pub Device {}

    impl DeviceInterface for Device {
        fn service(&self) -> ServiceToken;
        fn open(&mut self) -> Result<(), StatusCode>;
        fn close(&mut self) -> Result<(), StatusCode>;
        fn configuration_descriptor(&mut self) -> Result<Vec<u8>, StatusCode>;
        fn interface_iterator(&mut self) -> Result<InterfaceIterator, StatusCode>;
        fn control_transfer<'a>(
            &mut self,
            setup: SetupPacket,
            data: DataPhase<'a>,
            timeout: Duration,
        ) -> Result<usize, StatusCode>;
    }
}

mock! {
    pub Interface {}

    impl InterfaceInterface for Interface {
        fn service(&self) -> InterfaceService;
        fn open(&mut self) -> Result<(), StatusCode>;
        fn close(&mut self) -> Result<(), StatusCode>;
    }
}

mock! {
    pub Backend {}

    impl UsbBackend for Backend {
        type Device = MockDevice;
        type Interface = MockInterface;

        fn create_device_interface(
            &self,
            service: ServiceToken,
        ) -> Result<MockDevice, StatusCode>;

        fn create_interface_interface(
            &self,
            service: InterfaceService,
        ) -> Result<MockInterface, StatusCode>;
    }
}

pub const TOKEN: ServiceToken = ServiceToken {
    bus_number: 1,
    address: 4,
};

/// A mock device which knows its own service token, and nothing else.
pub fn device() -> MockDevice {
    let mut device = MockDevice::new();
    device.expect_service().return_const(TOKEN);
    device
}

pub fn interface(interface_number: u8) -> MockInterface {
    let mut interface = MockInterface::new();
    interface.expect_service().return_const(InterfaceService {
        device: TOKEN,
        interface_number,
    });
    interface
}

pub fn string_descriptor(text: &str) -> Vec<u8> {
    let mut bytes = vec![0, STRING_DESCRIPTOR];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes[0] = bytes.len() as u8;
    bytes
}

pub fn language_table(languages: &[u16]) -> Vec<u8> {
    let mut bytes = vec![0, STRING_DESCRIPTOR];
    for language in languages {
        bytes.extend_from_slice(&language.to_le_bytes());
    }
    bytes[0] = bytes.len() as u8;
    bytes
}

/// Fills the IN buffer using `f`, which returns the number of bytes "received".
#[rustfmt::skip]
pub fn transfer_in_with<F: FnMut(&mut [u8]) -> usize + Send + 'static>(
    mut f: F,
) -> impl FnMut(SetupPacket, DataPhase, Duration) -> Result<usize, StatusCode> + Send + 'static {
    move |_, mut data, _| {
        let mut n = 0;
        data.in_with(|bytes| n = f(bytes));
        Ok(n)
    }
}

/// Answers GET_DESCRIPTOR requests for the device descriptor and for the
/// given string descriptors (index 0 being the language table); anything else
/// stalls, as a real device would.
#[rustfmt::skip]
pub fn answer_descriptors(
    device: Vec<u8>,
    strings: Vec<(u8, Vec<u8>)>,
) -> impl FnMut(SetupPacket, DataPhase, Duration) -> Result<usize, StatusCode> + Send + 'static {
    move |setup, mut data, _| {
        let index = (setup.wValue & 0xFF) as u8;
        let source = match (setup.wValue >> 8) as u8 {
            DEVICE_DESCRIPTOR => Some(&device),
            STRING_DESCRIPTOR => strings
                .iter()
                .find(|(string_index, _)| *string_index == index)
                .map(|(_, bytes)| bytes),
            _ => None,
        };
        let Some(source) = source else {
            return Err(StatusCode::PIPE);
        };

        let mut n = 0;
        data.in_with(|bytes| {
            n = bytes.len().min(source.len());
            bytes[..n].copy_from_slice(&source[..n]);
        });
        Ok(n)
    }
}
