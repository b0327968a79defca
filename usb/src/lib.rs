pub use rusb;
pub mod backend;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod request;

mod handle;

#[cfg(test)]
mod mocks;

pub use backend::libusb::LibUsb;
pub use backend::{InterfaceIterator, InterfaceService, ServiceToken, UsbBackend};
pub use device::{UsbDevice, UsbInterface};
pub use error::{StatusCode, UsbError};
pub use handle::{DeviceHandle, InterfaceHandle};
pub use request::ControlRequest;
