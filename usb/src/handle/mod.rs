mod device;
mod interface;

pub use device::DeviceHandle;
pub use interface::InterfaceHandle;
