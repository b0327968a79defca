use crate::backend::{InterfaceInterface, InterfaceService, UsbBackend};
use crate::error::UsbError;
use log::{debug, warn};

/// Owns one low-level interface object. Opening claims the interface,
/// closing releases it.
pub struct InterfaceHandle<I: InterfaceInterface> {
    interface: I,
    open: bool,
}

impl<I: InterfaceInterface> InterfaceHandle<I> {
    pub fn from_service<B>(backend: &B, service: InterfaceService) -> Result<Self, UsbError>
    where
        B: UsbBackend<Interface = I>,
    {
        match backend.create_interface_interface(service) {
            Ok(interface) => Ok(Self {
                interface,
                open: false,
            }),
            Err(status) => {
                debug!("Handshake with {} failed: {}", service, status);
                Err(UsbError::HandshakeFailed(status))
            }
        }
    }

    pub fn service(&self) -> InterfaceService {
        self.interface.service()
    }

    pub fn interface_number(&self) -> u8 {
        self.interface.service().interface_number
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) -> Result<(), UsbError> {
        let result = self.interface.open();
        debug!("Claim {}: {:?}", self.interface.service(), result);
        result?;
        self.open = true;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), UsbError> {
        let result = self.interface.close();
        debug!("Release {}: {:?}", self.interface.service(), result);
        self.open = false;
        result?;
        Ok(())
    }
}

impl<I: InterfaceInterface> Drop for InterfaceHandle<I> {
    fn drop(&mut self) {
        if self.open {
            if let Err(error) = self.close() {
                warn!("Unable to release {}: {}", self.service(), error);
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/interface_handle.rs"]
mod tests;
