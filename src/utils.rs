use std::thread;
use std::time::Duration;

use tracing::{info, instrument};

use crate::backend::{BackendAdapter, DeviceBackend, DeviceInfo};
use crate::error::Result;

/// Blocks until a device is connected and returns the first one found.
///
/// An empty device list is not an error; the query is repeated every
/// `poll_interval` until something is plugged in. Backend failures abort.
#[instrument(skip(adapter))]
pub fn wait_for_device<B: DeviceBackend>(adapter: &mut BackendAdapter<B>, poll_interval: Duration) -> Result<DeviceInfo> {
    let mut announced = false;
    loop {
        let mut devices = adapter.query_devices()?;
        if !devices.is_empty() {
            let device = devices.remove(0);
            info!("Found device: {}", device.name.as_deref().unwrap_or("unknown"));
            return Ok(device);
        }
        if !announced {
            info!("No device connected, waiting for one to be plugged in...");
            announced = true;
        }
        thread::sleep(poll_interval);
    }
}

/// Logs the device description line by line.
pub fn log_device_info(device: &DeviceInfo) {
    for line in device.to_string().lines() {
        info!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;

    #[test]
    fn test_waits_for_hotplug() {
        let mut adapter = BackendAdapter::new(SimulatedBackend::plugged_in_after(3));
        let device = wait_for_device(&mut adapter, Duration::from_millis(1)).unwrap();
        assert_eq!(device.serial_number.as_deref(), Some("000000000001"));
    }

    #[test]
    fn test_connected_device_returned_immediately() {
        let mut adapter = BackendAdapter::new(SimulatedBackend::new());
        let device = wait_for_device(&mut adapter, Duration::from_secs(60)).unwrap();
        assert!(device.name.is_some());
    }
}
