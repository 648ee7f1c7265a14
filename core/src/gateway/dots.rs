use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{Channel, ChannelUpdate, DeviceState, DotTransport, GatewayError, Rgb, Vibration};

/// Outcome of a best-effort reset sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Devices visited
    pub devices: usize,
    /// Channel writes that did not apply
    pub failures: Vec<(u8, Channel)>,
}

impl ResetReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Injectable gateway over a [`DotTransport`].
///
/// One async mutex per device serialises writes to that device and guards its
/// mirrored [`DeviceState`]. The mirror only changes after the transport
/// accepted the frame.
pub struct DotGateway {
    transport: Option<Arc<dyn DotTransport>>,
    devices: BTreeMap<u8, Mutex<DeviceState>>,
    write_timeout: Duration,
    started: AtomicBool,
    connected: AtomicBool,
}

impl DotGateway {
    pub fn new(transport: Arc<dyn DotTransport>, addresses: &[u8], write_timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            devices: Self::device_table(addresses),
            write_timeout,
            started: AtomicBool::new(false),
            connected: AtomicBool::new(false),
        }
    }

    /// Gateway with no transport. Every write is a no-op returning
    /// [`GatewayError::NotStarted`].
    pub fn disabled(addresses: &[u8]) -> Self {
        Self {
            transport: None,
            devices: Self::device_table(addresses),
            write_timeout: Duration::from_secs(1),
            started: AtomicBool::new(false),
            connected: AtomicBool::new(false),
        }
    }

    fn device_table(addresses: &[u8]) -> BTreeMap<u8, Mutex<DeviceState>> {
        addresses
            .iter()
            .map(|&a| (a, Mutex::new(DeviceState::default())))
            .collect()
    }

    /// Connect the transport. On failure the gateway stays not-started.
    pub async fn start(&self) -> Result<(), GatewayError> {
        let Some(transport) = &self.transport else {
            tracing::error!("Haptic gateway has no transport; hardware output disabled");
            return Err(GatewayError::NotStarted);
        };

        let discovered = match timeout(self.write_timeout, transport.connect()).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Failed to start haptic gateway; hardware output disabled");
                return Err(GatewayError::NotStarted);
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Haptic gateway connect timed out; hardware output disabled"
                );
                return Err(GatewayError::NotStarted);
            }
        };

        for address in self.devices.keys() {
            if !discovered.contains(address) {
                tracing::warn!(address, "Configured device did not answer on connect");
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        tracing::info!(devices = ?discovered, "Haptic gateway started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Hardware actions are attempted at all
    pub fn is_ready(&self) -> bool {
        self.is_started() && self.is_connected()
    }

    pub fn addresses(&self) -> Vec<u8> {
        self.devices.keys().copied().collect()
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Last successfully written state of a device
    pub async fn device_state(&self, address: u8) -> Option<DeviceState> {
        let device = self.devices.get(&address)?;
        Some(*device.lock().await)
    }

    /// Write one update to one device, bounded by the write timeout
    pub async fn write(&self, address: u8, update: ChannelUpdate) -> Result<(), GatewayError> {
        if !self.is_ready() {
            tracing::debug!(address, "Gateway not started; write skipped");
            return Err(GatewayError::NotStarted);
        }
        let Some(transport) = &self.transport else {
            return Err(GatewayError::NotStarted);
        };
        let device = self
            .devices
            .get(&address)
            .ok_or(GatewayError::UnknownDevice(address))?;
        if update.is_empty() {
            return Ok(());
        }

        let mut state = device.lock().await;
        let next = state.apply(&update);
        match timeout(self.write_timeout, transport.write(address, &update, &next)).await {
            Ok(Ok(())) => {
                *state = next;
                Ok(())
            }
            Ok(Err(source)) => {
                if matches!(source, super::TransportError::Disconnected) {
                    self.connected.store(false, Ordering::SeqCst);
                    tracing::error!(address, "Haptic transport disconnected");
                } else {
                    tracing::warn!(address, error = %source, ?update, "Device write failed");
                }
                Err(GatewayError::Transport { address, source })
            }
            Err(_) => {
                tracing::warn!(
                    address,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "Device write timed out"
                );
                Err(GatewayError::Timeout { address })
            }
        }
    }

    pub async fn set_led(&self, address: u8, rgb: Rgb) -> Result<(), GatewayError> {
        self.write(address, ChannelUpdate::led(rgb)).await
    }

    pub async fn set_vibration(&self, address: u8, vibration: Vibration) -> Result<(), GatewayError> {
        self.write(address, ChannelUpdate::vibration(vibration)).await
    }

    pub async fn set_thermal(&self, address: u8, intensity: f32) -> Result<(), GatewayError> {
        self.write(address, ChannelUpdate::thermal(intensity)).await
    }

    /// Return one device's channels to rest, thermal then LED then vibration.
    /// Each channel is attempted even if an earlier one failed.
    pub async fn reset_device(&self, address: u8, channels: &[Channel], report: &mut ResetReport) {
        for &channel in channels {
            if self.write(address, ChannelUpdate::reset(channel)).await.is_err() {
                report.failures.push((address, channel));
            }
        }
        report.devices += 1;
    }

    /// Best-effort reset of every device
    pub async fn reset_all(&self) -> ResetReport {
        let mut report = ResetReport::default();
        if !self.is_ready() {
            tracing::debug!("Gateway not started; reset skipped");
            return report;
        }
        for address in self.addresses() {
            self.reset_device(address, &Channel::RESET_ORDER, &mut report)
                .await;
        }
        tracing::debug!(devices = report.devices, failures = report.failures.len(), "Reset all devices");
        report
    }

    /// Force every LED off
    pub async fn reset_leds(&self) -> ResetReport {
        let mut report = ResetReport::default();
        if !self.is_ready() {
            return report;
        }
        for address in self.addresses() {
            self.reset_device(address, &[Channel::Led], &mut report).await;
        }
        report
    }
}

impl std::fmt::Debug for DotGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DotGateway")
            .field("addresses", &self.addresses())
            .field("started", &self.is_started())
            .field("connected", &self.is_connected())
            .finish()
    }
}
