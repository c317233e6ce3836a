//! OTA partition adapter.
//!
//! Implements [`FlashPort`] on top of `esp-ota`.  On the host a two-slot
//! simulation stands in for the partition table, with failure injection for
//! every primitive so the engine's abort paths can be exercised.

use crate::app::ports::{FlashError, FlashPort};
use log::{info, warn};

/// Partition-table labels are at most 16 bytes.
pub type PartitionLabel = heapless::String<16>;

/// Copy a partition label, refusing one that does not fit.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn partition_label(raw: &str) -> Result<PartitionLabel, FlashError> {
    PartitionLabel::try_from(raw).map_err(|_| {
        warn!("OTA: partition label '{}' too long", raw);
        FlashError::NoPartition
    })
}

// ── ESP-IDF implementation ────────────────────────────────────

/// Inactive OTA slot as reported by the partition table.
#[cfg(target_os = "espidf")]
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub label: PartitionLabel,
    pub address: u32,
}

#[cfg(target_os = "espidf")]
pub struct FlashAdapter {
    /// Finalized image waiting for the boot-partition switch.
    completed: Option<esp_ota::CompletedOtaUpdate>,
}

#[cfg(target_os = "espidf")]
impl FlashAdapter {
    pub fn new() -> Self {
        Self { completed: None }
    }
}

#[cfg(target_os = "espidf")]
impl Default for FlashAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl FlashPort for FlashAdapter {
    type Partition = PartitionInfo;
    type Writer = esp_ota::OtaUpdate;

    fn select_inactive_partition(&mut self) -> Result<PartitionInfo, FlashError> {
        // SAFETY: read-only lookup in the static partition table.
        let part = unsafe { esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null()) };
        if part.is_null() {
            return Err(FlashError::NoPartition);
        }
        // SAFETY: non-null pointers returned above reference static entries.
        let (label, address) = unsafe {
            let label = core::ffi::CStr::from_ptr((*part).label.as_ptr());
            (label.to_str().unwrap_or("?"), (*part).address)
        };
        let info = PartitionInfo {
            label: partition_label(label)?,
            address,
        };
        info!("OTA: writing to partition {} at 0x{:08x}", info.label, info.address);
        Ok(info)
    }

    fn begin_write(&mut self, _partition: &PartitionInfo) -> Result<esp_ota::OtaUpdate, FlashError> {
        self.completed = None;
        esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("esp-ota begin failed: {:?}", e);
            FlashError::BeginFailed
        })
    }

    fn write(&mut self, writer: &mut esp_ota::OtaUpdate, data: &[u8]) -> Result<(), FlashError> {
        writer.write(data).map_err(|e| {
            warn!("esp-ota write failed: {:?}", e);
            FlashError::WriteFailed
        })
    }

    fn finalize(&mut self, writer: esp_ota::OtaUpdate) -> Result<(), FlashError> {
        let completed = writer.finalize().map_err(|e| {
            warn!("esp-ota finalize failed: {:?}", e);
            FlashError::FinalizeFailed
        })?;
        self.completed = Some(completed);
        Ok(())
    }

    fn set_boot_target(&mut self, partition: &PartitionInfo) -> Result<(), FlashError> {
        let mut completed = self.completed.take().ok_or(FlashError::BootSetFailed)?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("esp-ota set_as_boot_partition failed: {:?}", e);
            FlashError::BootSetFailed
        })?;
        info!("OTA: next boot from {}", partition.label);
        Ok(())
    }

    fn abort(&mut self, writer: esp_ota::OtaUpdate) {
        // esp-ota aborts the update when OtaUpdate is dropped
        drop(writer);
        self.completed = None;
    }

    fn restart(&mut self) {
        info!("OTA: restarting into new firmware");
        esp_ota::restart();
    }
}

/// Mark the running image valid so the bootloader cancels rollback.
#[cfg(target_os = "espidf")]
pub fn mark_running_image_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

// ── Simulation ────────────────────────────────────────────────

/// Primitive to fail on the next call.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStep {
    Select,
    Begin,
    /// Fail the n-th write (1-based) of the next session.
    Write(u32),
    Finalize,
    SetBoot,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPartition {
    pub slot: usize,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug)]
pub struct SimWriter {
    slot: usize,
    buf: Vec<u8>,
    writes: u32,
}

/// Two OTA slots; slot 0 runs at start.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct FlashAdapter {
    slots: [Vec<u8>; 2],
    running_slot: usize,
    boot_slot: usize,
    finalized: Option<usize>,
    fail: Option<FlashStep>,
    begin_calls: u32,
    finalize_calls: u32,
    boot_set_calls: u32,
    aborts: u32,
    restarts: u32,
}

#[cfg(not(target_os = "espidf"))]
impl FlashAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given primitive once.
    pub fn inject_failure(&mut self, step: FlashStep) {
        self.fail = Some(step);
    }

    pub fn boot_slot(&self) -> usize {
        self.boot_slot
    }

    pub fn image(&self, slot: usize) -> &[u8] {
        &self.slots[slot]
    }

    pub fn begin_calls(&self) -> u32 {
        self.begin_calls
    }

    pub fn finalize_calls(&self) -> u32 {
        self.finalize_calls
    }

    pub fn boot_set_calls(&self) -> u32 {
        self.boot_set_calls
    }

    pub fn aborts(&self) -> u32 {
        self.aborts
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn take_failure(&mut self, step: FlashStep) -> bool {
        if self.fail == Some(step) {
            self.fail = None;
            return true;
        }
        false
    }
}

#[cfg(not(target_os = "espidf"))]
impl FlashPort for FlashAdapter {
    type Partition = SimPartition;
    type Writer = SimWriter;

    fn select_inactive_partition(&mut self) -> Result<SimPartition, FlashError> {
        if self.take_failure(FlashStep::Select) {
            return Err(FlashError::NoPartition);
        }
        Ok(SimPartition {
            slot: 1 - self.running_slot,
        })
    }

    fn begin_write(&mut self, partition: &SimPartition) -> Result<SimWriter, FlashError> {
        self.begin_calls += 1;
        if self.take_failure(FlashStep::Begin) {
            return Err(FlashError::BeginFailed);
        }
        self.finalized = None;
        Ok(SimWriter {
            slot: partition.slot,
            buf: Vec::new(),
            writes: 0,
        })
    }

    fn write(&mut self, writer: &mut SimWriter, data: &[u8]) -> Result<(), FlashError> {
        writer.writes += 1;
        if self.take_failure(FlashStep::Write(writer.writes)) {
            return Err(FlashError::WriteFailed);
        }
        writer.buf.extend_from_slice(data);
        Ok(())
    }

    fn finalize(&mut self, writer: SimWriter) -> Result<(), FlashError> {
        self.finalize_calls += 1;
        if self.take_failure(FlashStep::Finalize) || writer.buf.is_empty() {
            return Err(FlashError::FinalizeFailed);
        }
        self.slots[writer.slot] = writer.buf;
        self.finalized = Some(writer.slot);
        Ok(())
    }

    fn set_boot_target(&mut self, partition: &SimPartition) -> Result<(), FlashError> {
        self.boot_set_calls += 1;
        if self.take_failure(FlashStep::SetBoot) || self.finalized != Some(partition.slot) {
            return Err(FlashError::BootSetFailed);
        }
        self.boot_slot = partition.slot;
        Ok(())
    }

    fn abort(&mut self, writer: SimWriter) {
        self.aborts += 1;
        drop(writer);
    }

    fn restart(&mut self) {
        self.restarts += 1;
        info!("OTA: restart (simulation, boot slot {})", self.boot_slot);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn mark_running_image_valid() {
    info!("OTA rollback check (simulation): skipped");
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn partition_label_fits_or_is_refused() {
        assert_eq!(partition_label("ota_1").as_deref(), Ok("ota_1"));
        assert_eq!(partition_label("a_label_of_17_chr"), Err(FlashError::NoPartition));
    }

    #[test]
    fn selects_the_other_slot() {
        let mut flash = FlashAdapter::new();
        assert_eq!(flash.select_inactive_partition(), Ok(SimPartition { slot: 1 }));
    }

    #[test]
    fn boot_switch_requires_finalized_image() {
        let mut flash = FlashAdapter::new();
        let part = flash.select_inactive_partition().unwrap();
        assert_eq!(flash.set_boot_target(&part), Err(FlashError::BootSetFailed));
        assert_eq!(flash.boot_slot(), 0);
    }

    #[test]
    fn full_cycle_switches_boot_slot() {
        let mut flash = FlashAdapter::new();
        let part = flash.select_inactive_partition().unwrap();
        let mut w = flash.begin_write(&part).unwrap();
        flash.write(&mut w, b"image").unwrap();
        flash.finalize(w).unwrap();
        flash.set_boot_target(&part).unwrap();
        assert_eq!(flash.boot_slot(), 1);
        assert_eq!(flash.image(1), b"image");
    }

    #[test]
    fn injected_write_failure_hits_nth_write_once() {
        let mut flash = FlashAdapter::new();
        flash.inject_failure(FlashStep::Write(2));
        let part = flash.select_inactive_partition().unwrap();
        let mut w = flash.begin_write(&part).unwrap();
        assert!(flash.write(&mut w, b"a").is_ok());
        assert_eq!(flash.write(&mut w, b"b"), Err(FlashError::WriteFailed));
        assert!(flash.write(&mut w, b"c").is_ok());
    }

    #[test]
    fn empty_image_fails_finalize() {
        let mut flash = FlashAdapter::new();
        let part = flash.select_inactive_partition().unwrap();
        let w = flash.begin_write(&part).unwrap();
        assert_eq!(flash.finalize(w), Err(FlashError::FinalizeFailed));
    }
}
