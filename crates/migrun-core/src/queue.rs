//! Per-device admission-controlled queue of in-flight jobs.
//!
//! Each device holds the uids currently occupying one of its slots. `submit`
//! refuses to exceed a device's capacity, so `len(device) <= capacity` holds
//! at all times. Removal is idempotent: a removed uid enters a history set and
//! later removals of it are no-ops, which matters when the completion store and
//! the process supervisor both report the same uid.

use std::collections::HashSet;

use crate::device::DeviceRegistry;
use crate::job::JobUid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("device {device} is full ({capacity} jobs); admission check was skipped")]
    CapacityExceeded { device: String, capacity: usize },
    #[error("unknown device {0}")]
    UnknownDevice(String),
    #[error("duplicate job uid {0}")]
    DuplicateJob(JobUid),
}

#[derive(Debug)]
struct DeviceSlots {
    name: String,
    capacity: usize,
    uids: Vec<JobUid>,
}

/// Device -> in-flight uids, in registry order.
#[derive(Debug)]
pub struct DeviceQueue {
    slots: Vec<DeviceSlots>,
    submitted: HashSet<JobUid>,
    history: HashSet<JobUid>,
}

impl DeviceQueue {
    pub fn new(registry: &DeviceRegistry) -> Self {
        let slots = registry
            .devices()
            .iter()
            .map(|d| DeviceSlots {
                name: d.name.clone(),
                capacity: d.capacity,
                uids: Vec::with_capacity(d.capacity),
            })
            .collect();
        Self {
            slots,
            submitted: HashSet::new(),
            history: HashSet::new(),
        }
    }

    /// Occupy a slot on `device` with `uid`. Never exceeds the device's capacity.
    pub fn submit(&mut self, uid: JobUid, device: &str) -> Result<(), QueueError> {
        if self.submitted.contains(&uid) {
            return Err(QueueError::DuplicateJob(uid));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.name == device)
            .ok_or_else(|| QueueError::UnknownDevice(device.to_string()))?;
        if slot.uids.len() >= slot.capacity {
            return Err(QueueError::CapacityExceeded {
                device: slot.name.clone(),
                capacity: slot.capacity,
            });
        }
        slot.uids.push(uid);
        self.submitted.insert(uid);
        Ok(())
    }

    /// Devices with at least one free slot, with their current job count, in registry order.
    pub fn free_devices(&self) -> Vec<(String, usize)> {
        self.slots
            .iter()
            .filter(|s| s.uids.len() < s.capacity)
            .map(|s| (s.name.clone(), s.uids.len()))
            .collect()
    }

    /// Release the slots held by `uids`. Returns the uids actually removed by this call;
    /// uids already removed earlier, or never queued, are skipped.
    pub fn remove(&mut self, uids: &[JobUid]) -> Vec<JobUid> {
        let mut removed = Vec::new();
        for &uid in uids {
            if self.history.contains(&uid) {
                continue;
            }
            for slot in self.slots.iter_mut() {
                if let Some(pos) = slot.uids.iter().position(|u| *u == uid) {
                    slot.uids.remove(pos);
                    self.history.insert(uid);
                    removed.push(uid);
                    break;
                }
            }
        }
        removed
    }

    /// All uids currently holding a slot, in registry order.
    pub fn running_uids(&self) -> Vec<JobUid> {
        self.slots
            .iter()
            .flat_map(|s| s.uids.iter().copied())
            .collect()
    }

    /// Device currently holding `uid`, if any.
    pub fn device_of(&self, uid: JobUid) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.uids.contains(&uid))
            .map(|s| s.name.as_str())
    }

    /// True once `uid` has been released from the queue.
    pub fn was_removed(&self, uid: JobUid) -> bool {
        self.history.contains(&uid)
    }

    /// Number of jobs currently holding a slot.
    pub fn len(&self) -> usize {
        self.slots.iter().map(|s| s.uids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.uids.is_empty())
    }

    /// Per-device uid lists, for progress display.
    pub fn snapshot(&self) -> Vec<(String, Vec<JobUid>)> {
        self.slots
            .iter()
            .map(|s| (s.name.clone(), s.uids.clone()))
            .collect()
    }
}
