// Queue family solver
//
// Maps the four logical roles (graphics, compute, transfer, present) onto the
// queue families a physical device exposes. Roles that land on the same
// family are merged into one family request, because device creation rejects
// duplicate family indices.

use bitflags::bitflags;
use std::fmt;

use crate::error::{EngineError, EngineResult};

bitflags! {
    /// What a queue family can do, including present support for the window surface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueCapabilities: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
        const PRESENT = 1 << 3;
    }
}

impl QueueCapabilities {
    pub fn from_vk(flags: ash::vk::QueueFlags, present: bool) -> Self {
        let mut caps = Self::empty();
        caps.set(Self::GRAPHICS, flags.contains(ash::vk::QueueFlags::GRAPHICS));
        caps.set(Self::COMPUTE, flags.contains(ash::vk::QueueFlags::COMPUTE));
        caps.set(Self::TRANSFER, flags.contains(ash::vk::QueueFlags::TRANSFER));
        caps.set(Self::PRESENT, present);
        caps
    }
}

/// One queue family as reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyRecord {
    pub index: u32,
    pub capabilities: QueueCapabilities,
    pub queue_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Graphics,
    Compute,
    Transfer,
    Present,
}

impl QueueRole {
    /// Order in which roles claim queue slots inside a shared family.
    pub const ALL: [QueueRole; 4] = [
        QueueRole::Graphics,
        QueueRole::Compute,
        QueueRole::Transfer,
        QueueRole::Present,
    ];

    fn capability(self) -> QueueCapabilities {
        match self {
            Self::Graphics => QueueCapabilities::GRAPHICS,
            Self::Compute => QueueCapabilities::COMPUTE,
            Self::Transfer => QueueCapabilities::TRANSFER,
            Self::Present => QueueCapabilities::PRESENT,
        }
    }
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
            Self::Transfer => "transfer",
            Self::Present => "present",
        })
    }
}

/// Scheduler priority hints per role. Summed per family and clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueWeights {
    pub graphics: f32,
    pub compute: f32,
    pub transfer: f32,
    pub present: f32,
}

impl Default for QueueWeights {
    fn default() -> Self {
        Self {
            graphics: 1.0,
            compute: 0.5,
            transfer: 0.5,
            present: 0.25,
        }
    }
}

impl QueueWeights {
    fn of(&self, role: QueueRole) -> f32 {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
            QueueRole::Present => self.present,
        }
    }
}

/// Where a role's queue lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSlot {
    pub family_index: u32,
    pub queue_index: u32,
}

/// One entry of the device's queue-create list.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyRequest {
    pub family_index: u32,
    /// Union of the capabilities of every role mapped here.
    pub capabilities: QueueCapabilities,
    pub queue_count: u32,
    pub priority: f32,
}

impl FamilyRequest {
    /// One priority per requested queue, as device creation expects.
    pub fn priorities(&self) -> Vec<f32> {
        vec![self.priority; self.queue_count as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueFamilyAssignment {
    graphics: QueueSlot,
    compute: QueueSlot,
    transfer: QueueSlot,
    present: QueueSlot,
    /// Transfer had no dedicated family and rides on the graphics family.
    shared_transfer: bool,
    families: Vec<FamilyRequest>,
}

impl QueueFamilyAssignment {
    pub fn slot(&self, role: QueueRole) -> QueueSlot {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
            QueueRole::Present => self.present,
        }
    }

    pub fn families(&self) -> &[FamilyRequest] {
        &self.families
    }

    pub fn has_shared_transfer(&self) -> bool {
        self.shared_transfer
    }

    /// Distinct family indices the swapchain images must be shared between.
    pub fn presentation_families(&self) -> Vec<u32> {
        let graphics = self.graphics.family_index;
        let present = self.present.family_index;
        if graphics == present {
            vec![graphics]
        } else {
            vec![graphics, present]
        }
    }
}

fn first_family(
    families: &[QueueFamilyRecord],
    predicate: impl Fn(QueueCapabilities) -> bool,
) -> Option<u32> {
    families
        .iter()
        .find(|family| family.queue_count > 0 && predicate(family.capabilities))
        .map(|family| family.index)
}

/// Assign every role to a queue family.
///
/// Returns either a complete assignment or `MissingQueueFamily` naming the
/// first role with no candidate; never a partial result.
pub fn solve(
    families: &[QueueFamilyRecord],
    weights: &QueueWeights,
) -> EngineResult<QueueFamilyAssignment> {
    use QueueCapabilities as Caps;

    let graphics = first_family(families, |caps| caps.contains(Caps::GRAPHICS));

    // Prefer an idle DMA-style family for uploads.
    let dedicated_transfer = first_family(families, |caps| {
        caps.contains(Caps::TRANSFER) && !caps.intersects(Caps::GRAPHICS | Caps::COMPUTE)
    });
    let shared_transfer = dedicated_transfer.is_none();
    let transfer = dedicated_transfer.or(graphics);

    let compute = first_family(families, |caps| {
        caps.contains(Caps::COMPUTE) && !caps.contains(Caps::GRAPHICS)
    })
    .or_else(|| first_family(families, |caps| caps.contains(Caps::COMPUTE)));

    let present = first_family(families, |caps| caps.contains(Caps::PRESENT));

    let graphics = graphics.ok_or(EngineError::MissingQueueFamily(QueueRole::Graphics))?;
    let compute = compute.ok_or(EngineError::MissingQueueFamily(QueueRole::Compute))?;
    let transfer = transfer.ok_or(EngineError::MissingQueueFamily(QueueRole::Transfer))?;
    let present = present.ok_or(EngineError::MissingQueueFamily(QueueRole::Present))?;

    let family_of = |role: QueueRole| match role {
        QueueRole::Graphics => graphics,
        QueueRole::Compute => compute,
        QueueRole::Transfer => transfer,
        QueueRole::Present => present,
    };

    // Group roles by family, keeping first-seen family order.
    let mut groups: Vec<(u32, Vec<QueueRole>)> = Vec::new();
    for role in QueueRole::ALL {
        let family_index = family_of(role);
        match groups.iter_mut().find(|(index, _)| *index == family_index) {
            Some((_, roles)) => roles.push(role),
            None => groups.push((family_index, vec![role])),
        }
    }

    let mut requests = Vec::with_capacity(groups.len());
    let mut slots = [QueueSlot {
        family_index: 0,
        queue_index: 0,
    }; 4];

    for (family_index, roles) in &groups {
        let available = families
            .iter()
            .find(|family| family.index == *family_index)
            .map_or(1, |family| family.queue_count.max(1));
        // Clamp down, never up: extra roles reuse the last valid queue.
        let queue_count = (roles.len() as u32).min(available);

        let mut capabilities = QueueCapabilities::empty();
        let mut weight = 0.0;
        for (position, role) in roles.iter().enumerate() {
            capabilities |= role.capability();
            weight += weights.of(*role);
            let slot_index = QueueRole::ALL
                .iter()
                .position(|candidate| candidate == role)
                .unwrap_or_default();
            slots[slot_index] = QueueSlot {
                family_index: *family_index,
                queue_index: (position as u32).min(queue_count - 1),
            };
        }

        requests.push(FamilyRequest {
            family_index: *family_index,
            capabilities,
            queue_count,
            priority: weight.clamp(0.0, 1.0),
        });
    }

    let assignment = QueueFamilyAssignment {
        graphics: slots[0],
        compute: slots[1],
        transfer: slots[2],
        present: slots[3],
        shared_transfer,
        families: requests,
    };

    log::debug!("Queue assignment: {:?}", assignment);
    Ok(assignment)
}
