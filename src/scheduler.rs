use crate::double_buffer::doubled_capacity;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GrowthPolicy {
    /// Capacity is set at configuration time; the budget is truncated instead.
    Fixed,
    /// Double the buffers until the request fits, never past `max_capacity`.
    Double { max_capacity: u32 },
}

/// How many records may be admitted this frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EmissionBudget {
    pub count: u32,
    /// Records the source wanted to hand over this frame but could not.
    /// They stay with the source for a later frame.
    pub deferred: u32,
    /// No free slot was left after the update step.
    pub at_capacity: bool,
}

impl EmissionBudget {
    /// Zero budget while the source still has records waiting.
    pub fn capacity_exhausted(&self) -> bool {
        self.count == 0 && self.deferred > 0
    }
}

/// `min(capacity - survivor_count, max_emit_per_frame, source_available)`.
pub fn compute_budget(
    capacity: u32,
    survivor_count: u32,
    max_emit_per_frame: u32,
    source_available: u32,
) -> EmissionBudget {
    let free = capacity.saturating_sub(survivor_count);
    let wanted = max_emit_per_frame.min(source_available);
    let count = free.min(wanted);
    EmissionBudget {
        count,
        deferred: wanted - count,
        at_capacity: free == 0,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EmissionScheduler {
    pub max_emit_per_frame: u32,
    pub growth: GrowthPolicy,
}

impl EmissionScheduler {
    pub fn new(max_emit_per_frame: u32, growth: GrowthPolicy) -> Self {
        EmissionScheduler {
            max_emit_per_frame,
            growth,
        }
    }

    pub fn compute_budget(
        &self,
        capacity: u32,
        survivor_count: u32,
        source_available: u32,
    ) -> EmissionBudget {
        compute_budget(
            capacity,
            survivor_count,
            self.max_emit_per_frame,
            source_available,
        )
    }

    /// The capacity to grow to before emitting, if the request does not fit
    /// and the policy allows growing.
    pub fn growth_target(&self, capacity: u32, survivor_count: u32, source_available: u32) -> Option<u32> {
        let requested = self.max_emit_per_frame.min(source_available);
        let required = survivor_count.saturating_add(requested);
        if required <= capacity {
            return None;
        }
        match self.growth {
            GrowthPolicy::Fixed => None,
            GrowthPolicy::Double { max_capacity } => {
                doubled_capacity(capacity, required, max_capacity)
                    .or_else(|| Some(max_capacity).filter(|&max| max > capacity))
            }
        }
    }
}
