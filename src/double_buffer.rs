use crate::backend::Backend;
use crate::error::{FountainError, Result};
use crate::record_layout::RecordLayout;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Front,
    Back,
}

/// Two equally sized record regions whose roles flip every frame.
///
/// `front` holds the `active_count` records the renderer may read. The
/// update and emission steps write into `back`; `swap` then exchanges the
/// roles without moving any data.
pub struct DoubleBuffer<B: Backend> {
    layout: RecordLayout,
    regions: [B::Region; 2],
    // Index of the front region in `regions`.
    front: usize,
    capacity: u32,
    active_count: u32,
    // Set by a growth that replaced the regions, cleared by `swap`.
    grown_this_frame: bool,
}

impl<B: Backend> DoubleBuffer<B> {
    pub fn new(backend: &mut B, layout: RecordLayout, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(FountainError::InvalidConfig(
                "buffer capacity must be non-zero".into(),
            ));
        }
        let bytes = layout.bytes_for(capacity);
        let regions = [
            backend.allocate("Record buffer A", bytes)?,
            backend.allocate("Record buffer B", bytes)?,
        ];
        log::info!(
            "Record buffers: capacity {} x {} bytes",
            capacity,
            layout.stride()
        );
        Ok(DoubleBuffer {
            layout,
            regions,
            front: 0,
            capacity,
            active_count: 0,
            grown_this_frame: false,
        })
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn stride(&self) -> u32 {
        self.layout.stride()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn grown_this_frame(&self) -> bool {
        self.grown_this_frame
    }

    pub fn front(&self) -> &B::Region {
        &self.regions[self.front]
    }

    pub fn back(&self) -> &B::Region {
        &self.regions[1 - self.front]
    }

    pub fn back_mut(&mut self) -> &mut B::Region {
        &mut self.regions[1 - self.front]
    }

    /// Front for reading and back for writing at the same time.
    pub fn front_and_back_mut(&mut self) -> (&B::Region, &mut B::Region) {
        let (a, b) = self.regions.split_at_mut(1);
        if self.front == 0 {
            (&a[0], &mut b[0])
        } else {
            (&b[0], &mut a[0])
        }
    }

    fn region_mut(&mut self, role: Role) -> &mut B::Region {
        match role {
            Role::Front => &mut self.regions[self.front],
            Role::Back => &mut self.regions[1 - self.front],
        }
    }

    fn region(&self, role: Role) -> &B::Region {
        match role {
            Role::Front => self.front(),
            Role::Back => self.back(),
        }
    }

    fn check_bounds(&self, offset: u32, count: u32) -> Result<()> {
        match offset.checked_add(count) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(FountainError::OutOfBounds {
                offset,
                count,
                capacity: self.capacity,
            }),
        }
    }

    /// Copies whole records into `role` starting `offset` records in.
    /// Returns the number of records written.
    pub fn write(&mut self, backend: &mut B, role: Role, records: &[u8], offset: u32) -> Result<u32> {
        let count = self.layout.record_count(records)?;
        self.check_bounds(offset, count)?;
        if count == 0 {
            return Ok(0);
        }
        let byte_offset = self.layout.bytes_for(offset);
        backend.write(self.region_mut(role), byte_offset, records);
        Ok(count)
    }

    pub fn read(&self, backend: &mut B, role: Role, offset: u32, count: u32) -> Result<Vec<u8>> {
        self.check_bounds(offset, count)?;
        backend.read(
            self.region(role),
            self.layout.bytes_for(offset),
            self.layout.bytes_for(count),
        )
    }

    /// Seeds the front region before the first frame.
    pub fn fill_front(&mut self, backend: &mut B, records: &[u8]) -> Result<u32> {
        let count = self.write(backend, Role::Front, records, 0)?;
        self.active_count = count;
        Ok(count)
    }

    /// Records how many valid records `back` holds once update and emission
    /// have committed. Takes effect at the next `swap`.
    pub(crate) fn commit_back(&mut self, count: u32) -> Result<()> {
        self.check_bounds(0, count)?;
        self.active_count = count;
        Ok(())
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
        self.grown_this_frame = false;
    }

    /// Replaces both regions with `new_capacity` sized ones, keeping the
    /// first `active_count` front records. Back contents are not carried.
    pub fn grow(&mut self, backend: &mut B, new_capacity: u32) -> Result<()> {
        self.grow_preserving(backend, new_capacity, 0)
    }

    /// `grow` for use mid-frame: the first `back_records` already written to
    /// `back` by this frame's update are rewritten into the new back region.
    pub fn grow_preserving(
        &mut self,
        backend: &mut B,
        new_capacity: u32,
        back_records: u32,
    ) -> Result<()> {
        if new_capacity <= self.capacity {
            return Ok(());
        }
        self.check_bounds(0, back_records)?;
        let bytes = self.layout.bytes_for(new_capacity);
        let mut new_front = backend.allocate("Record buffer A", bytes)?;
        let mut new_back = backend.allocate("Record buffer B", bytes)?;
        if self.active_count > 0 {
            backend.copy(
                self.front(),
                0,
                &mut new_front,
                0,
                self.layout.bytes_for(self.active_count),
            );
        }
        if back_records > 0 {
            backend.copy(
                self.back(),
                0,
                &mut new_back,
                0,
                self.layout.bytes_for(back_records),
            );
        }
        log::info!(
            "Record buffers resized {} -> {} records",
            self.capacity,
            new_capacity
        );
        self.regions = [new_front, new_back];
        self.front = 0;
        self.capacity = new_capacity;
        self.grown_this_frame = true;
        Ok(())
    }
}

/// Smallest doubling of `current` that holds `required` records, or `None`
/// when that would pass `ceiling`.
pub fn doubled_capacity(current: u32, required: u32, ceiling: u32) -> Option<u32> {
    let mut capacity = current.max(1) as u64;
    while capacity < required as u64 {
        capacity *= 2;
    }
    if capacity > ceiling as u64 {
        return None;
    }
    Some(capacity as u32)
}
