//! Host memory backend. Regions are plain byte vectors and kernels run on
//! the calling thread, which makes every frame step observable in tests.

pub mod kernels;

use crate::backend::Backend;
use crate::error::{FountainError, Result};

#[derive(Debug, Clone)]
pub struct HostRegion {
    label: String,
    bytes: Vec<u8>,
}

impl HostRegion {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[derive(Debug, Default)]
pub struct HostBackend {
    // Largest single allocation permitted, if any.
    allocation_limit: Option<u64>,
    bytes_uploaded: u64,
}

impl HostBackend {
    pub fn new() -> Self {
        HostBackend::default()
    }

    pub fn with_allocation_limit(limit: u64) -> Self {
        HostBackend {
            allocation_limit: Some(limit),
            bytes_uploaded: 0,
        }
    }

    /// Total bytes pushed through `write`, i.e. host to device traffic.
    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }
}

impl Backend for HostBackend {
    type Region = HostRegion;

    fn allocate(&mut self, label: &str, bytes: u64) -> Result<HostRegion> {
        if let Some(limit) = self.allocation_limit {
            if bytes > limit {
                return Err(FountainError::GrowthFailure {
                    requested_bytes: bytes,
                    reason: format!("over the {} byte allocation limit", limit),
                });
            }
        }
        let len = usize::try_from(bytes).map_err(|_| FountainError::GrowthFailure {
            requested_bytes: bytes,
            reason: "larger than the address space".into(),
        })?;
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(len)
            .map_err(|e| FountainError::GrowthFailure {
                requested_bytes: bytes,
                reason: e.to_string(),
            })?;
        storage.resize(len, 0);
        Ok(HostRegion {
            label: label.to_owned(),
            bytes: storage,
        })
    }

    fn write(&mut self, region: &mut HostRegion, byte_offset: u64, data: &[u8]) {
        let start = byte_offset as usize;
        region.bytes[start..start + data.len()].copy_from_slice(data);
        self.bytes_uploaded += data.len() as u64;
    }

    fn copy(
        &mut self,
        src: &HostRegion,
        src_offset: u64,
        dst: &mut HostRegion,
        dst_offset: u64,
        bytes: u64,
    ) {
        let (src_start, dst_start, len) = (src_offset as usize, dst_offset as usize, bytes as usize);
        dst.bytes[dst_start..dst_start + len].copy_from_slice(&src.bytes[src_start..src_start + len]);
    }

    fn read(&mut self, region: &HostRegion, byte_offset: u64, bytes: u64) -> Result<Vec<u8>> {
        let start = byte_offset as usize;
        Ok(region.bytes[start..start + bytes as usize].to_vec())
    }

    fn region_size(&self, region: &HostRegion) -> u64 {
        region.bytes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_limit() {
        let mut backend = HostBackend::with_allocation_limit(64);
        assert!(backend.allocate("ok", 64).is_ok());
        assert!(matches!(
            backend.allocate("too big", 65),
            Err(FountainError::GrowthFailure {
                requested_bytes: 65,
                ..
            })
        ));
    }

    #[test]
    fn write_copy_read() {
        let mut backend = HostBackend::new();
        let mut a = backend.allocate("a", 8).unwrap();
        let mut b = backend.allocate("b", 8).unwrap();
        backend.write(&mut a, 4, &[1, 2, 3, 4]);
        backend.copy(&a, 4, &mut b, 0, 4);
        assert_eq!(backend.read(&b, 0, 8).unwrap(), vec![1, 2, 3, 4, 0, 0, 0, 0]);
        assert_eq!(backend.bytes_uploaded(), 4);
        assert_eq!(backend.region_size(&b), 8);
    }
}
