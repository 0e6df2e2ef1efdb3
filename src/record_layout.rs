use crate::error::{FountainError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldFormat {
    Float32,
    Float32x2,
    Float32x3,
    Uint32,
}

impl FieldFormat {
    pub fn size(self) -> u32 {
        match self {
            FieldFormat::Float32 | FieldFormat::Uint32 => 4,
            FieldFormat::Float32x2 => 8,
            FieldFormat::Float32x3 => 12,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: u32,
    pub format: FieldFormat,
}

/// Byte layout of one population record. Handed to renderers alongside the
/// front buffer so they can bind attributes without knowing the Rust type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordLayout {
    stride: u32,
    fields: Vec<Field>,
}

impl RecordLayout {
    pub fn new(stride: u32, fields: Vec<Field>) -> Result<Self> {
        let layout = RecordLayout { stride, fields };
        layout.validate()?;
        Ok(layout)
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stride == 0 {
            return Err(FountainError::InvalidConfig(
                "record stride must be non-zero".into(),
            ));
        }
        let mut spans: Vec<(u32, u32, &str)> = self
            .fields
            .iter()
            .map(|f| (f.offset, f.offset + f.format.size(), f.name))
            .collect();
        spans.sort_unstable();
        for (start, end, name) in &spans {
            if *end > self.stride {
                return Err(FountainError::InvalidConfig(format!(
                    "field `{}` ends at byte {} past stride {}",
                    name, end, self.stride
                )));
            }
            if start % 4 != 0 {
                return Err(FountainError::InvalidConfig(format!(
                    "field `{}` is not 4 byte aligned",
                    name
                )));
            }
        }
        for pair in spans.windows(2) {
            if pair[0].1 > pair[1].0 {
                return Err(FountainError::InvalidConfig(format!(
                    "fields `{}` and `{}` overlap",
                    pair[0].2, pair[1].2
                )));
            }
        }
        Ok(())
    }

    /// Number of whole records in `bytes`, or `StrideMismatch`.
    pub fn record_count(&self, bytes: &[u8]) -> Result<u32> {
        if bytes.len() % self.stride as usize != 0 {
            return Err(FountainError::StrideMismatch {
                len: bytes.len(),
                stride: self.stride,
            });
        }
        Ok((bytes.len() / self.stride as usize) as u32)
    }

    pub fn bytes_for(&self, records: u32) -> u64 {
        records as u64 * self.stride as u64
    }
}

/// A plain-old-data record type with a known layout.
pub trait Record: bytemuck::Pod {
    fn layout() -> RecordLayout;
}

// This should match the struct defined in the particle shaders.
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Particle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub color: [f32; 3],
    pub ttl: f32,
}

impl Record for Particle {
    fn layout() -> RecordLayout {
        RecordLayout {
            stride: std::mem::size_of::<Particle>() as u32,
            fields: vec![
                Field {
                    name: "position",
                    offset: 0,
                    format: FieldFormat::Float32x2,
                },
                Field {
                    name: "velocity",
                    offset: 8,
                    format: FieldFormat::Float32x2,
                },
                Field {
                    name: "color",
                    offset: 16,
                    format: FieldFormat::Float32x3,
                },
                Field {
                    name: "ttl",
                    offset: 28,
                    format: FieldFormat::Float32,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_layout_matches_struct() {
        let layout = Particle::layout();
        assert_eq!(layout.stride(), 32);
        layout.validate().unwrap();
        assert_eq!(layout.field("ttl").unwrap().offset, 28);
    }

    #[test]
    fn overlapping_fields_rejected() {
        let fields = vec![
            Field {
                name: "a",
                offset: 0,
                format: FieldFormat::Float32x2,
            },
            Field {
                name: "b",
                offset: 4,
                format: FieldFormat::Float32,
            },
        ];
        assert!(RecordLayout::new(8, fields).is_err());
    }

    #[test]
    fn field_past_stride_rejected() {
        let fields = vec![Field {
            name: "a",
            offset: 4,
            format: FieldFormat::Float32x3,
        }];
        assert!(RecordLayout::new(12, fields).is_err());
    }

    #[test]
    fn record_count_requires_whole_records() {
        let layout = Particle::layout();
        assert_eq!(layout.record_count(&[0u8; 64]).unwrap(), 2);
        assert_eq!(
            layout.record_count(&[0u8; 40]),
            Err(FountainError::StrideMismatch { len: 40, stride: 32 })
        );
    }
}
