//! CPU side of a program's uniform interface.
//!
//! Plain uniforms are packed into one byte block using the WGSL uniform
//! address space rules, so the block can be copied straight into a uniform
//! buffer. Sampler uniforms are kept apart as a texture unit per sampler slot.

use super::types::{UniformDecl, UniformLocation, UniformType, UniformValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Byte offset inside the block.
    Block { offset: usize, ty: UniformType },
    /// Index of the sampler slot.
    Sampler(usize),
}

#[derive(Debug, Clone)]
pub(crate) struct UniformBlock {
    slots: Vec<Slot>,
    bytes: Vec<u8>,
    /// Texture unit read by each sampler slot.
    units: Vec<u32>,
}

/// (alignment, size) in the uniform address space.
fn align_and_size(ty: UniformType) -> (usize, usize) {
    match ty {
        UniformType::Float | UniformType::Int | UniformType::Bool => (4, 4),
        UniformType::Vec3 => (16, 12),
        UniformType::Vec4 => (16, 16),
        UniformType::Mat3 => (16, 48),
        UniformType::Mat4 => (16, 64),
        UniformType::Sampler => (0, 0),
    }
}

fn round_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl UniformBlock {
    pub(crate) fn new(decls: &[UniformDecl]) -> Self {
        let mut offset = 0;
        let mut samplers = 0;
        let slots = decls
            .iter()
            .map(|decl| match decl.ty {
                UniformType::Sampler => {
                    samplers += 1;
                    // Sampler slot n reads texture unit n until told otherwise.
                    Slot::Sampler(samplers - 1)
                }
                ty => {
                    let (align, size) = align_and_size(ty);
                    let at = round_up(offset, align);
                    offset = at + size;
                    Slot::Block { offset: at, ty }
                }
            })
            .collect();
        // Struct alignment in WGSL is at least 16 for anything we declare.
        let size = round_up(offset.max(16), 16);
        Self {
            slots,
            bytes: vec![0; size],
            units: (0..samplers as u32).collect(),
        }
    }

    pub(crate) fn slot(&self, location: UniformLocation) -> Option<Slot> {
        self.slots.get(location.0 as usize).copied()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn sampler_units(&self) -> &[u32] {
        &self.units
    }

    pub(crate) fn sampler_count(&self) -> usize {
        self.units.len()
    }

    /// Store `value`. Returns `false` if the location is unknown or the value
    /// does not fit the declared type.
    pub(crate) fn write(&mut self, location: UniformLocation, value: UniformValue) -> bool {
        let Some(slot) = self.slot(location) else {
            return false;
        };
        match (slot, value) {
            (Slot::Sampler(index), UniformValue::Int(unit)) if unit >= 0 => {
                self.units[index] = unit as u32;
                true
            }
            (Slot::Block { offset, ty }, value) if value.fits(ty) => {
                self.write_at(offset, value);
                true
            }
            _ => false,
        }
    }

    fn write_at(&mut self, offset: usize, value: UniformValue) {
        let mut put = |at: usize, data: &[u8]| {
            self.bytes[offset + at..offset + at + data.len()].copy_from_slice(data);
        };
        match value {
            UniformValue::Float(v) => put(0, bytemuck::bytes_of(&v)),
            UniformValue::Int(v) => put(0, bytemuck::bytes_of(&v)),
            UniformValue::Bool(v) => put(0, bytemuck::bytes_of(&(v as u32))),
            UniformValue::Vec3(v) => put(0, bytemuck::cast_slice(&v)),
            UniformValue::Vec4(v) => put(0, bytemuck::cast_slice(&v)),
            // Every mat3 column is padded to 16 bytes.
            UniformValue::Mat3(columns) => {
                for (i, column) in columns.iter().enumerate() {
                    put(i * 16, bytemuck::cast_slice(column));
                }
            }
            UniformValue::Mat4(columns) => {
                for (i, column) in columns.iter().enumerate() {
                    put(i * 16, bytemuck::cast_slice(column));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decls() -> Vec<UniformDecl> {
        vec![
            UniformDecl::new("view", UniformType::Mat4),
            UniformDecl::new("normalMatrix", UniformType::Mat3),
            UniformDecl::new("time", UniformType::Float),
            UniformDecl::new("texDiffuse", UniformType::Sampler),
            UniformDecl::new("hasDiffuseTex", UniformType::Bool),
            UniformDecl::new("texEmission", UniformType::Sampler),
        ]
    }

    #[test]
    fn offsets_follow_wgsl_alignment() {
        let block = UniformBlock::new(&decls());
        assert_eq!(
            block.slot(UniformLocation(0)),
            Some(Slot::Block {
                offset: 0,
                ty: UniformType::Mat4
            })
        );
        assert_eq!(
            block.slot(UniformLocation(1)),
            Some(Slot::Block {
                offset: 64,
                ty: UniformType::Mat3
            })
        );
        assert_eq!(
            block.slot(UniformLocation(2)),
            Some(Slot::Block {
                offset: 112,
                ty: UniformType::Float
            })
        );
        assert_eq!(block.slot(UniformLocation(3)), Some(Slot::Sampler(0)));
        assert_eq!(
            block.slot(UniformLocation(4)),
            Some(Slot::Block {
                offset: 116,
                ty: UniformType::Bool
            })
        );
        assert_eq!(block.bytes().len(), 128);
        assert_eq!(block.sampler_units(), &[0, 1]);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut block = UniformBlock::new(&decls());
        let m = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        assert!(block.write(UniformLocation(1), UniformValue::Mat3(m)));
        let floats: Vec<f32> = block.bytes()[64..112]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[0..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&floats[4..7], &[4.0, 5.0, 6.0]);
        assert_eq!(&floats[8..11], &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn rejects_mismatched_values() {
        let mut block = UniformBlock::new(&decls());
        assert!(!block.write(UniformLocation(2), UniformValue::Int(1)));
        assert!(!block.write(UniformLocation(9), UniformValue::Float(1.0)));
        assert!(block.write(UniformLocation(5), UniformValue::Int(3)));
        assert_eq!(block.sampler_units(), &[0, 3]);
    }
}
