use std::collections::{HashMap, HashSet};

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use super::link::ProgramInterface;
use super::reflect::{UniformBlock, UniformKind};

/// Resolved location of a uniform inside one program.
///
/// A failed lookup is `None`; [`UniformLocation::raw`] maps it to `-1`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation(u32);

impl UniformLocation {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Integer form of a lookup result, `-1` when not found.
    pub fn raw(location: Option<UniformLocation>) -> i32 {
        location.map_or(-1, |l| l.0 as i32)
    }
}

/// A host value for one uniform.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue<'a> {
    Int(i32),
    IntArray(&'a [i32]),
    Float(f32),
    Float2(Vec2),
    Float3(Vec3),
    Float4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue<'_> {
    pub fn type_name(&self) -> &'static str {
        match self {
            UniformValue::Int(_) => "i32",
            UniformValue::IntArray(_) => "i32 array",
            UniformValue::Float(_) => "f32",
            UniformValue::Float2(_) => "vec2<f32>",
            UniformValue::Float3(_) => "vec3<f32>",
            UniformValue::Float4(_) => "vec4<f32>",
            UniformValue::Mat3(_) => "mat3x3<f32>",
            UniformValue::Mat4(_) => "mat4x4<f32>",
        }
    }

    /// Bytes to write at the uniform's offset, or `None` if the value does not
    /// fit the declared kind.
    pub(crate) fn encode(&self, kind: UniformKind) -> Option<Vec<u8>> {
        let bytes = match (self, kind) {
            (UniformValue::Int(v), UniformKind::Int) => bytemuck::bytes_of(v).to_vec(),
            (UniformValue::Float(v), UniformKind::Float) => bytemuck::bytes_of(v).to_vec(),
            (UniformValue::Float2(v), UniformKind::Float2) => bytemuck::bytes_of(v).to_vec(),
            (UniformValue::Float3(v), UniformKind::Float3) => bytemuck::bytes_of(v).to_vec(),
            (UniformValue::Float4(v), UniformKind::Float4) => bytemuck::bytes_of(v).to_vec(),
            (UniformValue::Mat4(m), UniformKind::Mat4) => bytemuck::bytes_of(m).to_vec(),
            (UniformValue::Mat3(m), UniformKind::Mat3) => {
                // Columns are vec3 padded to 16 bytes.
                let padded = [
                    m.x_axis.extend(0.0),
                    m.y_axis.extend(0.0),
                    m.z_axis.extend(0.0),
                ];
                bytemuck::cast_slice::<Vec4, u8>(&padded).to_vec()
            }
            (UniformValue::IntArray(values), UniformKind::IntArray { len, stride }) => {
                let count = values.len().min(len as usize);
                let stride = stride as usize;
                let mut out = vec![0u8; count * stride];
                for (i, v) in values.iter().take(count).enumerate() {
                    out[i * stride..i * stride + 4].copy_from_slice(&v.to_ne_bytes());
                }
                out
            }
            _ => return None,
        };
        Some(bytes)
    }
}

/// Name to location cache of one program.
///
/// Every name is looked up in the reflected interface at most once; misses are
/// remembered too, so a uniform the compiler dropped costs one warning.
#[derive(Debug, Default)]
pub(crate) struct UniformCache {
    locations: HashMap<String, Option<UniformLocation>>,
    lookups: usize,
}

impl UniformCache {
    pub fn resolve(
        &mut self,
        name: &str,
        label: &str,
        lookup: impl FnOnce(&str) -> Option<UniformLocation>,
    ) -> Option<UniformLocation> {
        if let Some(cached) = self.locations.get(name) {
            return *cached;
        }

        self.lookups += 1;
        let location = lookup(name);
        if location.is_none() {
            log::warn!("uniform '{name}' not found in shader program {label}");
        }
        self.locations.insert(name.to_string(), location);
        location
    }

    /// Number of lookups that went past the cache.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }
}

#[derive(Debug)]
struct StagedBlock {
    bytes: Vec<u8>,
    dirty: bool,
}

/// CPU copies of a program's uniform buffers.
#[derive(Debug)]
pub(crate) struct UniformStaging {
    blocks: Vec<StagedBlock>,
}

impl UniformStaging {
    pub fn new(blocks: &[UniformBlock]) -> Self {
        Self {
            blocks: blocks
                .iter()
                .map(|b| StagedBlock {
                    bytes: vec![0; b.size as usize],
                    dirty: true,
                })
                .collect(),
        }
    }

    pub fn write(&mut self, block: usize, offset: u32, bytes: &[u8]) {
        let Some(staged) = self.blocks.get_mut(block) else { return };
        let start = offset as usize;
        let end = (start + bytes.len()).min(staged.bytes.len());
        if start >= end {
            return;
        }
        staged.bytes[start..end].copy_from_slice(&bytes[..end - start]);
        staged.dirty = true;
    }

    pub fn block(&self, block: usize) -> Option<&[u8]> {
        self.blocks.get(block).map(|b| b.bytes.as_slice())
    }

    pub fn is_dirty(&self) -> bool {
        self.blocks.iter().any(|b| b.dirty)
    }

    /// Hands every dirty block to `upload` and marks it clean.
    pub fn flush(&mut self, mut upload: impl FnMut(usize, &[u8])) {
        for (i, staged) in self.blocks.iter_mut().enumerate() {
            if staged.dirty {
                upload(i, &staged.bytes);
                staged.dirty = false;
            }
        }
    }
}

/// Host-side uniform state of one program.
#[derive(Debug)]
pub(crate) struct UniformState {
    pub cache: UniformCache,
    pub staging: UniformStaging,
    mismatched: HashSet<UniformLocation>,
}

impl UniformState {
    pub fn new(interface: &ProgramInterface) -> Self {
        Self {
            cache: UniformCache::default(),
            staging: UniformStaging::new(interface.uniform_blocks()),
            mismatched: HashSet::new(),
        }
    }

    pub fn location(
        &mut self,
        interface: &ProgramInterface,
        name: &str,
        label: &str,
    ) -> Option<UniformLocation> {
        self.cache
            .resolve(name, label, |n| interface.find_uniform(n))
    }

    /// Writes `value` into staging. Returns `false` if nothing was written.
    pub fn set(
        &mut self,
        interface: &ProgramInterface,
        name: &str,
        value: UniformValue<'_>,
        label: &str,
    ) -> bool {
        let Some(location) = self.location(interface, name, label) else {
            return false;
        };
        let Some(info) = interface.uniform(location) else {
            return false;
        };

        match value.encode(info.kind) {
            Some(bytes) => {
                self.staging.write(info.block, info.offset, &bytes);
                true
            }
            None => {
                if self.mismatched.insert(location) {
                    log::warn!(
                        "uniform '{name}' in shader program {label} is {:?}; ignoring {} value",
                        info.kind,
                        value.type_name()
                    );
                }
                false
            }
        }
    }
}
