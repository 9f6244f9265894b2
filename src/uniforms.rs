use std::fmt;
use std::rc::Rc;

use ahash::{HashMap, HashMapExt};

use crate::color::Color;
use crate::context::UniformSlot;
use crate::error::ContextError;
use crate::id::TextureHandle;

/// Shape of a uniform value. Programs declare their uniforms as an ordered list of slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Texture,
}

impl UniformKind {
    /// Bytes the value occupies in a packed uniform block. Every scalar and vector is padded
    /// to a `vec4`; matrices are stored as padded columns. Textures are bound separately.
    pub(crate) fn packed_size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Vec2 | UniformKind::Vec3 | UniformKind::Vec4 => 16,
            UniformKind::Mat3 => 48,
            UniformKind::Mat4 => 64,
            UniformKind::Texture => 0,
        }
    }
}

/// A single uniform value. Matrices are column-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([[f32; 3]; 3]),
    Mat4([[f32; 4]; 4]),
    Texture(TextureHandle),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat3(_) => UniformKind::Mat3,
            UniformValue::Mat4(_) => UniformKind::Mat4,
            UniformValue::Texture(_) => UniformKind::Texture,
        }
    }

    /// Lanes of the value as floats, zero-padded to its packed size.
    fn write_packed(&self, out: &mut Vec<f32>) {
        match *self {
            UniformValue::Float(x) => out.extend_from_slice(&[x, 0.0, 0.0, 0.0]),
            UniformValue::Vec2([x, y]) => out.extend_from_slice(&[x, y, 0.0, 0.0]),
            UniformValue::Vec3([x, y, z]) => out.extend_from_slice(&[x, y, z, 0.0]),
            UniformValue::Vec4(v) => out.extend_from_slice(&v),
            UniformValue::Mat3(columns) => {
                for [x, y, z] in columns {
                    out.extend_from_slice(&[x, y, z, 0.0]);
                }
            }
            UniformValue::Mat4(columns) => {
                for column in columns {
                    out.extend_from_slice(&column);
                }
            }
            UniformValue::Texture(_) => {}
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<[[f32; 3]; 3]> for UniformValue {
    fn from(value: [[f32; 3]; 3]) -> Self {
        UniformValue::Mat3(value)
    }
}

impl From<[[f32; 4]; 4]> for UniformValue {
    fn from(value: [[f32; 4]; 4]) -> Self {
        UniformValue::Mat4(value)
    }
}

impl From<Color> for UniformValue {
    fn from(value: Color) -> Self {
        UniformValue::Vec4(value.normalize())
    }
}

impl From<TextureHandle> for UniformValue {
    fn from(value: TextureHandle) -> Self {
        UniformValue::Texture(value)
    }
}

type WriteObserver = Rc<dyn Fn(&str)>;

/// Named uniform values with an optional write observer.
///
/// The observer is invoked after every mutation with the name that changed. A [`Shader`]
/// registers one at construction to mark itself dirty. Cloning a bag does not clone its
/// observer: the copy belongs to nobody until it is handed to a new shader.
///
/// [`Shader`]: crate::Shader
#[derive(Default)]
pub struct Uniforms {
    values: HashMap<String, UniformValue>,
    on_write: Option<WriteObserver>,
}

impl Uniforms {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            on_write: None,
        }
    }

    /// Creates an empty bag that reports every write to `observer`.
    pub fn with_observer(observer: impl Fn(&str) + 'static) -> Self {
        Self {
            values: HashMap::new(),
            on_write: Some(Rc::new(observer)),
        }
    }

    /// Builder-style [`Uniforms::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.set(name, value);
        self
    }

    pub(crate) fn set_observer(&mut self, observer: Option<WriteObserver>) {
        self.on_write = observer;
    }

    /// Writes a uniform and notifies the observer. Returns the previous value.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<UniformValue>,
    ) -> Option<UniformValue> {
        let name = name.into();
        let previous = self.values.insert(name.clone(), value.into());
        self.notify(&name);
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<UniformValue> {
        let removed = self.values.remove(name);
        if removed.is_some() {
            self.notify(name);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn notify(&self, name: &str) {
        if let Some(observer) = self.on_write.as_ref() {
            observer(name);
        }
    }

    fn lookup(&self, slot: &UniformSlot) -> Result<&UniformValue, ContextError> {
        let value = self
            .values
            .get(slot.name.as_ref())
            .ok_or_else(|| ContextError::UniformMismatch {
                name: slot.name.to_string(),
                reason: "no value set".into(),
            })?;

        if value.kind() != slot.kind {
            return Err(ContextError::UniformMismatch {
                name: slot.name.to_string(),
                reason: format!("expected {:?}, got {:?}", slot.kind, value.kind()),
            });
        }

        Ok(value)
    }

    /// Packs the non-texture slots, in declaration order, into a uniform block.
    pub(crate) fn pack(&self, slots: &[UniformSlot]) -> Result<Vec<u8>, ContextError> {
        let capacity = slots.iter().map(|slot| slot.kind.packed_size()).sum::<usize>() / 4;
        let mut lanes: Vec<f32> = Vec::with_capacity(capacity);

        for slot in slots.iter().filter(|slot| slot.kind != UniformKind::Texture) {
            self.lookup(slot)?.write_packed(&mut lanes);
        }

        Ok(bytemuck::cast_slice(&lanes).to_vec())
    }

    /// Textures bound by the texture slots, in declaration order.
    pub(crate) fn textures(&self, slots: &[UniformSlot]) -> Result<Vec<TextureHandle>, ContextError> {
        slots
            .iter()
            .filter(|slot| slot.kind == UniformKind::Texture)
            .map(|slot| match self.lookup(slot)? {
                UniformValue::Texture(texture) => Ok(*texture),
                other => Err(ContextError::UniformMismatch {
                    name: slot.name.to_string(),
                    reason: format!("expected Texture, got {:?}", other.kind()),
                }),
            })
            .collect()
    }
}

impl Clone for Uniforms {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            on_write: None,
        }
    }
}

impl fmt::Debug for Uniforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uniforms")
            .field("values", &self.values)
            .field("observed", &self.on_write.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn observer_sees_every_write_and_removal() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut uniforms = Uniforms::with_observer(move |name| sink.borrow_mut().push(name.to_owned()));

        uniforms.set("u_amount", 0.5);
        uniforms.set("u_amount", 0.75);
        uniforms.remove("u_missing");
        uniforms.remove("u_amount");

        assert_eq!(*seen.borrow(), vec!["u_amount", "u_amount", "u_amount"]);
    }

    #[test]
    fn clones_drop_the_observer() {
        let uniforms = Uniforms::with_observer(|_| {}).with("u_tint", Color::WHITE);
        let copy = uniforms.clone();

        assert!(format!("{copy:?}").contains("observed: false"));
        assert_eq!(copy.get("u_tint"), Some(&UniformValue::Vec4([1.0; 4])));
    }

    #[test]
    fn pack_pads_scalars_and_matrix_columns() {
        let slots = vec![
            UniformSlot::new("u_amount", UniformKind::Float),
            UniformSlot::new("u_mask", UniformKind::Texture),
            UniformSlot::new("u_basis", UniformKind::Mat3),
        ];
        let uniforms = Uniforms::new()
            .with("u_amount", 2.0)
            .with("u_mask", TextureHandle(9))
            .with("u_basis", [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);

        let bytes = uniforms.pack(&slots).unwrap();
        let lanes: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|lane| f32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]))
            .collect();

        assert_eq!(
            lanes,
            vec![
                2.0, 0.0, 0.0, 0.0, //
                1.0, 2.0, 3.0, 0.0, //
                4.0, 5.0, 6.0, 0.0, //
                7.0, 8.0, 9.0, 0.0,
            ]
        );
        assert_eq!(uniforms.textures(&slots).unwrap(), vec![TextureHandle(9)]);
    }

    #[test]
    fn pack_rejects_missing_and_mistyped_values() {
        let slots = vec![UniformSlot::new("u_color", UniformKind::Vec4)];

        let missing = Uniforms::new().pack(&slots);
        assert!(matches!(missing, Err(ContextError::UniformMismatch { .. })));

        let mistyped = Uniforms::new().with("u_color", 1.0).pack(&slots);
        assert!(matches!(mistyped, Err(ContextError::UniformMismatch { .. })));
    }
}
