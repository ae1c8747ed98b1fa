//! Surface materials attached to mesh nodes.

use glam::Vec3;

/// A PBR material definition.
///
/// Covers what the supported formats can express: glTF metallic-roughness
/// factors, OBJ/MTL diffuse and dissolve values, and the synthesized default
/// for raw geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    /// Material name (from the source file, empty when synthesized)
    pub name: String,

    /// Diffuse/albedo color (RGB, 0-1)
    pub base_color: Vec3,

    /// Metallic factor (0=dielectric, 1=metal)
    pub metallic: f32,

    /// Roughness factor (0=smooth, 1=rough)
    pub roughness: f32,

    /// Emissive color (RGB, for light-emitting surfaces)
    pub emissive: Vec3,

    /// Opacity (0=transparent, 1=opaque)
    pub opacity: f32,

    /// Path to diffuse/albedo texture, relative to the asset folder
    pub diffuse_texture: Option<String>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_color: Vec3::new(0.5, 0.5, 0.5),
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
            opacity: 1.0,
            diffuse_texture: None,
        }
    }
}

impl Material {
    /// Create a new material with just a name and base color.
    pub fn new(name: impl Into<String>, base_color: Vec3) -> Self {
        Self {
            name: name.into(),
            base_color,
            ..Default::default()
        }
    }

    /// Standard material from a packed `0xRRGGBB` color.
    pub fn from_hex(rgb: u32) -> Self {
        let channel = |shift: u32| ((rgb >> shift) & 0xff) as f32 / 255.0;
        Self {
            base_color: Vec3::new(channel(16), channel(8), channel(0)),
            ..Default::default()
        }
    }

    /// Light grey (`#cccccc`) standard material given to geometry that
    /// carries no material of its own.
    pub fn default_grey() -> Self {
        Self::from_hex(0xcccccc)
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive.length_squared() > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let m = Material::from_hex(0xff8000);
        assert!((m.base_color.x - 1.0).abs() < 1e-6);
        assert!((m.base_color.y - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(m.base_color.z, 0.0);
        assert!(!m.is_emissive());
    }

    #[test]
    fn test_default_grey() {
        let m = Material::default_grey();
        assert!((m.base_color - Vec3::splat(0.8)).length() < 1e-6);
        assert_eq!(m.opacity, 1.0);
    }
}
