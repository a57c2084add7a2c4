// material.rs - Semantic class to surface material lookup
//
// The table is an immutable value injected into the fuser. Lookups fall back
// to the `_default` entry for labels the table does not know.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::buffer::MaterialSample;
use crate::error::RelightError;

pub const DEFAULT_KEY: &str = "_default";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub roughness: f32,
    #[serde(default)]
    pub metallic: f32,
    #[serde(default)]
    pub subsurface: f32,
    #[serde(default)]
    pub emissive: f32,
    /// Hard depth override for every pixel of this class (e.g. sky)
    #[serde(default, rename = "forceDepth", alias = "force_depth", skip_serializing_if = "Option::is_none")]
    pub force_depth: Option<f32>,
}

impl Material {
    pub const fn new(roughness: f32, metallic: f32, subsurface: f32, emissive: f32) -> Self {
        Self { roughness, metallic, subsurface, emissive, force_depth: None }
    }

    pub const fn with_force_depth(mut self, depth: f32) -> Self {
        self.force_depth = Some(depth);
        self
    }

    pub fn sample(&self) -> MaterialSample {
        MaterialSample {
            roughness: self.roughness,
            metallic: self.metallic,
            subsurface: self.subsurface,
            emissive: self.emissive,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Material::new(0.5, 0.0, 0.0, 0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialTable {
    entries: HashMap<String, Material>,
    default: Material,
}

impl MaterialTable {
    /// Build from (label, material) pairs; labels are matched case-insensitively
    pub fn new(default: Material, entries: impl IntoIterator<Item = (String, Material)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .filter(|(k, _)| k != DEFAULT_KEY)
            .collect();
        Self { entries, default }
    }

    /// Parse a JSON object keyed by label. `_default` is required.
    pub fn from_json(json: &str) -> Result<Self, RelightError> {
        let mut raw: HashMap<String, Material> = serde_json::from_str(json)?;
        let default = raw.remove(DEFAULT_KEY).ok_or(RelightError::MissingDefaultMaterial)?;
        Ok(Self::new(default, raw))
    }

    /// Stock table for common indoor/outdoor scene labels
    pub fn builtin() -> Self {
        let rows: [(&str, Material); 17] = [
            ("sky", Material::new(1.0, 0.0, 0.0, 0.0).with_force_depth(1.0)),
            ("floor", Material::new(0.7, 0.0, 0.0, 0.0)),
            ("wall", Material::new(0.8, 0.0, 0.0, 0.0)),
            ("ceiling", Material::new(0.85, 0.0, 0.0, 0.0)),
            ("road", Material::new(0.9, 0.0, 0.0, 0.0)),
            ("sidewalk", Material::new(0.85, 0.0, 0.0, 0.0)),
            ("person", Material::new(0.6, 0.0, 0.4, 0.0)),
            ("skin", Material::new(0.55, 0.0, 0.5, 0.0)),
            ("plant", Material::new(0.7, 0.0, 0.3, 0.0)),
            ("tree", Material::new(0.75, 0.0, 0.25, 0.0)),
            ("grass", Material::new(0.8, 0.0, 0.2, 0.0)),
            ("water", Material::new(0.1, 0.0, 0.1, 0.0)),
            ("glass", Material::new(0.05, 0.0, 0.0, 0.0)),
            ("metal", Material::new(0.3, 0.9, 0.0, 0.0)),
            ("car", Material::new(0.3, 0.6, 0.0, 0.0)),
            ("lamp", Material::new(0.4, 0.0, 0.0, 0.8)),
            ("light", Material::new(0.4, 0.0, 0.0, 1.0)),
        ];
        Self::new(
            Material::default(),
            rows.into_iter().map(|(k, m)| (k.to_string(), m)),
        )
    }

    pub fn get(&self, label: &str) -> &Material {
        self.entries.get(&label.to_ascii_lowercase()).unwrap_or(&self.default)
    }

    pub fn default_material(&self) -> &Material {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_sky_forces_far_depth() {
        let table = MaterialTable::builtin();
        assert_eq!(table.get("sky").force_depth, Some(1.0));
        assert_eq!(table.get("Sky").force_depth, Some(1.0));
    }

    #[test]
    fn test_unknown_label_falls_back_to_default() {
        let table = MaterialTable::builtin();
        assert_eq!(table.get("unicorn"), table.default_material());
    }

    #[test]
    fn test_from_json_custom_table() {
        let json = r#"{
            "_default": { "roughness": 0.4 },
            "sky": { "roughness": 1.0, "forceDepth": 0.95 },
            "chrome": { "roughness": 0.1, "metallic": 1.0 }
        }"#;
        let table = MaterialTable::from_json(json).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.default_material().roughness, 0.4);
        assert_eq!(table.get("sky").force_depth, Some(0.95));
        assert_eq!(table.get("chrome").metallic, 1.0);
    }

    #[test]
    fn test_from_json_requires_default() {
        let err = MaterialTable::from_json(r#"{ "sky": { "roughness": 1.0 } }"#).unwrap_err();
        assert!(matches!(err, RelightError::MissingDefaultMaterial));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            MaterialTable::from_json("not json"),
            Err(RelightError::MaterialTable(_))
        ));
    }
}
