use nalgebra_glm::Vec4;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RayTraceSettings {
    pub rays_per_pixel: u32,
    pub max_bounces: u32,
    pub accumulate: bool,
    pub sky_zenith: [f32; 4],
    pub sky_horizon: [f32; 4],
    pub ground_color: [f32; 4],
    pub bake_rays_per_vertex: u32,
    pub bake_max_bounces: u32,
    pub bake_shadow_bias: f32,
    pub bake_indirect_iterations: u32,
    pub bake_diffuse_direct_passes: u32,
    pub bake_diffuse_indirect_passes: u32,
}

impl RayTraceSettings {
    pub fn new() -> Self {
        Self {
            rays_per_pixel: 4,
            max_bounces: 4,
            accumulate: true,
            sky_zenith: [0.0, 0.2, 0.6, 1.0],
            sky_horizon: [0.5, 0.5, 0.8, 1.0],
            ground_color: [0.3, 0.35, 0.32, 1.0],
            bake_rays_per_vertex: 4,
            bake_max_bounces: 4,
            bake_shadow_bias: 0.001,
            bake_indirect_iterations: 20,
            bake_diffuse_direct_passes: 2,
            bake_diffuse_indirect_passes: 2,
        }
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read(path.display().to_string(), e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    /// Diffuse passes per mesh, the extra one writes the welded result back.
    pub fn total_diffuse_passes(&self) -> u32 {
        self.bake_diffuse_direct_passes.max(self.bake_diffuse_indirect_passes) + 1
    }

    pub fn sky_zenith(&self) -> Vec4 {
        Vec4::from(self.sky_zenith)
    }

    pub fn sky_horizon(&self) -> Vec4 {
        Vec4::from(self.sky_horizon)
    }

    pub fn ground_color(&self) -> Vec4 {
        Vec4::from(self.ground_color)
    }
}

impl Default for RayTraceSettings {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Cannot read settings file {0}: {1}")]
    Read(String, std::io::Error),
    #[error("Error parsing settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let settings = RayTraceSettings::parse("max_bounces = 2\nbake_indirect_iterations = 0\n").unwrap();

        assert_eq!(settings.max_bounces, 2);
        assert_eq!(settings.bake_indirect_iterations, 0);
        assert_eq!(settings.rays_per_pixel, 4);
        assert!(settings.accumulate);
        assert_eq!(settings.sky_zenith, [0.0, 0.2, 0.6, 1.0]);
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(RayTraceSettings::parse("").unwrap(), RayTraceSettings::default());
    }

    #[test]
    fn wrong_type_is_an_error() {
        assert!(RayTraceSettings::parse("max_bounces = \"many\"").is_err());
    }

    #[test]
    fn diffuse_passes_take_the_larger_count() {
        let mut settings = RayTraceSettings::new();
        settings.bake_diffuse_direct_passes = 2;
        settings.bake_diffuse_indirect_passes = 1;

        assert_eq!(settings.total_diffuse_passes(), 3);
    }
}
