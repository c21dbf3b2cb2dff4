use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::graphics::TextureFormat;

/// Pipeline configuration. Loaded from JSON where available, otherwise the
/// defaults apply; `validate` clamps values that would break the pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default = "RenderSettings::default_shadow_map_format")]
    pub shadow_map_format: TextureFormat,
    /// When enabled, all lights of a given shadow-map size share one texture
    /// and are rendered sequentially. When disabled, each light gets its own
    /// slot up to `max_shadow_maps`.
    #[serde(default = "RenderSettings::default_true")]
    pub reuse_shadow_maps: bool,
    #[serde(default = "RenderSettings::default_max_shadow_maps")]
    pub max_shadow_maps: usize,
    #[serde(default = "RenderSettings::default_true")]
    pub dynamic_instancing: bool,
    /// Batch groups below this instance count draw per-instance instead.
    #[serde(default = "RenderSettings::default_min_instances")]
    pub min_instances: usize,
    /// Groups larger than this skip per-instance distance sorting.
    #[serde(default = "RenderSettings::default_max_sorted_instances")]
    pub max_sorted_instances: usize,
    /// Software occlusion triangle budget; zero disables occlusion culling.
    #[serde(default)]
    pub max_occluder_triangles: u32,
    #[serde(default = "RenderSettings::default_occlusion_buffer_size")]
    pub occlusion_buffer_size: u32,
    /// Minimum screen-size fraction for a drawable to be used as an occluder.
    #[serde(default = "RenderSettings::default_occluder_size_threshold")]
    pub occluder_size_threshold: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadow_map_size: Self::default_shadow_map_size(),
            shadow_map_format: Self::default_shadow_map_format(),
            reuse_shadow_maps: true,
            max_shadow_maps: Self::default_max_shadow_maps(),
            dynamic_instancing: true,
            min_instances: Self::default_min_instances(),
            max_sorted_instances: Self::default_max_sorted_instances(),
            max_occluder_triangles: 0,
            occlusion_buffer_size: Self::default_occlusion_buffer_size(),
            occluder_size_threshold: Self::default_occluder_size_threshold(),
        }
    }
}

impl RenderSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }
        if !self.shadow_map_size.is_power_of_two() {
            let rounded = self.shadow_map_size.next_power_of_two();
            warn!(
                "Shadow map size {} rounded up to power of two {}.",
                self.shadow_map_size, rounded
            );
            self.shadow_map_size = rounded;
        }
        if !self.shadow_map_format.is_depth() {
            warn!("Shadow map format must be a depth format. Using default format.");
            self.shadow_map_format = Self::default_shadow_map_format();
        }
        if self.max_shadow_maps == 0 {
            warn!("Max shadow maps must be greater than zero. Using 1 instead.");
            self.max_shadow_maps = 1;
        }
        if self.min_instances < 2 {
            self.min_instances = 2;
        }
        if self.occlusion_buffer_size == 0 {
            warn!("Occlusion buffer size must be greater than zero. Using default value.");
            self.occlusion_buffer_size = Self::default_occlusion_buffer_size();
        }
        self
    }

    const fn default_shadow_map_size() -> u32 {
        1024
    }

    const fn default_shadow_map_format() -> TextureFormat {
        TextureFormat::Depth16
    }

    const fn default_max_shadow_maps() -> usize {
        4
    }

    const fn default_min_instances() -> usize {
        2
    }

    const fn default_max_sorted_instances() -> usize {
        1000
    }

    const fn default_occlusion_buffer_size() -> u32 {
        256
    }

    const fn default_occluder_size_threshold() -> f32 {
        0.025
    }

    const fn default_true() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let settings = RenderSettings {
            shadow_map_size: 0,
            shadow_map_format: TextureFormat::Rgba8,
            max_shadow_maps: 0,
            min_instances: 0,
            occlusion_buffer_size: 0,
            ..RenderSettings::default()
        }
        .validate();

        assert_eq!(settings.shadow_map_size, 1024);
        assert!(settings.shadow_map_format.is_depth());
        assert_eq!(settings.max_shadow_maps, 1);
        assert_eq!(settings.min_instances, 2);
        assert_eq!(settings.occlusion_buffer_size, 256);
    }

    #[test]
    fn validate_rounds_shadow_map_size_to_power_of_two() {
        let settings = RenderSettings {
            shadow_map_size: 1000,
            ..RenderSettings::default()
        }
        .validate();
        assert_eq!(settings.shadow_map_size, 1024);
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = RenderSettings {
            reuse_shadow_maps: false,
            max_shadow_maps: 8,
            ..RenderSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: RenderSettings = serde_json::from_str(&json).unwrap();
        assert!(!parsed.reuse_shadow_maps);
        assert_eq!(parsed.max_shadow_maps, 8);
    }
}
