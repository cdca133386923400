use serde::{Deserialize, Serialize};

use super::device::ShaderMacro;

/// User tunables, read from `GD3D11.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    pub vsync: bool,
    /// Render at this size instead of the one the game asks for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_override: Option<[i32; 2]>,
    pub enable_graphics_events: bool,
    pub shadow_map_size: u32,
    pub normal_mapping: bool,
    pub scratch_vertex_buffer_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            resolution_override: None,
            enable_graphics_events: cfg!(debug_assertions),
            shadow_map_size: 2048,
            normal_mapping: true,
            scratch_vertex_buffer_size: 0x10000,
        }
    }
}

fn define(name: &str, definition: impl ToString) -> ShaderMacro {
    ShaderMacro {
        name: name.to_owned(),
        definition: definition.to_string(),
    }
}

/// Preprocessor defines every shader is compiled with.
pub fn construct_shader_macro_list(settings: &EngineSettings) -> Vec<ShaderMacro> {
    vec![
        define("SHD_ENABLE", 1),
        define("SHD_MAP_SIZE", settings.shadow_map_size),
        define("NORMALMAPPING", settings.normal_mapping as u8),
        define("MAX_RENDER_LIGHTS", crate::MAX_RENDER_LIGHTS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let settings: EngineSettings = toml::from_str("vsync = false\n").unwrap();
        assert!(!settings.vsync);
        assert_eq!(settings.shadow_map_size, 2048);
        assert_eq!(settings.resolution_override, None);
    }

    #[test]
    fn resolution_override_round_trips_through_toml() {
        let settings = EngineSettings {
            resolution_override: Some([1920, 1080]),
            ..Default::default()
        };
        let text = toml::to_string(&settings).unwrap();
        assert!(text.contains("resolution_override = [1920, 1080]"));
        assert_eq!(toml::from_str::<EngineSettings>(&text).unwrap(), settings);
    }

    #[test]
    fn macro_list_follows_settings() {
        let settings = EngineSettings {
            shadow_map_size: 1024,
            normal_mapping: false,
            ..Default::default()
        };
        let macros = construct_shader_macro_list(&settings);
        let get = |name: &str| {
            macros
                .iter()
                .find(|m| m.name == name)
                .map(|m| m.definition.as_str())
        };
        assert_eq!(get("SHD_MAP_SIZE"), Some("1024"));
        assert_eq!(get("NORMALMAPPING"), Some("0"));
        assert_eq!(get("MAX_RENDER_LIGHTS"), Some("8"));
    }
}
