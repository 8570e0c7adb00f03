use crate::{constants::CONFIG_FILE_NAME, data::FoveationRadii};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json as json;
use std::{fs, path::Path};

// Windows virtual-key codes
const VK_F1: i32 = 0x70;
const VK_F2: i32 = 0x71;
const VK_F3: i32 = 0x72;
const VK_F4: i32 = 0x73;
const VK_F5: i32 = 0x74;
const VK_F6: i32 = 0x75;
const VK_F7: i32 = 0x76;
const VK_F8: i32 = 0x77;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SharpenConfig {
    pub enabled: bool,
    pub sharpness: f32,

    // Fraction of the frame height
    pub radius: f32,
}

impl Default for SharpenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sharpness: 0.4,
            radius: 0.5,
        }
    }
}

// Key bindings are only carried here; polling the keyboard is up to the hook layer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HotkeyConfig {
    pub enabled: bool,
    pub require_ctrl: bool,
    pub require_alt: bool,
    pub require_shift: bool,
    #[serde(rename = "toggleFFR")]
    pub toggle_ffr: i32,
    pub toggle_debug_mode: i32,
    pub decrease_sharpness: i32,
    pub increase_sharpness: i32,
    pub decrease_radius: i32,
    pub increase_radius: i32,
    pub capture_output: i32,
    #[serde(rename = "toggleUseVRS")]
    pub toggle_use_vrs: i32,
    pub select_inner_radius: i32,
    pub select_mid_radius: i32,
    pub select_outer_radius: i32,
    pub select_sharpen_radius: i32,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_ctrl: false,
            require_alt: false,
            require_shift: false,
            toggle_ffr: VK_F1,
            toggle_debug_mode: VK_F2,
            decrease_sharpness: VK_F3,
            increase_sharpness: VK_F4,
            decrease_radius: VK_F5,
            increase_radius: VK_F6,
            capture_output: VK_F7,
            toggle_use_vrs: VK_F8,
            select_inner_radius: '1' as i32,
            select_mid_radius: '2' as i32,
            select_outer_radius: '3' as i32,
            select_sharpen_radius: '4' as i32,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FoveatedConfig {
    pub enabled: bool,
    #[serde(alias = "preferVariableRateShading")]
    pub use_variable_rate_shading: bool,
    pub inner_radius: f32,
    pub mid_radius: f32,
    pub outer_radius: f32,

    // Enables GPU profiling and the in-shader visualization
    pub debug_mode: bool,
    pub sharpen: SharpenConfig,
    pub hotkeys: HotkeyConfig,
}

impl Default for FoveatedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            use_variable_rate_shading: false,
            inner_radius: 0.5,
            mid_radius: 0.8,
            outer_radius: 1.,
            debug_mode: false,
            sharpen: SharpenConfig::default(),
            hotkeys: HotkeyConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub foveated: FoveatedConfig,
}

impl Config {
    pub fn from_json(text: &str) -> json::Result<Self> {
        json::from_str::<Config>(text).map(Config::sanitize)
    }

    // A missing or malformed document never fails: it yields the defaults and one log line.
    pub fn load(path: &Path) -> Self {
        let config = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| Self::from_json(&text).map_err(|e| e.to_string()));

        match config {
            Ok(config) => {
                info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                info!("Could not read config file {:?} ({}), using defaults", path, e);
                Config::default()
            }
        }
    }

    // The config file sits next to the host executable
    pub fn load_from_dir(dir: &Path) -> Self {
        Self::load(&dir.join(CONFIG_FILE_NAME))
    }

    pub fn sanitize(mut self) -> Self {
        let sharpen = &mut self.foveated.sharpen;
        sharpen.sharpness = clamp_unit(sharpen.sharpness);

        let fov = &mut self.foveated;
        let requested = (fov.inner_radius, fov.mid_radius, fov.outer_radius);
        let radii = FoveationRadii::new(fov.inner_radius, fov.mid_radius, fov.outer_radius);
        fov.inner_radius = radii.inner;
        fov.mid_radius = radii.mid;
        fov.outer_radius = radii.outer;
        if requested != (radii.inner, radii.mid, radii.outer) {
            warn!(
                "Foveation radii {:?} are not monotonic, using {:?}",
                requested,
                (radii.inner, radii.mid, radii.outer)
            );
        }

        self
    }

    pub fn radii(&self) -> FoveationRadii {
        FoveationRadii::new(
            self.foveated.inner_radius,
            self.foveated.mid_radius,
            self.foveated.outer_radius,
        )
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.
    } else {
        value.max(0.).min(1.)
    }
}
