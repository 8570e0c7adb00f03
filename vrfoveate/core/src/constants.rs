pub const CONFIG_FILE_NAME: &str = "openvr_mod.cfg";

// Number of in-flight GPU timestamp query triples used in debug mode
pub const PROFILE_QUERY_COUNT: usize = 6;
pub const PROFILE_LOG_INTERVAL_SAMPLES: u32 = 500;

pub const RDM_THREAD_GROUP_SIZE: u32 = 8;
pub const RDM_CLUSTER_SIZE: f32 = 8.;
// Preset 2 of 0..=3
pub const RDM_RECONSTRUCTION_QUALITY: i32 = 2;

pub const SHARPEN_THREAD_GROUP_SIZE: u32 = 32;

// Hardware shading rate granularity
pub const VRS_TILE_WIDTH: u32 = 16;
pub const VRS_TILE_HEIGHT: u32 = 16;
