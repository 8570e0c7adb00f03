/// Decides whether a depth-stencil texture is known not to be the VR render target.
pub trait DepthTargetFilter {
    fn is_excluded(&self, debug_name: Option<&str>) -> bool;
}

// Some older Unity games clear a camera depth texture with the same size as the eye target
pub const UNITY_CAMERA_DEPTH_TEXTURE: &str = "Camera DepthTexture";

pub struct DebugNameDenylist {
    names: Vec<String>,
}

impl DebugNameDenylist {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl Default for DebugNameDenylist {
    fn default() -> Self {
        Self::new(vec![UNITY_CAMERA_DEPTH_TEXTURE.into()])
    }
}

impl DepthTargetFilter for DebugNameDenylist {
    fn is_excluded(&self, debug_name: Option<&str>) -> bool {
        debug_name.map_or(false, |name| self.names.iter().any(|n| n == name))
    }
}
