mod pattern;

pub use pattern::*;

use crate::{
    constants::*,
    data::{Eye, FoveationRadii},
    format::Format,
    geometry::ProjectionCenter,
    graphics::{Backend, BindFlags, TextureDesc},
    StrResult,
};
use log::{error, info, warn};

const TRACE_CONTEXT: &str = "VRS";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShadingRate {
    Cull,
    X1PerPixel,
    X1Per1x2Pixels,
    X1Per2x2Pixels,
    X1Per4x4Pixels,
}

// Indexed by foveation tier
pub const TIER_SHADING_RATES: [ShadingRate; 4] = [
    ShadingRate::X1PerPixel,
    ShadingRate::X1Per1x2Pixels,
    ShadingRate::X1Per2x2Pixels,
    ShadingRate::X1Per4x4Pixels,
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ViewportShadingRate {
    pub enabled: bool,
    pub rates: [ShadingRate; 4],
}

impl ViewportShadingRate {
    pub fn foveated() -> Self {
        Self {
            enabled: true,
            rates: TIER_SHADING_RATES,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            rates: [ShadingRate::Cull; 4],
        }
    }
}

/// Vendor extension that programs the rasterizer shading rate unit.
pub trait ShadingRateApi<B: Backend> {
    type View;

    // Loads the extension library. Called at most once per successful load.
    fn initialize(&mut self) -> StrResult;

    fn unload(&mut self);

    fn supports_variable_pixel_shading(&self, backend: &B) -> StrResult<bool>;

    fn create_view(&self, backend: &B, texture: &B::Texture, array: bool) -> StrResult<Self::View>;

    fn bind_view(&self, backend: &B, view: &Self::View) -> StrResult;

    fn set_viewport_rates(&self, backend: &B, viewports: &[ViewportShadingRate]) -> StrResult;
}

/// Used when no vendor extension is available: probing always reports no support.
pub struct NoShadingRateApi;

impl<B: Backend> ShadingRateApi<B> for NoShadingRateApi {
    type View = ();

    fn initialize(&mut self) -> StrResult {
        trace_str!("No shading rate extension available")
    }

    fn unload(&mut self) {}

    fn supports_variable_pixel_shading(&self, _: &B) -> StrResult<bool> {
        Ok(false)
    }

    fn create_view(&self, _: &B, _: &B::Texture, _: bool) -> StrResult {
        trace_str!("No shading rate extension available")
    }

    fn bind_view(&self, _: &B, _: &()) -> StrResult {
        trace_str!("No shading rate extension available")
    }

    fn set_viewport_rates(&self, _: &B, _: &[ViewportShadingRate]) -> StrResult {
        trace_str!("No shading rate extension available")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VrsLayout {
    // Both eyes side by side in one target
    Combined,
    SingleEye(Eye),
    // One array layer per eye
    Array,
}

struct PatternResource<B: Backend, V> {
    width: u32,
    height: u32,
    _texture: B::Texture,
    view: V,
}

impl<B: Backend, V> PatternResource<B, V> {
    fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }
}

enum Patterns<B: Backend, V> {
    Combined(PatternResource<B, V>),
    SingleEye([Option<PatternResource<B, V>>; 2]),
    Array(PatternResource<B, V>),
}

enum VrsState<B: Backend, V> {
    Uninitialized,
    // Terminal
    Unsupported,
    Ready(Option<Patterns<B, V>>),
}

pub struct VrsController<B: Backend, A: ShadingRateApi<B>> {
    api: A,
    api_loaded: bool,
    state: VrsState<B, A::View>,
    radii: FoveationRadii,
}

impl<B: Backend, A: ShadingRateApi<B>> VrsController<B, A> {
    pub fn new(api: A, radii: FoveationRadii) -> Self {
        Self {
            api,
            api_loaded: false,
            state: VrsState::Uninitialized,
            radii,
        }
    }

    // Loads the extension once and queries the device. Any failure is permanent.
    pub fn probe(&mut self, backend: &B) -> bool {
        match self.state {
            VrsState::Ready(_) => return true,
            VrsState::Unsupported => return false,
            VrsState::Uninitialized => (),
        }

        info!("Trying to load the shading rate extension...");
        if !self.api_loaded {
            if let Err(e) = self.api.initialize() {
                info!("Shading rate extension is not available: {}", e);
                self.state = VrsState::Unsupported;
                return false;
            }
            self.api_loaded = true;
        }

        match self.api.supports_variable_pixel_shading(backend) {
            Ok(true) => {
                info!("Variable rate shading is available");
                self.state = VrsState::Ready(None);
                true
            }
            Ok(false) => {
                info!("Variable rate shading is not available");
                self.fail();
                false
            }
            Err(e) => {
                warn!("Variable rate shading capability query failed: {}", e);
                self.fail();
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, VrsState::Ready(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.state, VrsState::Unsupported)
    }

    // Pattern layout currently held, if any
    pub fn layout(&self) -> Option<VrsLayout> {
        match &self.state {
            VrsState::Ready(Some(Patterns::Combined(_))) => Some(VrsLayout::Combined),
            VrsState::Ready(Some(Patterns::Array(_))) => Some(VrsLayout::Array),
            VrsState::Ready(Some(Patterns::SingleEye(eyes))) => {
                if eyes[1].is_some() && eyes[0].is_none() {
                    Some(VrsLayout::SingleEye(Eye::Right))
                } else {
                    Some(VrsLayout::SingleEye(Eye::Left))
                }
            }
            _ => None,
        }
    }

    /// Binds the foveation pattern for a render target of the given pixel size and enables the
    /// tier shading rates. On failure the hardware path is disabled for the session.
    pub fn apply(
        &mut self,
        backend: &B,
        layout: VrsLayout,
        width: u32,
        height: u32,
        centers: &[ProjectionCenter; 2],
    ) {
        let api = &self.api;
        let res = match &mut self.state {
            VrsState::Ready(patterns) => {
                pattern_view(patterns, backend, api, layout, width, height, centers, &self.radii)
                    .and_then(|view| {
                        api.bind_view(backend, view)?;
                        api.set_viewport_rates(backend, &[ViewportShadingRate::foveated()])
                    })
            }
            _ => return,
        };
        if let Err(e) = res {
            error!("Error while setting shading rates: {}", e);
            self.fail();
        }
    }

    pub fn disable(&mut self, backend: &B) {
        if !self.is_ready() {
            return;
        }

        let disabled = [ViewportShadingRate::disabled(); 2];
        if let Err(e) = self.api.set_viewport_rates(backend, &disabled) {
            error!("Error while disabling shading rates: {}", e);
            self.fail();
        }
    }

    // Drops device resources but keeps the probed capability
    pub fn release(&mut self) {
        if let VrsState::Ready(patterns) = &mut self.state {
            *patterns = None;
        }
    }

    fn fail(&mut self) {
        if self.api_loaded {
            self.api.unload();
            self.api_loaded = false;
        }
        self.state = VrsState::Unsupported;
    }
}

impl<B: Backend, A: ShadingRateApi<B>> Drop for VrsController<B, A> {
    fn drop(&mut self) {
        // Views must go before the extension library
        self.state = VrsState::Uninitialized;
        if self.api_loaded {
            self.api.unload();
        }
    }
}

// Returns the view of the pattern matching the layout, building it when the size changed
#[allow(clippy::too_many_arguments)]
fn pattern_view<'a, B: Backend, A: ShadingRateApi<B>>(
    patterns: &'a mut Option<Patterns<B, A::View>>,
    backend: &B,
    api: &A,
    layout: VrsLayout,
    width: u32,
    height: u32,
    centers: &[ProjectionCenter; 2],
    radii: &FoveationRadii,
) -> StrResult<&'a A::View> {
    let up_to_date = match (&*patterns, layout) {
        (Some(Patterns::Combined(p)), VrsLayout::Combined)
        | (Some(Patterns::Array(p)), VrsLayout::Array) => p.matches(width, height),
        (Some(Patterns::SingleEye(eyes)), VrsLayout::SingleEye(eye)) => eyes[eye.index()]
            .as_ref()
            .map_or(false, |p| p.matches(width, height)),
        _ => false,
    };

    if !up_to_date {
        let resource = build_pattern(backend, api, layout, width, height, centers, radii)?;
        match layout {
            VrsLayout::Combined => *patterns = Some(Patterns::Combined(resource)),
            VrsLayout::Array => *patterns = Some(Patterns::Array(resource)),
            VrsLayout::SingleEye(eye) => {
                if let Some(Patterns::SingleEye(eyes)) = patterns {
                    eyes[eye.index()] = Some(resource);
                } else {
                    let mut eyes = [None, None];
                    eyes[eye.index()] = Some(resource);
                    *patterns = Some(Patterns::SingleEye(eyes));
                }
            }
        }
    }

    let resource = match (&*patterns, layout) {
        (Some(Patterns::Combined(p)), VrsLayout::Combined)
        | (Some(Patterns::Array(p)), VrsLayout::Array) => Some(p),
        (Some(Patterns::SingleEye(eyes)), VrsLayout::SingleEye(eye)) => eyes[eye.index()].as_ref(),
        _ => None,
    };

    trace_none!(resource.map(|p| &p.view), "Missing {:?} pattern", layout)
}

fn build_pattern<B: Backend, A: ShadingRateApi<B>>(
    backend: &B,
    api: &A,
    layout: VrsLayout,
    width: u32,
    height: u32,
    centers: &[ProjectionCenter; 2],
    radii: &FoveationRadii,
) -> StrResult<PatternResource<B, A::View>> {
    let tiles_x = width / VRS_TILE_WIDTH;
    let tiles_y = height / VRS_TILE_HEIGHT;
    if tiles_x == 0 || tiles_y == 0 {
        return trace_str!("Render target {}x{} is smaller than one tile", width, height);
    }

    info!(
        "Creating {:?} VRS pattern texture of size {}x{}",
        layout, tiles_x, tiles_y
    );
    let (data, array_size) = match layout {
        VrsLayout::Combined => (combined_pattern(tiles_x, tiles_y, centers, radii), 1),
        VrsLayout::SingleEye(eye) => (
            single_eye_pattern(tiles_x, tiles_y, &centers[eye.index()], radii),
            1,
        ),
        VrsLayout::Array => (array_pattern(tiles_x, tiles_y, centers, radii), 2),
    };

    let desc = TextureDesc {
        array_size,
        ..TextureDesc::new_2d(tiles_x, tiles_y, Format::R8_UINT, BindFlags::SHADER_RESOURCE)
    };
    let texture = trace_err!(
        backend.create_texture(&desc, Some(&data)),
        "Creating VRS pattern texture"
    )?;
    let view = trace_err!(
        api.create_view(backend, &texture, array_size > 1),
        "Creating shading rate resource view"
    )?;

    Ok(PatternResource {
        width,
        height,
        _texture: texture,
        view,
    })
}
