mod cache;
mod depth_filter;
mod profiler;
mod rdm;
mod sharpen;

pub use cache::*;
pub use depth_filter::*;
pub use profiler::*;
pub use rdm::*;
pub use sharpen::*;

use crate::{
    config::{Config, FoveatedConfig},
    data::*,
    format::*,
    geometry::{compute_projection_centers, ProjectionCenter, VrSystem},
    graphics::*,
    vrs::{ShadingRateApi, VrsController, VrsLayout},
    StrResult,
};
use log::{error, info, warn};

const TRACE_CONTEXT: &str = "Post-processor";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FoveationMode {
    // Stencil mask during rendering, compute reconstruction on submit
    RadialDensityMask,
    // Hardware shading rates, no reconstruction needed
    VariableRateShading,
}

// Everything created for one submitted texture size. Dropping it releases every GPU object.
struct FrameResources<B: Backend> {
    backend: B,
    width: u32,
    height: u32,
    single_eye_texture: bool,
    input_is_srgb: bool,
    sampler: B::Sampler,
    centers: [ProjectionCenter; 2],
    radii: FoveationRadii,
    mode: FoveationMode,
    cache: ResourceCache<B>,
    rdm: Option<RdmEngine<B>>,
    sharpener: Option<Sharpener<B>>,
    profiler: Option<GpuProfiler<B>>,
    eye_count: usize,
    depth_clear_count: u32,
    // Distinct render targets seen in the current frame, in binding order
    vrs_targets: Vec<TextureKey>,
}

impl<B: Backend> FrameResources<B> {
    // Returns the texture to hand to the VR runtime, or `None` if the submission must be passed
    // through untouched
    fn post_process(
        &mut self,
        eye: Eye,
        texture: &B::Texture,
        bounds: &TextureBounds,
        config: &FoveatedConfig,
    ) -> Option<B::Texture> {
        let output = {
            let backend = StateGuard::capture(&self.backend, StateScope::Compute);

            let input_view = self.cache.input_view(&backend, texture, eye)?;

            if let Some(profiler) = &self.profiler {
                profiler.begin(&backend);
            }

            backend.unbind_render_targets();
            let rect = bounds.to_pixels(self.width, self.height);

            match self.run_passes(&backend, eye, &input_view, &rect, config) {
                Ok(output) => output,
                Err(e) => {
                    error!("{}", e);
                    None
                }
            }
        };

        if let Some(profiler) = &mut self.profiler {
            profiler.end(&self.backend);
        }

        output
    }

    fn run_passes(
        &self,
        backend: &B,
        eye: Eye,
        input_view: &B::ShaderResourceView,
        rect: &PixelRect,
        config: &FoveatedConfig,
    ) -> StrResult<Option<B::Texture>> {
        let center = self.centers[eye.index()];
        let mut view = input_view.clone();
        let mut output = None;

        if let Some(rdm) = &self.rdm {
            // The right eye center is expressed relative to the left edge of a shared texture
            let mut rdm_center = center;
            if !self.single_eye_texture && eye == Eye::Right {
                rdm_center.x += 1.;
            }
            let constants =
                reconstruct_constants(rect, &rdm_center, self.width, self.height, &self.radii);
            rdm.reconstruct(backend, eye, &view, &self.sampler, rect, &constants)?;

            view = rdm.output_view().clone();
            output = Some(rdm.output().clone());
        }

        if let Some(sharpener) = &self.sharpener {
            let params = SharpenParams {
                sharpness: config.sharpen.sharpness,
                radius: config.sharpen.radius,
                debug: config.debug_mode,
            };
            let constants = sharpen_constants(&params, rect, self.width, self.height, &center)?;
            sharpener.apply(backend, eye, &view, &self.sampler, &constants)?;

            output = Some(sharpener.output().clone());
        }

        Ok(output)
    }

    fn apply_mask(
        &mut self,
        depth_filter: &dyn DepthTargetFilter,
        texture: &B::Texture,
        depth: f32,
        stencil: u8,
    ) {
        let rdm = match &self.rdm {
            Some(rdm) => rdm,
            None => return,
        };

        let desc = self.backend.texture_desc(texture);
        if desc.width < self.width || desc.height < self.height {
            // Can't be the VR render target
            return;
        }
        if desc.width == desc.height {
            // Probably a shadow map
            return;
        }
        if depth_filter.is_excluded(self.backend.debug_name(texture).as_deref()) {
            return;
        }

        let side_by_side = !self.single_eye_texture || desc.width >= 2 * self.width;
        let array = desc.array_size == 2;
        // Without a layout hint both eyes clear the same target one after the other
        let eye = if !side_by_side && !array && self.depth_clear_count > 0 {
            Eye::Right
        } else {
            Eye::Left
        };
        let render_width = if side_by_side {
            desc.width / 2
        } else {
            desc.width
        };
        self.depth_clear_count += 1;

        let first_view = match self.cache.depth_stencil_view(&self.backend, texture, eye) {
            Some(view) => view,
            None => return,
        };
        let second_view = if side_by_side || array {
            match self
                .cache
                .depth_stencil_view(&self.backend, texture, Eye::Right)
            {
                Some(view) => Some(view),
                None => return,
            }
        } else {
            None
        };

        let viewport = Viewport {
            x: 0.,
            y: 0.,
            width: render_width as f32,
            height: desc.height as f32,
        };
        let mut passes = vec![MaskPass {
            eye,
            depth_stencil_view: &first_view,
            center: self.centers[eye.index()],
            viewport,
        }];
        if let Some(view) = &second_view {
            let right = self.centers[Eye::Right.index()];
            passes.push(MaskPass {
                eye: Eye::Right,
                depth_stencil_view: view,
                center: ProjectionCenter {
                    x: if side_by_side { right.x + 1. } else { right.x },
                    y: right.y,
                },
                viewport: Viewport {
                    x: if side_by_side { render_width as f32 } else { 0. },
                    ..viewport
                },
            });
        }

        let params = MaskParams {
            depth,
            stencil,
            radii: self.radii,
            render_width,
            render_height: desc.height,
            flip_y: array,
        };
        if let Err(e) = rdm.apply_mask(&self.backend, &passes, &params) {
            error!("{}", e);
        }
    }

    fn vrs_layout(&mut self, target: &B::Texture, desc: &TextureDesc) -> VrsLayout {
        if desc.array_size == 2 {
            VrsLayout::Array
        } else if !self.single_eye_texture || desc.width >= 2 * self.width {
            VrsLayout::Combined
        } else {
            let key = B::texture_key(target);
            let index = match self.vrs_targets.iter().position(|k| *k == key) {
                Some(index) => index,
                None => {
                    self.vrs_targets.push(key);
                    self.vrs_targets.len() - 1
                }
            };

            VrsLayout::SingleEye(Eye::from_index(index))
        }
    }
}

enum ProcessorState<B: Backend> {
    Uninitialized,
    Ready(FrameResources<B>),
    // Resource creation failed for textures of this size
    Disabled { width: u32, height: u32 },
}

/// Foveated rendering post-processor for one host process. The render hook layer owns it and
/// forwards every eye submission, depth-stencil clear and render target change to it, on the
/// thread that owns the GPU context.
pub struct PostProcessor<B: Backend, V: ShadingRateApi<B>> {
    config: Config,
    vr_system: Box<dyn VrSystem>,
    shaders: ShaderBytecode,
    depth_filter: Box<dyn DepthTargetFilter>,
    vrs: VrsController<B, V>,
    state: ProcessorState<B>,
}

impl<B: Backend, V: ShadingRateApi<B>> PostProcessor<B, V> {
    pub fn new(
        config: Config,
        vr_system: Box<dyn VrSystem>,
        shaders: ShaderBytecode,
        shading_rate_api: V,
    ) -> Self {
        let vrs = VrsController::new(shading_rate_api, config.radii());

        Self {
            config,
            vr_system,
            shaders,
            depth_filter: Box::new(DebugNameDenylist::default()),
            vrs,
            state: ProcessorState::Uninitialized,
        }
    }

    pub fn with_depth_filter(mut self, filter: Box<dyn DepthTargetFilter>) -> Self {
        self.depth_filter = filter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Post-processes one submitted eye image and points the submission at the result. Never
    /// fails: on errors the submission is left untouched.
    pub fn apply(
        &mut self,
        eye: Eye,
        texture: &mut SubmittedTexture<B::Texture>,
        bounds: Option<TextureBounds>,
        _flags: SubmitFlags,
    ) {
        if !self.config.foveated.enabled || texture.texture_type != TextureType::DirectX {
            return;
        }
        let handle = match &texture.handle {
            Some(handle) => handle.clone(),
            None => return,
        };
        let bounds = bounds.unwrap_or_default();

        let rebuild = match &self.state {
            ProcessorState::Ready(resources) => {
                let desc = resources.backend.texture_desc(&handle);
                if (desc.width, desc.height) != (resources.width, resources.height) {
                    info!("Texture size changed, recreating resources...");
                    true
                } else if resources.mode == FoveationMode::VariableRateShading
                    && self.vrs.is_unsupported()
                {
                    warn!("Variable rate shading failed, falling back to radial density mask");
                    true
                } else {
                    false
                }
            }
            ProcessorState::Disabled { width, height } => {
                let size = B::from_texture(&handle).map(|backend| {
                    let desc = backend.texture_desc(&handle);
                    (desc.width, desc.height)
                });
                match size {
                    Ok(size) if size != (*width, *height) => {
                        info!("Texture size changed, retrying resource creation...");
                        true
                    }
                    _ => return,
                }
            }
            ProcessorState::Uninitialized => false,
        };
        if rebuild {
            self.reset();
        }

        if let ProcessorState::Uninitialized = self.state {
            let backend = match trace_err!(
                B::from_texture(&handle),
                "Getting device of submitted texture"
            ) {
                Ok(backend) => backend,
                Err(e) => {
                    error!("{}", e);
                    self.state = ProcessorState::Disabled {
                        width: 0,
                        height: 0,
                    };
                    return;
                }
            };
            let desc = backend.texture_desc(&handle);

            match self.prepare_resources(backend, &desc, texture.color_space, &bounds) {
                Ok(resources) => self.state = ProcessorState::Ready(resources),
                Err(e) => {
                    error!("{}", e);
                    error!("Resource creation failed, disabling");
                    self.state = ProcessorState::Disabled {
                        width: desc.width,
                        height: desc.height,
                    };
                    return;
                }
            }
        }

        let config = &self.config.foveated;
        if let ProcessorState::Ready(resources) = &mut self.state {
            let output = resources.post_process(eye, &handle, &bounds, config);

            resources.eye_count = (resources.eye_count + 1) % 2;
            if resources.eye_count == 0 {
                resources.depth_clear_count = 0;
                resources.vrs_targets.clear();
            }

            if let Some(output) = output {
                texture.handle = Some(output);
                texture.color_space = if resources.input_is_srgb {
                    ColorSpace::Gamma
                } else {
                    ColorSpace::Auto
                };
            }
        }
    }

    /// Called when the host clears a depth-stencil texture. Writes the foveation mask if the
    /// texture looks like the VR render target.
    pub fn apply_fixed_foveated_rendering(
        &mut self,
        depth_stencil: Option<&B::Texture>,
        depth: f32,
        stencil: u8,
    ) {
        if !self.config.foveated.enabled {
            return;
        }
        let texture = match depth_stencil {
            Some(texture) => texture,
            None => return,
        };

        if let ProcessorState::Ready(resources) = &mut self.state {
            resources.apply_mask(&*self.depth_filter, texture, depth, stencil);
        }
    }

    /// Called when the host binds new render targets. In variable rate shading mode this selects
    /// the shading rate pattern matching the target, or turns shading rates off.
    pub fn on_render_target_change(&mut self, render_target: Option<&B::Texture>) {
        if !self.config.foveated.enabled {
            return;
        }
        let resources = match &mut self.state {
            ProcessorState::Ready(resources)
                if resources.mode == FoveationMode::VariableRateShading =>
            {
                resources
            }
            _ => return,
        };

        let target = match render_target {
            Some(target) => target,
            None => {
                self.vrs.disable(&resources.backend);
                return;
            }
        };

        let desc = resources.backend.texture_desc(target);
        if desc.width < resources.width
            || desc.height < resources.height
            || desc.width == desc.height
        {
            self.vrs.disable(&resources.backend);
            return;
        }

        let layout = resources.vrs_layout(target, &desc);
        self.vrs.apply(
            &resources.backend,
            layout,
            desc.width,
            desc.height,
            &resources.centers,
        );
    }

    /// Releases every GPU object and cached view. The next submission creates them again.
    pub fn reset(&mut self) {
        self.state = ProcessorState::Uninitialized;
        self.vrs.release();
    }

    pub fn is_enabled(&self) -> bool {
        self.config.foveated.enabled && !matches!(self.state, ProcessorState::Disabled { .. })
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, ProcessorState::Ready(_))
    }

    pub fn eye_count(&self) -> usize {
        self.resources().map_or(0, |r| r.eye_count)
    }

    pub fn depth_clear_count(&self) -> u32 {
        self.resources().map_or(0, |r| r.depth_clear_count)
    }

    pub fn mode(&self) -> Option<FoveationMode> {
        self.resources().map(|r| r.mode)
    }

    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.resources().map(|r| (r.width, r.height))
    }

    pub fn single_eye_texture(&self) -> Option<bool> {
        self.resources().map(|r| r.single_eye_texture)
    }

    pub fn projection_centers(&self) -> Option<[ProjectionCenter; 2]> {
        self.resources().map(|r| r.centers)
    }

    fn resources(&self) -> Option<&FrameResources<B>> {
        match &self.state {
            ProcessorState::Ready(resources) => Some(resources),
            _ => None,
        }
    }

    fn prepare_resources(
        &mut self,
        backend: B,
        desc: &TextureDesc,
        color_space: ColorSpace,
        bounds: &TextureBounds,
    ) -> StrResult<FrameResources<B>> {
        info!("Creating post-processing resources");

        let centers = compute_projection_centers(&*self.vr_system);

        let input_is_srgb = color_space == ColorSpace::Gamma
            || (color_space == ColorSpace::Auto && is_considered_srgb_by_runtime(desc.format));
        if input_is_srgb {
            info!("Input texture is in SRGB color space");
        }

        let single_eye_texture = bounds.width() > 0.5;

        let sampler = trace_err!(backend.create_sampler(), "Creating sampler")?;
        let cache = ResourceCache::new(&backend, desc)?;

        let fov = &self.config.foveated;
        let mode = if fov.use_variable_rate_shading && self.vrs.probe(&backend) {
            FoveationMode::VariableRateShading
        } else {
            FoveationMode::RadialDensityMask
        };
        info!("Using {:?}", mode);

        let format = output_format(desc.format);
        info!("Creating output textures in format {:?}", format);

        let rdm = if mode == FoveationMode::RadialDensityMask {
            Some(RdmEngine::new(
                &backend,
                &self.shaders,
                desc.width,
                desc.height,
                format,
            )?)
        } else {
            None
        };

        let sharpener = if fov.sharpen.enabled {
            info!("Creating sharpened texture of size {}x{}", desc.width, desc.height);
            Some(Sharpener::new(
                &backend,
                &self.shaders,
                desc.width,
                desc.height,
                format,
            )?)
        } else {
            None
        };

        let profiler = if fov.debug_mode {
            Some(GpuProfiler::new(&backend)?)
        } else {
            None
        };

        Ok(FrameResources {
            backend,
            width: desc.width,
            height: desc.height,
            single_eye_texture,
            input_is_srgb,
            sampler,
            centers,
            radii: self.config.radii(),
            mode,
            cache,
            rdm,
            sharpener,
            profiler,
            eye_count: 0,
            depth_clear_count: 0,
            vrs_targets: vec![],
        })
    }
}
