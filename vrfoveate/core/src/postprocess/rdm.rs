// Radial density masking: a stencil mask marks the foveation tier of every pixel so that the
// host skips shading work in the periphery, then a compute pass fills in the skipped pixels.

use crate::{
    constants::*,
    data::{Eye, FoveationRadii, PixelRect},
    format::{typed_format, Format},
    geometry::ProjectionCenter,
    graphics::*,
    StrResult,
};
use bytemuck::{Pod, Zeroable};

const TRACE_CONTEXT: &str = "RDM";

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaskConstants {
    pub depth_out: f32,
    pub radius: [f32; 3],
    pub inv_cluster_resolution: [f32; 2],
    pub projection_center: [f32; 2],
    pub y_fix: [f32; 2],
    pub unused: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ReconstructConstants {
    pub offset: [i32; 2],
    pub projection_center: [f32; 2],
    pub inv_cluster_resolution: [f32; 2],
    pub inv_resolution: [f32; 2],
    pub radius: [f32; 3],
    pub quality: i32,
}

// One full-screen mask draw
pub struct MaskPass<'a, B: Backend> {
    pub eye: Eye,
    pub depth_stencil_view: &'a B::DepthStencilView,
    pub center: ProjectionCenter,
    pub viewport: Viewport,
}

pub struct MaskParams {
    // Depth clear value of the host
    pub depth: f32,
    pub stencil: u8,
    pub radii: FoveationRadii,
    pub render_width: u32,
    pub render_height: u32,
    // Array targets are rendered upside down
    pub flip_y: bool,
}

impl MaskParams {
    pub fn constants(&self, center: &ProjectionCenter) -> MaskConstants {
        MaskConstants {
            depth_out: 1. - self.depth,
            radius: self.radii.as_array(),
            inv_cluster_resolution: [
                RDM_CLUSTER_SIZE / self.render_width as f32,
                RDM_CLUSTER_SIZE / self.render_height as f32,
            ],
            projection_center: [center.x, center.y],
            y_fix: if self.flip_y {
                [-1., self.render_height as f32]
            } else {
                [1., 0.]
            },
            unused: [0.; 2],
        }
    }
}

pub fn reconstruct_constants(
    rect: &PixelRect,
    center: &ProjectionCenter,
    texture_width: u32,
    texture_height: u32,
    radii: &FoveationRadii,
) -> ReconstructConstants {
    ReconstructConstants {
        offset: [rect.x as i32, rect.y as i32],
        projection_center: [center.x, center.y],
        inv_cluster_resolution: [
            RDM_CLUSTER_SIZE / rect.width as f32,
            RDM_CLUSTER_SIZE / rect.height as f32,
        ],
        inv_resolution: [1. / texture_width as f32, 1. / texture_height as f32],
        radius: radii.as_array(),
        quality: RDM_RECONSTRUCTION_QUALITY,
    }
}

pub struct RdmEngine<B: Backend> {
    vertex_shader: B::VertexShader,
    mask_shader: B::PixelShader,
    reconstruct_shader: B::ComputeShader,
    mask_constants: EyeConstants<B, MaskConstants>,
    reconstruct_constants: EyeConstants<B, ReconstructConstants>,
    depth_stencil_state: B::DepthStencilState,
    rasterizer_state: B::RasterizerState,
    output: B::Texture,
    output_view: B::ShaderResourceView,
    output_uav: B::UnorderedAccessView,
}

impl<B: Backend> RdmEngine<B> {
    pub fn new(
        backend: &B,
        shaders: &ShaderBytecode,
        width: u32,
        height: u32,
        format: Format,
    ) -> StrResult<Self> {
        let vertex_shader = trace_err!(
            backend.create_vertex_shader(shaders.fullscreen_triangle_vs),
            "Creating RDM fullscreen tri vertex shader"
        )?;
        let mask_shader = trace_err!(
            backend.create_pixel_shader(shaders.rdm_mask_ps),
            "Creating RDM masking shader"
        )?;
        let reconstruct_shader = trace_err!(
            backend.create_compute_shader(shaders.rdm_reconstruct_cs),
            "Creating RDM reconstruction shader"
        )?;

        let output = trace_err!(
            backend.create_texture(
                &TextureDesc::new_2d(
                    width,
                    height,
                    format,
                    BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE,
                ),
                None,
            ),
            "Creating RDM reconstructed texture"
        )?;
        let output_uav = trace_err!(
            backend.create_unordered_access_view(&output, format),
            "Creating RDM reconstructed UAV"
        )?;
        let output_view = trace_err!(
            backend.create_shader_resource_view(
                &output,
                &ViewDesc {
                    format: typed_format(format),
                    dimension: ViewDimension::Texture2D,
                },
            ),
            "Creating RDM reconstructed view"
        )?;

        let depth_stencil_state = trace_err!(
            backend.create_mask_depth_stencil_state(),
            "Creating RDM depth stencil state"
        )?;
        let rasterizer_state = trace_err!(
            backend.create_mask_rasterizer_state(),
            "Creating RDM rasterizer state"
        )?;

        Ok(Self {
            vertex_shader,
            mask_shader,
            reconstruct_shader,
            mask_constants: EyeConstants::new(backend, "RDM masking")?,
            reconstruct_constants: EyeConstants::new(backend, "RDM reconstruct")?,
            depth_stencil_state,
            rasterizer_state,
            output,
            output_view,
            output_uav,
        })
    }

    pub fn output(&self) -> &B::Texture {
        &self.output
    }

    pub fn output_view(&self) -> &B::ShaderResourceView {
        &self.output_view
    }

    /// Draws the foveation mask into the depth-stencil target. The host pipeline state is
    /// restored before returning, on success or failure.
    pub fn apply_mask(
        &self,
        backend: &B,
        passes: &[MaskPass<B>],
        params: &MaskParams,
    ) -> StrResult {
        let backend = StateGuard::capture(backend, StateScope::Graphics);

        for pass in passes {
            let constants = self.mask_constants.write(
                &backend,
                pass.eye,
                &params.constants(&pass.center),
            )?;

            backend.draw_mask(&MaskDraw {
                vertex_shader: &self.vertex_shader,
                pixel_shader: &self.mask_shader,
                constants,
                depth_stencil_view: pass.depth_stencil_view,
                depth_stencil_state: &self.depth_stencil_state,
                rasterizer_state: &self.rasterizer_state,
                stencil_ref: u32::from(!params.stencil),
                viewport: pass.viewport,
            });
        }

        Ok(())
    }

    /// Reconstructs the eye rectangle of the input into the output texture. Compute bindings
    /// are not restored here.
    pub fn reconstruct(
        &self,
        backend: &B,
        eye: Eye,
        input: &B::ShaderResourceView,
        sampler: &B::Sampler,
        rect: &PixelRect,
        constants: &ReconstructConstants,
    ) -> StrResult {
        let buffer = self.reconstruct_constants.write(backend, eye, constants)?;

        backend.dispatch(&ComputeDispatch {
            shader: &self.reconstruct_shader,
            constants: buffer,
            input,
            output: &self.output_uav,
            sampler,
            groups: dispatch_groups(rect.width, rect.height, RDM_THREAD_GROUP_SIZE),
        });

        Ok(())
    }
}
