use crate::{
    constants::*,
    data::{Eye, PixelRect},
    format::Format,
    geometry::ProjectionCenter,
    graphics::*,
    StrResult,
};
use bytemuck::{Pod, Zeroable};

const TRACE_CONTEXT: &str = "Sharpen";

const DETECT_RATIO: f32 = 2. * 1127. / 1024.;
const DETECT_THRESHOLD: f32 = 64. / 1024.;
const MIN_CONTRAST_RATIO: f32 = 2.;
const MAX_CONTRAST_RATIO: f32 = 10.;
const SHARP_START_Y: f32 = 0.45;
const SHARP_END_Y: f32 = 0.9;

// Layout of the adaptive sharpening shader constants, extended with the foveation fields
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct SharpenConstants {
    pub detect_ratio: f32,
    pub detect_threshold: f32,
    pub min_contrast_ratio: f32,
    pub ratio_norm: f32,

    pub contrast_boost: f32,
    pub eps: f32,
    pub sharp_start_y: f32,
    pub sharp_scale_y: f32,

    pub sharp_strength_min: f32,
    pub sharp_strength_scale: f32,
    pub sharp_limit_min: f32,
    pub sharp_limit_scale: f32,

    pub scale_x: f32,
    pub scale_y: f32,
    pub dst_norm_x: f32,
    pub dst_norm_y: f32,

    pub src_norm_x: f32,
    pub src_norm_y: f32,
    pub input_viewport_origin_x: u32,
    pub input_viewport_origin_y: u32,

    pub input_viewport_width: u32,
    pub input_viewport_height: u32,
    pub output_viewport_origin_x: u32,
    pub output_viewport_origin_y: u32,

    pub output_viewport_width: u32,
    pub output_viewport_height: u32,
    pub reserved0: u32,
    // Non zero enables the in-shader visualization
    pub debug: u32,

    pub image_center: [f32; 2],
    pub padding: [f32; 2],

    // Falloff radius in pixels, its square, texture width and height
    pub radius: [f32; 4],
}

pub struct SharpenParams {
    // [0, 1]
    pub sharpness: f32,
    // Fraction of the eye height
    pub radius: f32,
    pub debug: bool,
}

/// Builds the constants for sharpening `rect` of a `texture_width`x`texture_height` image. An
/// empty rectangle extent stands for the whole texture.
pub fn sharpen_constants(
    params: &SharpenParams,
    rect: &PixelRect,
    texture_width: u32,
    texture_height: u32,
    center: &ProjectionCenter,
) -> StrResult<SharpenConstants> {
    let width = if rect.width == 0 { texture_width } else { rect.width };
    let height = if rect.height == 0 { texture_height } else { rect.height };
    if width == 0 || height == 0 || texture_width == 0 || texture_height == 0 {
        return trace_str!("Invalid sharpening viewport {}x{}", width, height);
    }

    let slider = params.sharpness - 0.5;
    let (max_scale, min_scale, limit_scale) = if slider >= 0. {
        (1.25, 1.25, 1.25)
    } else {
        (1.75, 1., 1.)
    };

    let strength_min = (0.4 + slider * min_scale * 1.2).max(0.);
    let strength_max = 1.6 + slider * max_scale * 1.8;
    let limit_min = (0.14 + slider * limit_scale * 0.32).max(0.1);
    let limit_max = 0.5 + slider * limit_scale * 0.6;

    let src_norm_x = 1. / texture_width as f32;
    let src_norm_y = 1. / texture_height as f32;
    let radius = 0.5 * params.radius * height as f32;

    Ok(SharpenConstants {
        detect_ratio: DETECT_RATIO,
        detect_threshold: DETECT_THRESHOLD,
        min_contrast_ratio: MIN_CONTRAST_RATIO,
        ratio_norm: 1. / (MAX_CONTRAST_RATIO - MIN_CONTRAST_RATIO),
        contrast_boost: 1.,
        eps: 1. / 255.,
        sharp_start_y: SHARP_START_Y,
        sharp_scale_y: 1. / (SHARP_END_Y - SHARP_START_Y),
        sharp_strength_min: strength_min,
        sharp_strength_scale: strength_max - strength_min,
        sharp_limit_min: limit_min,
        sharp_limit_scale: limit_max - limit_min,
        scale_x: 1.,
        scale_y: 1.,
        dst_norm_x: src_norm_x,
        dst_norm_y: src_norm_y,
        src_norm_x,
        src_norm_y,
        input_viewport_origin_x: rect.x,
        input_viewport_origin_y: rect.y,
        input_viewport_width: width,
        input_viewport_height: height,
        output_viewport_origin_x: rect.x,
        output_viewport_origin_y: rect.y,
        output_viewport_width: width,
        output_viewport_height: height,
        reserved0: 0,
        debug: params.debug as u32,
        image_center: [
            rect.x as f32 + width as f32 * center.x,
            rect.y as f32 + height as f32 * center.y,
        ],
        padding: [0.; 2],
        radius: [
            radius,
            radius * radius,
            texture_width as f32,
            texture_height as f32,
        ],
    })
}

pub struct Sharpener<B: Backend> {
    shader: B::ComputeShader,
    constants: EyeConstants<B, SharpenConstants>,
    output: B::Texture,
    output_uav: B::UnorderedAccessView,
}

impl<B: Backend> Sharpener<B> {
    pub fn new(
        backend: &B,
        shaders: &ShaderBytecode,
        width: u32,
        height: u32,
        format: Format,
    ) -> StrResult<Self> {
        let shader = trace_err!(
            backend.create_compute_shader(shaders.sharpen_cs),
            "Creating sharpening shader"
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
            "Creating sharpened texture"
        )?;
        let output_uav = trace_err!(
            backend.create_unordered_access_view(&output, format),
            "Creating sharpened UAV"
        )?;

        Ok(Self {
            shader,
            constants: EyeConstants::new(backend, "sharpening")?,
            output,
            output_uav,
        })
    }

    pub fn output(&self) -> &B::Texture {
        &self.output
    }

    pub fn apply(
        &self,
        backend: &B,
        eye: Eye,
        input: &B::ShaderResourceView,
        sampler: &B::Sampler,
        constants: &SharpenConstants,
    ) -> StrResult {
        let buffer = self.constants.write(backend, eye, constants)?;

        backend.dispatch(&ComputeDispatch {
            shader: &self.shader,
            constants: buffer,
            input,
            output: &self.output_uav,
            sampler,
            groups: dispatch_groups(
                constants.output_viewport_width,
                constants.output_viewport_height,
                SHARPEN_THREAD_GROUP_SIZE,
            ),
        });

        Ok(())
    }
}
