#[cfg(windows)]
pub mod d3d11;
#[cfg(test)]
pub(crate) mod mock;
mod state;
mod uniform_buffer;

use crate::{format::Format, StrResult};
use bitflags::bitflags;
use std::time::Duration;

pub use state::*;
pub use uniform_buffer::*;

bitflags! {
    pub struct BindFlags: u32 {
        const SHADER_RESOURCE = 0x08;
        const RENDER_TARGET = 0x20;
        const DEPTH_STENCIL = 0x40;
        const UNORDERED_ACCESS = 0x80;
    }
}

// Opaque identity of an externally owned texture. It is only used as a cache key and never
// dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TextureKey(pub usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub array_size: u32,
    pub sample_count: u32,
    pub format: Format,
    pub bind_flags: BindFlags,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, format: Format, bind_flags: BindFlags) -> Self {
        Self {
            width,
            height,
            array_size: 1,
            sample_count: 1,
            format,
            bind_flags,
        }
    }

    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ViewDimension {
    Texture2D,
    Texture2DMultisampled,
    ArraySlice(u32),
    MultisampledArraySlice(u32),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ViewDesc {
    pub format: Format,
    pub dimension: ViewDimension,
}

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StateScope {
    // Fixed-function and shader bindings touched by a full-screen draw
    Graphics,
    // Compute bindings plus output-merger targets
    Compute,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum TimerPoll {
    Pending,
    Disjoint,
    Elapsed(Duration),
}

// Compiled shader blobs, supplied by the hook layer
#[derive(Clone, Copy)]
pub struct ShaderBytecode {
    pub fullscreen_triangle_vs: &'static [u8],
    pub rdm_mask_ps: &'static [u8],
    pub rdm_reconstruct_cs: &'static [u8],
    pub sharpen_cs: &'static [u8],
}

impl ShaderBytecode {
    pub const EMPTY: ShaderBytecode = ShaderBytecode {
        fullscreen_triangle_vs: &[],
        rdm_mask_ps: &[],
        rdm_reconstruct_cs: &[],
        sharpen_cs: &[],
    };
}

pub struct MaskDraw<'a, B: Backend> {
    pub vertex_shader: &'a B::VertexShader,
    pub pixel_shader: &'a B::PixelShader,
    pub constants: &'a B::ConstantBuffer,
    pub depth_stencil_view: &'a B::DepthStencilView,
    pub depth_stencil_state: &'a B::DepthStencilState,
    pub rasterizer_state: &'a B::RasterizerState,
    pub stencil_ref: u32,
    pub viewport: Viewport,
}

pub struct ComputeDispatch<'a, B: Backend> {
    pub shader: &'a B::ComputeShader,
    pub constants: &'a B::ConstantBuffer,
    pub input: &'a B::ShaderResourceView,
    pub output: &'a B::UnorderedAccessView,
    pub sampler: &'a B::Sampler,
    pub groups: (u32, u32, u32),
}

// GPU device plus immediate context of the host. Everything runs on the thread that owns the
// context, so methods take &self.
pub trait Backend: Sized {
    type Texture: Clone;
    type ShaderResourceView: Clone;
    type UnorderedAccessView;
    type DepthStencilView: Clone;
    type ConstantBuffer;
    type Sampler;
    type VertexShader;
    type PixelShader;
    type ComputeShader;
    type DepthStencilState;
    type RasterizerState;
    type Timer;
    type SavedState;

    // Device and immediate context that own a submitted texture
    fn from_texture(texture: &Self::Texture) -> StrResult<Self>;

    fn texture_key(texture: &Self::Texture) -> TextureKey;

    fn texture_desc(&self, texture: &Self::Texture) -> TextureDesc;

    fn debug_name(&self, texture: &Self::Texture) -> Option<String>;

    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_data: Option<&[u8]>,
    ) -> StrResult<Self::Texture>;

    fn create_shader_resource_view(
        &self,
        texture: &Self::Texture,
        desc: &ViewDesc,
    ) -> StrResult<Self::ShaderResourceView>;

    fn create_unordered_access_view(
        &self,
        texture: &Self::Texture,
        format: Format,
    ) -> StrResult<Self::UnorderedAccessView>;

    fn create_depth_stencil_view(
        &self,
        texture: &Self::Texture,
        desc: &ViewDesc,
    ) -> StrResult<Self::DepthStencilView>;

    fn create_constant_buffer(&self, size: usize) -> StrResult<Self::ConstantBuffer>;

    // Linear filtering, clamped addressing
    fn create_sampler(&self) -> StrResult<Self::Sampler>;

    fn create_vertex_shader(&self, bytecode: &[u8]) -> StrResult<Self::VertexShader>;

    fn create_pixel_shader(&self, bytecode: &[u8]) -> StrResult<Self::PixelShader>;

    fn create_compute_shader(&self, bytecode: &[u8]) -> StrResult<Self::ComputeShader>;

    // Depth test always passes and writes, stencil always replaces
    fn create_mask_depth_stencil_state(&self) -> StrResult<Self::DepthStencilState>;

    // Solid fill, no culling, depth clip enabled
    fn create_mask_rasterizer_state(&self) -> StrResult<Self::RasterizerState>;

    fn create_timer(&self) -> StrResult<Self::Timer>;

    fn write_constant_buffer(&self, buffer: &Self::ConstantBuffer, data: &[u8]) -> StrResult;

    fn copy_texture(&self, dest: &Self::Texture, source: &Self::Texture, width: u32, height: u32);

    fn resolve_texture(&self, dest: &Self::Texture, source: &Self::Texture, format: Format);

    fn unbind_render_targets(&self);

    fn draw_mask(&self, draw: &MaskDraw<Self>);

    fn dispatch(&self, dispatch: &ComputeDispatch<Self>);

    fn capture_state(&self, scope: StateScope) -> Self::SavedState;

    fn restore_state(&self, state: Self::SavedState);

    fn begin_timer(&self, timer: &Self::Timer);

    fn end_timer(&self, timer: &Self::Timer);

    fn poll_timer(&self, timer: &Self::Timer) -> TimerPoll;
}

pub fn dispatch_groups(width: u32, height: u32, group_size: u32) -> (u32, u32, u32) {
    (
        (width + group_size - 1) / group_size,
        (height + group_size - 1) / group_size,
        1,
    )
}
