use super::*;
use std::{ffi::c_void, mem, ptr::null_mut, slice};
use winapi::{
    shared::{
        dxgiformat::DXGI_FORMAT,
        dxgitype::DXGI_SAMPLE_DESC,
        minwindef::UINT,
        winerror::{FAILED, S_FALSE, S_OK},
    },
    um::{d3d11::*, d3dcommon::*, winnt::HRESULT},
    Interface,
};
use wio::com::ComPtr;

const TRACE_CONTEXT: &str = "D3D11";

const VERTEX_BUFFER_SLOTS: usize = D3D11_IA_VERTEX_INPUT_RESOURCE_SLOT_COUNT as usize;
const RENDER_TARGET_SLOTS: usize = D3D11_SIMULTANEOUS_RENDER_TARGET_COUNT as usize;
const VIEWPORT_SLOTS: usize = D3D11_VIEWPORT_AND_SCISSORRECT_OBJECT_COUNT_PER_PIPELINE as usize;
const COMPUTE_SRV_SLOTS: usize = 3;

// Keep the current UAV counter
const KEEP_UAV_COUNTER: UINT = UINT::max_value();

macro_rules! hr_ok {
    ($operation:expr, $hr:expr) => {{
        let hr: HRESULT = $hr;
        if FAILED(hr) {
            trace_str!("Failed ({:#x}): {}", hr, $operation)
        } else {
            Ok(())
        }
    }};
}

fn wrap<T: Interface>(ptr: *mut T) -> Option<ComPtr<T>> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { ComPtr::from_raw(ptr) })
    }
}

fn wrap_all<T: Interface>(ptrs: &[*mut T]) -> Vec<Option<ComPtr<T>>> {
    ptrs.iter().map(|&ptr| wrap(ptr)).collect()
}

fn raw<T: Interface>(object: &Option<ComPtr<T>>) -> *mut T {
    object.as_ref().map_or(null_mut(), |o| o.as_raw())
}

fn raw_all<T: Interface>(objects: &[Option<ComPtr<T>>]) -> Vec<*mut T> {
    objects.iter().map(raw).collect()
}

fn created<T: Interface>(ptr: *mut T, operation: &str) -> StrResult<ComPtr<T>> {
    trace_none!(wrap(ptr), "{} returned a null object", operation)
}

fn as_resource(texture: &ComPtr<ID3D11Texture2D>) -> *mut ID3D11Resource {
    texture.as_raw() as *mut ID3D11Resource
}

pub struct D3D11Timer {
    disjoint: ComPtr<ID3D11Query>,
    start: ComPtr<ID3D11Query>,
    end: ComPtr<ID3D11Query>,
}

pub struct GraphicsState {
    vertex_shader: Option<ComPtr<ID3D11VertexShader>>,
    pixel_shader: Option<ComPtr<ID3D11PixelShader>>,
    input_layout: Option<ComPtr<ID3D11InputLayout>>,
    topology: D3D11_PRIMITIVE_TOPOLOGY,
    vertex_buffers: Vec<Option<ComPtr<ID3D11Buffer>>>,
    vertex_strides: [UINT; VERTEX_BUFFER_SLOTS],
    vertex_offsets: [UINT; VERTEX_BUFFER_SLOTS],
    index_buffer: Option<ComPtr<ID3D11Buffer>>,
    index_format: DXGI_FORMAT,
    index_offset: UINT,
    render_targets: Vec<Option<ComPtr<ID3D11RenderTargetView>>>,
    depth_stencil_view: Option<ComPtr<ID3D11DepthStencilView>>,
    rasterizer_state: Option<ComPtr<ID3D11RasterizerState>>,
    depth_stencil_state: Option<ComPtr<ID3D11DepthStencilState>>,
    stencil_ref: UINT,
    viewports: Vec<D3D11_VIEWPORT>,
    vs_constant_buffer: Option<ComPtr<ID3D11Buffer>>,
    ps_constant_buffer: Option<ComPtr<ID3D11Buffer>>,
}

pub struct ComputeState {
    shader: Option<ComPtr<ID3D11ComputeShader>>,
    shader_resources: Vec<Option<ComPtr<ID3D11ShaderResourceView>>>,
    unordered_access_view: Option<ComPtr<ID3D11UnorderedAccessView>>,
    constant_buffer: Option<ComPtr<ID3D11Buffer>>,
    sampler: Option<ComPtr<ID3D11SamplerState>>,
    render_targets: Vec<Option<ComPtr<ID3D11RenderTargetView>>>,
    depth_stencil_view: Option<ComPtr<ID3D11DepthStencilView>>,
}

pub enum D3D11SavedState {
    Graphics(Box<GraphicsState>),
    Compute(Box<ComputeState>),
}

// Device and immediate context borrowed from the host application
pub struct D3D11Backend {
    device: ComPtr<ID3D11Device>,
    context: ComPtr<ID3D11DeviceContext>,
}

impl D3D11Backend {
    pub fn new(device: ComPtr<ID3D11Device>, context: ComPtr<ID3D11DeviceContext>) -> Self {
        Self { device, context }
    }

    pub fn device(&self) -> &ComPtr<ID3D11Device> {
        &self.device
    }

    pub fn context(&self) -> &ComPtr<ID3D11DeviceContext> {
        &self.context
    }

    fn output_merger_targets(
        &self,
    ) -> (
        Vec<Option<ComPtr<ID3D11RenderTargetView>>>,
        Option<ComPtr<ID3D11DepthStencilView>>,
    ) {
        let mut render_targets = [null_mut(); RENDER_TARGET_SLOTS];
        let mut depth_stencil_view = null_mut();
        unsafe {
            self.context.OMGetRenderTargets(
                RENDER_TARGET_SLOTS as _,
                render_targets.as_mut_ptr(),
                &mut depth_stencil_view,
            )
        };

        (wrap_all(&render_targets), wrap(depth_stencil_view))
    }

    fn set_output_merger_targets(
        &self,
        render_targets: &[Option<ComPtr<ID3D11RenderTargetView>>],
        depth_stencil_view: &Option<ComPtr<ID3D11DepthStencilView>>,
    ) {
        let render_targets = raw_all(render_targets);
        unsafe {
            self.context.OMSetRenderTargets(
                render_targets.len() as _,
                render_targets.as_ptr(),
                raw(depth_stencil_view),
            )
        };
    }

    fn capture_graphics(&self) -> GraphicsState {
        let context = &self.context;

        let mut vertex_shader = null_mut();
        let mut pixel_shader = null_mut();
        let mut input_layout = null_mut();
        let mut topology = D3D11_PRIMITIVE_TOPOLOGY_UNDEFINED;
        let mut vertex_buffers = [null_mut(); VERTEX_BUFFER_SLOTS];
        let mut vertex_strides = [0; VERTEX_BUFFER_SLOTS];
        let mut vertex_offsets = [0; VERTEX_BUFFER_SLOTS];
        let mut index_buffer = null_mut();
        let mut index_format = 0;
        let mut index_offset = 0;
        let mut rasterizer_state = null_mut();
        let mut depth_stencil_state = null_mut();
        let mut stencil_ref = 0;
        let mut viewport_count = VIEWPORT_SLOTS as UINT;
        let mut viewports: [D3D11_VIEWPORT; VIEWPORT_SLOTS] = unsafe { mem::zeroed() };
        let mut vs_constant_buffer = null_mut();
        let mut ps_constant_buffer = null_mut();

        unsafe {
            context.VSGetShader(&mut vertex_shader, null_mut(), null_mut());
            context.PSGetShader(&mut pixel_shader, null_mut(), null_mut());
            context.IAGetInputLayout(&mut input_layout);
            context.IAGetPrimitiveTopology(&mut topology);
            context.IAGetVertexBuffers(
                0,
                VERTEX_BUFFER_SLOTS as _,
                vertex_buffers.as_mut_ptr(),
                vertex_strides.as_mut_ptr(),
                vertex_offsets.as_mut_ptr(),
            );
            context.IAGetIndexBuffer(&mut index_buffer, &mut index_format, &mut index_offset);
            context.RSGetState(&mut rasterizer_state);
            context.OMGetDepthStencilState(&mut depth_stencil_state, &mut stencil_ref);
            context.RSGetViewports(&mut viewport_count, viewports.as_mut_ptr());
            context.VSGetConstantBuffers(0, 1, &mut vs_constant_buffer);
            context.PSGetConstantBuffers(0, 1, &mut ps_constant_buffer);
        }
        let (render_targets, depth_stencil_view) = self.output_merger_targets();

        GraphicsState {
            vertex_shader: wrap(vertex_shader),
            pixel_shader: wrap(pixel_shader),
            input_layout: wrap(input_layout),
            topology,
            vertex_buffers: wrap_all(&vertex_buffers),
            vertex_strides,
            vertex_offsets,
            index_buffer: wrap(index_buffer),
            index_format,
            index_offset,
            render_targets,
            depth_stencil_view,
            rasterizer_state: wrap(rasterizer_state),
            depth_stencil_state: wrap(depth_stencil_state),
            stencil_ref,
            viewports: viewports[..(viewport_count as usize).min(VIEWPORT_SLOTS)].to_vec(),
            vs_constant_buffer: wrap(vs_constant_buffer),
            ps_constant_buffer: wrap(ps_constant_buffer),
        }
    }

    fn restore_graphics(&self, state: &GraphicsState) {
        let context = &self.context;
        let vertex_buffers = raw_all(&state.vertex_buffers);
        let vs_constant_buffer = raw(&state.vs_constant_buffer);
        let ps_constant_buffer = raw(&state.ps_constant_buffer);

        unsafe {
            context.VSSetShader(raw(&state.vertex_shader), null_mut(), 0);
            context.PSSetShader(raw(&state.pixel_shader), null_mut(), 0);
            context.IASetInputLayout(raw(&state.input_layout));
            context.IASetPrimitiveTopology(state.topology);
            context.IASetVertexBuffers(
                0,
                VERTEX_BUFFER_SLOTS as _,
                vertex_buffers.as_ptr(),
                state.vertex_strides.as_ptr(),
                state.vertex_offsets.as_ptr(),
            );
            context.IASetIndexBuffer(
                raw(&state.index_buffer),
                state.index_format,
                state.index_offset,
            );
        }
        self.set_output_merger_targets(&state.render_targets, &state.depth_stencil_view);
        unsafe {
            context.RSSetState(raw(&state.rasterizer_state));
            context.OMSetDepthStencilState(raw(&state.depth_stencil_state), state.stencil_ref);
            context.RSSetViewports(state.viewports.len() as _, state.viewports.as_ptr());
            context.VSSetConstantBuffers(0, 1, &vs_constant_buffer);
            context.PSSetConstantBuffers(0, 1, &ps_constant_buffer);
        }
    }

    fn capture_compute(&self) -> ComputeState {
        let context = &self.context;

        let mut shader = null_mut();
        let mut shader_resources = [null_mut(); COMPUTE_SRV_SLOTS];
        let mut unordered_access_view = null_mut();
        let mut constant_buffer = null_mut();
        let mut sampler = null_mut();
        unsafe {
            context.CSGetShader(&mut shader, null_mut(), null_mut());
            context.CSGetShaderResources(
                0,
                COMPUTE_SRV_SLOTS as _,
                shader_resources.as_mut_ptr(),
            );
            context.CSGetUnorderedAccessViews(0, 1, &mut unordered_access_view);
            context.CSGetConstantBuffers(0, 1, &mut constant_buffer);
            context.CSGetSamplers(0, 1, &mut sampler);
        }
        let (render_targets, depth_stencil_view) = self.output_merger_targets();

        ComputeState {
            shader: wrap(shader),
            shader_resources: wrap_all(&shader_resources),
            unordered_access_view: wrap(unordered_access_view),
            constant_buffer: wrap(constant_buffer),
            sampler: wrap(sampler),
            render_targets,
            depth_stencil_view,
        }
    }

    fn restore_compute(&self, state: &ComputeState) {
        let context = &self.context;
        let shader_resources = raw_all(&state.shader_resources);
        let unordered_access_view = raw(&state.unordered_access_view);
        let constant_buffer = raw(&state.constant_buffer);
        let sampler = raw(&state.sampler);

        // The UAV slot must be released before the host targets are bound again
        unsafe {
            context.CSSetShader(raw(&state.shader), null_mut(), 0);
            context.CSSetUnorderedAccessViews(0, 1, &unordered_access_view, &KEEP_UAV_COUNTER);
            context.CSSetShaderResources(
                0,
                shader_resources.len() as _,
                shader_resources.as_ptr(),
            );
            context.CSSetConstantBuffers(0, 1, &constant_buffer);
            context.CSSetSamplers(0, 1, &sampler);
        }
        self.set_output_merger_targets(&state.render_targets, &state.depth_stencil_view);
    }
}

impl Backend for D3D11Backend {
    type Texture = ComPtr<ID3D11Texture2D>;
    type ShaderResourceView = ComPtr<ID3D11ShaderResourceView>;
    type UnorderedAccessView = ComPtr<ID3D11UnorderedAccessView>;
    type DepthStencilView = ComPtr<ID3D11DepthStencilView>;
    type ConstantBuffer = ComPtr<ID3D11Buffer>;
    type Sampler = ComPtr<ID3D11SamplerState>;
    type VertexShader = ComPtr<ID3D11VertexShader>;
    type PixelShader = ComPtr<ID3D11PixelShader>;
    type ComputeShader = ComPtr<ID3D11ComputeShader>;
    type DepthStencilState = ComPtr<ID3D11DepthStencilState>;
    type RasterizerState = ComPtr<ID3D11RasterizerState>;
    type Timer = D3D11Timer;
    type SavedState = D3D11SavedState;

    fn from_texture(texture: &ComPtr<ID3D11Texture2D>) -> StrResult<Self> {
        let mut device = null_mut();
        unsafe { texture.GetDevice(&mut device) };
        let device = trace_none!(wrap(device), "Submitted texture has no device")?;

        let mut context = null_mut();
        unsafe { device.GetImmediateContext(&mut context) };
        let context = trace_none!(wrap(context), "Device has no immediate context")?;

        Ok(Self { device, context })
    }

    fn texture_key(texture: &ComPtr<ID3D11Texture2D>) -> TextureKey {
        TextureKey(texture.as_raw() as usize)
    }

    fn texture_desc(&self, texture: &ComPtr<ID3D11Texture2D>) -> TextureDesc {
        let mut desc: D3D11_TEXTURE2D_DESC = unsafe { mem::zeroed() };
        unsafe { texture.GetDesc(&mut desc) };

        TextureDesc {
            width: desc.Width,
            height: desc.Height,
            array_size: desc.ArraySize,
            sample_count: desc.SampleDesc.Count,
            format: Format(desc.Format),
            bind_flags: BindFlags::from_bits_truncate(desc.BindFlags),
        }
    }

    fn debug_name(&self, texture: &ComPtr<ID3D11Texture2D>) -> Option<String> {
        let mut name = [0_u8; 255];
        let mut size = name.len() as UINT;
        let hr = unsafe {
            texture.GetPrivateData(
                &WKPDID_D3DDebugObjectName,
                &mut size,
                name.as_mut_ptr() as *mut c_void,
            )
        };
        if FAILED(hr) || size == 0 {
            return None;
        }

        let name = &name[..(size as usize).min(name.len())];
        let len = name.iter().position(|&c| c == 0).unwrap_or_else(|| name.len());
        Some(String::from_utf8_lossy(&name[..len]).into_owned())
    }

    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_data: Option<&[u8]>,
    ) -> StrResult<ComPtr<ID3D11Texture2D>> {
        let d3d_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.width,
            Height: desc.height,
            MipLevels: 1,
            ArraySize: desc.array_size,
            Format: desc.format.0,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: desc.sample_count,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: desc.bind_flags.bits(),
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };

        // One subresource per array slice, tightly packed
        let subresources = initial_data.map(|data| {
            let slices = desc.array_size.max(1) as usize;
            let slice_size = data.len() / slices;
            let row_pitch = slice_size / desc.height.max(1) as usize;
            (0..slices)
                .map(|slice| D3D11_SUBRESOURCE_DATA {
                    pSysMem: data[slice * slice_size..].as_ptr() as *const c_void,
                    SysMemPitch: row_pitch as UINT,
                    SysMemSlicePitch: slice_size as UINT,
                })
                .collect::<Vec<_>>()
        });

        let mut texture = null_mut();
        hr_ok!("Creating texture", unsafe {
            self.device.CreateTexture2D(
                &d3d_desc,
                subresources.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
                &mut texture,
            )
        })?;

        created(texture, "CreateTexture2D")
    }

    fn create_shader_resource_view(
        &self,
        texture: &ComPtr<ID3D11Texture2D>,
        desc: &ViewDesc,
    ) -> StrResult<ComPtr<ID3D11ShaderResourceView>> {
        let mut view_desc: D3D11_SHADER_RESOURCE_VIEW_DESC = unsafe { mem::zeroed() };
        view_desc.Format = desc.format.0;
        unsafe {
            match desc.dimension {
                ViewDimension::Texture2D => {
                    view_desc.ViewDimension = D3D11_SRV_DIMENSION_TEXTURE2D;
                    *view_desc.u.Texture2D_mut() = D3D11_TEX2D_SRV {
                        MostDetailedMip: 0,
                        MipLevels: 1,
                    };
                }
                ViewDimension::Texture2DMultisampled => {
                    view_desc.ViewDimension = D3D11_SRV_DIMENSION_TEXTURE2DMS;
                }
                ViewDimension::ArraySlice(slice) => {
                    view_desc.ViewDimension = D3D11_SRV_DIMENSION_TEXTURE2DARRAY;
                    *view_desc.u.Texture2DArray_mut() = D3D11_TEX2D_ARRAY_SRV {
                        MostDetailedMip: 0,
                        MipLevels: 1,
                        FirstArraySlice: slice,
                        ArraySize: 1,
                    };
                }
                ViewDimension::MultisampledArraySlice(slice) => {
                    view_desc.ViewDimension = D3D11_SRV_DIMENSION_TEXTURE2DMSARRAY;
                    *view_desc.u.Texture2DMSArray_mut() = D3D11_TEX2DMS_ARRAY_SRV {
                        FirstArraySlice: slice,
                        ArraySize: 1,
                    };
                }
            }
        }

        let mut view = null_mut();
        hr_ok!("Creating shader resource view", unsafe {
            self.device
                .CreateShaderResourceView(as_resource(texture), &view_desc, &mut view)
        })?;

        created(view, "CreateShaderResourceView")
    }

    fn create_unordered_access_view(
        &self,
        texture: &ComPtr<ID3D11Texture2D>,
        format: Format,
    ) -> StrResult<ComPtr<ID3D11UnorderedAccessView>> {
        let mut view_desc: D3D11_UNORDERED_ACCESS_VIEW_DESC = unsafe { mem::zeroed() };
        view_desc.Format = format.0;
        view_desc.ViewDimension = D3D11_UAV_DIMENSION_TEXTURE2D;
        unsafe { *view_desc.u.Texture2D_mut() = D3D11_TEX2D_UAV { MipSlice: 0 } };

        let mut view = null_mut();
        hr_ok!("Creating unordered access view", unsafe {
            self.device
                .CreateUnorderedAccessView(as_resource(texture), &view_desc, &mut view)
        })?;

        created(view, "CreateUnorderedAccessView")
    }

    fn create_depth_stencil_view(
        &self,
        texture: &ComPtr<ID3D11Texture2D>,
        desc: &ViewDesc,
    ) -> StrResult<ComPtr<ID3D11DepthStencilView>> {
        let mut view_desc: D3D11_DEPTH_STENCIL_VIEW_DESC = unsafe { mem::zeroed() };
        view_desc.Format = desc.format.0;
        view_desc.Flags = 0;
        unsafe {
            match desc.dimension {
                ViewDimension::Texture2D => {
                    view_desc.ViewDimension = D3D11_DSV_DIMENSION_TEXTURE2D;
                    *view_desc.u.Texture2D_mut() = D3D11_TEX2D_DSV { MipSlice: 0 };
                }
                ViewDimension::Texture2DMultisampled => {
                    view_desc.ViewDimension = D3D11_DSV_DIMENSION_TEXTURE2DMS;
                }
                ViewDimension::ArraySlice(slice) => {
                    view_desc.ViewDimension = D3D11_DSV_DIMENSION_TEXTURE2DARRAY;
                    *view_desc.u.Texture2DArray_mut() = D3D11_TEX2D_ARRAY_DSV {
                        MipSlice: 0,
                        FirstArraySlice: slice,
                        ArraySize: 1,
                    };
                }
                ViewDimension::MultisampledArraySlice(slice) => {
                    view_desc.ViewDimension = D3D11_DSV_DIMENSION_TEXTURE2DMSARRAY;
                    *view_desc.u.Texture2DMSArray_mut() = D3D11_TEX2DMS_ARRAY_DSV {
                        FirstArraySlice: slice,
                        ArraySize: 1,
                    };
                }
            }
        }

        let mut view = null_mut();
        hr_ok!("Creating depth stencil view", unsafe {
            self.device
                .CreateDepthStencilView(as_resource(texture), &view_desc, &mut view)
        })?;

        created(view, "CreateDepthStencilView")
    }

    fn create_constant_buffer(&self, size: usize) -> StrResult<ComPtr<ID3D11Buffer>> {
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: ((size + 15) / 16 * 16) as UINT,
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE,
            MiscFlags: 0,
            StructureByteStride: 0,
        };

        let mut buffer = null_mut();
        hr_ok!("Creating constant buffer", unsafe {
            self.device.CreateBuffer(&desc, std::ptr::null(), &mut buffer)
        })?;

        created(buffer, "CreateBuffer")
    }

    fn create_sampler(&self) -> StrResult<ComPtr<ID3D11SamplerState>> {
        let desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
            MipLODBias: 0.,
            MaxAnisotropy: 1,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            BorderColor: [0.; 4],
            MinLOD: 0.,
            MaxLOD: 0.,
        };

        let mut sampler = null_mut();
        hr_ok!("Creating sampler", unsafe {
            self.device.CreateSamplerState(&desc, &mut sampler)
        })?;

        created(sampler, "CreateSamplerState")
    }

    fn create_vertex_shader(&self, bytecode: &[u8]) -> StrResult<ComPtr<ID3D11VertexShader>> {
        let mut shader = null_mut();
        hr_ok!("Creating vertex shader", unsafe {
            self.device.CreateVertexShader(
                bytecode.as_ptr() as *const c_void,
                bytecode.len(),
                null_mut(),
                &mut shader,
            )
        })?;

        created(shader, "CreateVertexShader")
    }

    fn create_pixel_shader(&self, bytecode: &[u8]) -> StrResult<ComPtr<ID3D11PixelShader>> {
        let mut shader = null_mut();
        hr_ok!("Creating pixel shader", unsafe {
            self.device.CreatePixelShader(
                bytecode.as_ptr() as *const c_void,
                bytecode.len(),
                null_mut(),
                &mut shader,
            )
        })?;

        created(shader, "CreatePixelShader")
    }

    fn create_compute_shader(&self, bytecode: &[u8]) -> StrResult<ComPtr<ID3D11ComputeShader>> {
        let mut shader = null_mut();
        hr_ok!("Creating compute shader", unsafe {
            self.device.CreateComputeShader(
                bytecode.as_ptr() as *const c_void,
                bytecode.len(),
                null_mut(),
                &mut shader,
            )
        })?;

        created(shader, "CreateComputeShader")
    }

    fn create_mask_depth_stencil_state(&self) -> StrResult<ComPtr<ID3D11DepthStencilState>> {
        let face = D3D11_DEPTH_STENCILOP_DESC {
            StencilFailOp: D3D11_STENCIL_OP_KEEP,
            StencilDepthFailOp: D3D11_STENCIL_OP_KEEP,
            StencilPassOp: D3D11_STENCIL_OP_REPLACE,
            StencilFunc: D3D11_COMPARISON_ALWAYS,
        };
        let desc = D3D11_DEPTH_STENCIL_DESC {
            DepthEnable: 1,
            DepthWriteMask: D3D11_DEPTH_WRITE_MASK_ALL,
            DepthFunc: D3D11_COMPARISON_ALWAYS,
            StencilEnable: 1,
            StencilReadMask: 0xff,
            StencilWriteMask: 0xff,
            FrontFace: face,
            BackFace: face,
        };

        let mut state = null_mut();
        hr_ok!("Creating mask depth stencil state", unsafe {
            self.device.CreateDepthStencilState(&desc, &mut state)
        })?;

        created(state, "CreateDepthStencilState")
    }

    fn create_mask_rasterizer_state(&self) -> StrResult<ComPtr<ID3D11RasterizerState>> {
        let desc = D3D11_RASTERIZER_DESC {
            FillMode: D3D11_FILL_SOLID,
            CullMode: D3D11_CULL_NONE,
            FrontCounterClockwise: 0,
            DepthBias: 0,
            DepthBiasClamp: 0.,
            SlopeScaledDepthBias: 0.,
            DepthClipEnable: 1,
            ScissorEnable: 0,
            MultisampleEnable: 0,
            AntialiasedLineEnable: 0,
        };

        let mut state = null_mut();
        hr_ok!("Creating mask rasterizer state", unsafe {
            self.device.CreateRasterizerState(&desc, &mut state)
        })?;

        created(state, "CreateRasterizerState")
    }

    fn create_timer(&self) -> StrResult<D3D11Timer> {
        let create_query = |query, operation| {
            let desc = D3D11_QUERY_DESC {
                Query: query,
                MiscFlags: 0,
            };
            let mut query = null_mut();
            hr_ok!(operation, unsafe { self.device.CreateQuery(&desc, &mut query) })?;
            created(query, operation)
        };

        Ok(D3D11Timer {
            disjoint: create_query(D3D11_QUERY_TIMESTAMP_DISJOINT, "Creating disjoint query")?,
            start: create_query(D3D11_QUERY_TIMESTAMP, "Creating start timestamp query")?,
            end: create_query(D3D11_QUERY_TIMESTAMP, "Creating end timestamp query")?,
        })
    }

    fn write_constant_buffer(&self, buffer: &ComPtr<ID3D11Buffer>, data: &[u8]) -> StrResult {
        let resource = buffer.as_raw() as *mut ID3D11Resource;
        let mut mapped: D3D11_MAPPED_SUBRESOURCE = unsafe { mem::zeroed() };
        hr_ok!("Mapping constant buffer", unsafe {
            self.context
                .Map(resource, 0, D3D11_MAP_WRITE_DISCARD, 0, &mut mapped)
        })?;

        unsafe {
            let dest = slice::from_raw_parts_mut(mapped.pData as *mut u8, data.len());
            dest.copy_from_slice(data);
            self.context.Unmap(resource, 0);
        }

        Ok(())
    }

    fn copy_texture(
        &self,
        dest: &ComPtr<ID3D11Texture2D>,
        source: &ComPtr<ID3D11Texture2D>,
        width: u32,
        height: u32,
    ) {
        let region = D3D11_BOX {
            left: 0,
            top: 0,
            front: 0,
            right: width,
            bottom: height,
            back: 1,
        };
        unsafe {
            self.context.CopySubresourceRegion(
                as_resource(dest),
                0,
                0,
                0,
                0,
                as_resource(source),
                0,
                &region,
            )
        };
    }

    fn resolve_texture(
        &self,
        dest: &ComPtr<ID3D11Texture2D>,
        source: &ComPtr<ID3D11Texture2D>,
        format: Format,
    ) {
        unsafe {
            self.context
                .ResolveSubresource(as_resource(dest), 0, as_resource(source), 0, format.0)
        };
    }

    fn unbind_render_targets(&self) {
        unsafe {
            self.context
                .OMSetRenderTargets(0, std::ptr::null(), null_mut())
        };
    }

    fn draw_mask(&self, draw: &MaskDraw<Self>) {
        let context = &self.context;
        let constants = draw.constants.as_raw();
        let viewport = D3D11_VIEWPORT {
            TopLeftX: draw.viewport.x,
            TopLeftY: draw.viewport.y,
            Width: draw.viewport.width,
            Height: draw.viewport.height,
            MinDepth: 0.,
            MaxDepth: 1.,
        };

        unsafe {
            context.VSSetShader(draw.vertex_shader.as_raw(), null_mut(), 0);
            context.PSSetShader(draw.pixel_shader.as_raw(), null_mut(), 0);
            context.IASetInputLayout(null_mut());
            context.IASetPrimitiveTopology(D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            context.IASetVertexBuffers(0, 0, std::ptr::null(), std::ptr::null(), std::ptr::null());
            context.IASetIndexBuffer(null_mut(), 0, 0);
            context.OMSetRenderTargets(0, std::ptr::null(), draw.depth_stencil_view.as_raw());
            context.RSSetState(draw.rasterizer_state.as_raw());
            context.OMSetDepthStencilState(draw.depth_stencil_state.as_raw(), draw.stencil_ref);
            context.VSSetConstantBuffers(0, 1, &constants);
            context.PSSetConstantBuffers(0, 1, &constants);
            context.RSSetViewports(1, &viewport);
            context.Draw(3, 0);
        }
    }

    fn dispatch(&self, dispatch: &ComputeDispatch<Self>) {
        let context = &self.context;
        let constants = dispatch.constants.as_raw();
        let input = dispatch.input.as_raw();
        let output = dispatch.output.as_raw();
        let sampler = dispatch.sampler.as_raw();
        let (x, y, z) = dispatch.groups;

        // The output is bound first so that a previous output can become this pass input
        unsafe {
            context.CSSetShader(dispatch.shader.as_raw(), null_mut(), 0);
            context.CSSetUnorderedAccessViews(0, 1, &output, &KEEP_UAV_COUNTER);
            context.CSSetConstantBuffers(0, 1, &constants);
            context.CSSetShaderResources(0, 1, &input);
            context.CSSetSamplers(0, 1, &sampler);
            context.Dispatch(x, y, z);
        }
    }

    fn capture_state(&self, scope: StateScope) -> D3D11SavedState {
        match scope {
            StateScope::Graphics => D3D11SavedState::Graphics(Box::new(self.capture_graphics())),
            StateScope::Compute => D3D11SavedState::Compute(Box::new(self.capture_compute())),
        }
    }

    fn restore_state(&self, state: D3D11SavedState) {
        match state {
            D3D11SavedState::Graphics(state) => self.restore_graphics(&state),
            D3D11SavedState::Compute(state) => self.restore_compute(&state),
        }
    }

    fn begin_timer(&self, timer: &D3D11Timer) {
        unsafe {
            self.context
                .Begin(timer.disjoint.as_raw() as *mut ID3D11Asynchronous);
            self.context
                .End(timer.start.as_raw() as *mut ID3D11Asynchronous);
        }
    }

    fn end_timer(&self, timer: &D3D11Timer) {
        unsafe {
            self.context
                .End(timer.end.as_raw() as *mut ID3D11Asynchronous);
            self.context
                .End(timer.disjoint.as_raw() as *mut ID3D11Asynchronous);
        }
    }

    fn poll_timer(&self, timer: &D3D11Timer) -> TimerPoll {
        let mut disjoint: D3D11_QUERY_DATA_TIMESTAMP_DISJOINT = unsafe { mem::zeroed() };
        let hr = unsafe {
            self.context.GetData(
                timer.disjoint.as_raw() as *mut ID3D11Asynchronous,
                &mut disjoint as *mut _ as *mut c_void,
                mem::size_of::<D3D11_QUERY_DATA_TIMESTAMP_DISJOINT>() as _,
                0,
            )
        };
        if hr == S_FALSE {
            return TimerPoll::Pending;
        } else if hr != S_OK || disjoint.Disjoint != 0 || disjoint.Frequency == 0 {
            return TimerPoll::Disjoint;
        }

        let read_timestamp = |query: &ComPtr<ID3D11Query>| {
            let mut timestamp = 0_u64;
            let hr = unsafe {
                self.context.GetData(
                    query.as_raw() as *mut ID3D11Asynchronous,
                    &mut timestamp as *mut _ as *mut c_void,
                    mem::size_of::<u64>() as _,
                    0,
                )
            };
            if hr == S_OK {
                Some(timestamp)
            } else {
                None
            }
        };

        match (read_timestamp(&timer.start), read_timestamp(&timer.end)) {
            (Some(begin), Some(end)) => {
                let seconds = end.saturating_sub(begin) as f64 / disjoint.Frequency as f64;
                TimerPoll::Elapsed(Duration::from_secs_f64(seconds))
            }
            _ => TimerPoll::Disjoint,
        }
    }
}
