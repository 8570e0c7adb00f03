// In-memory backend for tests. Every object created through the Backend trait is counted while
// alive, draws and dispatches are recorded as events.

use super::*;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

const TRACE_CONTEXT: &str = "Mock backend";

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MockCall {
    FromTexture,
    CreateTexture,
    CreateShaderResourceView,
    CreateUnorderedAccessView,
    CreateDepthStencilView,
    CreateConstantBuffer,
    CreateSampler,
    CreateShader,
    CreateState,
    CreateTimer,
    WriteConstantBuffer,
}

#[derive(Clone, PartialEq, Debug)]
pub enum MockEvent {
    Capture(StateScope),
    Restore(StateScope),
    UnbindRenderTargets,
    Copy {
        dest: usize,
        source: usize,
        width: u32,
        height: u32,
    },
    Resolve {
        dest: usize,
        source: usize,
    },
    DrawMask {
        depth_stencil_view: usize,
        constants: usize,
        stencil_ref: u32,
        viewport: Viewport,
    },
    Dispatch {
        shader: usize,
        constants: usize,
        input: usize,
        output: usize,
        groups: (u32, u32, u32),
    },
    BeginTimer(usize),
    EndTimer(usize),
}

#[derive(Clone, PartialEq, Debug)]
pub enum MockObjectKind {
    Texture(TextureDesc),
    ShaderResourceView { texture: usize, desc: ViewDesc },
    UnorderedAccessView { texture: usize },
    DepthStencilView { texture: usize, desc: ViewDesc },
    Other,
}

#[derive(Default)]
pub struct MockDevice {
    next_id: Cell<usize>,
    live_objects: Cell<usize>,
    objects: RefCell<HashMap<usize, MockObjectKind>>,
    debug_names: RefCell<HashMap<usize, String>>,
    buffers: RefCell<HashMap<usize, Vec<u8>>>,
    ended_timers: RefCell<Vec<usize>>,
    disjoint_timers: Cell<bool>,
    events: RefCell<Vec<MockEvent>>,
    pending_failures: RefCell<Vec<MockCall>>,
    call_counts: RefCell<HashMap<MockCall, usize>>,
}

pub struct MockObject {
    id: usize,
    device: Rc<MockDevice>,
    counted: bool,
}

impl MockObject {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Drop for MockObject {
    fn drop(&mut self) {
        if self.counted {
            self.device
                .live_objects
                .set(self.device.live_objects.get() - 1);
        }
    }
}

pub type MockHandle = Rc<MockObject>;

#[derive(Clone, Default)]
pub struct MockBackend {
    device: Rc<MockDevice>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_object(&self, kind: MockObjectKind, counted: bool) -> MockHandle {
        let id = self.device.next_id.get() + 1;
        self.device.next_id.set(id);
        self.device.objects.borrow_mut().insert(id, kind);
        if counted {
            self.device
                .live_objects
                .set(self.device.live_objects.get() + 1);
        }

        Rc::new(MockObject {
            id,
            device: self.device.clone(),
            counted,
        })
    }

    fn call(&self, call: MockCall) -> StrResult {
        *self
            .device
            .call_counts
            .borrow_mut()
            .entry(call)
            .or_insert(0) += 1;

        let mut failures = self.device.pending_failures.borrow_mut();
        if let Some(idx) = failures.iter().position(|c| *c == call) {
            failures.remove(idx);
            trace_str!("{:?} failed (0x80070057)", call)
        } else {
            Ok(())
        }
    }

    fn push(&self, event: MockEvent) {
        self.device.events.borrow_mut().push(event);
    }

    // Texture owned by the host: not counted as a live object of the post-processor
    pub fn host_texture(&self, desc: TextureDesc) -> MockHandle {
        self.new_object(MockObjectKind::Texture(desc), false)
    }

    pub fn set_debug_name(&self, texture: &MockHandle, name: &str) {
        self.device
            .debug_names
            .borrow_mut()
            .insert(texture.id, name.into());
    }

    pub fn fail_next(&self, call: MockCall) {
        self.device.pending_failures.borrow_mut().push(call);
    }

    pub fn set_disjoint_timers(&self, disjoint: bool) {
        self.device.disjoint_timers.set(disjoint);
    }

    pub fn live_objects(&self) -> usize {
        self.device.live_objects.get()
    }

    pub fn call_count(&self, call: MockCall) -> usize {
        self.device
            .call_counts
            .borrow()
            .get(&call)
            .cloned()
            .unwrap_or(0)
    }

    pub fn object_kind(&self, id: usize) -> Option<MockObjectKind> {
        self.device.objects.borrow().get(&id).cloned()
    }

    pub fn buffer_contents(&self, id: usize) -> Vec<u8> {
        self.device
            .buffers
            .borrow()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.device.events.borrow().clone()
    }

    pub fn take_events(&self) -> Vec<MockEvent> {
        self.device.events.borrow_mut().drain(..).collect()
    }

    pub fn same_device(&self, other: &MockBackend) -> bool {
        Rc::ptr_eq(&self.device, &other.device)
    }
}

impl Backend for MockBackend {
    type Texture = MockHandle;
    type ShaderResourceView = MockHandle;
    type UnorderedAccessView = MockHandle;
    type DepthStencilView = MockHandle;
    type ConstantBuffer = MockHandle;
    type Sampler = MockHandle;
    type VertexShader = MockHandle;
    type PixelShader = MockHandle;
    type ComputeShader = MockHandle;
    type DepthStencilState = MockHandle;
    type RasterizerState = MockHandle;
    type Timer = MockHandle;
    type SavedState = StateScope;

    fn from_texture(texture: &MockHandle) -> StrResult<Self> {
        let backend = MockBackend {
            device: texture.device.clone(),
        };
        backend.call(MockCall::FromTexture)?;

        Ok(backend)
    }

    fn texture_key(texture: &MockHandle) -> TextureKey {
        TextureKey(texture.id)
    }

    fn texture_desc(&self, texture: &MockHandle) -> TextureDesc {
        match self.object_kind(texture.id) {
            Some(MockObjectKind::Texture(desc)) => desc,
            _ => TextureDesc::new_2d(0, 0, Format::UNKNOWN, BindFlags::empty()),
        }
    }

    fn debug_name(&self, texture: &MockHandle) -> Option<String> {
        self.device.debug_names.borrow().get(&texture.id).cloned()
    }

    fn create_texture(&self, desc: &TextureDesc, _: Option<&[u8]>) -> StrResult<MockHandle> {
        self.call(MockCall::CreateTexture)?;
        Ok(self.new_object(MockObjectKind::Texture(*desc), true))
    }

    fn create_shader_resource_view(
        &self,
        texture: &MockHandle,
        desc: &ViewDesc,
    ) -> StrResult<MockHandle> {
        self.call(MockCall::CreateShaderResourceView)?;
        Ok(self.new_object(
            MockObjectKind::ShaderResourceView {
                texture: texture.id,
                desc: *desc,
            },
            true,
        ))
    }

    fn create_unordered_access_view(&self, texture: &MockHandle, _: Format) -> StrResult<MockHandle> {
        self.call(MockCall::CreateUnorderedAccessView)?;
        Ok(self.new_object(
            MockObjectKind::UnorderedAccessView {
                texture: texture.id,
            },
            true,
        ))
    }

    fn create_depth_stencil_view(
        &self,
        texture: &MockHandle,
        desc: &ViewDesc,
    ) -> StrResult<MockHandle> {
        self.call(MockCall::CreateDepthStencilView)?;
        Ok(self.new_object(
            MockObjectKind::DepthStencilView {
                texture: texture.id,
                desc: *desc,
            },
            true,
        ))
    }

    fn create_constant_buffer(&self, size: usize) -> StrResult<MockHandle> {
        self.call(MockCall::CreateConstantBuffer)?;
        let buffer = self.new_object(MockObjectKind::Other, true);
        self.device
            .buffers
            .borrow_mut()
            .insert(buffer.id, vec![0; size]);

        Ok(buffer)
    }

    fn create_sampler(&self) -> StrResult<MockHandle> {
        self.call(MockCall::CreateSampler)?;
        Ok(self.new_object(MockObjectKind::Other, true))
    }

    fn create_vertex_shader(&self, _: &[u8]) -> StrResult<MockHandle> {
        self.call(MockCall::CreateShader)?;
        Ok(self.new_object(MockObjectKind::Other, true))
    }

    fn create_pixel_shader(&self, _: &[u8]) -> StrResult<MockHandle> {
        self.call(MockCall::CreateShader)?;
        Ok(self.new_object(MockObjectKind::Other, true))
    }

    fn create_compute_shader(&self, _: &[u8]) -> StrResult<MockHandle> {
        self.call(MockCall::CreateShader)?;
        Ok(self.new_object(MockObjectKind::Other, true))
    }

    fn create_mask_depth_stencil_state(&self) -> StrResult<MockHandle> {
        self.call(MockCall::CreateState)?;
        Ok(self.new_object(MockObjectKind::Other, true))
    }

    fn create_mask_rasterizer_state(&self) -> StrResult<MockHandle> {
        self.call(MockCall::CreateState)?;
        Ok(self.new_object(MockObjectKind::Other, true))
    }

    fn create_timer(&self) -> StrResult<MockHandle> {
        self.call(MockCall::CreateTimer)?;
        Ok(self.new_object(MockObjectKind::Other, true))
    }

    fn write_constant_buffer(&self, buffer: &MockHandle, data: &[u8]) -> StrResult {
        self.call(MockCall::WriteConstantBuffer)?;
        self.device
            .buffers
            .borrow_mut()
            .insert(buffer.id, data.to_vec());

        Ok(())
    }

    fn copy_texture(&self, dest: &MockHandle, source: &MockHandle, width: u32, height: u32) {
        self.push(MockEvent::Copy {
            dest: dest.id,
            source: source.id,
            width,
            height,
        });
    }

    fn resolve_texture(&self, dest: &MockHandle, source: &MockHandle, _: Format) {
        self.push(MockEvent::Resolve {
            dest: dest.id,
            source: source.id,
        });
    }

    fn unbind_render_targets(&self) {
        self.push(MockEvent::UnbindRenderTargets);
    }

    fn draw_mask(&self, draw: &MaskDraw<Self>) {
        self.push(MockEvent::DrawMask {
            depth_stencil_view: draw.depth_stencil_view.id,
            constants: draw.constants.id,
            stencil_ref: draw.stencil_ref,
            viewport: draw.viewport,
        });
    }

    fn dispatch(&self, dispatch: &ComputeDispatch<Self>) {
        self.push(MockEvent::Dispatch {
            shader: dispatch.shader.id,
            constants: dispatch.constants.id,
            input: dispatch.input.id,
            output: dispatch.output.id,
            groups: dispatch.groups,
        });
    }

    fn capture_state(&self, scope: StateScope) -> StateScope {
        self.push(MockEvent::Capture(scope));
        scope
    }

    fn restore_state(&self, scope: StateScope) {
        self.push(MockEvent::Restore(scope));
    }

    fn begin_timer(&self, timer: &MockHandle) {
        self.device.ended_timers.borrow_mut().retain(|id| *id != timer.id);
        self.push(MockEvent::BeginTimer(timer.id));
    }

    fn end_timer(&self, timer: &MockHandle) {
        self.device.ended_timers.borrow_mut().push(timer.id);
        self.push(MockEvent::EndTimer(timer.id));
    }

    fn poll_timer(&self, timer: &MockHandle) -> TimerPoll {
        if !self.device.ended_timers.borrow().contains(&timer.id) {
            TimerPoll::Pending
        } else if self.device.disjoint_timers.get() {
            TimerPoll::Disjoint
        } else {
            TimerPoll::Elapsed(Duration::from_micros(250))
        }
    }
}
