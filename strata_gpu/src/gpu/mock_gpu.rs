/// Mock device for unit tests (no GPU required)
///
/// Every collaborator trait is implemented here. Side effects that matter for
/// ordering (layout requests, resolves, mip generation, uploads, pipeline
/// state traffic, segment replays) go to one shared event log.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};
use crate::gpu::buffer::Buffer;
use crate::gpu::command_buffer::{ClearAttachment, ClearRect, SecondaryCommandBuffer, Viewport};
use crate::gpu::device::{Gpu, GpuStats};
use crate::gpu::geometry::{IRect, SurfaceOrigin};
use crate::gpu::image::{
    AccessFlags, Image, ImageLayout, PipelineStageFlags, RenderTarget, StencilAttachment, Texture,
};
use crate::gpu::mesh::PrimitiveType;
use crate::gpu::pipeline::{Pipeline, PrimitiveProcessor, TextureAccess};
use crate::gpu::pipeline_state::PipelineState;
use crate::gpu::render_pass::{
    AttachmentDesc, AttachmentsDescriptor, ClearValue, CompatibleRenderPassHandle, LoadStoreOps,
    RenderPass, TextureFormat,
};
use crate::gpu::resource_provider::ResourceProvider;
use crate::gpu::upload::{FlushState, DeferredUpload, WritePixels};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

fn next_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Event log
// ============================================================================

/// Command recorded into a mock secondary command buffer
#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    ClearAttachments { attachment: ClearAttachment, rect: ClearRect },
    BindPipeline(PrimitiveType),
    BindVertexBuffer(u32),
    BindIndexBuffer(u32),
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32 },
    SetViewport(Viewport),
    SetScissor(IRect),
    SetBlendConstants([f32; 4]),
}

impl MockCommand {
    pub fn is_draw(&self) -> bool {
        matches!(self, MockCommand::Draw { .. } | MockCommand::DrawIndexed { .. })
    }
}

/// A segment replayed by the mock device
#[derive(Debug, Clone, PartialEq)]
pub struct MockReplay {
    pub command_buffer: u32,
    pub color_ops: LoadStoreOps,
    pub stencil_ops: LoadStoreOps,
    pub clear_value: ClearValue,
    pub bounds: IRect,
    pub commands: Vec<MockCommand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    LayoutRequest { image: String, layout: ImageLayout, access: AccessFlags, stage: PipelineStageFlags },
    Resolve(String),
    GenerateMipmap(String),
    Upload(u32),
    PipelineStateResolved(PrimitiveType),
    SetData(PrimitiveType),
    FreeTempResources(PrimitiveType),
    Replay(MockReplay),
}

pub type EventLog = Arc<Mutex<Vec<MockEvent>>>;

fn push_event(gpu: &dyn Gpu, event: MockEvent) {
    if let Some(mock) = gpu.as_any().downcast_ref::<MockGpu>() {
        mock.events.lock().unwrap().push(event);
    }
}

// ============================================================================
// Mock Images
// ============================================================================

pub struct MockImage {
    pub name: String,
    layout: Mutex<ImageLayout>,
}

impl MockImage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), layout: Mutex::new(ImageLayout::Undefined) }
    }
}

impl Image for MockImage {
    fn current_layout(&self) -> ImageLayout {
        *self.layout.lock().unwrap()
    }

    fn request_layout(
        &self,
        gpu: &dyn Gpu,
        layout: ImageLayout,
        access: AccessFlags,
        stage: PipelineStageFlags,
        _discardable: bool,
    ) {
        *self.layout.lock().unwrap() = layout;
        push_event(gpu, MockEvent::LayoutRequest { image: self.name.clone(), layout, access, stage });
    }
}

pub struct MockStencil {
    image: MockImage,
    bits: u32,
}

impl Image for MockStencil {
    fn current_layout(&self) -> ImageLayout {
        self.image.current_layout()
    }

    fn request_layout(&self, gpu: &dyn Gpu, layout: ImageLayout, access: AccessFlags, stage: PipelineStageFlags, discardable: bool) {
        self.image.request_layout(gpu, layout, access, stage, discardable);
    }
}

impl StencilAttachment for MockStencil {
    fn bits(&self) -> u32 {
        self.bits
    }
}

// ============================================================================
// Mock Render Target
// ============================================================================

pub struct MockRenderTarget {
    pub name: String,
    width: u32,
    height: u32,
    origin: SurfaceOrigin,
    image: MockImage,
    msaa_image: Option<MockImage>,
    stencil: Option<MockStencil>,
    handle: CompatibleRenderPassHandle,
    needs_resolve: AtomicBool,
}

impl MockRenderTarget {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            origin: SurfaceOrigin::TopLeft,
            image: MockImage::new(name),
            msaa_image: None,
            stencil: None,
            handle: CompatibleRenderPassHandle::invalid(),
            needs_resolve: AtomicBool::new(false),
        }
    }

    pub fn with_stencil(mut self, bits: u32) -> Self {
        self.stencil = Some(MockStencil { image: MockImage::new(format!("{}.stencil", self.name)), bits });
        self
    }

    pub fn with_msaa(mut self) -> Self {
        self.msaa_image = Some(MockImage::new(format!("{}.msaa", self.name)));
        self
    }

    pub fn with_origin(mut self, origin: SurfaceOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_handle(mut self, handle: CompatibleRenderPassHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn set_needs_resolve(&self, value: bool) {
        self.needs_resolve.store(value, Ordering::Relaxed);
    }
}

impl RenderTarget for MockRenderTarget {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn origin(&self) -> SurfaceOrigin {
        self.origin
    }

    fn image(&self) -> &dyn Image {
        &self.image
    }

    fn msaa_image(&self) -> Option<&dyn Image> {
        self.msaa_image.as_ref().map(|i| i as &dyn Image)
    }

    fn stencil_attachment(&self) -> Option<&dyn StencilAttachment> {
        self.stencil.as_ref().map(|s| s as &dyn StencilAttachment)
    }

    fn compatible_render_pass_handle(&self) -> CompatibleRenderPassHandle {
        self.handle
    }

    fn attachments(&self) -> AttachmentsDescriptor {
        let samples = if self.msaa_image.is_some() { 4 } else { 1 };
        AttachmentsDescriptor {
            color: AttachmentDesc { format: TextureFormat::R8G8B8A8_UNORM, samples },
            stencil: self.stencil.as_ref().map(|_| AttachmentDesc { format: TextureFormat::S8_UINT, samples }),
        }
    }

    fn needs_resolve(&self) -> bool {
        self.needs_resolve.load(Ordering::Relaxed)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

pub struct MockTexture {
    image: MockImage,
    mips_dirty: AtomicBool,
    render_target: Option<MockRenderTarget>,
}

impl MockTexture {
    pub fn new(id: u32) -> Arc<Self> {
        Arc::new(Self {
            image: MockImage::new(format!("texture{}", id)),
            mips_dirty: AtomicBool::new(false),
            render_target: None,
        })
    }

    /// Texture that is also drawn into through `target`
    pub fn with_render_target(id: u32, target: MockRenderTarget) -> Arc<Self> {
        Arc::new(Self {
            image: MockImage::new(format!("texture{}", id)),
            mips_dirty: AtomicBool::new(false),
            render_target: Some(target),
        })
    }

    pub fn name(&self) -> &str {
        &self.image.name
    }
}

impl Image for MockTexture {
    fn current_layout(&self) -> ImageLayout {
        self.image.current_layout()
    }

    fn request_layout(&self, gpu: &dyn Gpu, layout: ImageLayout, access: AccessFlags, stage: PipelineStageFlags, discardable: bool) {
        self.image.request_layout(gpu, layout, access, stage, discardable);
    }
}

impl Texture for MockTexture {
    fn as_render_target(&self) -> Option<&dyn RenderTarget> {
        self.render_target.as_ref().map(|t| t as &dyn RenderTarget)
    }

    fn mip_maps_dirty(&self) -> bool {
        self.mips_dirty.load(Ordering::Relaxed)
    }

    fn set_mip_maps_dirty(&self, dirty: bool) {
        self.mips_dirty.store(dirty, Ordering::Relaxed);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub id: u32,
    size: u64,
    cpu_backed: bool,
    mapped: bool,
}

impl MockBuffer {
    pub fn device(size: u64) -> Arc<Self> {
        Arc::new(Self { id: next_id(), size, cpu_backed: false, mapped: false })
    }

    pub fn cpu_backed(size: u64) -> Arc<Self> {
        Arc::new(Self { id: next_id(), size, cpu_backed: true, mapped: false })
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn is_cpu_backed(&self) -> bool {
        self.cpu_backed
    }

    fn is_mapped(&self) -> bool {
        self.mapped
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn buffer_id(buffer: &Arc<dyn Buffer>) -> u32 {
    buffer.as_any().downcast_ref::<MockBuffer>().map(|b| b.id).unwrap_or(0)
}

// ============================================================================
// Mock Render Pass
// ============================================================================

#[derive(Debug)]
pub struct MockRenderPass {
    attachments: AttachmentsDescriptor,
    color: LoadStoreOps,
    stencil: LoadStoreOps,
}

impl RenderPass for MockRenderPass {
    fn attachments(&self) -> &AttachmentsDescriptor {
        &self.attachments
    }

    fn color_ops(&self) -> LoadStoreOps {
        self.color
    }

    fn stencil_ops(&self) -> LoadStoreOps {
        self.stencil
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Secondary Command Buffer
// ============================================================================

pub struct MockSecondaryCommandBuffer {
    pub id: u32,
    pub commands: Vec<MockCommand>,
    recording: bool,
}

impl MockSecondaryCommandBuffer {
    fn new() -> Self {
        Self { id: next_id(), commands: Vec::new(), recording: false }
    }

    fn record(&mut self, command: MockCommand) -> Result<()> {
        if !self.recording {
            return Err(Error::BackendError("command recorded outside begin/end".to_string()));
        }
        self.commands.push(command);
        Ok(())
    }
}

impl SecondaryCommandBuffer for MockSecondaryCommandBuffer {
    fn begin(&mut self, _target: &dyn RenderTarget, _render_pass: &Arc<dyn RenderPass>) -> Result<()> {
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.recording = false;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn clear_attachments(&mut self, attachments: &[ClearAttachment], rects: &[ClearRect]) -> Result<()> {
        for attachment in attachments {
            for rect in rects {
                self.record(MockCommand::ClearAttachments { attachment: *attachment, rect: *rect })?;
            }
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.record(MockCommand::BindVertexBuffer(buffer_id(buffer)))
    }

    fn bind_index_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> Result<()> {
        self.record(MockCommand::BindIndexBuffer(buffer_id(buffer)))
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, _first_instance: u32) -> Result<()> {
        self.record(MockCommand::Draw { vertex_count, instance_count, first_vertex })
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, _first_instance: u32) -> Result<()> {
        self.record(MockCommand::DrawIndexed { index_count, instance_count, first_index, vertex_offset })
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.record(MockCommand::SetViewport(viewport))
    }

    fn set_scissor(&mut self, scissor: IRect) -> Result<()> {
        self.record(MockCommand::SetScissor(scissor))
    }

    fn set_blend_constants(&mut self, constants: [f32; 4]) -> Result<()> {
        self.record(MockCommand::SetBlendConstants(constants))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Mock Pipeline State
// ============================================================================

pub struct MockPipelineState {
    primitive_type: PrimitiveType,
    fail_set_data: bool,
}

impl PipelineState for MockPipelineState {
    fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    fn set_data(&self, gpu: &dyn Gpu, _primitive_processor: &dyn PrimitiveProcessor, _pipeline: &Pipeline) -> Result<()> {
        push_event(gpu, MockEvent::SetData(self.primitive_type));
        if self.fail_set_data {
            return Err(Error::OutOfMemory);
        }
        Ok(())
    }

    fn bind(&self, _gpu: &dyn Gpu, command_buffer: &mut dyn SecondaryCommandBuffer) -> Result<()> {
        match command_buffer.as_any_mut().downcast_mut::<MockSecondaryCommandBuffer>() {
            Some(cb) => cb.record(MockCommand::BindPipeline(self.primitive_type)),
            None => Err(Error::InvalidResource("not a mock command buffer".to_string())),
        }
    }

    fn free_temp_resources(&self, gpu: &dyn Gpu) {
        push_event(gpu, MockEvent::FreeTempResources(self.primitive_type));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Resource Provider
// ============================================================================

/// Record of a render-pass lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassLookup {
    pub by_handle: bool,
    pub color: LoadStoreOps,
    pub stencil: LoadStoreOps,
}

pub struct MockResourceProvider {
    events: EventLog,
    compatible_sets: Mutex<Vec<AttachmentsDescriptor>>,
    pub lookups: Mutex<Vec<RenderPassLookup>>,
    pub recycled: Mutex<Vec<u32>>,
    command_buffers_exhausted: AtomicBool,
    missing_pipeline_states: Mutex<Vec<PrimitiveType>>,
    fail_set_data: AtomicBool,
}

impl MockResourceProvider {
    fn new(events: EventLog) -> Self {
        Self {
            events,
            compatible_sets: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            recycled: Mutex::new(Vec::new()),
            command_buffers_exhausted: AtomicBool::new(false),
            missing_pipeline_states: Mutex::new(Vec::new()),
            fail_set_data: AtomicBool::new(false),
        }
    }

    /// Register a compatible set and return its handle
    pub fn register_compatible_set(&self, attachments: AttachmentsDescriptor) -> CompatibleRenderPassHandle {
        let mut sets = self.compatible_sets.lock().unwrap();
        sets.push(attachments);
        CompatibleRenderPassHandle::new(sets.len() as u32 - 1)
    }

    /// Make secondary command buffer acquisition fail
    pub fn exhaust_command_buffers(&self, exhausted: bool) {
        self.command_buffers_exhausted.store(exhausted, Ordering::Relaxed);
    }

    /// Make pipeline-state lookups for `primitive_type` fail
    pub fn fail_pipeline_state(&self, primitive_type: PrimitiveType) {
        self.missing_pipeline_states.lock().unwrap().push(primitive_type);
    }

    pub fn fail_set_data(&self, fail: bool) {
        self.fail_set_data.store(fail, Ordering::Relaxed);
    }

    fn make_render_pass(&self, attachments: AttachmentsDescriptor, color: LoadStoreOps, stencil: LoadStoreOps) -> Arc<dyn RenderPass> {
        Arc::new(MockRenderPass { attachments, color, stencil })
    }
}

impl ResourceProvider for MockResourceProvider {
    fn find_render_pass(&self, target: &dyn RenderTarget, color_ops: LoadStoreOps, stencil_ops: LoadStoreOps) -> Result<Arc<dyn RenderPass>> {
        self.lookups.lock().unwrap().push(RenderPassLookup { by_handle: false, color: color_ops, stencil: stencil_ops });
        Ok(self.make_render_pass(target.attachments(), color_ops, stencil_ops))
    }

    fn find_compatible_render_pass(
        &self,
        handle: CompatibleRenderPassHandle,
        color_ops: LoadStoreOps,
        stencil_ops: LoadStoreOps,
    ) -> Result<Arc<dyn RenderPass>> {
        self.lookups.lock().unwrap().push(RenderPassLookup { by_handle: true, color: color_ops, stencil: stencil_ops });
        let attachments = handle
            .index()
            .and_then(|i| self.compatible_sets.lock().unwrap().get(i as usize).copied())
            .ok_or_else(|| Error::InvalidResource(format!("unknown compatible set {:?}", handle)))?;
        Ok(self.make_render_pass(attachments, color_ops, stencil_ops))
    }

    fn find_or_create_secondary_command_buffer(&self) -> Option<Box<dyn SecondaryCommandBuffer>> {
        if self.command_buffers_exhausted.load(Ordering::Relaxed) {
            return None;
        }
        Some(Box::new(MockSecondaryCommandBuffer::new()))
    }

    fn recycle_secondary_command_buffer(&self, command_buffer: Box<dyn SecondaryCommandBuffer>) {
        if let Some(cb) = command_buffer.as_any().downcast_ref::<MockSecondaryCommandBuffer>() {
            self.recycled.lock().unwrap().push(cb.id);
        }
    }

    fn find_or_create_compatible_pipeline_state(
        &self,
        _pipeline: &Pipeline,
        _primitive_processor: &dyn PrimitiveProcessor,
        primitive_type: PrimitiveType,
        _render_pass: &dyn RenderPass,
    ) -> Option<Arc<dyn PipelineState>> {
        if self.missing_pipeline_states.lock().unwrap().contains(&primitive_type) {
            return None;
        }
        self.events.lock().unwrap().push(MockEvent::PipelineStateResolved(primitive_type));
        Some(Arc::new(MockPipelineState {
            primitive_type,
            fail_set_data: self.fail_set_data.load(Ordering::Relaxed),
        }))
    }
}

// ============================================================================
// Mock Gpu
// ============================================================================

pub struct MockGpu {
    pub events: EventLog,
    pub provider: MockResourceProvider,
    stats: GpuStats,
    failing_replays: Mutex<Vec<u32>>,
}

impl MockGpu {
    pub fn new() -> Arc<Self> {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        Arc::new(Self {
            provider: MockResourceProvider::new(events.clone()),
            events,
            stats: GpuStats::new(),
            failing_replays: Mutex::new(Vec::new()),
        })
    }

    /// Make the replay of secondary command buffer `id` fail
    pub fn fail_replay(&self, id: u32) {
        self.failing_replays.lock().unwrap().push(id);
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Replayed segments in submission order
    pub fn replays(&self) -> Vec<MockReplay> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Replay(replay) => Some(replay),
                _ => None,
            })
            .collect()
    }
}

impl Gpu for MockGpu {
    fn resource_provider(&self) -> &dyn ResourceProvider {
        &self.provider
    }

    fn resolve_render_target(&self, target: &dyn RenderTarget) {
        if let Some(mock) = target.as_any().downcast_ref::<MockRenderTarget>() {
            mock.set_needs_resolve(false);
            self.events.lock().unwrap().push(MockEvent::Resolve(mock.name.clone()));
        }
    }

    fn generate_mipmap(&self, texture: &dyn Texture) {
        if let Some(mock) = texture.as_any().downcast_ref::<MockTexture>() {
            self.events.lock().unwrap().push(MockEvent::GenerateMipmap(mock.name().to_string()));
        }
    }

    fn submit_secondary_command_buffer(
        &self,
        command_buffer: &dyn SecondaryCommandBuffer,
        render_pass: &Arc<dyn RenderPass>,
        clear_value: &ClearValue,
        _target: &dyn RenderTarget,
        bounds: IRect,
    ) -> Result<()> {
        let cb = command_buffer
            .as_any()
            .downcast_ref::<MockSecondaryCommandBuffer>()
            .ok_or_else(|| Error::InvalidResource("not a mock command buffer".to_string()))?;
        if cb.recording {
            return Err(Error::BackendError("secondary command buffer still recording".to_string()));
        }
        if self.failing_replays.lock().unwrap().contains(&cb.id) {
            return Err(Error::BackendError(format!("replay of command buffer {} failed", cb.id)));
        }
        self.events.lock().unwrap().push(MockEvent::Replay(MockReplay {
            command_buffer: cb.id,
            color_ops: render_pass.color_ops(),
            stencil_ops: render_pass.stencil_ops(),
            clear_value: *clear_value,
            bounds,
            commands: cb.commands.clone(),
        }));
        Ok(())
    }

    fn stats(&self) -> &GpuStats {
        &self.stats
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Primitive Processor / Flush State
// ============================================================================

pub struct MockPrimitiveProcessor {
    pub textures: Vec<TextureAccess>,
}

impl MockPrimitiveProcessor {
    pub fn new() -> Self {
        Self { textures: Vec::new() }
    }

    pub fn with_texture(mut self, access: TextureAccess) -> Self {
        self.textures.push(access);
        self
    }
}

impl PrimitiveProcessor for MockPrimitiveProcessor {
    fn name(&self) -> &str {
        "MockPrimitiveProcessor"
    }

    fn texture_accesses(&self) -> &[TextureAccess] {
        &self.textures
    }

    fn program_key(&self) -> u64 {
        0x5eed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Pixel writer counting the writes it receives
#[derive(Default)]
pub struct MockPixelWriter {
    pub writes: u32,
}

impl WritePixels for MockPixelWriter {
    fn write_pixels(&mut self, _texture: &Arc<dyn Texture>, _rect: IRect, _data: &[u8]) -> bool {
        self.writes += 1;
        true
    }
}

pub struct MockFlushState;

impl FlushState for MockFlushState {
    fn do_upload(&self, upload: DeferredUpload) {
        let mut writer = MockPixelWriter::default();
        upload(&mut writer);
    }
}

/// Upload that logs `MockEvent::Upload(id)` when it runs
pub fn logged_upload(gpu: &MockGpu, id: u32) -> DeferredUpload {
    let events = gpu.events.clone();
    Box::new(move |_writer: &mut dyn WritePixels| {
        events.lock().unwrap().push(MockEvent::Upload(id));
    })
}
