//! Common types shared between backends

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture, together with its sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    /// Six array layers viewed as a cube
    Cube,
}

impl TextureDimension {
    pub fn layers(&self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

bitflags::bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC = 1 << 0;
        const COPY_DST = 1 << 1;
        const TEXTURE_BINDING = 1 << 2;
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const COPY_DST = 1 << 0;
        const INDEX = 1 << 1;
        const VERTEX = 1 << 2;
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            sample_count: 1,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// One texture slot a program samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramTextureSlot {
    /// Binding of the texture in the texture group. The sampler sits at `binding + 1`.
    pub binding: u32,
    pub dimension: TextureDimension,
}

/// Everything a backend needs to compile and lay out a program
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: Option<String>,
    pub source: String,
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Size of the uniform block at group 0, binding 0. Zero when the program has none.
    pub uniform_block_size: u32,
    pub textures: Vec<ProgramTextureSlot>,
    pub color_outputs: u32,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
}

impl AttributeFormat {
    pub fn size(&self) -> u64 {
        match self {
            AttributeFormat::Unorm8x4 => 4,
            AttributeFormat::Float32x2 => 8,
            AttributeFormat::Float32x3 => 12,
            AttributeFormat::Float32x4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: AttributeFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexStepMode {
    Vertex,
    Instance,
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    LineList,
    TriangleList,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
}

/// Compare function for depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Blend component state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

/// Blend state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
            },
        }
    }
}

/// Fixed-function state applied to subsequent draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub topology: PrimitiveTopology,
    pub blend: Option<BlendState>,
    pub depth_compare: CompareFunction,
    pub depth_write: bool,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            blend: None,
            depth_compare: CompareFunction::Less,
            depth_write: true,
            cull_mode: CullMode::None,
            polygon_mode: PolygonMode::Fill,
        }
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Sampler descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
        }
    }
}

/// What a render pass attachment draws into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentView {
    /// The presentable surface, or its depth buffer when used as a depth attachment
    Surface,
    Texture { texture: TextureHandle, layer: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Color attachment for render pass
#[derive(Debug, Clone, PartialEq)]
pub struct ColorAttachment {
    pub view: AttachmentView,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

/// Depth stencil attachment for render pass
#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilAttachment {
    pub view: AttachmentView,
    /// `Clear` clears to `depth_clear_value`; its color payload is ignored.
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub depth_clear_value: f32,
}

/// Render pass descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Optional features a backend may lack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub wireframe: bool,
    pub float32_filterable: bool,
    pub max_sample_count: u32,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            wireframe: true,
            float32_filterable: true,
            max_sample_count: 8,
        }
    }
}

/// Pixels read back from the GPU, tightly packed RGBA8 rows, top row first
#[derive(Debug, Clone, PartialEq)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}
