//! Handles, descriptors and state enums understood by every [`GraphicsDevice`](super::GraphicsDevice).

use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw handle value. Zero is never handed out.
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// A GPU buffer holding vertex data.
    BufferId
);
handle!(
    /// Vertex input state: which buffers feed which shader locations.
    VertexArrayId
);
handle!(TextureId);
handle!(FramebufferId);
handle!(ProgramId);

/// Hands out monotonically increasing handle values starting at 1.
#[derive(Debug, Default)]
pub(crate) struct HandleAllocator {
    last: u32,
}

impl HandleAllocator {
    pub(crate) fn next(&mut self) -> u32 {
        self.last += 1;
        self.last
    }
}

/// Number of texture units a program can sample from.
pub const MAX_TEXTURE_UNITS: usize = 8;
/// Number of color attachment points on a framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba16Float => 8,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
    pub wrap: WrapMode,
}

/// What a device reports about a live texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentPoint {
    Color(u8),
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// No attachment at all.
    MissingAttachment,
    /// An attachment refers to a destroyed texture or a format that does not
    /// fit its attachment point.
    IncompleteAttachment,
    /// Attachments disagree on their size.
    IncompleteDimensions,
    /// A draw buffer names an attachment point with nothing attached.
    IncompleteDrawBuffer,
}

impl FramebufferStatus {
    pub fn is_complete(self) -> bool {
        self == FramebufferStatus::Complete
    }
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FramebufferStatus::Complete => "complete",
            FramebufferStatus::MissingAttachment => "no attachments",
            FramebufferStatus::IncompleteAttachment => "attachment is invalid",
            FramebufferStatus::IncompleteDimensions => "attachment sizes differ",
            FramebufferStatus::IncompleteDrawBuffer => "draw buffer has no attachment",
        };
        f.write_str(text)
    }
}

/// Completeness rules shared by all backends.
///
/// `attachments` pairs each attachment point with what the device knows about
/// the attached texture, `None` if the texture has since been destroyed.
pub fn check_completeness(
    attachments: &[(AttachmentPoint, Option<TextureInfo>)],
    draw_buffers: &[AttachmentPoint],
) -> FramebufferStatus {
    if attachments.is_empty() {
        return FramebufferStatus::MissingAttachment;
    }
    let mut size = None;
    for (point, info) in attachments {
        let Some(info) = info else {
            return FramebufferStatus::IncompleteAttachment;
        };
        let fits = match point {
            AttachmentPoint::Depth => info.format.is_depth(),
            AttachmentPoint::Color(index) => {
                !info.format.is_depth() && (*index as usize) < MAX_COLOR_ATTACHMENTS
            }
        };
        if !fits || info.width == 0 || info.height == 0 {
            return FramebufferStatus::IncompleteAttachment;
        }
        match size {
            None => size = Some((info.width, info.height)),
            Some(s) if s != (info.width, info.height) => {
                return FramebufferStatus::IncompleteDimensions;
            }
            Some(_) => (),
        }
    }
    let attached = |p: &AttachmentPoint| attachments.iter().any(|(point, _)| point == p);
    if draw_buffers
        .iter()
        .any(|p| matches!(p, AttachmentPoint::Depth) || !attached(p))
    {
        return FramebufferStatus::IncompleteDrawBuffer;
    }
    FramebufferStatus::Complete
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
}

impl VertexFormat {
    pub fn size(self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    /// A tightly packed buffer feeding a single attribute.
    pub fn single(location: u32, format: VertexFormat) -> Self {
        Self {
            stride: format.size(),
            attributes: vec![VertexAttribute {
                location,
                format,
                offset: 0,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBinding {
    pub buffer: BufferId,
    pub layout: VertexBufferLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexArrayDescriptor {
    pub label: String,
    /// Buffer slot `i` is `bindings[i]`.
    pub bindings: Vec<VertexBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    Bool,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    /// A texture + sampler pair. Its value is the texture unit to read from.
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([[f32; 3]; 3]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    /// Whether a value of this kind may be written to a uniform of type `ty`.
    pub fn fits(&self, ty: UniformType) -> bool {
        matches!(
            (self, ty),
            (UniformValue::Float(_), UniformType::Float)
                | (UniformValue::Int(_), UniformType::Int)
                | (UniformValue::Int(_), UniformType::Sampler)
                | (UniformValue::Bool(_), UniformType::Bool)
                | (UniformValue::Vec3(_), UniformType::Vec3)
                | (UniformValue::Vec4(_), UniformType::Vec4)
                | (UniformValue::Mat3(_), UniformType::Mat3)
                | (UniformValue::Mat4(_), UniformType::Mat4)
        )
    }
}

impl From<cgmath::Matrix4<f32>> for UniformValue {
    fn from(m: cgmath::Matrix4<f32>) -> Self {
        UniformValue::Mat4(m.into())
    }
}

impl From<cgmath::Matrix3<f32>> for UniformValue {
    fn from(m: cgmath::Matrix3<f32>) -> Self {
        UniformValue::Mat3(m.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
}

impl UniformDecl {
    pub fn new(name: &str, ty: UniformType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// Index into the declaration list of the program that resolved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStage {
    pub source: String,
    pub entry_point: String,
}

impl ShaderStage {
    pub fn new(source: impl Into<String>, entry_point: &str) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.to_string(),
        }
    }
}

/// Everything needed to link a program.
///
/// Non-sampler uniforms form one block at `@group(0) @binding(0)` in
/// declaration order. The `n`-th sampler uniform occupies
/// `@group(1) @binding(2n)` (texture) and `@binding(2n + 1)` (sampler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    pub label: String,
    pub vertex: ShaderStage,
    pub fragment: ShaderStage,
    pub uniforms: Vec<UniformDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetId {
    /// The visible surface (or the offscreen stand-in of a headless device).
    Default,
    Framebuffer(FramebufferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u8 {
        const COLOR = 0b01;
        const DEPTH = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Less,
    LessEqual,
    Equal,
    Greater,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    Back,
    Front,
}

/// Binding state a device draws with.
#[derive(Debug)]
pub(crate) struct BindingState {
    pub(crate) target: RenderTargetId,
    pub(crate) viewport: Option<Viewport>,
    pub(crate) clear_color: [f32; 4],
    pub(crate) depth_test: Option<DepthFunc>,
    pub(crate) cull_face: Option<CullFace>,
    pub(crate) program: Option<ProgramId>,
    pub(crate) units: [Option<TextureId>; MAX_TEXTURE_UNITS],
    pub(crate) vertex_array: Option<VertexArrayId>,
}

impl Default for BindingState {
    fn default() -> Self {
        Self {
            target: RenderTargetId::Default,
            viewport: None,
            clear_color: [0.0; 4],
            depth_test: None,
            cull_face: None,
            program: None,
            units: [None; MAX_TEXTURE_UNITS],
            vertex_array: None,
        }
    }
}
