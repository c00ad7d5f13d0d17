//! Hosting: window, event loop and the frame clock.
//!
//! [`run`] opens a window, loads the scene manifest and renders continuously:
//! every finished frame requests the next one, so the display's present mode
//! is the only throttle. Resize events are applied before the next frame.
//! [`render_headless`] does the same setup without a window and writes a
//! single frame to disk.
//!
//! # Keys
//!
//! - `P` writes the current frame to the configured capture path
//! - `Escape` quits

use std::{path::Path, sync::Arc};

use anyhow::Context as _;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::{
    capture::render_to_file,
    config::RendererConfig,
    context::RenderContext,
    device::gpu::{GpuOptions, WgpuDevice},
    render::RenderPipeline,
    resources::scene::{SceneManifest, populate},
};

/// Everything the host needs to start.
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub config: RendererConfig,
    /// Manifest file, relative to `config.asset_root`.
    pub scene: String,
    pub gpu: GpuOptions,
    pub title: String,
    pub size: (u32, u32),
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            config: RendererConfig::default(),
            scene: "scene.json".to_string(),
            gpu: GpuOptions::default(),
            title: "defer-ngin".to_string(),
            size: (1280, 720),
        }
    }
}

/// Build the pipeline and load the manifest's actors into it.
async fn load_pipeline(
    ctx: &mut RenderContext<WgpuDevice>,
    options: &ViewerOptions,
) -> anyhow::Result<RenderPipeline> {
    let mut pipeline = RenderPipeline::new(ctx, options.config.clone())?;
    let root = options.config.asset_root.as_path();
    let loaded = async {
        let manifest = SceneManifest::load(root, &options.scene).await?;
        populate(ctx, &mut pipeline, &manifest, root).await
    }
    .await;
    if let Err(e) = loaded {
        pipeline.teardown(ctx);
        return Err(e);
    }
    Ok(pipeline)
}

struct AppState {
    window: Arc<Window>,
    ctx: RenderContext<WgpuDevice>,
    pipeline: RenderPipeline,
}

impl AppState {
    async fn new(window: Arc<Window>, options: &ViewerOptions) -> anyhow::Result<Self> {
        let device = WgpuDevice::windowed(window.clone(), &options.gpu).await?;
        let mut ctx = RenderContext::new(device);
        let pipeline = load_pipeline(&mut ctx, options).await?;
        let mut state = Self {
            window,
            ctx,
            pipeline,
        };
        let size = state.window.inner_size();
        state.resize(size.width, size.height);
        Ok(state)
    }

    /// Minimised windows report zero sizes; those are ignored.
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.ctx.resize_target(width, height);
            if let Err(e) = self.pipeline.resize(&mut self.ctx, width, height) {
                log::error!("Resize to {}x{} failed: {}", width, height, e);
            }
        }
    }

    fn render(&mut self) -> crate::errors::Result<()> {
        self.ctx.begin_frame()?;
        let elapsed = self.pipeline.elapsed_seconds();
        if let Err(e) = self.pipeline.render_frame(&mut self.ctx, elapsed) {
            self.ctx.abort_frame();
            return Err(e);
        }
        self.ctx.end_frame()
    }

    fn capture(&mut self) {
        let path = self.pipeline.config().capture_path.clone();
        match render_to_file(&mut self.ctx, &mut self.pipeline, &path) {
            Ok(()) => log::info!("Saved frame to {}", path.display()),
            Err(e) => log::error!("Could not save frame: {}", e),
        }
    }

    fn teardown(&mut self) {
        self.pipeline.teardown(&mut self.ctx);
    }
}

pub struct App {
    async_runtime: tokio::runtime::Runtime,
    options: ViewerOptions,
    state: Option<AppState>,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(options: ViewerOptions) -> anyhow::Result<Self> {
        Ok(Self {
            async_runtime: tokio::runtime::Runtime::new()?,
            options,
            state: None,
            failure: None,
        })
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        // Redraws still queued after this find no state and are ignored.
        if let Some(mut state) = self.state.take() {
            state.teardown();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let (width, height) = self.options.size;
        let window_attributes = Window::default_attributes()
            .with_title(self.options.title.clone())
            .with_inner_size(PhysicalSize::new(width, height));
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.failure = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        match self
            .async_runtime
            .block_on(AppState::new(window, &self.options))
        {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(e) => {
                log::error!("Startup failed: {:#}", e);
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => self.exit(event_loop),
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
                state.window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.render() {
                    log::error!("Frame aborted: {}", e);
                }
                state.window.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::KeyP => state.capture(),
                KeyCode::Escape => self.exit(event_loop),
                _ => {}
            },
            _ => {}
        }
    }
}

/// Open a window and render until it is closed.
pub fn run(options: ViewerOptions) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }

    let event_loop = EventLoop::new()?;
    let mut app = App::new(options)?;
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Render one frame offscreen at `width` x `height` and save it to `output`.
pub fn render_headless(
    options: ViewerOptions,
    width: u32,
    height: u32,
    output: &Path,
) -> anyhow::Result<()> {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let device = WgpuDevice::headless(width, height, &options.gpu).await?;
        let mut ctx = RenderContext::new(device);
        let mut pipeline = load_pipeline(&mut ctx, &options).await?;
        let rendered = pipeline
            .resize(&mut ctx, width, height)
            .and_then(|_| render_to_file(&mut ctx, &mut pipeline, output));
        pipeline.teardown(&mut ctx);
        rendered.with_context(|| format!("rendering to {}", output.display()))
    })
}
