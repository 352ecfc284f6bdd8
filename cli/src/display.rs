//! Windowed presentation loop
//!
//! Owns the window and the GPU surface. On a fixed timer tick it snapshots
//! the shared canvas (one lock, one memcpy), uploads it to a texture and
//! blits it to the screen. The dispatch thread never waits on the GPU and
//! the window never waits on inference; the canvas mutex is the only point
//! of contact.
//!
//! Escape or `q` raises the abort flag and closes the window; the loop also
//! exits on its own once the dispatch thread raises the flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use inferscope_core::SharedCanvas;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Fullscreen, Window, WindowId};

/// Display loop settings, extracted from the benchmark configuration.
pub struct DisplayOptions {
    pub full_screen: bool,
    pub refresh: Duration,
}

struct Gpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    frame_tex: wgpu::Texture,
    frame_bind: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
}

struct App {
    canvas: SharedCanvas,
    abort: Arc<AtomicBool>,
    options: DisplayOptions,
    canvas_size: (u32, u32),
    /// RGBA upload staging, reused every tick
    staging: Vec<u8>,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    next_tick: Instant,
    init_error: Option<anyhow::Error>,
}

/// Run the windowed presentation loop until abort or window close.
///
/// # Errors
///
/// Fails if the event loop or GPU surface cannot be created.
pub fn run(
    canvas: SharedCanvas,
    abort: Arc<AtomicBool>,
    options: DisplayOptions,
) -> anyhow::Result<()> {
    let canvas_size = {
        let guard = match canvas.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        (guard.width(), guard.height())
    };
    let staging = vec![0; canvas_size.0 as usize * canvas_size.1 as usize * 4];

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let mut app = App {
        canvas,
        abort: Arc::clone(&abort),
        options,
        canvas_size,
        staging,
        window: None,
        gpu: None,
        next_tick: Instant::now(),
        init_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("presentation loop failed")?;
    // whatever ended the loop, make sure dispatch winds down too
    abort.store(true, Ordering::Relaxed);
    app.init_error.map_or(Ok(()), Err)
}

impl App {
    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let mut attrs = Window::default_attributes()
            .with_title("inferscope")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.canvas_size.0,
                self.canvas_size.1,
            ));
        if self.options.full_screen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        window.set_cursor_visible(false);

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no compatible GPU adapter")?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("display-device"),
            required_features: wgpu::Features::empty(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("failed to acquire GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let frame_tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("canvas-texture"),
            size: wgpu::Extent3d {
                width: self.canvas_size.0,
                height: self.canvas_size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let frame_view = frame_tex.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("canvas-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("canvas-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let frame_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("canvas-bind"),
            layout: &bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&frame_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit-shader"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(include_str!(
                "shaders/blit.wgsl"
            ))),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit-layout"),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blit-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        info!(
            width = self.canvas_size.0,
            height = self.canvas_size.1,
            fullscreen = self.options.full_screen,
            "presentation started"
        );
        self.window = Some(window);
        self.gpu = Some(Gpu {
            device,
            queue,
            surface,
            config,
            frame_tex,
            frame_bind,
            pipeline,
        });
        Ok(())
    }

    /// Snapshot the canvas into the texture and schedule a redraw.
    fn tick(&mut self) {
        let Some(gpu) = self.gpu.as_ref() else {
            return;
        };
        {
            let canvas = match self.canvas.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for (dst, src) in self.staging.chunks_exact_mut(4).zip(canvas.pixels().chunks_exact(3))
            {
                dst[..3].copy_from_slice(src);
                dst[3] = 255;
            }
        }
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.frame_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.staging,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.canvas_size.0 * 4),
                rows_per_image: Some(self.canvas_size.1),
            },
            wgpu::Extent3d {
                width: self.canvas_size.0,
                height: self.canvas_size.1,
                depth_or_array_layers: 1,
            },
        );
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let frame = match gpu.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                match err {
                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                        gpu.surface.configure(&gpu.device, &gpu.config);
                    }
                    wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => {}
                    wgpu::SurfaceError::OutOfMemory => {
                        warn!("surface out of memory, closing");
                        event_loop.exit();
                    }
                }
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blit-encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            rpass.set_pipeline(&gpu.pipeline);
            rpass.set_bind_group(0, &gpu.frame_bind, &[]);
            rpass.draw(0..3, 0..1);
        }
        gpu.queue.submit(Some(encoder.finish()));
        frame.present();
    }

    fn quit(&self, event_loop: &ActiveEventLoop) {
        self.abort.store(true, Ordering::Relaxed);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init_gpu(event_loop) {
            error!("presentation init failed: {err:#}");
            self.abort.store(true, Ordering::Relaxed);
            self.init_error = Some(err);
            event_loop.exit();
        }
    }

    fn new_events(&mut self, event_loop: &ActiveEventLoop, cause: StartCause) {
        match cause {
            StartCause::Init | StartCause::ResumeTimeReached { .. } => {
                if self.abort.load(Ordering::Relaxed) {
                    event_loop.exit();
                    return;
                }
                self.tick();
                self.next_tick = Instant::now() + self.options.refresh;
            }
            _ => {}
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested => self.quit(event_loop),
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                match event.logical_key {
                    Key::Named(NamedKey::Escape) => self.quit(event_loop),
                    Key::Character(ref c) if c == "q" => self.quit(event_loop),
                    _ => {}
                }
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.config.width = new_size.width.max(1);
                    gpu.config.height = new_size.height.max(1);
                    gpu.surface.configure(&gpu.device, &gpu.config);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}
