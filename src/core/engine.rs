//! Core Engine struct and main loop

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::PhysicalKey,
    window::{Window, WindowId},
};

use crate::core::{EngineConfig, Time};
use crate::input::{Input, InputMapper, SceneAction};
use crate::renderer::{
    Camera, CameraView, CommandList, RenderError, RenderSettings, Renderer, ResourceLoader,
    Viewport,
};

/// Camera orbit speed in radians per second
const ORBIT_SPEED: f32 = 1.5;
/// Distance moved per scroll line
const ZOOM_STEP: f32 = 0.5;

/// A scene hosted by the [`Engine`]
///
/// Call order: `preload`, `load_shaders`, `load`, then per frame `update`,
/// `draw` and `post_draw`.
pub trait SceneApp: 'static {
    /// Load what the frame itself needs: skybox, render targets
    fn preload(
        &mut self,
        loader: &mut dyn ResourceLoader,
        viewport: Viewport,
    ) -> Result<(), RenderError>;

    /// Compile shaders; calling again recompiles them from disk
    fn load_shaders(&mut self, loader: &mut dyn ResourceLoader) -> Result<(), RenderError>;

    /// Load models and build the scene
    fn load(&mut self, loader: &mut dyn ResourceLoader) -> Result<(), RenderError>;

    /// Advance animations to `time` seconds since startup
    fn update(&mut self, time: f32);

    /// Record the scene into the off-screen target
    fn draw(
        &self,
        camera: &dyn CameraView,
        settings: &RenderSettings,
        cmds: &mut CommandList,
    ) -> Result<(), RenderError>;

    /// Record the composite onto the screen
    fn post_draw(
        &self,
        camera: &dyn CameraView,
        settings: &RenderSettings,
        cmds: &mut CommandList,
    ) -> Result<(), RenderError>;

    /// Called when the window is resized
    fn on_resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Called for every bound key press, after settings toggles are applied
    fn on_key(&mut self, _action: SceneAction) {}

    /// Camera the viewer starts with
    fn initial_camera(&self) -> Camera {
        Camera::default()
    }
}

/// Main engine struct
pub struct Engine<A: SceneApp> {
    config: EngineConfig,
    app: A,
    time: Time,
    input: Input,
    mapper: InputMapper,
    settings: RenderSettings,
    camera: Camera,
    commands: CommandList,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    /// Set once `load` has succeeded
    loaded: bool,
    /// First fatal error, returned from [`Engine::run`]
    error: Option<RenderError>,
}

impl<A: SceneApp> Engine<A> {
    /// Create a new engine hosting `app`
    pub fn new(config: EngineConfig, app: A) -> Self {
        let settings = config.initial_settings();
        let mut camera = app.initial_camera();
        camera.set_aspect(config.width, config.height);

        Self {
            config,
            app,
            time: Time::new(),
            input: Input::new(),
            mapper: InputMapper::with_defaults(),
            settings,
            camera,
            commands: CommandList::new(),
            window: None,
            renderer: None,
            loaded: false,
            error: None,
        }
    }

    /// Run the engine
    pub fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::init();
        log::info!("Starting engine: {}", self.config.title);

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RenderError) {
        log::error!("{err}");
        self.error.get_or_insert(err);
        event_loop.exit();
    }

    /// Create the renderer and load the app
    fn start(&mut self, window: Arc<Window>) -> Result<(), RenderError> {
        let size = window.inner_size();
        let viewport = Viewport::new(size.width.max(1), size.height.max(1))?;
        self.camera.set_aspect(viewport.width(), viewport.height());

        let mut renderer = pollster::block_on(Renderer::new(
            window,
            self.config.vsync,
            self.config.shader_dir.clone(),
        ))?;

        self.app.preload(&mut renderer, viewport)?;
        self.app.load_shaders(&mut renderer)?;
        self.app.load(&mut renderer)?;

        self.renderer = Some(renderer);
        self.loaded = true;
        Ok(())
    }

    /// Follow a window resize
    ///
    /// Minimized windows report a zero size and are ignored, as are resizes
    /// before the app has loaded: `preload` already sees the current size.
    /// A failure from the app is fatal, like a failed frame.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 || !self.loaded {
            return Ok(());
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(width, height);
        }
        self.camera.set_aspect(width, height);
        self.app.on_resize(width, height)
    }

    fn handle_action(&mut self, event_loop: &ActiveEventLoop, action: SceneAction) {
        match action {
            SceneAction::Quit => {
                log::info!("Quit requested");
                event_loop.exit();
                return;
            }
            SceneAction::ReloadShaders => {
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(err) = self.app.load_shaders(renderer)
                {
                    log::error!("Shader reload failed: {err}");
                }
            }
            _ => {
                if action.apply(&mut self.settings) {
                    log::debug!("{action:?}");
                }
            }
        }
        self.app.on_key(action);
    }

    /// Move the camera for held arrow keys and the scroll wheel
    fn drive_camera(&mut self) {
        let step = ORBIT_SPEED * self.time.delta_secs();
        let (mut yaw, mut pitch) = (0.0, 0.0);
        for key in self.input.pressed_keys() {
            if let Some((dy, dp)) = self
                .mapper
                .get_action(key)
                .and_then(SceneAction::orbit_direction)
            {
                yaw += dy * step;
                pitch += dp * step;
            }
        }
        if yaw != 0.0 || pitch != 0.0 {
            self.camera.orbit(yaw, pitch);
        }

        let scroll = self.input.scroll_delta().y;
        if scroll != 0.0 {
            self.camera.zoom(scroll * ZOOM_STEP);
        }
    }

    fn frame(&mut self) -> Result<(), RenderError> {
        self.time.update();
        self.drive_camera();
        self.app.update(self.time.elapsed_secs());

        self.commands.clear();
        self.app.draw(&self.camera, &self.settings, &mut self.commands)?;
        self.app
            .post_draw(&self.camera, &self.settings, &mut self.commands)?;

        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(&self.commands);
        }
        self.input.update();
        Ok(())
    }
}

impl<A: SceneApp> ApplicationHandler for Engine<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {err}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(Arc::clone(&window));

        match self.start(window) {
            Ok(()) => log::info!("Engine initialized successfully"),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                if let Err(err) = self.resize(new_size.width, new_size.height) {
                    self.fail(event_loop, err);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key_code) = event.physical_key
                    && self.input.process_keyboard(key_code, event.state)
                    && let Some(action) = self.mapper.get_action(key_code)
                {
                    self.handle_action(event_loop, action);
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    winit::event::MouseScrollDelta::LineDelta(x, y) => glam::Vec2::new(x, y),
                    winit::event::MouseScrollDelta::PixelDelta(pos) => {
                        glam::Vec2::new(pos.x as f32, pos.y as f32) / 32.0
                    }
                };
                self.input.process_scroll(scroll);
            }

            WindowEvent::RedrawRequested => {
                if self.renderer.is_none() {
                    return;
                }
                if let Err(err) = self.frame() {
                    self.fail(event_loop, err);
                    return;
                }

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records resizes; fails them once `broken` is set
    #[derive(Default)]
    struct ResizeApp {
        resizes: Vec<(u32, u32)>,
        broken: bool,
    }

    impl SceneApp for ResizeApp {
        fn preload(
            &mut self,
            _loader: &mut dyn ResourceLoader,
            _viewport: Viewport,
        ) -> Result<(), RenderError> {
            Ok(())
        }

        fn load_shaders(&mut self, _loader: &mut dyn ResourceLoader) -> Result<(), RenderError> {
            Ok(())
        }

        fn load(&mut self, _loader: &mut dyn ResourceLoader) -> Result<(), RenderError> {
            Ok(())
        }

        fn update(&mut self, _time: f32) {}

        fn draw(
            &self,
            _camera: &dyn CameraView,
            _settings: &RenderSettings,
            _cmds: &mut CommandList,
        ) -> Result<(), RenderError> {
            Ok(())
        }

        fn post_draw(
            &self,
            _camera: &dyn CameraView,
            _settings: &RenderSettings,
            _cmds: &mut CommandList,
        ) -> Result<(), RenderError> {
            Ok(())
        }

        fn on_resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
            if self.broken {
                return Err(RenderError::NotPreloaded);
            }
            self.resizes.push((width, height));
            Ok(())
        }
    }

    #[test]
    fn test_resize_before_load_is_ignored() {
        let mut engine = Engine::new(EngineConfig::default(), ResizeApp::default());
        assert!(engine.resize(1920, 1080).is_ok());
        assert!(engine.app.resizes.is_empty());
    }

    #[test]
    fn test_resize_reaches_app_and_camera() {
        let mut engine = Engine::new(EngineConfig::default(), ResizeApp::default());
        engine.loaded = true;

        engine.resize(1000, 500).unwrap();
        engine.resize(0, 500).unwrap();

        assert_eq!(engine.app.resizes, vec![(1000, 500)]);
        assert!((engine.camera.aspect - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_resize_is_an_error() {
        let mut engine = Engine::new(
            EngineConfig::default(),
            ResizeApp {
                broken: true,
                ..Default::default()
            },
        );
        engine.loaded = true;

        assert!(matches!(
            engine.resize(800, 600),
            Err(RenderError::NotPreloaded)
        ));
    }
}
