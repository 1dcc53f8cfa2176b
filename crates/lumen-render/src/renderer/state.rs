use std::fmt;

/// Lifecycle of a [`Renderer`](super::Renderer).
///
/// ```text
/// Uninitialized -> Ready -> Frame <-> Scene
///                            ^  clear  |
///                            +---------+        any -> ShutDown
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum RendererState {
    #[default]
    Uninitialized,
    /// Initialized; no frame target yet.
    Ready,
    /// A frame target was cleared and accepts draws.
    Frame,
    /// Inside `begin_scene` / `end_scene`.
    Scene,
    ShutDown,
}

/// Lifecycle operations that move the state machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Transition {
    Initialize,
    Clear,
    BeginScene,
    EndScene,
    Shutdown,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::Initialize => "initialize",
            Transition::Clear => "clear",
            Transition::BeginScene => "begin a scene",
            Transition::EndScene => "end a scene",
            Transition::Shutdown => "shut down",
        }
    }
}

impl RendererState {
    /// State after `transition`, or `None` if it is not allowed from `self`.
    pub(crate) fn next(self, transition: Transition) -> Option<RendererState> {
        use RendererState::*;
        use Transition as T;

        match (self, transition) {
            (Uninitialized, T::Initialize) => Some(Ready),
            (Ready | Frame, T::Clear) => Some(Frame),
            (Frame, T::BeginScene) => Some(Scene),
            (Scene, T::EndScene) => Some(Frame),
            (ShutDown, T::Shutdown) => None,
            (_, T::Shutdown) => Some(ShutDown),
            _ => None,
        }
    }

    /// Whether draws are accepted.
    pub fn accepts_draws(self) -> bool {
        matches!(self, RendererState::Frame | RendererState::Scene)
    }

    pub fn is_initialized(self) -> bool {
        !matches!(self, RendererState::Uninitialized | RendererState::ShutDown)
    }
}

impl fmt::Display for RendererState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RendererState::Uninitialized => "uninitialized",
            RendererState::Ready => "ready",
            RendererState::Frame => "in a frame",
            RendererState::Scene => "in a scene",
            RendererState::ShutDown => "shut down",
        };
        f.write_str(s)
    }
}
