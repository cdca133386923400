use std::ptr::addr_of_mut;

use gd3d11_lib::{engine::GraphicsEngine, Gothic};

/// Everything the hook thunks reach through the process-global state.
///
/// Only touched from the host's render thread.
pub struct State {
    gothic: Gothic,
    engine: Box<dyn GraphicsEngine>,
}

impl State {
    pub fn new(gothic: Gothic, engine: Box<dyn GraphicsEngine>) -> Self {
        Self { gothic, engine }
    }

    pub fn gothic_mut(&mut self) -> &mut Gothic {
        &mut self.gothic
    }

    pub fn into_parts(self) -> (Gothic, Box<dyn GraphicsEngine>) {
        (self.gothic, self.engine)
    }
}

static mut STATE: Option<State> = None;

pub fn init_state(state: State) {
    unsafe { *addr_of_mut!(STATE) = Some(state) };
}

pub fn take_state() -> Option<State> {
    unsafe { (*addr_of_mut!(STATE)).take() }
}

pub fn state_mut() -> Option<&'static mut State> {
    unsafe { (*addr_of_mut!(STATE)).as_mut() }
}

pub fn engine() -> Option<&'static mut dyn GraphicsEngine> {
    state_mut().map(|state| state.engine.as_mut())
}
