use std::rc::Rc;

use super::ResourceId;

/// Number of texture units a context exposes.
pub const MAX_TEXTURE_UNITS: usize = 16;

/// A resource that can be made current on a context.
pub(crate) trait Bindable {
    fn resource_id(&self) -> ResourceId;
}

/// What is currently bound on a context: one program and one texture per unit.
///
/// Bound resources are held by `Rc`, so a resource released by its owner while
/// still bound stays alive until it is unbound or replaced.
pub(crate) struct BindingState<P, T> {
    program: Option<Rc<P>>,
    units: [Option<Rc<T>>; MAX_TEXTURE_UNITS],
}

impl<P, T> Default for BindingState<P, T> {
    fn default() -> Self {
        Self {
            program: None,
            units: std::array::from_fn(|_| None),
        }
    }
}

impl<P: Bindable, T: Bindable> BindingState<P, T> {
    pub fn bind_program(&mut self, program: Rc<P>) {
        self.program = Some(program);
    }

    pub fn unbind_program(&mut self) {
        self.program = None;
    }

    pub fn program(&self) -> Option<&Rc<P>> {
        self.program.as_ref()
    }

    pub fn program_id(&self) -> Option<ResourceId> {
        self.program.as_ref().map(|p| p.resource_id())
    }

    /// Binds `texture` to `slot`. Returns `false` if the slot does not exist.
    pub fn bind_texture(&mut self, slot: u32, texture: Rc<T>) -> bool {
        match self.units.get_mut(slot as usize) {
            Some(unit) => {
                *unit = Some(texture);
                true
            }
            None => false,
        }
    }

    /// Clears every unit currently holding the texture `id`.
    pub fn unbind_texture(&mut self, id: ResourceId) -> usize {
        let mut cleared = 0;
        for unit in &mut self.units {
            if unit.as_ref().is_some_and(|t| t.resource_id() == id) {
                *unit = None;
                cleared += 1;
            }
        }
        cleared
    }

    pub fn texture(&self, slot: u32) -> Option<&Rc<T>> {
        self.units.get(slot as usize).and_then(Option::as_ref)
    }

    pub fn texture_id(&self, slot: u32) -> Option<ResourceId> {
        self.texture(slot).map(|t| t.resource_id())
    }

    /// Drops every binding.
    pub fn reset(&mut self) {
        self.program = None;
        for unit in &mut self.units {
            *unit = None;
        }
    }
}
