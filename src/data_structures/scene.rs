use crate::data_structures::mesh::MeshResource;

/// Which geometry-pass shader an actor is drawn with.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShaderSlot {
    /// The pipeline's built-in G-buffer shader.
    #[default]
    Default,
    /// A shader registered on the pipeline under this name.
    Named(String),
}

#[derive(Debug)]
pub struct Actor {
    pub name: String,
    pub mesh: MeshResource,
    pub shader: ShaderSlot,
}

/// Actors in draw order. Insertion order is draw order; nothing is sorted
/// or deduplicated.
#[derive(Debug, Default)]
pub struct Scene {
    actors: Vec<Actor>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, actor: Actor) {
        self.actors.push(actor);
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn find(&self, name: &str) -> Option<&Actor> {
        self.actors.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Take every actor out, leaving the scene empty.
    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Actor> {
        self.actors.drain(..)
    }
}
