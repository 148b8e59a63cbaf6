//! Shader program sources.

/// Vertex and fragment source text for a shader program.
///
/// Kept by the program so it can be recompiled after a context loss.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProgramSource {
    /// Debug label for the program.
    pub label: Option<String>,
    /// Vertex stage source.
    pub vertex: String,
    /// Fragment stage source.
    pub fragment: String,
}

impl ProgramSource {
    /// Create a program source from its two stages.
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            label: None,
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
