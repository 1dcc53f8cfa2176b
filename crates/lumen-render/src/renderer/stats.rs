/// Draw counters since the last clear.
///
/// Counters saturate instead of wrapping.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct RenderStats {
    pub draw_calls: u32,
    pub triangle_count: u32,
}

impl RenderStats {
    pub(crate) fn record(&mut self, triangles: u32) {
        self.draw_calls = self.draw_calls.saturating_add(1);
        self.triangle_count = self.triangle_count.saturating_add(triangles);
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
