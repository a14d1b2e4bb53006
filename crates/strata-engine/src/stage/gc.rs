use std::fmt;

/// Outcome of one eviction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcReport {
    pub frame: u64,
    pub aggressive: bool,
    /// Texture sources whose payload was released.
    pub sources_freed: usize,
    pub texture_bytes_freed: u64,
    /// Part of `texture_bytes_freed` whose sources were requested again right
    /// away because they are still visible.
    pub texture_bytes_reloaded: u64,
    pub render_target_bytes_freed: u64,
    pub renderer_bytes_freed: u64,
    /// Usage after the pass. Includes sources reloaded for visible elements
    /// during an aggressive pass.
    pub remaining: u64,
    pub texture_memory: u64,
    pub render_target_memory: u64,
}

impl GcReport {
    pub fn total_freed(&self) -> u64 {
        self.texture_bytes_freed + self.render_target_bytes_freed + self.renderer_bytes_freed
    }

    /// Texture bytes that stay freed once visible sources have reloaded.
    pub fn durable_texture_bytes(&self) -> u64 {
        self.texture_bytes_freed.saturating_sub(self.texture_bytes_reloaded)
    }
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / 1e6
}

impl fmt::Display for GcReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GC{} frame {}: freed {:.2}MB ({} sources",
            if self.aggressive { "[aggressive]" } else { "" },
            self.frame,
            mb(self.total_freed()),
            self.sources_freed,
        )?;
        if self.texture_bytes_reloaded > 0 {
            write!(f, ", {:.2}MB reloading", mb(self.texture_bytes_reloaded))?;
        }
        write!(
            f,
            "). Remaining {:.2}MB (textures {:.2}MB, render targets {:.2}MB, other {:.2}MB)",
            mb(self.remaining),
            mb(self.texture_memory),
            mb(self.render_target_memory),
            mb(self.remaining.saturating_sub(self.texture_memory + self.render_target_memory)),
        )
    }
}
