use std::fmt;

use crate::error::ShaderError;

/// Programmable stage a source text is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// One stage that parsed and validated on its own.
///
/// Holds the WGSL text (the GPU module is created from it at link time) and
/// the validated IR used for reflection.
#[derive(Debug)]
pub struct CompiledStage {
    pub(crate) stage: ShaderStage,
    pub(crate) origin: String,
    pub(crate) source: String,
    pub(crate) module: naga::Module,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// File path or label the source came from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// First entry point declared for this stage, if any.
    pub fn entry_point(&self) -> Option<&naga::EntryPoint> {
        let wanted = self.stage.to_naga();
        self.module.entry_points.iter().find(|ep| ep.stage == wanted)
    }
}

/// Compiles one stage of WGSL on the CPU.
///
/// Diagnostics are the compiler's rendered messages (with source excerpts), so
/// callers can surface them without re-parsing log output.
pub fn compile_stage(
    stage: ShaderStage,
    source: &str,
    origin: &str,
) -> Result<CompiledStage, ShaderError> {
    let compile_error = |diagnostic: String| ShaderError::Compile {
        stage,
        origin: origin.to_string(),
        diagnostic,
    };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| compile_error(err.emit_to_string(source)))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    );
    validator
        .validate(&module)
        .map_err(|err| compile_error(err.emit_to_string(source)))?;

    log::trace!("{stage} stage '{origin}' compiled");

    Ok(CompiledStage {
        stage,
        origin: origin.to_string(),
        source: source.to_string(),
        module,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = include_str!("shaders/sprite.vert.wgsl");
    const FRAGMENT: &str = include_str!("shaders/sprite.frag.wgsl");

    #[test]
    fn builtin_sources_compile() {
        let v = compile_stage(ShaderStage::Vertex, VERTEX, "sprite.vert").unwrap();
        let f = compile_stage(ShaderStage::Fragment, FRAGMENT, "sprite.frag").unwrap();
        assert_eq!(v.entry_point().map(|ep| ep.name.as_str()), Some("vs_main"));
        assert_eq!(f.entry_point().map(|ep| ep.name.as_str()), Some("fs_main"));
    }

    #[test]
    fn syntax_error_names_the_stage() {
        let err = compile_stage(ShaderStage::Vertex, "bad vertex syntax", "inline").unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Vertex));
        assert!(!err.diagnostic().unwrap_or_default().is_empty());
    }

    #[test]
    fn fragment_syntax_error_names_fragment() {
        let src = "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0) }";
        let err = compile_stage(ShaderStage::Fragment, src, "inline").unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Fragment));
    }

    #[test]
    fn type_error_is_reported_as_compile_error() {
        // Parses, but returning f32 from a vec4 function fails validation or lowering.
        let src = "@fragment fn fs_main() -> @location(0) vec4<f32> { return 1.0; }";
        let err = compile_stage(ShaderStage::Fragment, src, "inline").unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn entry_point_lookup_is_per_stage() {
        // A module with only a fragment entry point has no vertex entry point.
        let stage = compile_stage(ShaderStage::Vertex, FRAGMENT, "inline").unwrap();
        assert!(stage.entry_point().is_none());
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }
}
