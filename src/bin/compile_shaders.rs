use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, bail};
use log::*;

use ash_sdl_textured_quad::util::manifest_path;

/// Compiles each glsl source shader into spv
/// requires glslc on the path (ie, from the vulkan sdk)
fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let source_dir = manifest_path(["shaders", "source"]);
    let compiled_dir = manifest_path(["shaders", "compiled"]);
    fs::create_dir_all(&compiled_dir)
        .with_context(|| format!("failed to create {compiled_dir:?}"))?;

    let entries =
        fs::read_dir(&source_dir).with_context(|| format!("failed to read {source_dir:?}"))?;

    let mut compiled = 0;
    for entry in entries {
        let in_path = entry?.path();
        let Some(file_name) = in_path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some((stem, stage)) = shader_stage(file_name) else {
            debug!("skipping {file_name}");
            continue;
        };

        let out_path = compiled_dir.join(format!("{stem}.{stage}.spv"));
        compile(&in_path, &out_path, stage)?;
        compiled += 1;
    }

    info!("compiled {compiled} shaders into {compiled_dir:?}");

    Ok(())
}

/// `quad.vert.glsl` -> (`quad`, `vert`)
fn shader_stage(file_name: &str) -> Option<(&str, &'static str)> {
    let without_ext = file_name.strip_suffix(".glsl")?;
    for stage in ["vert", "frag"] {
        if let Some(stem) = without_ext.strip_suffix(stage).and_then(|s| s.strip_suffix('.')) {
            return Some((stem, stage));
        }
    }

    None
}

fn compile(in_path: &Path, out_path: &Path, stage: &str) -> anyhow::Result<()> {
    let output = Command::new("glslc")
        .arg(format!("-fshader-stage={stage}"))
        .arg(in_path)
        .arg("-o")
        .arg(out_path)
        .output()
        .context("failed to run glslc; is the Vulkan SDK on the path?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("failed to compile {in_path:?}:\n{stderr}");
    }

    debug!("{in_path:?} -> {out_path:?}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_comes_from_the_inner_extension() {
        assert_eq!(shader_stage("quad.vert.glsl"), Some(("quad", "vert")));
        assert_eq!(shader_stage("quad.frag.glsl"), Some(("quad", "frag")));
    }

    #[test]
    fn other_files_are_skipped() {
        assert_eq!(shader_stage("quad.glsl"), None);
        assert_eq!(shader_stage("quad.vert.spv"), None);
        assert_eq!(shader_stage("quad.comp.glsl"), None);
        assert_eq!(shader_stage("README.md"), None);
    }
}
