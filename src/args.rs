use clap::Parser;
use std::path::PathBuf;

/// Bakes vertex lighting for a glTF scene and renders a path traced preview of it.
#[derive(Parser, Debug)]
pub struct Args {
    /// glTF file to load, a built-in test scene is used when omitted
    pub file_to_open: Option<PathBuf>,
    /// TOML file with ray tracing settings and `[materials.<name>]` overrides
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Skip the light bake
    #[arg(long, default_value_t = false)]
    pub no_bake: bool,
    /// Frames accumulated for the preview image
    #[arg(short, long, default_value_t = 64)]
    pub preview_frames: u32,
    /// Preview resolution as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size, default_value = "640x360")]
    pub preview_size: (u32, u32),
    /// Where the preview PNG is written
    #[arg(short, long, default_value = "preview.png")]
    pub output: PathBuf,
    /// Give up on the bake after this many frames
    #[arg(long, default_value_t = 100_000)]
    pub max_frames: u64,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;

    let parse = |v: &str| v.trim().parse::<u32>().map_err(|e| format!("invalid size `{v}`: {e}"));
    let size = (parse(width)?, parse(height)?);

    if size.0 == 0 || size.1 == 0 {
        return Err("preview size must not be zero".into());
    }

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["raybake"]);

        assert!(args.file_to_open.is_none());
        assert!(!args.no_bake);
        assert_eq!(args.preview_frames, 64);
        assert_eq!(args.output, PathBuf::from("preview.png"));
        assert_eq!(args.preview_size, (640, 360));
    }

    #[test]
    fn preview_size_parses() {
        let args = Args::parse_from(["raybake", "--preview-size", "1280x720"]);

        assert_eq!(args.preview_size, (1280, 720));
        assert!(Args::try_parse_from(["raybake", "--preview-size", "0x720"]).is_err());
        assert!(Args::try_parse_from(["raybake", "--preview-size", "1280"]).is_err());
    }

    #[test]
    fn scene_and_flags() {
        let args = Args::parse_from(["raybake", "scene.glb", "-c", "rt.toml", "--no-bake", "-p", "8"]);

        assert_eq!(args.file_to_open, Some(PathBuf::from("scene.glb")));
        assert_eq!(args.config, Some(PathBuf::from("rt.toml")));
        assert!(args.no_bake);
        assert_eq!(args.preview_frames, 8);
    }
}
