//! Write a new scene manifest.

use std::path::{Path, PathBuf};

use talkpic_face_model::{AnchorRegion, LoadedScene, RegionKind, Scene};

pub fn run(
    image: PathBuf,
    audio: PathBuf,
    output: PathBuf,
    mouth: Option<String>,
    left_eye: Option<String>,
    right_eye: Option<String>,
) -> anyhow::Result<()> {
    let base = manifest_dir(&output);
    let mut scene = Scene::new(relative_to(&base, &image), relative_to(&base, &audio));

    for (kind, spec) in [
        (RegionKind::Mouth, mouth),
        (RegionKind::LeftEye, left_eye),
        (RegionKind::RightEye, right_eye),
    ] {
        if let Some(spec) = spec {
            let region = parse_region(&spec)
                .map_err(|e| anyhow::anyhow!("Invalid {} region '{spec}': {e}", kind.label()))?;
            scene
                .anchors
                .confirm(kind, region)
                .map_err(|e| anyhow::anyhow!("Invalid {} region: {e}", kind.label()))?;
        }
    }

    let loaded = LoadedScene {
        path: output,
        scene,
    };
    loaded
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to write scene: {e}"))?;

    println!("Scene written: {}", loaded.path.display());
    println!("  Image: {}", loaded.scene.image.display());
    println!("  Audio: {}", loaded.scene.audio.display());
    for kind in RegionKind::ALL {
        match loaded.scene.anchors.get(kind) {
            Some(r) => println!(
                "  {:<10} x={:.3} y={:.3} w={:.3} h={:.3}",
                kind.label(),
                r.x,
                r.y,
                r.width,
                r.height
            ),
            None => println!("  {:<10} (not selected)", kind.label()),
        }
    }
    for missing in loaded.missing_media() {
        println!("  [WARN] {missing}");
    }
    if !loaded.scene.anchors.eyes_present() {
        println!();
        println!("Without both eye regions the portrait will not blink.");
    }

    Ok(())
}

/// Parse `x,y,width,height` fractions.
fn parse_region(spec: &str) -> anyhow::Result<AnchorRegion> {
    let values = spec
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    let [x, y, width, height] = values[..] else {
        anyhow::bail!("expected four comma-separated numbers");
    };
    Ok(AnchorRegion::new(x, y, width, height)?)
}

fn manifest_dir(manifest: &Path) -> PathBuf {
    let dir = manifest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// Store media paths relative to the manifest when they live beneath it.
fn relative_to(base: &Path, media: &Path) -> PathBuf {
    let Ok(absolute) = std::fs::canonicalize(media) else {
        return media.to_path_buf();
    };
    absolute
        .strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or(absolute)
}
