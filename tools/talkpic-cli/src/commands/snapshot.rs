//! Render one still frame.

use std::path::PathBuf;
use std::sync::Arc;

use talkpic_common::config::AppConfig;
use talkpic_render_engine::FrameCompositor;

use super::{open_session, SceneArgs};

pub async fn run(
    args: SceneArgs,
    output: PathBuf,
    opening: f64,
    closure: f64,
    config: &AppConfig,
) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&opening) || !(0.0..=1.0).contains(&closure) {
        anyhow::bail!("--opening and --closure must be within [0.0, 1.0]");
    }

    let (_scene, session) = open_session(&args, false).await?;
    let image = session
        .image()
        .ok_or_else(|| anyhow::anyhow!("Scene image did not load"))?;

    let surface = args.surface(config);
    let anchors = session.resolve_anchors(surface)?;
    let mut compositor = FrameCompositor::new(Arc::clone(&image.pixels));
    let frame = compositor.render_frame(surface, opening, closure, &anchors);

    frame
        .save(&output)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", output.display()))?;
    println!(
        "Snapshot written: {} ({}x{}, opening {opening:.2}, closure {closure:.2})",
        output.display(),
        surface.width,
        surface.height
    );
    Ok(())
}
