//! talkpic CLI: animate a portrait photo to a voice track.
//!
//! Usage:
//!   talkpic render <SCENE>            Capture the animation to a video file
//!   talkpic play <SCENE>              Real-time playback with a terminal meter
//!   talkpic snapshot <SCENE> -o PNG   Render one still frame
//!   talkpic init <IMAGE> <AUDIO>      Write a scene manifest
//!   talkpic info <SCENE>              Show scene, anchors, and track facts
//!   talkpic check                     Check encoder availability

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use talkpic_common::config::AppConfig;

mod commands;

use commands::SceneArgs;

#[derive(Parser)]
#[command(
    name = "talkpic",
    about = "Lip-synced talking photos from a portrait and a voice track",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the animation to a video file
    Render {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output file path (default: lip-sync-animation-<ms>.<ext> in the output dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: mp4|webm
        #[arg(long)]
        format: Option<String>,

        /// Pace frames in real time instead of rendering as fast as possible
        #[arg(long)]
        realtime: bool,
    },

    /// Play the animation in real time with a live meter
    Play {
        #[command(flatten)]
        scene: SceneArgs,
    },

    /// Render a single still frame to PNG
    Snapshot {
        #[command(flatten)]
        scene: SceneArgs,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Mouth opening [0.0, 1.0]
        #[arg(long, default_value = "0.0")]
        opening: f64,

        /// Eye closure [0.0, 1.0]
        #[arg(long, default_value = "0.0")]
        closure: f64,
    },

    /// Create a scene manifest
    Init {
        /// Portrait image
        image: PathBuf,

        /// Voice track (WAV)
        audio: PathBuf,

        /// Manifest path
        #[arg(short, long, default_value = "scene.json")]
        output: PathBuf,

        /// Mouth region as x,y,width,height fractions
        #[arg(long)]
        mouth: Option<String>,

        /// Left eye region as x,y,width,height fractions
        #[arg(long)]
        left_eye: Option<String>,

        /// Right eye region as x,y,width,height fractions
        #[arg(long)]
        right_eye: Option<String>,
    },

    /// Show scene information
    Info {
        #[command(flatten)]
        scene: SceneArgs,
    },

    /// Check encoder availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    talkpic_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render {
            scene,
            output,
            format,
            realtime,
        } => commands::render::run(scene, output, format, realtime, &config).await,
        Commands::Play { scene } => commands::play::run(scene, &config).await,
        Commands::Snapshot {
            scene,
            output,
            opening,
            closure,
        } => commands::snapshot::run(scene, output, opening, closure, &config).await,
        Commands::Init {
            image,
            audio,
            output,
            mouth,
            left_eye,
            right_eye,
        } => commands::init::run(image, audio, output, mouth, left_eye, right_eye),
        Commands::Info { scene } => commands::info::run(scene, &config).await,
        Commands::Check => commands::check::run(&config),
    }
}
