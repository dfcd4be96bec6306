//! edl2ffmpeg — renders a declarative Edit Decision List into one encoded
//! video file.
//!
//! Usage:
//!     edl2ffmpeg project.edl.json output.mp4
//!     edl2ffmpeg project.edl.json output.mp4 --crf 18 --preset slow -v

use clap::Parser;
use edl2ffmpeg_core::{load_timeline, EdlError, RenderContext};
use edl2ffmpeg_media::{EncodeOptions, TimelineDriver};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "edl2ffmpeg",
    version,
    about = "Render an Edit Decision List (EDL) JSON file into a single video file"
)]
struct Cli {
    /// Path to the EDL JSON document.
    edl: PathBuf,

    /// Destination video file (container inferred from extension).
    output: PathBuf,

    /// H.264 constant rate factor — lower is higher quality, larger output.
    #[arg(long, default_value_t = 23)]
    crf: u8,

    /// libx264 preset (ultrafast .. veryslow).
    #[arg(long, default_value = "fast")]
    preset: String,

    /// Verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "edl2ffmpeg=debug,info" } else { "edl2ffmpeg=info,warn" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast::<EdlError>() {
                Ok(edl_err) => {
                    tracing::error!("{}", edl_err.diagnostic());
                    ExitCode::from(edl_err.exit_code() as u8)
                }
                Err(other) => {
                    tracing::error!("{other:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&cli.edl)
        .map_err(|e| EdlError::config(cli.edl.to_string_lossy(), format!("cannot read file: {e}")))?;
    let timeline = load_timeline(&text)?;

    tracing::info!(
        "rendering {}x{} @ {:.3}fps, {} clip(s) -> {}",
        timeline.width,
        timeline.height,
        timeline.fps,
        timeline.clips.len(),
        cli.output.display()
    );

    let ctx = RenderContext::new();
    let cancel = Arc::new(AtomicBool::new(false));

    let opts = EncodeOptions { crf: cli.crf, preset: cli.preset };
    let driver = TimelineDriver::new(&timeline, ctx.clone(), cancel);
    driver.render(&cli.output, &opts)?;

    let metrics = ctx.metrics.snapshot();
    tracing::info!(
        "done: {} frame(s) rendered, {} pool allocation(s), {} pool recycle(s)",
        metrics.frames_rendered,
        metrics.pool_allocations,
        metrics.pool_recycles
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_edl(dir: &tempfile::TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("project.edl.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn malformed_edl_surfaces_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let edl = write_edl(&dir, "{not json");
        let output = dir.path().join("out.mp4");

        let cli = Cli { edl, output, crf: 20, preset: "medium".to_string(), verbose: false };
        let err = run(cli).unwrap_err();
        let edl_err = err.downcast::<EdlError>().expect("expected EdlError");
        assert_eq!(edl_err.exit_code(), 1);
    }

    #[test]
    fn missing_source_media_surfaces_as_source_error() {
        let dir = tempfile::tempdir().unwrap();
        let edl = write_edl(
            &dir,
            r#"{
                "width": 64, "height": 64, "fps": 30,
                "tracks": [{"type": "video"}],
                "clips": [
                    {"track": 0, "start": 0.0, "duration": 1.0,
                     "source": {"uri": "/nonexistent/does-not-exist.mp4"}}
                ]
            }"#,
        );
        let output = dir.path().join("out.mp4");

        let cli = Cli { edl, output: output.clone(), crf: 20, preset: "medium".to_string(), verbose: false };
        let err = run(cli).unwrap_err();
        let edl_err = err.downcast::<EdlError>().expect("expected EdlError");
        assert_eq!(edl_err.exit_code(), 2);
        assert!(!output.exists(), "partial output must be removed on render failure");
    }
}
