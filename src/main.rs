use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use stream_recorder::utils::logging;
use stream_recorder::{
    AppConfig, CaptureTask, OwnerInfo, Recorder, RecorderContext, RecorderEvent,
};
use tokio::sync::mpsc;

const USAGE: &str = "usage: stream-recorder <name> <stream-url> [config.json]";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (name, url) = match (args.next(), args.next()) {
        (Some(name), Some(url)) => (name, url),
        _ => bail!(USAGE),
    };
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("recorder.json"));

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    logging::init(&config.log).context("initializing logging")?;

    tracing::info!("Starting Stream Recorder v{}", env!("CARGO_PKG_VERSION"));

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let ctx = RecorderContext::new(config.recorder, events_tx);
    let task = CaptureTask::new(name, url.clone(), OwnerInfo::new(url));
    let recorder = Recorder::new(task, ctx);

    recorder.start_record(None).context("starting recorder")?;
    tracing::info!("Recording into {:?}", recorder.save_path());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            tracing::info!("Interrupted, stopping {}", recorder.name());
            recorder.stop_record();
            let state = recorder.wait_for_exit().await;
            tracing::info!("Recorder finished: {}", state);
        }
        event = events_rx.recv() => {
            if let Some(RecorderEvent::StreamDisconnect { recorder, exit_code }) = event {
                tracing::warn!(
                    "Stream {} disconnected (exit code {:?}), files in {:?}",
                    recorder.name(),
                    exit_code,
                    recorder.save_path()
                );
            }
        }
    }

    Ok(())
}
