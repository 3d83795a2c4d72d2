use anyhow::{Context, Result, anyhow};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::engine::{ProbeEvent, ProbeSource, SharedStats};
use crate::tracker::live::Tracker;

/// Events buffered between the probe source and the consumer
const EVENT_BUFFER: usize = 256;

/// Runs a live session: one probe source, one event consumer, and the
/// interrupt and interactive statistics listeners
///
/// The first error reported by any of them stops the source and is returned.
pub struct Supervisor<S: ProbeSource> {
    source: S,
    tracker: Arc<Tracker>,
    stats: SharedStats,
    terminal: bool,
}

impl<S: ProbeSource> Supervisor<S> {
    pub fn new(source: S, config: Config) -> Self {
        let tracker = Arc::new(Tracker::new(config, source.stop_handle()));
        let stats = source.statistics();
        Self {
            source,
            tracker,
            stats,
            terminal: true,
        }
    }

    /// Skip the Ctrl+C listener and the stdin reader
    pub fn without_terminal(mut self) -> Self {
        self.terminal = false;
        self
    }

    pub fn tracker(&self) -> Arc<Tracker> {
        self.tracker.clone()
    }

    /// Drive the session to completion, writing session output to `out`
    pub async fn run<W: Write + Send + 'static>(self, mut out: W) -> Result<()> {
        let Self {
            source,
            tracker,
            stats,
            terminal,
        } = self;

        writeln!(out, "{}", tracker.render_start(source.host(), source.target()))
            .context("failed to write output")?;
        out.flush().context("failed to write output")?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<anyhow::Error>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let stop = source.stop_handle();

        // Event consumer
        {
            let tracker = tracker.clone();
            let errors = error_tx.clone();
            tokio::spawn(async move {
                let mut event_rx = event_rx;
                match consume(&tracker, &mut event_rx, &mut out).await {
                    Ok(()) => {
                        let _ = done_tx.send(());
                    }
                    Err(e) => {
                        // Queue the cause before the source sees a closed channel
                        let _ = errors.send(e);
                    }
                }
                drop(event_rx);
            });
        }

        // Probe source; the guard keeps the event channel open until its
        // error (if any) is queued ahead of the consumer's
        {
            let errors = error_tx.clone();
            let guard = event_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = source.run(event_tx).await {
                    let _ = errors.send(e);
                }
                drop(guard);
            });
        }

        if terminal {
            spawn_interrupt_listener(tracker.clone(), error_tx.clone());
            spawn_stats_reader(tracker.clone(), stats, error_tx.clone());
        }

        tokio::select! {
            biased;
            Some(err) = error_rx.recv() => {
                stop.cancel();
                Err(err)
            }
            done = done_rx => {
                done.map_err(|_| anyhow!("event consumer stopped unexpectedly"))
            }
        }
    }
}

/// Apply events to the tracker until the source's summary arrives
async fn consume<W: Write>(
    tracker: &Tracker,
    events: &mut mpsc::Receiver<ProbeEvent>,
    out: &mut W,
) -> Result<()> {
    while let Some(event) = events.recv().await {
        let written = match event {
            ProbeEvent::Reply(reply) => tracker.on_reply(out, &reply),
            ProbeEvent::Duplicate(reply) => tracker.on_duplicate(out, &reply),
            ProbeEvent::Summary(summary) => {
                let text = tracker.render_statistics(&summary, tracker.was_interrupted(), true);
                out.write_all(text.as_bytes())
                    .and_then(|()| out.flush())
                    .context("failed to write statistics")?;
                return Ok(());
            }
        };
        written
            .and_then(|()| out.flush())
            .context("failed to write output")?;
    }

    Err(anyhow!("probe source stopped without a summary"))
}

/// Repeated Ctrl+C only re-requests the stop
fn spawn_interrupt_listener(tracker: Arc<Tracker>, errors: mpsc::UnboundedSender<anyhow::Error>) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                let _ = errors.send(anyhow::Error::new(e).context("failed to listen for Ctrl+C"));
                break;
            }
            tracker.interrupt();
        }
    });
}

/// Each line on stdin prints interim statistics to stderr
fn spawn_stats_reader(
    tracker: Arc<Tracker>,
    stats: SharedStats,
    errors: mpsc::UnboundedSender<anyhow::Error>,
) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        match serve_stats_requests(&tracker, &stats, stdin.lock(), &mut io::stderr()) {
            Ok(()) => log::debug!("Standard input closed, interactive statistics disabled"),
            Err(e) => {
                let _ = errors.send(e);
            }
        }
    });
}

/// Render a non-final statistics block to `sink` for every line of `input`
///
/// Returns once `input` reaches end of file.
pub fn serve_stats_requests<R: BufRead, W: Write>(
    tracker: &Tracker,
    stats: &SharedStats,
    input: R,
    sink: &mut W,
) -> Result<()> {
    for line in input.lines() {
        line.context("failed to read standard input")?;

        let text = tracker.render_statistics(&stats.snapshot(), tracker.was_interrupted(), false);
        sink.write_all(text.as_bytes())
            .and_then(|()| sink.flush())
            .context("failed to write statistics")?;
    }
    Ok(())
}
