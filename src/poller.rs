use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, Sink};
use crate::storage::Store;

/// Runs an update pass on a fixed interval until stopped.
///
/// Passes run back to back on one thread and hold the bridge lock for their
/// whole duration, so a pass never overlaps another pass or a command.
pub struct Poller {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(
        bridge: Arc<Mutex<Bridge>>,
        store: Arc<Store>,
        interval: Duration,
        mut sink: Box<dyn Sink + Send>,
    ) -> Self {
        let (stop_tx, stop_rx) = unbounded();

        let thread = thread::spawn(move || {
            info!(interval = %humantime::format_duration(interval), "poller started");
            loop {
                {
                    let mut bridge = bridge.lock();
                    let report = bridge.update(sink.as_mut());
                    debug!(lines = report.lines, "poll pass delivered");
                    if let Err(err) = bridge.save(&store) {
                        let error = format!("{err:#}");
                        warn!(error = %error, "saving subscriptions failed");
                    }
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("poller stopped");
        });

        Self {
            stop: stop_tx,
            thread,
        }
    }

    /// Signals the loop and waits for an in-flight pass to finish.
    pub fn stop(self) {
        let _ = self.stop.send(());
        if self.thread.join().is_err() {
            warn!("poller thread panicked");
        }
    }
}
