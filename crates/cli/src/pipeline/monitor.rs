use std::thread;
use std::time::Duration;

use nightqa_ingest::{DiscoveryMode, ExposureDiscovery, ProcessedSet};
use tracing::{error, info};

use super::Pipeline;
use crate::external::run_job_command;

#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub mode: DiscoveryMode,
    /// Submit each exposure to the batch scheduler instead of processing it here.
    pub batch: bool,
    pub poll: Duration,
    /// Return after this many consecutive empty discovery passes.
    pub max_idle_polls: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub processed: usize,
    pub failed: usize,
    pub submitted: usize,
}

impl Pipeline {
    /// Poll for new exposures until stopped.
    ///
    /// Discovery, processing and persistence run on the calling thread; only
    /// metric computation fans out. Per-exposure failures are logged and never
    /// end the loop. Every handled exposure, failed or not, joins `processed`
    /// so it is not retried before restart.
    pub fn run_loop(&self, options: &LoopOptions, processed: &mut ProcessedSet) -> LoopSummary {
        let discovery = ExposureDiscovery::new(self.config.raw_layout(), self.config.output_layout())
            .with_start_night(self.config.monitor.start_night);
        let mut summary = LoopSummary::default();
        let mut idle = 0usize;

        info!(mode = %options.mode, batch = options.batch, "monitor loop started");
        loop {
            if self.stop_requested() {
                info!(stop_file = %self.config.monitor.stop_file.display(), "stop requested");
                break;
            }

            let Some(id) = discovery.next(options.mode, processed) else {
                idle += 1;
                if options.max_idle_polls.is_some_and(|max| idle >= max) {
                    break;
                }
                thread::sleep(options.poll);
                continue;
            };
            idle = 0;

            if options.batch {
                match self.external.submit(id, &run_job_command(&self.config, id)) {
                    Ok(()) => summary.submitted += 1,
                    Err(e) => {
                        error!(night = id.night, expid = id.expid, error = %e, "batch submission failed");
                        summary.failed += 1;
                    }
                }
            } else {
                match self.process_exposure(id) {
                    Ok(_) => summary.processed += 1,
                    Err(e) => {
                        error!(night = id.night, expid = id.expid, error = %e, "exposure failed");
                        summary.failed += 1;
                    }
                }
            }
            processed.insert(id);
        }

        info!(
            processed = summary.processed,
            submitted = summary.submitted,
            failed = summary.failed,
            "monitor loop finished"
        );
        summary
    }
}
