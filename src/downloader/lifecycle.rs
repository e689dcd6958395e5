//! Shutdown coordination.

use crate::error::Result;

use super::{PipelineState, SubtitleDownloader};

impl SubtitleDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new jobs
    /// 2. Sets the stop flag of every job's pending task, so queued payloads never run
    /// 3. Closes the worker pool
    /// 4. Stops the controlling context and waits for it to exit
    ///
    /// Payloads already running finish on their own; their results are discarded.
    /// Calling `shutdown` again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1 + 2. Stop accepting new jobs and stop pending tasks
        match self
            .context
            .query(|state: &mut PipelineState| {
                state.accepting_new = false;
                let mut stopped = 0usize;
                for job in state.jobs.values_mut() {
                    if let Some(task) = job.current_task.take() {
                        task.stop();
                        stopped += 1;
                    }
                }
                stopped
            })
            .await
        {
            Ok(stopped) => tracing::info!(stopped, "Stopped accepting new jobs and signaled pending tasks"),
            Err(_) => tracing::debug!("Controlling context already stopped"),
        }

        // 3. Close the worker pool
        self.scheduler.close();

        // 4. Stop the controlling context
        self.shutdown_token.cancel();
        let control_loop = self.control_loop.lock().await.take();
        if let Some(handle) = control_loop {
            match handle.await {
                Ok(state) => tracing::debug!(jobs = state.jobs.len(), "Controlling context exited"),
                Err(e) => tracing::error!(error = %e, "Controlling context task failed"),
            }
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
