use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};
use crate::infra::{EpochReport, TrainingObserver};

/// Progress bar observer - shows epochs and the latest loss
pub struct ProgressObserver {
    progress_bar: Option<ProgressBar>,
}

impl ProgressObserver {
    pub fn new() -> Self {
        Self { progress_bar: None }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingObserver for ProgressObserver {
    fn on_train_start(&mut self, _policy_name: &str, epochs: usize) -> Result<()> {
        let pb = ProgressBar::new(epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} epochs ({msg})")
                .map_err(|e| Error::ProgressBarTemplate {
                    message: e.to_string(),
                })?
                .progress_chars("=>-"),
        );
        self.progress_bar = Some(pb);
        Ok(())
    }

    fn on_epoch(&mut self, report: &EpochReport) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.inc(1);
            pb.set_message(format!("loss = {:3.6}", report.loss));
        }
        Ok(())
    }

    fn on_train_end(&mut self, best: Option<(usize, f32)>) -> Result<()> {
        if let Some(pb) = self.progress_bar.take() {
            let message = match best {
                Some((_, reward)) => format!("best reward = {reward:.4}"),
                None => "no epochs".to_string(),
            };
            pb.finish_with_message(message);
        }
        Ok(())
    }
}
