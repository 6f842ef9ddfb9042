use tracing::{debug, info};

use crate::error::Result;
use crate::infra::{EpochReport, TrainingObserver};

pub struct DefaultObserver;

impl TrainingObserver for DefaultObserver {
    fn on_train_start(&mut self, policy_name: &str, epochs: usize) -> Result<()> {
        info!("Training {} for {} epochs", policy_name, epochs);
        Ok(())
    }

    fn on_epoch(&mut self, report: &EpochReport) -> Result<()> {
        if report.improved {
            info!(
                "Epoch {:5}: loss = {:3.6}, avg total reward = {:.4} (best)",
                report.epoch, report.loss, report.avg_total_reward
            );
        } else {
            debug!(
                "Epoch {:5}: loss = {:3.6}, avg total reward = {:.4}",
                report.epoch, report.loss, report.avg_total_reward
            );
        }
        Ok(())
    }

    fn on_train_end(&mut self, best: Option<(usize, f32)>) -> Result<()> {
        match best {
            Some((epoch, reward)) => info!("Best avg total reward {:.4} at epoch {}", reward, epoch),
            None => info!("Training finished without any epoch"),
        }
        Ok(())
    }
}
