use crate::error::Result;

/// Statistics of one optimization epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub loss: f32,
    pub avg_total_reward: f32,
    /// The average total reward beat every earlier epoch
    pub improved: bool,
}

/// Trait for observing policy optimization
pub trait TrainingObserver {
    /// Called once before the first epoch
    fn on_train_start(&mut self, policy_name: &str, epochs: usize) -> Result<()>;

    /// Called after every optimization step
    fn on_epoch(&mut self, report: &EpochReport) -> Result<()>;

    /// Called once after the last epoch with the best `(epoch, reward)` pair
    fn on_train_end(&mut self, best: Option<(usize, f32)>) -> Result<()>;
}
