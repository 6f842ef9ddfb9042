mod composite_observer;
mod default_observer;
pub mod events;
mod progress_observer;
mod timing;
mod training_observer;

pub use composite_observer::CompositeObserver;
pub use default_observer::DefaultObserver;
pub use events::SummaryWriter;
pub use progress_observer::ProgressObserver;
pub use timing::timed;
pub use training_observer::{EpochReport, TrainingObserver};
