mod builder;
mod config;
mod history;
mod trainer;

pub use builder::{BuiltTrainer, TrainerBuilder};
pub use config::TrainerConfig;
pub use history::{LossHistory, TrainingOutcome};
pub use trainer::FlowTrainer;
