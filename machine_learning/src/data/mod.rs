pub mod dataloader;
pub mod dataset;
pub mod file;
pub mod split;

pub use dataloader::{Batches, num_batches};
pub use dataset::{Batch, Dataset, SampleSource, WeightPolicy};
pub use file::FileDataset;
pub use split::{Split, split_range};
