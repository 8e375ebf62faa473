mod loss_fn;
mod weighted_nll;

pub use loss_fn::LossFn;
pub use weighted_nll::WeightedNll;
