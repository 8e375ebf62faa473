mod affine;
mod bounded;
mod flow;

pub use affine::AffineFlow;
pub use bounded::BoundedFlow;
pub use flow::Flow;
