pub mod flows;
pub mod loss;
