pub mod inference;
pub mod propagation;
