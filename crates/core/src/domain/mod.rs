pub mod association;
pub mod order;
pub mod product;
pub mod settings;
