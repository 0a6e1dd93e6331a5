pub mod plot;
pub mod text;
