pub mod decode;
pub mod info;
pub mod resample;
pub mod spectrum;
