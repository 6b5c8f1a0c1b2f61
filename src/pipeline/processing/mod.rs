// Pipeline processing: value parsing, row validation and normalization

pub mod normalize;
pub mod parse;
pub mod validate;

pub use normalize::{NormalizeError, Normalizer};
pub use validate::Validator;
