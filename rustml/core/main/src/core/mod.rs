pub(crate) mod runtime;
pub(crate) mod shape;
