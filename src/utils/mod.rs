pub(crate) mod http;
pub(crate) mod task;

#[doc(hidden)]
pub mod test_support;
