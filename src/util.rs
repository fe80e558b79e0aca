pub(crate) mod redact;
pub mod time;
