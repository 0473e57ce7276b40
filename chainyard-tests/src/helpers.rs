pub mod fake_runtime;
pub mod yard;
