pub mod intent;
pub mod policy;
