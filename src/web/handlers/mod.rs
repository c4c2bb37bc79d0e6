pub mod moderate;
pub mod transcribe;
