// Hearo AI: moderation and speech-to-text inference server.
//
// This is the library root. Each module corresponds to one of the two
// inference services plus the HTTP surface that composes them.

pub mod config;
pub mod moderation;
pub mod transcription;
pub mod web;
