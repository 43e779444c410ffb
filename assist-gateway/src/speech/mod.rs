pub mod elevenlabs;

pub use elevenlabs::{ElevenLabsClient, SpeechError, Voice, audio_extension, save_audio};
