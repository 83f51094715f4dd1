//! linegpt core library — LINE webhook relay to an OpenAI completion model,
//! used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod prompts;
pub mod version;
