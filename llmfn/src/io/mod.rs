//! Side-effecting helpers: providers, config, declaration files, attempt logs.

pub mod attempt_log;
pub mod codex;
pub mod config;
pub mod declarations;
pub mod openai;
pub mod process;
pub mod provider;
