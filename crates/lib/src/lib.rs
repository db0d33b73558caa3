//! hapi core library: Zalo webhook intake, retrieval, reply composition, and the
//! gateway used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod pipeline;
pub mod responder;
pub mod retrieval;
