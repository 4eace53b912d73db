//! Veth core library: the streaming chat assistant (conversation log, reply adapters, widget
//! controller), marketing copy generation, the Gemini client, and the gateway that hosts them.

pub mod chat;
pub mod config;
pub mod copy;
pub mod gateway;
pub mod init;
pub mod llm;
