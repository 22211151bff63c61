pub mod consumer;
pub mod dead_letter;
pub mod publish;
pub mod replay;
pub mod router;
