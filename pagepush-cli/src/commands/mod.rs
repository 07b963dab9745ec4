pub mod daemon;
pub mod init;
pub mod publish;
pub mod push;
pub mod status;
