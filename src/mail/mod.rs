pub mod decoders;
pub mod extract;
pub mod gmail_client;
