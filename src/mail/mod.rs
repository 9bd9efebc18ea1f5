pub mod decoders;
pub mod imap_transport;
pub mod parse;
pub mod transport;
