pub mod encoding_queue;
pub mod recovery;
pub mod transcoder;
