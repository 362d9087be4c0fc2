use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("datagram too short for an IPX header")]
    TooShort,
}
